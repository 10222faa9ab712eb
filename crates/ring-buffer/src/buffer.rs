//! Ring Buffer Implementation

/// Fixed-capacity ring buffer, oldest entry evicted first
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Box<[T]>,
    /// Index of the oldest entry
    head: usize,
    /// Number of live entries
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: vec![T::default(); capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Push an entry, overwriting the oldest when full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let capacity = self.storage.len();

        if self.len < capacity {
            let idx = (self.head + self.len) % capacity;
            self.storage[idx] = item;
            self.len += 1;
            None
        } else {
            let evicted = std::mem::replace(&mut self.storage[self.head], item);
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    /// Most recently pushed entry
    pub fn newest(&self) -> Option<&T> {
        self.get_from_newest(0)
    }

    /// Mutable access to the most recently pushed entry
    pub fn newest_mut(&mut self) -> Option<&mut T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.len - 1) % self.storage.len();
        Some(&mut self.storage[idx])
    }

    /// Entry `offset` steps back from the newest (0 = newest)
    pub fn get_from_newest(&self, offset: usize) -> Option<&T> {
        if offset >= self.len {
            return None;
        }
        let capacity = self.storage.len();
        let idx = (self.head + self.len - 1 - offset) % capacity;
        Some(&self.storage[idx])
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        let capacity = self.storage.len();
        (0..self.len).map(move |i| &self.storage[(self.head + i) % capacity])
    }

    /// Iterate newest to oldest
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().rev()
    }

    /// Get the number of entries currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5u32 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.newest(), Some(&400));
        assert_eq!(buffer.iter().next(), Some(&0));
        assert_eq!(buffer.get_from_newest(2), Some(&200));
        assert_eq!(buffer.get_from_newest(5), None);
    }

    #[test]
    fn test_newest_mut_after_wrap() {
        let mut buffer = RingBuffer::new(3);
        assert!(buffer.newest_mut().is_none());

        for i in 0..4u32 {
            buffer.push(i);
        }
        if let Some(newest) = buffer.newest_mut() {
            *newest = 42;
        }
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![1, 2, 42]);
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        let mut evicted = Vec::new();
        for i in 0..8u32 {
            if let Some(old) = buffer.push(i) {
                evicted.push(old);
            }
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(evicted, vec![0, 1, 2]);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5, 6, 7]);
        assert_eq!(
            buffer.iter_newest_first().copied().collect::<Vec<_>>(),
            vec![7, 6, 5, 4, 3]
        );
    }


    #[test]
    fn test_zero_capacity_is_promoted() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(9u8);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.newest(), Some(&9));
    }

    proptest! {
        #[test]
        fn pt_len_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
            let mut buffer = RingBuffer::new(capacity);
            for i in 0..pushes {
                buffer.push(i);
                prop_assert!(buffer.len() <= buffer.capacity());
            }
            prop_assert_eq!(buffer.len(), pushes.min(capacity));
            if pushes > 0 {
                prop_assert_eq!(buffer.newest(), Some(&(pushes - 1)));
                prop_assert_eq!(buffer.iter().next(), Some(&pushes.saturating_sub(capacity)));
            }
        }
    }
}
