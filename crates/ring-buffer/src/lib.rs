//! Fixed-Capacity Ring Buffer
//!
//! Provides the sliding window used for fatigue history and frame timing
//! statistics. Storage is allocated once; pushes never allocate.

mod buffer;

pub use buffer::RingBuffer;
