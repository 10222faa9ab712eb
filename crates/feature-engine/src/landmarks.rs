//! Face mesh landmark layout

use serde::{Deserialize, Serialize};

use crate::FeatureError;

/// Minimum number of landmarks in a full face mesh
pub const MIN_LANDMARKS: usize = 468;

/// Left eye boundary, ordered p0..p5 (outer corner, upper, upper, inner corner, lower, lower)
pub(crate) const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
/// Right eye boundary, same ordering as `LEFT_EYE`
pub(crate) const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

pub(crate) const NOSE_TIP: usize = 1;
pub(crate) const CHIN: usize = 152;
pub(crate) const MOUTH_LEFT: usize = 61;
pub(crate) const MOUTH_RIGHT: usize = 291;

/// One landmark in image-normalized coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth (unused by the 2D geometry)
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }
}

/// 2D point used for geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn centroid(points: &[Point]) -> Point {
        if points.is_empty() {
            return Point::default();
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }

    /// Rotate around `origin` by `angle` radians
    pub fn rotate_around(&self, origin: &Point, angle: f64) -> Point {
        let (sin, cos) = angle.sin_cos();
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Point::new(origin.x + dx * cos - dy * sin, origin.y + dx * sin + dy * cos)
    }
}

/// Validated view over a landmark set
pub struct FaceMesh<'a> {
    landmarks: &'a [Landmark],
}

impl<'a> FaceMesh<'a> {
    /// Wrap a landmark slice, rejecting short meshes
    pub fn new(landmarks: &'a [Landmark]) -> Result<Self, FeatureError> {
        if landmarks.len() < MIN_LANDMARKS {
            return Err(FeatureError::InsufficientLandmarks {
                required: MIN_LANDMARKS,
                actual: landmarks.len(),
            });
        }
        Ok(Self { landmarks })
    }

    /// Point at `index`, failing if absent or non-finite
    pub fn point(&self, index: usize) -> Result<Point, FeatureError> {
        let lm = self.landmarks.get(index).ok_or(FeatureError::IndexOutOfRange {
            index,
            len: self.landmarks.len(),
        })?;
        if !lm.x.is_finite() || !lm.y.is_finite() {
            return Err(FeatureError::NonFinite(index));
        }
        Ok(lm.point())
    }

    /// The six ordered boundary points for the given indices
    pub fn eye(&self, indices: &[usize; 6]) -> Result<[Point; 6], FeatureError> {
        let mut points = [Point::default(); 6];
        for (slot, &index) in points.iter_mut().zip(indices.iter()) {
            *slot = self.point(index)?;
        }
        Ok(points)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
