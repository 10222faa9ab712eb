//! Per-frame Feature Extraction

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::landmarks::{
    FaceMesh, Landmark, Point, CHIN, LEFT_EYE, MOUTH_LEFT, MOUTH_RIGHT, NOSE_TIP, RIGHT_EYE,
};
use crate::{EyeSide, FeatureError};

/// Length of the classifier input vector
pub const CLASSIFIER_INPUT_LEN: usize = 6;

/// Pitch above which the head counts as tilted down (degrees)
pub const HEAD_DOWN_PITCH_DEGREES: f64 = 15.0;

/// EAR below which the classifier's closed-eye flag is set
const CLASSIFIER_CLOSED_EAR: f64 = 0.21;

/// Horizontal eye distances below this are rejected
const MIN_EYE_WIDTH: f64 = 1e-6;

/// Nose tip position along the eye-line → chin span for a level head
pub(crate) const NEUTRAL_NOSE_RATIO: f64 = 0.35;

/// Compute the Eye Aspect Ratio for 6 ordered boundary points.
///
/// `EAR = (|p1-p5| + |p2-p4|) / (2 * |p0-p3|)`. Returns `None` when the
/// horizontal distance is too small to divide by.
pub fn eye_aspect_ratio(points: &[Point; 6]) -> Option<f64> {
    let horizontal = points[0].distance(&points[3]);
    if horizontal < MIN_EYE_WIDTH {
        return None;
    }
    let v1 = points[1].distance(&points[5]);
    let v2 = points[2].distance(&points[4]);
    let ear = (v1 + v2) / (2.0 * horizontal);
    ear.is_finite().then_some(ear)
}

/// Head pose (Euler angles, degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Yaw (left-right rotation), positive towards image right
    pub yaw: f64,
    /// Pitch (up-down tilt), positive = head down
    pub pitch: f64,
    /// Roll (side tilt), positive = clockwise in the image
    pub roll: f64,
}

/// Facial features extracted from one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacialFeatures {
    pub left_ear: f64,
    pub right_ear: f64,
    pub average_ear: f64,
    pub pose: HeadPose,
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
}

/// Input vector handed to the drowsiness classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierInput(pub [f32; CLASSIFIER_INPUT_LEN]);

impl ClassifierInput {
    /// `[ear, yaw/90, pitch/90, roll/90, ear<0.21, pitch>15]`
    pub fn from_features(features: &FacialFeatures) -> Self {
        let ear = features.average_ear;
        let pose = features.pose;
        Self([
            ear as f32,
            (pose.yaw / 90.0) as f32,
            (pose.pitch / 90.0) as f32,
            (pose.roll / 90.0) as f32,
            if ear < CLASSIFIER_CLOSED_EAR { 1.0 } else { 0.0 },
            if pose.pitch > HEAD_DOWN_PITCH_DEGREES { 1.0 } else { 0.0 },
        ])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Stateless extractor from landmarks to `FacialFeatures`
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract EAR and head pose from a full face mesh
    pub fn extract(&self, landmarks: &[Landmark]) -> Result<FacialFeatures, FeatureError> {
        let mesh = FaceMesh::new(landmarks)?;

        let left_eye = mesh.eye(&LEFT_EYE)?;
        let right_eye = mesh.eye(&RIGHT_EYE)?;

        let left_ear =
            eye_aspect_ratio(&left_eye).ok_or(FeatureError::DegenerateEye(EyeSide::Left))?;
        let right_ear =
            eye_aspect_ratio(&right_eye).ok_or(FeatureError::DegenerateEye(EyeSide::Right))?;

        let pose = self.head_pose(&mesh, &left_eye, &right_eye)?;

        let features = FacialFeatures {
            left_ear,
            right_ear,
            average_ear: (left_ear + right_ear) / 2.0,
            pose,
            left_eye,
            right_eye,
        };

        trace!(
            "Features: ear={:.3} yaw={:.1} pitch={:.1} roll={:.1}",
            features.average_ear,
            pose.yaw,
            pose.pitch,
            pose.roll
        );

        Ok(features)
    }

    /// Estimate head pose from the angles of vectors between landmarks.
    ///
    /// Roll is the tilt of the eye line. The remaining points are rotated
    /// upright around the eye midpoint before yaw (nose offset from the face
    /// midline) and pitch (nose position along the eye → chin span) are read
    /// off the image axes.
    fn head_pose(
        &self,
        mesh: &FaceMesh<'_>,
        left_eye: &[Point; 6],
        right_eye: &[Point; 6],
    ) -> Result<HeadPose, FeatureError> {
        // The subject's right eye appears on the image left
        let image_left = Point::centroid(right_eye);
        let image_right = Point::centroid(left_eye);

        let eye_distance = image_left.distance(&image_right);
        if eye_distance < MIN_EYE_WIDTH {
            return Ok(HeadPose::default());
        }

        let roll = (image_right.y - image_left.y).atan2(image_right.x - image_left.x);
        let eye_mid = image_left.midpoint(&image_right);
        let upright = |p: Point| p.rotate_around(&eye_mid, -roll);

        let nose = upright(mesh.point(NOSE_TIP)?);
        let chin = upright(mesh.point(CHIN)?);
        let mouth_mid = upright(mesh.point(MOUTH_LEFT)?.midpoint(&mesh.point(MOUTH_RIGHT)?));

        let midline_x = (eye_mid.x + mouth_mid.x) / 2.0;
        let yaw = ((nose.x - midline_x) / (eye_distance / 2.0)).clamp(-1.0, 1.0).asin();

        let span = chin.y - eye_mid.y;
        let pitch = if span.abs() < MIN_EYE_WIDTH {
            0.0
        } else {
            let ratio = (nose.y - eye_mid.y) / span;
            ((ratio - NEUTRAL_NOSE_RATIO) * 2.0).clamp(-1.0, 1.0).asin()
        };

        Ok(HeadPose {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        })
    }
}
