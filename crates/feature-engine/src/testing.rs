//! Synthetic face meshes for tests in this and downstream crates

use crate::features::NEUTRAL_NOSE_RATIO;
use crate::landmarks::{
    Landmark, CHIN, LEFT_EYE, MIN_LANDMARKS, MOUTH_LEFT, MOUTH_RIGHT, NOSE_TIP, RIGHT_EYE,
};

const EYE_WIDTH: f32 = 0.1;

fn place_eye(mesh: &mut [Landmark], indices: &[usize; 6], cx: f32, cy: f32, opening: f32) {
    let half = EYE_WIDTH / 2.0;
    let pts = [
        (cx - half, cy),
        (cx - half / 3.0, cy - opening / 2.0),
        (cx + half / 3.0, cy - opening / 2.0),
        (cx + half, cy),
        (cx + half / 3.0, cy + opening / 2.0),
        (cx - half / 3.0, cy + opening / 2.0),
    ];
    for (&i, (x, y)) in indices.iter().zip(pts) {
        mesh[i] = Landmark::new(x, y);
    }
}

/// A level, frontal face whose eyes both measure `ear`
pub fn frontal_face(ear: f64) -> Vec<Landmark> {
    let opening = ear as f32 * EYE_WIDTH;
    let mut mesh = vec![Landmark::new(0.5, 0.5); MIN_LANDMARKS];
    place_eye(&mut mesh, &RIGHT_EYE, 0.4, 0.4, opening);
    place_eye(&mut mesh, &LEFT_EYE, 0.6, 0.4, opening);
    // chin 0.4 below the eye line, nose at the neutral ratio
    mesh[CHIN] = Landmark::new(0.5, 0.8);
    mesh[NOSE_TIP] = Landmark::new(0.5, 0.4 + 0.4 * NEUTRAL_NOSE_RATIO as f32);
    mesh[MOUTH_LEFT] = Landmark::new(0.45, 0.7);
    mesh[MOUTH_RIGHT] = Landmark::new(0.55, 0.7);
    mesh
}
