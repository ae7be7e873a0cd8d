//! Landmark geometry: point distances and the eye-aspect-ratio metric.

use thiserror::Error;

/// Number of contour points describing one eye.
pub const EYE_POINT_COUNT: usize = 6;

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("invalid eye contour: expected {EYE_POINT_COUNT} points, got {0}")]
    WrongPointCount(usize),
    #[error("invalid eye contour: zero horizontal span")]
    DegenerateEye,
}

/// Euclidean distance between two 2D points.
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Eye aspect ratio over a six-point eye contour.
///
/// Points are ordered outer corner (p1), upper lid (p2, p3), inner corner
/// (p4), lower lid (p5, p6):
///
/// ```text
/// EAR = (‖p2−p6‖ + ‖p3−p5‖) / (2 · ‖p1−p4‖)
/// ```
///
/// The ratio stays near its open-eye value while the lids are apart and
/// collapses toward zero as they close, independent of face scale.
pub fn eye_aspect_ratio(eye: &[(f32, f32)]) -> Result<f32, GeometryError> {
    if eye.len() != EYE_POINT_COUNT {
        return Err(GeometryError::WrongPointCount(eye.len()));
    }

    let vertical_a = distance(eye[1], eye[5]);
    let vertical_b = distance(eye[2], eye[4]);
    let horizontal = distance(eye[0], eye[3]);

    if horizontal == 0.0 {
        return Err(GeometryError::DegenerateEye);
    }

    Ok((vertical_a + vertical_b) / (2.0 * horizontal))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a symmetric eye contour: corners `width` apart, lids `height` apart.
    fn eye_shape(width: f32, height: f32) -> [(f32, f32); 6] {
        let half = height / 2.0;
        [
            (0.0, 0.0),                // p1 outer corner
            (width / 3.0, -half),      // p2 upper lid
            (2.0 * width / 3.0, -half),// p3 upper lid
            (width, 0.0),              // p4 inner corner
            (2.0 * width / 3.0, half), // p5 lower lid
            (width / 3.0, half),       // p6 lower lid
        ]
    }

    #[test]
    fn test_distance_3_4_5() {
        assert!((distance((0.0, 0.0), (3.0, 4.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_zero() {
        assert_eq!(distance((1.5, -2.5), (1.5, -2.5)), 0.0);
    }

    #[test]
    fn test_ear_closed_eye_near_zero() {
        // Lid points coincident with the corner line — fully closed.
        let eye = eye_shape(10.0, 0.0);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!(ear < 1e-6, "closed eye EAR should be ~0, got {ear}");
    }

    #[test]
    fn test_ear_square_open_eye_near_one() {
        // Vertical lid spacing equal to the horizontal span.
        let eye = eye_shape(10.0, 10.0);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!((ear - 1.0).abs() < 1e-6, "square-open EAR should be ~1, got {ear}");
    }

    #[test]
    fn test_ear_translation_invariant() {
        let eye = eye_shape(12.0, 4.0);
        let base = eye_aspect_ratio(&eye).unwrap();

        for shift in [(5.0, -3.0), (-100.0, 250.0), (0.25, 0.75)] {
            let moved: Vec<(f32, f32)> =
                eye.iter().map(|p| (p.0 + shift.0, p.1 + shift.1)).collect();
            let moved_ear = eye_aspect_ratio(&moved).unwrap();
            assert!((moved_ear - base).abs() < 1e-5, "EAR changed under translation");
        }
    }

    #[test]
    fn test_ear_rejects_wrong_cardinality() {
        let five = [(0.0, 0.0); 5];
        assert_eq!(
            eye_aspect_ratio(&five),
            Err(GeometryError::WrongPointCount(5))
        );
        let seven = [(0.0, 0.0); 7];
        assert_eq!(
            eye_aspect_ratio(&seven),
            Err(GeometryError::WrongPointCount(7))
        );
    }

    #[test]
    fn test_ear_rejects_zero_horizontal_span() {
        // All points stacked vertically — corners coincide.
        let eye = [
            (5.0, 0.0),
            (5.0, -1.0),
            (5.0, -1.0),
            (5.0, 0.0),
            (5.0, 1.0),
            (5.0, 1.0),
        ];
        assert_eq!(eye_aspect_ratio(&eye), Err(GeometryError::DegenerateEye));
    }
}
