//! Face alignment: similarity transform onto the ArcFace landmark template.
//!
//! Estimates a 4-DOF (scale, rotation, translation) transform from the five
//! detected landmarks to the canonical 112×112 positions and warps the
//! color frame accordingly.

use image::RgbImage;

/// ArcFace reference landmark template for a 112×112 crop.
pub const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Row-major 2×3 affine matrix `[a, -b, tx, b, a, ty]`.
type Similarity = [f32; 6];

/// Least-squares similarity transform from `src` onto `dst`.
///
/// Each correspondence contributes two rows of the overdetermined system in
/// the unknowns `(a, b, tx, ty)`; the 4×4 normal equations are solved by
/// Gaussian elimination with partial pivoting.
fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let mut normal = [[0.0f32; 5]; 4]; // augmented [AᵀA | Aᵀb]

    for i in 0..5 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
        for (row, rhs) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    normal[j][k] += row[j] * row[k];
                }
                normal[j][4] += row[j] * rhs;
            }
        }
    }

    // Forward elimination with partial pivoting.
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&a, &b| {
                normal[a][col]
                    .abs()
                    .partial_cmp(&normal[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        normal.swap(col, pivot_row);

        let pivot = normal[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]; // degenerate: identity
        }
        for row in (col + 1)..4 {
            let factor = normal[row][col] / pivot;
            for k in col..5 {
                normal[row][k] -= factor * normal[col][k];
            }
        }
    }

    // Back substitution.
    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = normal[i][4];
        for j in (i + 1)..4 {
            x[i] -= normal[i][j] * x[j];
        }
        x[i] /= normal[i][i];
    }

    let (a, b, tx, ty) = (x[0], x[1], x[2], x[3]);
    [a, -b, tx, b, a, ty]
}

/// Warp the frame through the inverse of `m`, producing the aligned crop.
///
/// Samples with bilinear interpolation per channel; out-of-frame samples are
/// black.
fn warp_rgb(frame: &RgbImage, m: &Similarity) -> RgbImage {
    let (a, b, tx, ty) = (m[0], m[3], m[2], m[5]);
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    }
    let (ia, ib) = (a / det, b / det);

    let (src_w, src_h) = (frame.width() as i64, frame.height() as i64);
    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);

    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let sample = |x: i64, y: i64, c: usize| -> f32 {
                if x >= 0 && x < src_w && y >= 0 && y < src_h {
                    frame.get_pixel(x as u32, y as u32).0[c] as f32
                } else {
                    0.0
                }
            };

            let pixel = out.get_pixel_mut(ox, oy);
            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                pixel.0[c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Align a detected face to the canonical 112×112 ArcFace crop.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let m = estimate_similarity(landmarks, &REFERENCE_LANDMARKS);
    warp_rgb(frame, &m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_identity_when_src_equals_dst() {
        let m = estimate_similarity(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a' = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_half_scale_for_doubled_source() {
        let doubled: [(f32, f32); 5] =
            std::array::from_fn(|i| (REFERENCE_LANDMARKS[i].0 * 2.0, REFERENCE_LANDMARKS[i].1 * 2.0));
        let m = estimate_similarity(&doubled, &REFERENCE_LANDMARKS);
        assert!((m[0] - 0.5).abs() < 0.01, "scale = {}", m[0]);
    }

    #[test]
    fn test_aligned_crop_dimensions() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
        let landmarks: [(f32, f32); 5] = [
            (250.0, 180.0),
            (330.0, 180.0),
            (290.0, 230.0),
            (260.0, 280.0),
            (320.0, 280.0),
        ];
        let aligned = align_face(&frame, &landmarks);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_template_position() {
        // Paint a red patch at the source left-eye landmark; after alignment
        // it must appear near the template's left-eye position.
        let mut frame = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for dy in -2i32..=2 {
            for dx in -2i32..=2 {
                let x = (src[0].0 as i32 + dx) as u32;
                let y = (src[0].1 as i32 + dy) as u32;
                frame.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&frame, &src);

        let (ref_x, ref_y) = (
            REFERENCE_LANDMARKS[0].0.round() as i32,
            REFERENCE_LANDMARKS[0].1.round() as i32,
        );
        let mut max_red = 0u8;
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let x = (ref_x + dx) as u32;
                let y = (ref_y + dy) as u32;
                if x < ALIGNED_SIZE && y < ALIGNED_SIZE {
                    max_red = max_red.max(aligned.get_pixel(x, y).0[0]);
                }
            }
        }
        assert!(max_red > 100, "expected red patch near template eye, max={max_red}");
    }

    #[test]
    fn test_warp_out_of_frame_is_black() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        // Translation far outside the source frame.
        let m = [1.0, 0.0, -500.0, 0.0, 1.0, -500.0];
        let out = warp_rgb(&frame, &m);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
