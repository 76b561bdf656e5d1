//! Face crop renderer.
//!
//! Applies a [`CropSpec`] to a source image: the face center is mapped to
//! the canvas center, the source is rotated about that center so the face
//! comes out upright, samples falling outside the source are filled with a
//! solid background, and the result is the canvas-sized thumbnail.
//!
//! Rendering is inverse-mapped: every output pixel is traced back to a
//! source location and bilinearly sampled, so identical inputs always give
//! identical output and calls are independent and parallel-safe.

use image::{Rgb, RgbImage};

use crate::error::Result;
use crate::geometry::{crop_spec, CropSpec};
use crate::recognition::FaceDetection;

/// Fill color for canvas pixels sampled from outside the source image.
pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Render the upright crop for one detected face.
///
/// Fails with `InvalidGeometry` when the face's bounding box is degenerate;
/// the caller skips that face only.
pub fn crop_face(source: &RgbImage, face: &FaceDetection) -> Result<RgbImage> {
    let spec = crop_spec(&face.polygon, face.roll_angle)?;
    Ok(apply(source, &spec))
}

/// Apply a crop spec to a source image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply(source: &RgbImage, spec: &CropSpec) -> RgbImage {
    let half_w = f64::from(spec.width) / 2.0;
    let half_h = f64::from(spec.height) / 2.0;
    // The source is rotated by `rotate_degrees` about the face center; the
    // inverse map rotates each output offset back by the same angle.
    let (sin, cos) = spec.rotate_degrees.to_radians().sin_cos();

    RgbImage::from_fn(spec.width, spec.height, |ox, oy| {
        // Offset of this output pixel's center from the canvas center.
        let dx = f64::from(ox) + 0.5 - half_w;
        let dy = f64::from(oy) + 0.5 - half_h;
        let sx = spec.center_x + cos * dx + sin * dy;
        let sy = spec.center_y - sin * dx + cos * dy;
        sample_bilinear(source, sx, sy).unwrap_or(BACKGROUND)
    })
}

/// Bilinear sample at a fractional source coordinate, `None` when any of
/// the four neighbors falls outside the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    // Pixel centers sit at integer + 0.5.
    let fx = x - 0.5;
    let fy = y - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    if x0 < 0.0 || y0 < 0.0 {
        return None;
    }
    let (x0, y0) = (x0 as u32, y0 as u32);
    let (x1, y1) = (x0 + 1, y0 + 1);
    if x1 >= img.width() || y1 >= img.height() {
        return None;
    }

    let tx = fx.fract();
    let ty = fy.fract();
    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = f64::from(p00[c]) * (1.0 - tx) + f64::from(p10[c]) * tx;
        let bottom = f64::from(p01[c]) * (1.0 - tx) + f64::from(p11[c]) * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}
