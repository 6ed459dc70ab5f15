// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for the detector and the top-down pose model.
//!
//! The detector sees the whole image letterboxed to its input size. The pose model sees
//! one crop per person box: the box is padded, expanded to the model's aspect ratio and
//! warped onto the input canvas. Both paths end in a normalised NCHW tensor.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names
)]

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use ndarray::Array4;

use crate::error::{PoseError, Result};

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Fill color outside the source image in pose crops.
pub const CROP_FILL_COLOR: [u8; 3] = [0, 0, 0];

/// Per-channel normalisation applied when building a tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Mean subtracted from each channel (in 0..255 pixel units).
    pub mean: [f32; 3],
    /// Standard deviation each channel is divided by.
    pub std: [f32; 3],
    /// Keep RGB order. When `false` channels are fed as BGR.
    pub to_rgb: bool,
}

impl Normalization {
    /// Build a normalisation from a model config.
    #[must_use]
    pub const fn from_config(config: &crate::metadata::ModelConfig) -> Self {
        Self {
            mean: config.mean,
            std: config.std,
            to_rgb: config.to_rgb,
        }
    }
}

/// Result of letterboxing an image for the detector.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Input tensor with shape (1, 3, H, W).
    pub tensor: Array4<f32>,
    /// Original image size as (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Letterbox `image` into `target_size` (height, width) and normalise it.
///
/// # Errors
///
/// Returns [`PoseError::ImageError`] for an empty image or target size.
pub fn letterbox(
    image: &DynamicImage,
    target_size: (usize, usize),
    norm: &Normalization,
) -> Result<PreprocessResult> {
    let (orig_w, orig_h) = (image.width(), image.height());
    if orig_w == 0 || orig_h == 0 || target_size.0 == 0 || target_size.1 == 0 {
        return Err(PoseError::ImageError(format!(
            "cannot letterbox {orig_w}x{orig_h} image into {}x{}",
            target_size.1, target_size.0
        )));
    }

    let (new_w, new_h, pad_left, pad_top, scale) =
        calculate_letterbox_params(orig_w, orig_h, target_size);

    let resized = imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(
        target_size.1 as u32,
        target_size.0 as u32,
        Rgb(LETTERBOX_COLOR),
    );
    imageops::replace(&mut canvas, &resized, i64::from(pad_left), i64::from(pad_top));

    Ok(PreprocessResult {
        tensor: image_to_tensor(&canvas, norm),
        orig_shape: (orig_h, orig_w),
        scale,
        padding: (pad_top as f32, pad_left as f32),
    })
}

/// Calculate letterbox parameters for resizing.
///
/// Returns `(new_width, new_height, pad_left, pad_top, (scale_y, scale_x))`.
fn calculate_letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: (usize, usize),
) -> (u32, u32, u32, u32, (f32, f32)) {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_w = ((orig_w * scale).round() as u32).max(1);
    let new_h = ((orig_h * scale).round() as u32).max(1);

    let pad_w = (target_size.1 as u32).saturating_sub(new_w);
    let pad_h = (target_size.0 as u32).saturating_sub(new_h);

    let pad_left = pad_w / 2;
    let pad_top = pad_h / 2;

    let scale_x = new_w as f32 / orig_w;
    let scale_y = new_h as f32 / orig_h;

    (new_w, new_h, pad_left, pad_top, (scale_y, scale_x))
}

/// Crop region of a person box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTransform {
    /// Box center (x, y).
    pub center: [f32; 2],
    /// Crop extent (width, height) after padding and aspect correction.
    pub scale: [f32; 2],
    /// Model input size as (height, width).
    pub input_size: (usize, usize),
}

impl CropTransform {
    /// Build the crop for an xyxy box, padded by `padding` and widened or heightened to
    /// match the model input aspect ratio.
    #[must_use]
    pub fn from_bbox(bbox: [f32; 4], padding: f32, input_size: (usize, usize)) -> Self {
        let center = [(bbox[0] + bbox[2]) * 0.5, (bbox[1] + bbox[3]) * 0.5];
        let mut w = (bbox[2] - bbox[0]) * padding;
        let mut h = (bbox[3] - bbox[1]) * padding;

        let aspect_ratio = input_size.1 as f32 / input_size.0 as f32;
        if w > h * aspect_ratio {
            h = w / aspect_ratio;
        } else {
            w = h * aspect_ratio;
        }

        Self {
            center,
            scale: [w, h],
            input_size,
        }
    }

    /// Map a point from model input space back into the source image.
    #[must_use]
    pub fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        let (in_h, in_w) = (self.input_size.0 as f32, self.input_size.1 as f32);
        (
            x / in_w * self.scale[0] + self.center[0] - self.scale[0] * 0.5,
            y / in_h * self.scale[1] + self.center[1] - self.scale[1] * 0.5,
        )
    }

    fn projection(&self) -> Option<Projection> {
        let (in_h, in_w) = (self.input_size.0 as f32, self.input_size.1 as f32);
        if self.scale[0] <= 0.0 || self.scale[1] <= 0.0 {
            return None;
        }
        let x0 = self.center[0] - self.scale[0] * 0.5;
        let y0 = self.center[1] - self.scale[1] * 0.5;
        Some(
            Projection::translate(-x0, -y0)
                .and_then(Projection::scale(in_w / self.scale[0], in_h / self.scale[1])),
        )
    }
}

/// Warp the crop of `transform` out of `image` and normalise it.
///
/// # Errors
///
/// Returns [`PoseError::ImageError`] for a degenerate box.
pub fn crop_to_tensor(
    image: &RgbImage,
    transform: &CropTransform,
    norm: &Normalization,
) -> Result<Array4<f32>> {
    let projection = transform.projection().ok_or_else(|| {
        PoseError::ImageError(format!(
            "degenerate crop {:?} around {:?}",
            transform.scale, transform.center
        ))
    })?;

    let (in_h, in_w) = transform.input_size;
    let mut crop = RgbImage::new(in_w as u32, in_h as u32);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb(CROP_FILL_COLOR),
        &mut crop,
    );

    Ok(image_to_tensor(&crop, norm))
}

/// Convert an RGB image to a normalised NCHW tensor with shape (1, 3, H, W).
#[must_use]
pub fn image_to_tensor(image: &RgbImage, norm: &Normalization) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut tensor = Array4::zeros((1, 3, h, w));
    let order: [usize; 3] = if norm.to_rgb { [0, 1, 2] } else { [2, 1, 0] };

    for (x, y, pixel) in image.enumerate_pixels() {
        for (c, &src) in order.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] =
                (f32::from(pixel[src]) - norm.mean[c]) / norm.std[c];
        }
    }

    tensor
}

/// Scale coordinates from model output space back to original image space.
///
/// # Arguments
///
/// * `coords` - Coordinates in model space (after letterbox).
/// * `scale` - Scale factors (`scale_y`, `scale_x`) from preprocessing.
/// * `padding` - Padding (`pad_top`, `pad_left`) from preprocessing.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;

    [
        (coords[0] - pad_left) / scale_x,
        (coords[1] - pad_top) / scale_y,
        (coords[2] - pad_left) / scale_x,
        (coords[3] - pad_top) / scale_y,
    ]
}

/// Clip box coordinates to an image of `shape` (height, width).
#[must_use]
pub fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [
        coords[0].clamp(0.0, w),
        coords[1].clamp(0.0, h),
        coords[2].clamp(0.0, w),
        coords[3].clamp(0.0, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: Normalization = Normalization {
        mean: [0.0; 3],
        std: [1.0; 3],
        to_rgb: true,
    };

    #[test]
    fn test_letterbox_params() {
        let (new_w, new_h, pad_left, pad_top, (sy, sx)) =
            calculate_letterbox_params(1280, 640, (640, 640));
        assert_eq!((new_w, new_h), (640, 320));
        assert_eq!((pad_left, pad_top), (0, 160));
        assert!((sx - 0.5).abs() < 1e-6 && (sy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_shape_and_padding() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 0, 0])));
        let result = letterbox(&image, (64, 64), &IDENTITY).unwrap();

        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(result.orig_shape, (100, 200));
        // Top rows are padding, center rows are image.
        assert!((result.tensor[[0, 0, 0, 0]] - 114.0).abs() < 1e-6);
        assert!((result.tensor[[0, 0, 32, 32]] - 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_rejects_empty_image() {
        let image = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            letterbox(&image, (64, 64), &IDENTITY),
            Err(PoseError::ImageError(_))
        ));
    }

    #[test]
    fn test_scale_coords_inverts_letterbox() {
        let coords = scale_coords(&[10.0, 170.0, 20.0, 180.0], (0.5, 0.5), (160.0, 0.0));
        assert_eq!(coords, [20.0, 20.0, 40.0, 40.0]);
        assert_eq!(clip_coords(&[-5.0, 5.0, 500.0, 50.0], (40, 100)), [0.0, 5.0, 100.0, 40.0]);
    }

    #[test]
    fn test_crop_transform_aspect_ratio() {
        // 192 wide, 256 tall model: a square box grows in height.
        let transform = CropTransform::from_bbox([0.0, 0.0, 100.0, 100.0], 1.0, (256, 192));
        assert_eq!(transform.center, [50.0, 50.0]);
        assert!((transform.scale[0] - 100.0).abs() < 1e-4);
        assert!((transform.scale[1] - 100.0 * 256.0 / 192.0).abs() < 1e-3);

        let (x, y) = transform.to_image(96.0, 128.0);
        assert!((x - 50.0).abs() < 1e-4 && (y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_crop_to_tensor() {
        let mut image = RgbImage::from_pixel(100, 100, Rgb([10, 20, 30]));
        image.put_pixel(50, 50, Rgb([200, 200, 200]));

        let transform = CropTransform::from_bbox([0.0, 0.0, 100.0, 100.0], 1.0, (32, 32));
        let bgr = Normalization {
            to_rgb: false,
            ..IDENTITY
        };
        let tensor = crop_to_tensor(&image, &transform, &bgr).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        // BGR order puts the blue channel first.
        assert!((tensor[[0, 0, 2, 2]] - 30.0).abs() < 1e-3);

        let degenerate = CropTransform::from_bbox([5.0, 5.0, 5.0, 5.0], 1.25, (32, 32));
        assert!(crop_to_tensor(&image, &degenerate, &IDENTITY).is_err());
    }
}
