// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Keypoint and skeleton rendering.
//!
//! Keypoints are drawn as filled circles colored and sized by region, skeleton edges as
//! 2 px lines. Coordinates are truncated toward zero before drawing and anything outside
//! the canvas is clipped.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use ndarray::ArrayView2;

use crate::error::{PoseError, Result};
use crate::results::PoseResult;
use crate::wholebody::{BodyRegion, WHOLEBODY_CONNECTIONS, ensure_wholebody, region_slice};

/// Ultralytics Color Palette
pub const COLORS: [[u8; 3]; 20] = [
    [4, 42, 255],    // #042aff
    [11, 219, 235],  // #0bdbeb
    [243, 243, 243], // #f3f3f3
    [0, 223, 183],   // #00dfb7
    [17, 31, 104],   // #111f68
    [255, 111, 221], // #ff6fdd
    [255, 68, 79],   // #ff444f
    [204, 237, 0],   // #cced00
    [0, 243, 68],    // #00f344
    [189, 0, 255],   // #bd00ff
    [0, 180, 255],   // #00b4ff
    [221, 0, 186],   // #dd00ba
    [0, 255, 255],   // #00ffff
    [38, 192, 0],    // #26c000
    [1, 255, 179],   // #01ffb3
    [125, 36, 255],  // #7d24ff
    [123, 0, 104],   // #7b0068
    [255, 27, 108],  // #ff1b6c
    [252, 109, 47],  // #fc6d2f
    [162, 255, 11],  // #a2ff0b
];

/// Body keypoint color.
pub const BODY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Face keypoint color.
pub const FACE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Hand keypoint color.
pub const HAND_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Foot keypoint color.
pub const FOOT_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
/// Skeleton edge color.
pub const EDGE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Skeleton edge width in pixels.
pub const EDGE_THICKNESS: i32 = 2;

/// Order regions are drawn in. Later regions paint over earlier ones.
pub const DRAW_ORDER: [BodyRegion; 4] = [
    BodyRegion::Body,
    BodyRegion::Face,
    BodyRegion::Hand,
    BodyRegion::Foot,
];

/// Get color for a person index
#[must_use]
pub fn get_class_color(class_id: usize) -> Rgb<u8> {
    Rgb(COLORS[class_id % COLORS.len()])
}

/// Keypoint color of a region.
#[must_use]
pub const fn region_color(region: BodyRegion) -> Rgb<u8> {
    match region {
        BodyRegion::Body => BODY_COLOR,
        BodyRegion::Face => FACE_COLOR,
        BodyRegion::Hand => HAND_COLOR,
        BodyRegion::Foot => FOOT_COLOR,
    }
}

/// Keypoint circle radius of a region.
#[must_use]
pub const fn region_radius(region: BodyRegion) -> i32 {
    match region {
        BodyRegion::Body | BodyRegion::Foot => 5,
        BodyRegion::Face | BodyRegion::Hand => 2,
    }
}

/// Draw keypoints and skeleton on a copy of `image`.
///
/// `keypoints` is `(K, 2)` or `(K, 3)`; only the first two columns are read.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] if there are fewer than 133 keypoints.
pub fn render_pose(image: &DynamicImage, keypoints: ArrayView2<'_, f32>) -> Result<DynamicImage> {
    ensure_wholebody(keypoints)?;
    let mut canvas = image.to_rgb8();
    render_keypoints(&mut canvas, keypoints)?;
    render_connections(&mut canvas, keypoints)?;
    Ok(DynamicImage::ImageRgb8(canvas))
}

/// Draw region-colored keypoint circles onto `canvas`.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] if there are fewer than 133 keypoints.
pub fn render_keypoints(canvas: &mut RgbImage, keypoints: ArrayView2<'_, f32>) -> Result<()> {
    ensure_wholebody(keypoints)?;
    for region in DRAW_ORDER {
        let color = region_color(region);
        let radius = region_radius(region);
        for kpt in region_slice(keypoints, region)?.rows() {
            if let Some(center) = pixel(kpt[0], kpt[1]) {
                draw_circle_clipped(canvas, center, radius, color);
            }
        }
    }
    Ok(())
}

/// Draw the whole-body skeleton edges onto `canvas`.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] if there are fewer than 133 keypoints.
pub fn render_connections(canvas: &mut RgbImage, keypoints: ArrayView2<'_, f32>) -> Result<()> {
    ensure_wholebody(keypoints)?;
    for [a, b] in WHOLEBODY_CONNECTIONS {
        let (Some(start), Some(end)) = (
            pixel(keypoints[[a, 0]], keypoints[[a, 1]]),
            pixel(keypoints[[b, 0]], keypoints[[b, 1]]),
        ) else {
            continue;
        };
        draw_thick_line(canvas, start, end, EDGE_THICKNESS, EDGE_COLOR);
    }
    Ok(())
}

/// Draw every pose result onto a copy of `image`: its box in a per-person color, an
/// optional label, then its keypoints and skeleton.
///
/// # Errors
///
/// Returns [`PoseError::KeypointCount`] if a result does not use the whole-body layout.
pub fn annotate_results(
    image: &DynamicImage,
    results: &[PoseResult],
    font: Option<&FontVec>,
) -> Result<DynamicImage> {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for (person, result) in results.iter().enumerate() {
        let color = get_class_color(person);
        let bbox = result.bbox(0)?;
        draw_box(&mut canvas, [bbox[0], bbox[1], bbox[2], bbox[3]], color);

        if let Some(font) = font.filter(|_| width > 0 && height > 0) {
            let label = result.instance_scores(0).map_or_else(
                || format!("person {person}"),
                |scores| format!("person {:.2}", scores.mean().unwrap_or(0.0)),
            );
            let x1 = (bbox[0] as i32).clamp(0, width as i32 - 1);
            let y1 = bbox[1] as i32;
            let text_y = if y1 > 20 {
                y1 - 20
            } else {
                (bbox[3] as i32).saturating_add(5)
            };
            if text_y >= 0 && text_y < height as i32 {
                draw_text_mut(&mut canvas, color, x1, text_y, PxScale::from(16.0), font, &label);
            }
        }

        let keypoints = result.instance_keypoints(0)?;
        render_keypoints(&mut canvas, keypoints)?;
        render_connections(&mut canvas, keypoints)?;
    }

    Ok(DynamicImage::ImageRgb8(canvas))
}

/// Load a TrueType/OpenType font for box labels.
///
/// # Errors
///
/// Returns [`PoseError::Io`] if the file cannot be read and [`PoseError::ImageError`]
/// if it is not a valid font.
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontVec> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    FontVec::try_from_vec(data)
        .map_err(|e| PoseError::ImageError(format!("Invalid font {}: {e}", path.display())))
}

/// Find the next available run directory (predict, predict2, predict3, etc.)
#[must_use]
pub fn find_next_run_dir(base: &Path, prefix: &str) -> PathBuf {
    let first = base.join(prefix);
    if !first.exists() {
        return first;
    }

    (2..)
        .map(|i| base.join(format!("{prefix}{i}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Truncate a keypoint to a pixel position. Non-finite coordinates are skipped.
fn pixel(x: f32, y: f32) -> Option<(i32, i32)> {
    (x.is_finite() && y.is_finite()).then(|| (x as i32, y as i32))
}

fn draw_circle_clipped(canvas: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    let (x, y) = center;
    if x < -radius || y < -radius || x > width as i32 + radius || y > height as i32 + radius {
        return;
    }
    draw_filled_circle_mut(canvas, center, radius, color);
}

/// Draw a line `thickness` pixels wide by stacking parallel 1 px segments.
fn draw_thick_line(
    canvas: &mut RgbImage,
    start: (i32, i32),
    end: (i32, i32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let (width, height) = canvas.dimensions();
    let (x0, y0) = (start.0 as f32, start.1 as f32);
    let (x1, y1) = (end.0 as f32, end.1 as f32);
    let steep = (y1 - y0).abs() > (x1 - x0).abs();

    for offset in 0..thickness {
        let offset = offset as f32;
        let (dx, dy) = if steep { (offset, 0.0) } else { (0.0, offset) };
        if let Some((a, b)) =
            clip_segment((x0 + dx, y0 + dy), (x1 + dx, y1 + dy), width as f32, height as f32)
        {
            draw_line_segment_mut(canvas, a, b, color);
        }
    }
}

/// Liang-Barsky clip of a segment to `[0, width - 1] x [0, height - 1]`.
fn clip_segment(
    a: (f32, f32),
    b: (f32, f32),
    width: f32,
    height: f32,
) -> Option<((f32, f32), (f32, f32))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0_f32, 1.0_f32);

    for (p, q) in [
        (-dx, a.0),
        (dx, width - 1.0 - a.0),
        (-dy, a.1),
        (dy, height - 1.0 - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }

    (t0 <= t1).then(|| {
        (
            (a.0 + t0 * dx, a.1 + t0 * dy),
            (a.0 + t1 * dx, a.1 + t1 * dy),
        )
    })
}

fn draw_box(canvas: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.round() as i32).clamp(0, width as i32 - 1);
    let clamp_y = |v: f32| (v.round() as i32).clamp(0, height as i32 - 1);

    let (mut x1, mut y1, mut x2, mut y2) =
        (clamp_x(bbox[0]), clamp_y(bbox[1]), clamp_x(bbox[2]), clamp_y(bbox[3]));
    if x1 > x2 {
        std::mem::swap(&mut x1, &mut x2);
    }
    if y1 > y2 {
        std::mem::swap(&mut y1, &mut y2);
    }
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    for t in 0..EDGE_THICKNESS {
        let (tx1, ty1) = ((x1 + t).min(x2), (y1 + t).min(y2));
        let (tx2, ty2) = ((x2 - t).max(tx1), (y2 - t).max(ty1));
        if tx2 > tx1 && ty2 > ty1 {
            #[allow(clippy::cast_sign_loss)]
            let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wholebody::NUM_WHOLEBODY_KEYPOINTS;
    use ndarray::Array2;

    const FAR: f32 = -1000.0;

    fn far_keypoints() -> Array2<f32> {
        Array2::from_elem((NUM_WHOLEBODY_KEYPOINTS, 2), FAR)
    }

    fn set(kpts: &mut Array2<f32>, idx: usize, x: f32, y: f32) {
        kpts[[idx, 0]] = x;
        kpts[[idx, 1]] = y;
    }

    #[test]
    fn test_keypoint_colors_by_region() {
        let mut kpts = far_keypoints();
        set(&mut kpts, 0, 10.7, 10.2); // body
        set(&mut kpts, 20, 30.9, 80.1); // foot
        set(&mut kpts, 50, 50.0, 50.0); // face
        set(&mut kpts, 100, 70.5, 70.5); // hand

        let mut canvas = RgbImage::new(100, 100);
        render_keypoints(&mut canvas, kpts.view()).unwrap();

        assert_eq!(*canvas.get_pixel(10, 10), BODY_COLOR);
        assert_eq!(*canvas.get_pixel(30, 80), FOOT_COLOR);
        assert_eq!(*canvas.get_pixel(50, 50), FACE_COLOR);
        assert_eq!(*canvas.get_pixel(70, 70), HAND_COLOR);
        // Body radius 5 reaches 4 px out; face radius 2 does not.
        assert_eq!(*canvas.get_pixel(14, 10), BODY_COLOR);
        assert_eq!(*canvas.get_pixel(54, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_pose_draws_edges_and_keeps_input() {
        let mut kpts = far_keypoints();
        set(&mut kpts, 5, 10.0, 50.0);
        set(&mut kpts, 6, 90.0, 50.0);

        let image = DynamicImage::new_rgb8(100, 100);
        let rendered = render_pose(&image, kpts.view()).unwrap().to_rgb8();

        assert_eq!(*rendered.get_pixel(50, 50), EDGE_COLOR);
        assert_eq!(*rendered.get_pixel(50, 51), EDGE_COLOR);
        assert_eq!(*rendered.get_pixel(50, 53), Rgb([0, 0, 0]));
        assert_eq!(*image.to_rgb8().get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_tolerates_out_of_frame_and_nan() {
        let mut kpts = Array2::from_elem((NUM_WHOLEBODY_KEYPOINTS, 3), 1.0e9_f32);
        kpts[[0, 0]] = f32::NAN;
        kpts[[1, 1]] = -3.0;
        let image = DynamicImage::new_rgb8(16, 16);
        assert!(render_pose(&image, kpts.view()).is_ok());
    }

    #[test]
    fn test_render_rejects_short_keypoints() {
        let kpts = Array2::<f32>::zeros((50, 2));
        let image = DynamicImage::new_rgb8(8, 8);
        assert!(matches!(
            render_pose(&image, kpts.view()),
            Err(PoseError::KeypointCount { len: 50, required: 133 })
        ));
    }

    #[test]
    fn test_annotate_results() {
        let mut kpts = far_keypoints();
        set(&mut kpts, 50, 20.0, 20.0);
        let result = PoseResult::single([5.0, 5.0, 40.0, 40.0], kpts, None).unwrap();

        let image = DynamicImage::new_rgb8(64, 64);
        let annotated = annotate_results(&image, &[result], None).unwrap().to_rgb8();
        assert_eq!(*annotated.get_pixel(5, 20), get_class_color(0));
        assert_eq!(*annotated.get_pixel(20, 20), FACE_COLOR);
    }

    #[test]
    fn test_annotate_results_empty_canvas() {
        let result = PoseResult::single([0.0, 0.0, 4.0, 4.0], far_keypoints(), None).unwrap();
        for (w, h) in [(0, 8), (8, 0), (0, 0)] {
            let image = DynamicImage::new_rgb8(w, h);
            let annotated = annotate_results(&image, &[result.clone()], None).unwrap();
            assert_eq!((annotated.width(), annotated.height()), (w, h));
        }
    }

    #[test]
    fn test_draw_box_huge_coordinates() {
        let mut canvas = RgbImage::new(16, 16);
        draw_box(&mut canvas, [1.0e12, -1.0e12, f32::MAX, f32::INFINITY], BODY_COLOR);
        draw_box(&mut canvas, [2.0, 2.0, 1.0e12, 1.0e12], BODY_COLOR);
        assert_eq!(*canvas.get_pixel(2, 2), BODY_COLOR);
        assert_eq!(*canvas.get_pixel(14, 14), BODY_COLOR);
    }

    #[test]
    fn test_foot_and_edge_colors_differ() {
        assert_eq!(region_color(BodyRegion::Foot), Rgb([0, 255, 255]));
        assert_ne!(FOOT_COLOR, EDGE_COLOR);
    }

    #[test]
    fn test_clip_segment() {
        assert!(clip_segment((-10.0, -10.0), (-5.0, -1.0), 10.0, 10.0).is_none());
        let (a, b) = clip_segment((-10.0, 5.0), (20.0, 5.0), 10.0, 10.0).unwrap();
        assert!((a.0 - 0.0).abs() < 1e-5 && (b.0 - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_find_next_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_next_run_dir(dir.path(), "predict"), dir.path().join("predict"));
        std::fs::create_dir(dir.path().join("predict")).unwrap();
        assert_eq!(find_next_run_dir(dir.path(), "predict"), dir.path().join("predict2"));
    }
}
