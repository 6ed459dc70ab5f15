// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ab_glyph::FontVec;
use image::GenericImageView;

use crate::annotate::{annotate_results, find_next_run_dir, load_font};
use crate::cli::args::PredictArgs;
use crate::cli::logging::set_verbose;
use crate::config::{ModelPaths, PipelineConfig};
use crate::detection::FilterMode;
use crate::model::load_backends;
use crate::pipeline::PosePipeline;
use crate::results::{PoseResult, Speed};
use crate::source::Source;
use crate::utils::format_count;
use crate::wholebody::{BodyRegion, WholeBodyEstimator, region_keypoints};
use crate::{VERSION, error, info, section, success, verbose, warn};

/// Run whole-body pose estimation over every image in the source.
#[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
pub fn run_prediction(args: &PredictArgs) {
    set_verbose(args.verbose);

    let paths = ModelPaths::new(
        &args.pose_config,
        &args.pose_checkpoint,
        &args.det_config,
        &args.det_checkpoint,
    )
    .resolve(Path::new(&args.models_dir));

    let (detector, estimator) = match load_backends(&paths, args.threads) {
        Ok(backends) => backends,
        Err(e) => {
            error!("Error loading models: {e}");
            process::exit(1);
        }
    };

    let det_scope = args.det_scope_or(detector.config()).to_string();
    let pose_scope = args.pose_scope_or(estimator.config()).to_string();
    let noun = detector
        .config()
        .class_name(args.class_id)
        .unwrap_or("object")
        .to_string();
    let filter_mode = if args.exhaustive {
        FilterMode::Exhaustive
    } else {
        FilterMode::EarlyExit
    };

    let config = PipelineConfig::new()
        .with_target_class(args.class_id)
        .with_class_threshold(args.conf)
        .with_filter_mode(filter_mode)
        .with_det_scope(det_scope)
        .with_pose_scope(pose_scope)
        .with_threads(args.threads);

    let pipeline = match PosePipeline::with_config(detector, estimator, config) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid configuration: {e}");
            process::exit(1);
        }
    };
    let mut model = WholeBodyEstimator::new(pipeline);

    let image_paths = match Source::from(args.source.as_str()).image_paths() {
        Ok(p) if p.is_empty() => {
            error!("No images found in source: {}", args.source);
            process::exit(1);
        }
        Ok(p) => p,
        Err(e) => {
            error!("Error reading source: {e}");
            process::exit(1);
        }
    };

    let font = args.font.as_ref().and_then(|path| match load_font(path) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Could not load font, boxes will be drawn without labels: {e}");
            None
        }
    });

    let save_dir = if args.save {
        let dir = find_next_run_dir(Path::new(&args.project), "predict");
        if let Err(e) = fs::create_dir_all(&dir) {
            error!("Failed to create save directory {}: {e}", dir.display());
            process::exit(1);
        }
        Some(dir)
    } else {
        None
    };

    section!("wholebody-pose {VERSION}");
    verbose!(
        "detector {} ({}), pose {} ({})",
        paths.det_checkpoint.display(),
        model.pipeline().config().det_scope,
        paths.pose_checkpoint.display(),
        model.pipeline().config().pose_scope
    );
    verbose!("");

    let total = image_paths.len();
    let mut processed = 0usize;
    let mut speed_sum = Speed::new(0.0, 0.0, 0.0);

    for (i, path) in image_paths.iter().enumerate() {
        let image = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                error!("Failed to open {}: {e}", path.display());
                continue;
            }
        };

        let pose_results = match model.predict(&image) {
            Ok((_, results)) => results.to_vec(),
            Err(e) => {
                error!("Prediction failed for {}: {e}", path.display());
                continue;
            }
        };

        let speed = model.pipeline().speed().clone();
        let (width, height) = image.dimensions();
        verbose!(
            "image {}/{} {}: {}x{} {}, {:.1}ms",
            i + 1,
            total,
            path.display(),
            width,
            height,
            format_pose_summary(&pose_results, &noun),
            speed.total()
        );

        if let Some(region) = args.region {
            for line in region_lines(&pose_results, region) {
                info!("{line}");
            }
        }

        if let Some(dir) = &save_dir {
            save_annotated(&image, &pose_results, font.as_ref(), dir, path);
        }

        accumulate(&mut speed_sum, &speed);
        processed += 1;
    }

    let n = processed.max(1) as f64;
    verbose!(
        "Speed: {:.1}ms detect, {:.1}ms filter, {:.1}ms estimate per image",
        speed_sum.detect.unwrap_or(0.0) / n,
        speed_sum.filter.unwrap_or(0.0) / n,
        speed_sum.estimate.unwrap_or(0.0) / n
    );

    if let Some(dir) = &save_dir {
        success!("Results saved to {}", dir.display());
    }
}

/// Format a per-image summary like "2 persons" or "(no persons)".
fn format_pose_summary(results: &[PoseResult], noun: &str) -> String {
    match results.len() {
        0 => format!("(no {noun}s)"),
        n => format_count(n, noun),
    }
}

/// One line per person with the keypoints of `region`. Printed whatever the verbosity.
fn region_lines(results: &[PoseResult], region: BodyRegion) -> Vec<String> {
    (0..results.len())
        .map(|obj_idx| match region_keypoints(results, obj_idx, region) {
            Ok(kpts) => {
                let points: Vec<String> = kpts
                    .rows()
                    .into_iter()
                    .map(|p| format!("({:.1}, {:.1})", p[0], p[1]))
                    .collect();
                format!(
                    "  person {obj_idx} {}: {} keypoints {}",
                    region.as_str(),
                    kpts.nrows(),
                    points.join(" ")
                )
            }
            Err(e) => format!("  person {obj_idx} {}: {e}", region.as_str()),
        })
        .collect()
}

fn save_annotated(
    image: &image::DynamicImage,
    results: &[PoseResult],
    font: Option<&FontVec>,
    dir: &Path,
    source_path: &Path,
) {
    let annotated = match annotate_results(image, results, font) {
        Ok(img) => img,
        Err(e) => {
            error!("Failed to annotate {}: {e}", source_path.display());
            return;
        }
    };
    let out = output_path(dir, source_path);
    if let Err(e) = annotated.save(&out) {
        error!("Failed to save {}: {e}", out.display());
    }
}

/// Output file for an annotated image: same file name inside `dir`.
fn output_path(dir: &Path, source_path: &Path) -> PathBuf {
    source_path
        .file_name()
        .map_or_else(|| dir.join("image.jpg"), |name| dir.join(name))
}

fn accumulate(sum: &mut Speed, speed: &Speed) {
    sum.detect = Some(sum.detect.unwrap_or(0.0) + speed.detect.unwrap_or(0.0));
    sum.filter = Some(sum.filter.unwrap_or(0.0) + speed.filter.unwrap_or(0.0));
    sum.estimate = Some(sum.estimate.unwrap_or(0.0) + speed.estimate.unwrap_or(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn person() -> PoseResult {
        PoseResult::single([0.0, 0.0, 10.0, 10.0], Array2::zeros((133, 2)), None).unwrap()
    }

    #[test]
    fn test_format_pose_summary() {
        assert_eq!(format_pose_summary(&[], "person"), "(no persons)");
        assert_eq!(format_pose_summary(&[person()], "person"), "1 person");
        assert_eq!(format_pose_summary(&[person(), person(), person()], "person"), "3 persons");
        assert_eq!(format_pose_summary(&[person(), person()], "car"), "2 cars");
    }

    #[test]
    fn test_region_lines() {
        let lines = region_lines(&[person(), person()], BodyRegion::Hand);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  person 0 hand: 42 keypoints (0.0, 0.0)"));
        assert!(lines[1].starts_with("  person 1 hand: 42 keypoints"));
        assert!(region_lines(&[], BodyRegion::Face).is_empty());
    }

    #[test]
    fn test_output_path_keeps_file_name() {
        let out = output_path(Path::new("runs/pose/predict"), Path::new("data/img.png"));
        assert_eq!(out, PathBuf::from("runs/pose/predict/img.png"));
        let fallback = output_path(Path::new("out"), Path::new(".."));
        assert_eq!(fallback, PathBuf::from("out/image.jpg"));
    }

    #[test]
    fn test_accumulate_speed() {
        let mut sum = Speed::new(0.0, 0.0, 0.0);
        accumulate(&mut sum, &Speed::new(1.0, 0.5, 2.0));
        accumulate(&mut sum, &Speed { detect: Some(3.0), filter: None, estimate: Some(1.0) });
        assert_eq!(sum.detect, Some(4.0));
        assert_eq!(sum.filter, Some(0.5));
        assert_eq!(sum.estimate, Some(3.0));
    }
}
