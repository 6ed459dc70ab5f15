// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model config file parsing.
//!
//! Each checkpoint ships with a small YAML config describing how to feed it: input size,
//! normalisation, the default scope the backend resolves its output layout from, and
//! (for detectors) class names. Only the flat subset of YAML these files use is read,
//! so no YAML crate is needed.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{PoseError, Result};

/// ImageNet channel means used by most exported detectors and pose models.
pub const DEFAULT_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// ImageNet channel standard deviations.
pub const DEFAULT_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Settings read from a model config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Scope recorded in the config, if any.
    pub default_scope: Option<String>,
    /// Network input size as (height, width).
    pub input_size: (usize, usize),
    /// Per-channel mean subtracted before inference.
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided out before inference.
    pub std: [f32; 3],
    /// Whether the network expects RGB (as opposed to BGR) channel order.
    pub to_rgb: bool,
    /// Number of keypoints a pose model predicts.
    pub num_keypoints: usize,
    /// SimCC bins per input pixel.
    pub simcc_split_ratio: f32,
    /// Box enlargement applied before cropping for the pose model.
    pub bbox_padding: f32,
    /// Minimum detector score kept by the backend.
    pub score_threshold: f32,
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_scope: None,
            input_size: (640, 640),
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
            to_rgb: true,
            num_keypoints: crate::wholebody::NUM_WHOLEBODY_KEYPOINTS,
            simcc_split_ratio: 2.0,
            bbox_padding: 1.25,
            score_threshold: 0.0,
            names: HashMap::from([(0, "person".to_string())]),
        }
    }
}

impl ModelConfig {
    /// Read a model config from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds invalid values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PoseError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a model config from a YAML string. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::ConfigError`] if a known key holds a value of the wrong type.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut names = HashMap::new();
        let mut in_names_block = false;
        let mut names_indent = 0;

        for line in yaml_str.lines() {
            let trimmed = strip_comment(line).trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = line.len() - line.trim_start().len();

            if in_names_block {
                if indent > names_indent {
                    if let Some((key, value)) = trimmed.split_once(':') {
                        if let Ok(class_id) = key.trim().parse::<usize>() {
                            names.insert(class_id, unquote(value).to_string());
                        }
                    }
                    continue;
                }
                in_names_block = false;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "default_scope" => config.default_scope = Some(unquote(value).to_string()),
                "input_size" => {
                    let [h, w] = parse_list::<usize, 2>(key, value)?;
                    config.input_size = (h, w);
                }
                "mean" => config.mean = parse_list(key, value)?,
                "std" => config.std = parse_list(key, value)?,
                "to_rgb" => config.to_rgb = parse_bool(key, value)?,
                "num_keypoints" => config.num_keypoints = parse_value(key, value)?,
                "simcc_split_ratio" => config.simcc_split_ratio = parse_value(key, value)?,
                "bbox_padding" => config.bbox_padding = parse_value(key, value)?,
                "score_threshold" => config.score_threshold = parse_value(key, value)?,
                "names" => {
                    if value.starts_with('{') {
                        names.extend(parse_inline_dict(value));
                    } else {
                        in_names_block = true;
                        names_indent = indent;
                    }
                }
                _ => {}
            }
        }

        if !names.is_empty() {
            config.names = names;
        }
        Ok(config)
    }

    /// The scope recorded in the config, or `fallback` if none is set.
    #[must_use]
    pub fn scope_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.default_scope.as_deref().unwrap_or(fallback)
    }

    /// Get a class name by ID.
    #[must_use]
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }
}

fn strip_comment(line: &str) -> &str {
    line.split_once(" #").map_or(line, |(before, _)| before)
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'').trim_matches('"')
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    unquote(value)
        .parse()
        .map_err(|_| PoseError::ConfigError(format!("Invalid {key} value: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match unquote(value).to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(PoseError::ConfigError(format!("Invalid {key} value: {value}"))),
    }
}

/// Parse an inline list like `[192, 256]` into exactly `N` values.
fn parse_list<T: std::str::FromStr + Copy + Default, const N: usize>(
    key: &str,
    value: &str,
) -> Result<[T; N]> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| PoseError::ConfigError(format!("{key} must be a list, got {value}")))?;

    let items = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value::<T>(key, s))
        .collect::<Result<Vec<T>>>()?;

    if items.len() != N {
        return Err(PoseError::ConfigError(format!(
            "{key} must have {N} values, got {}",
            items.len()
        )));
    }
    let mut out = [T::default(); N];
    out.copy_from_slice(&items);
    Ok(out)
}

/// Parse `{0: 'person', 1: 'bicycle'}`.
fn parse_inline_dict(value: &str) -> HashMap<usize, String> {
    value
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| {
            let (key, name) = entry.split_once(':')?;
            let class_id = key.trim().parse::<usize>().ok()?;
            Some((class_id, unquote(name).to_string()))
        })
        .collect()
}
