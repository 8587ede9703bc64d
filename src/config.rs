use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::collision::OverlapMetric;
use crate::error::{Result, SynthError};

/// Synthesize an object-detection dataset by pasting object cutouts onto
/// background images, writing YOLO labels.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory containing background images
    #[arg(long = "backgrounds", default_value = "./backgrounds")]
    pub backgrounds: PathBuf,

    /// Directory containing one sub-directory of object images per class
    #[arg(long = "objects", default_value = "./objects")]
    pub objects: PathBuf,

    /// Output directory for the synthesized images/ and labels/
    #[arg(long = "savename", default_value = "./synthesis")]
    pub savename: PathBuf,

    /// How many times every object image is used
    #[arg(long = "number", default_value_t = 1)]
    pub number: usize,

    /// JSON file mapping class names to indices; read at start, written at end
    #[arg(long = "class_mapping", default_value = "./class_mapping.json")]
    pub class_mapping: PathBuf,

    /// Optional classes.txt to write, one class name per line
    #[arg(long = "class_txt")]
    pub class_txt: Option<PathBuf>,

    /// Backgrounds with a shorter edge are upscaled to this size
    #[arg(long = "min_background_size", default_value_t = 640)]
    pub min_background_size: u32,

    /// Minimum number of objects pasted per image
    #[arg(long = "min_objects", default_value_t = 1)]
    pub min_objects: usize,

    /// Maximum number of objects pasted per image
    #[arg(long = "max_objects", default_value_t = 5)]
    pub max_objects: usize,

    /// Smallest object long edge, as a ratio of the background's short edge
    #[arg(long = "object_min_ratio", default_value_t = 0.2, value_parser = validate_ratio)]
    pub object_min_ratio: f32,

    /// Largest object long edge, as a ratio of the background's short edge
    #[arg(long = "object_max_ratio", default_value_t = 0.4, value_parser = validate_ratio)]
    pub object_max_ratio: f32,

    /// Maximum rotation angle in degrees (both directions)
    #[arg(long = "rotate_degree", default_value_t = 20.0, value_parser = validate_degree)]
    pub rotate_degree: f32,

    /// Probability of rotating an object
    #[arg(long = "rotate_prob", default_value_t = 1.0, value_parser = validate_prob)]
    pub rotate_prob: f64,

    /// Lower bound of the alpha multiplier for transparency reduction
    #[arg(long = "transparency_min", default_value_t = 0.7, value_parser = validate_ratio)]
    pub transparency_min: f32,

    /// Upper bound of the alpha multiplier for transparency reduction
    #[arg(long = "transparency_max", default_value_t = 1.0, value_parser = validate_ratio)]
    pub transparency_max: f32,

    /// Probability of reducing an object's transparency
    #[arg(long = "transparency_prob", default_value_t = 1.0, value_parser = validate_prob)]
    pub transparency_prob: f64,

    /// Smallest number of cells per axis for the perspective warp
    #[arg(long = "perspective_min", default_value_t = 3)]
    pub perspective_min: u32,

    /// Largest number of cells per axis for the perspective warp
    #[arg(long = "perspective_max", default_value_t = 10)]
    pub perspective_max: u32,

    /// Probability of applying a perspective warp
    #[arg(long = "perspective_prob", default_value_t = 1.0, value_parser = validate_prob)]
    pub perspective_prob: f64,

    /// Probability of seamless (Poisson) cloning instead of alpha pasting
    #[arg(long = "seamless_clone_prob", default_value_t = 0.1, value_parser = validate_prob)]
    pub seamless_clone_prob: f64,

    /// Probability of turning the background grayscale after a paste
    #[arg(long = "grayscale_prob", default_value_t = 0.0, value_parser = validate_prob)]
    pub grayscale_prob: f64,

    /// Maximum accepted overlap between a new object and any placed object
    #[arg(long = "max_overlap_iob", default_value_t = 0.2, value_parser = validate_prob)]
    pub max_overlap_iob: f64,

    /// Number of positions tried before accepting an overlapping one
    #[arg(long = "max_overlap_retry", default_value_t = 10)]
    pub max_overlap_retry: usize,

    /// Metric used for the overlap check
    #[arg(long = "overlap_metric", value_enum, default_value = "iob")]
    pub overlap_metric: OverlapMetric,

    /// Seed for a reproducible run
    #[arg(long = "seed")]
    pub seed: Option<u64>,
}

// Validate that a probability is between 0.0 and 1.0
fn validate_prob(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("value must be between 0.0 and 1.0".to_string()),
    }
}

fn validate_degree(s: &str) -> std::result::Result<f32, String> {
    match f32::from_str(s) {
        Ok(val) if val.is_finite() && (0.0..=360.0).contains(&val) => Ok(val),
        _ => Err("angle must be between 0 and 360 degrees".to_string()),
    }
}

fn validate_ratio(s: &str) -> std::result::Result<f32, String> {
    match f32::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("ratio must be between 0.0 and 1.0".to_string()),
    }
}

/// Parameters of the per-object augmentation chain
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentConfig {
    /// Object long edge as a ratio of the background short edge, `[min, max)`
    pub object_ratio: (f32, f32),
    pub rotate_degree: f32,
    pub rotate_prob: f64,
    /// Alpha multiplier range
    pub transparency_range: (f32, f32),
    pub transparency_prob: f64,
    /// Cells per axis used to jitter the warp corners
    pub perspective_range: (u32, u32),
    pub perspective_prob: f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        AugmentConfig {
            object_ratio: (0.2, 0.4),
            rotate_degree: 20.0,
            rotate_prob: 1.0,
            transparency_range: (0.7, 1.0),
            transparency_prob: 1.0,
            perspective_range: (3, 10),
            perspective_prob: 1.0,
        }
    }
}

/// Parameters of the placement search and compositing
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementConfig {
    pub max_overlap: f64,
    pub max_overlap_retry: usize,
    pub overlap_metric: OverlapMetric,
    pub seamless_clone_prob: f64,
    pub grayscale_prob: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            max_overlap: 0.2,
            max_overlap_retry: 10,
            overlap_metric: OverlapMetric::Iob,
            seamless_clone_prob: 0.1,
            grayscale_prob: 0.0,
        }
    }
}

/// Everything a synthesis run needs, independent of the CLI
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisConfig {
    pub backgrounds_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub output_dir: PathBuf,
    pub number: usize,
    pub class_mapping_path: PathBuf,
    pub class_txt_path: Option<PathBuf>,
    pub min_background_size: u32,
    /// Inclusive range of objects pasted per image
    pub objects_per_image: (usize, usize),
    pub augment: AugmentConfig,
    pub placement: PlacementConfig,
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            backgrounds_dir: PathBuf::from("./backgrounds"),
            objects_dir: PathBuf::from("./objects"),
            output_dir: PathBuf::from("./synthesis"),
            number: 1,
            class_mapping_path: PathBuf::from("./class_mapping.json"),
            class_txt_path: None,
            min_background_size: 640,
            objects_per_image: (1, 5),
            augment: AugmentConfig::default(),
            placement: PlacementConfig::default(),
            seed: None,
        }
    }
}

impl SynthesisConfig {
    /// Check the cross-field constraints clap cannot express
    pub fn validate(&self) -> Result<()> {
        let (min_objects, max_objects) = self.objects_per_image;
        if min_objects == 0 || min_objects > max_objects {
            return Err(SynthError::InvalidConfig(format!(
                "objects per image must satisfy 1 <= min <= max, got {min_objects}..={max_objects}"
            )));
        }

        let aug = &self.augment;
        if aug.object_ratio.0 > aug.object_ratio.1 {
            return Err(SynthError::InvalidConfig(format!(
                "object ratio min {} exceeds max {}",
                aug.object_ratio.0, aug.object_ratio.1
            )));
        }
        if aug.transparency_range.0 > aug.transparency_range.1 {
            return Err(SynthError::InvalidConfig(format!(
                "transparency min {} exceeds max {}",
                aug.transparency_range.0, aug.transparency_range.1
            )));
        }
        if aug.perspective_range.0 == 0 || aug.perspective_range.0 > aug.perspective_range.1 {
            return Err(SynthError::InvalidConfig(format!(
                "perspective range must satisfy 1 <= min <= max, got {}..={}",
                aug.perspective_range.0, aug.perspective_range.1
            )));
        }

        if !aug.rotate_degree.is_finite() || !(0.0..=360.0).contains(&aug.rotate_degree) {
            return Err(SynthError::InvalidConfig(format!(
                "rotate_degree must be between 0 and 360, got {}",
                aug.rotate_degree
            )));
        }

        let ratios = [
            ("object_min_ratio", aug.object_ratio.0),
            ("object_max_ratio", aug.object_ratio.1),
            ("transparency_min", aug.transparency_range.0),
            ("transparency_max", aug.transparency_range.1),
        ];
        for (name, ratio) in ratios {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(SynthError::InvalidConfig(format!(
                    "{name} must be between 0.0 and 1.0, got {ratio}"
                )));
            }
        }

        let probs = [
            ("max_overlap_iob", self.placement.max_overlap),
            ("rotate_prob", aug.rotate_prob),
            ("transparency_prob", aug.transparency_prob),
            ("perspective_prob", aug.perspective_prob),
            ("seamless_clone_prob", self.placement.seamless_clone_prob),
            ("grayscale_prob", self.placement.grayscale_prob),
        ];
        for (name, prob) in probs {
            if !(0.0..=1.0).contains(&prob) {
                return Err(SynthError::InvalidConfig(format!(
                    "{name} must be between 0.0 and 1.0, got {prob}"
                )));
            }
        }

        Ok(())
    }
}

impl TryFrom<&Args> for SynthesisConfig {
    type Error = SynthError;

    fn try_from(args: &Args) -> Result<Self> {
        let config = SynthesisConfig {
            backgrounds_dir: args.backgrounds.clone(),
            objects_dir: args.objects.clone(),
            output_dir: args.savename.clone(),
            number: args.number,
            class_mapping_path: args.class_mapping.clone(),
            class_txt_path: args.class_txt.clone(),
            min_background_size: args.min_background_size,
            objects_per_image: (args.min_objects, args.max_objects),
            augment: AugmentConfig {
                object_ratio: (args.object_min_ratio, args.object_max_ratio),
                rotate_degree: args.rotate_degree,
                rotate_prob: args.rotate_prob,
                transparency_range: (args.transparency_min, args.transparency_max),
                transparency_prob: args.transparency_prob,
                perspective_range: (args.perspective_min, args.perspective_max),
                perspective_prob: args.perspective_prob,
            },
            placement: PlacementConfig {
                max_overlap: args.max_overlap_iob,
                max_overlap_retry: args.max_overlap_retry,
                overlap_metric: args.overlap_metric,
                seamless_clone_prob: args.seamless_clone_prob,
                grayscale_prob: args.grayscale_prob,
            },
            seed: args.seed,
        };
        config.validate()?;
        Ok(config)
    }
}
