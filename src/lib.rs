//! Synthetic object-detection dataset generation.
//!
//! Object cutouts (`objects/<class>/<image>`) are augmented and pasted onto
//! background images, and every result is written together with a YOLO label
//! file. Class indices persist across runs in a JSON class mapping.
//!
//! ```no_run
//! use detsynth::{run_synthesis, SynthesisConfig};
//!
//! let config = SynthesisConfig {
//!     number: 3,
//!     seed: Some(42),
//!     ..SynthesisConfig::default()
//! };
//! let summary = run_synthesis(&config)?;
//! println!("{} images written", summary.images_written);
//! # Ok::<(), detsynth::SynthError>(())
//! ```

pub mod augment;
pub mod blending;
pub mod collision;
pub mod config;
pub mod error;
pub mod labels;
pub mod objects;
pub mod placement;
pub mod synthesis;

pub use augment::AugmentPipeline;
pub use collision::{calculate_iob, calculate_iou, BoundingBox, OverlapMetric};
pub use config::{Args, AugmentConfig, PlacementConfig, SynthesisConfig};
pub use error::{Result, SynthError};
pub use labels::{encode_yolo_labels, ClassMapping};
pub use objects::ObjectAsset;
pub use placement::{PlacementEngine, PlacementOutcome, SynthesizedImage};
pub use synthesis::{run_synthesis, SynthesisSummary};
