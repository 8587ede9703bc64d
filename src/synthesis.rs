//! Batch orchestration: draws objects and backgrounds, runs placement, and
//! writes images, labels and the class mapping.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};

use crate::augment::AugmentPipeline;
use crate::config::SynthesisConfig;
use crate::error::{Result, SynthError};
use crate::labels::{encode_yolo_labels, ClassMapping};
use crate::objects::{discover_backgrounds, discover_object_assets, load_background, ObjectAsset};
use crate::placement::{PlacementEngine, SynthesizedImage};

/// Totals reported after a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthesisSummary {
    pub images_written: usize,
    pub objects_placed: usize,
    /// Placements that exceeded the overlap threshold after all retries
    pub degraded_placements: usize,
    /// Classes in the mapping once the run finished
    pub class_count: usize,
}

/// Output locations under the run's save directory
#[derive(Clone, Debug)]
pub struct OutputLayout {
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(output_dir: &Path) -> Self {
        OutputLayout {
            images_dir: output_dir.join("images"),
            labels_dir: output_dir.join("labels"),
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.images_dir, &self.labels_dir] {
            fs::create_dir_all(dir).map_err(|e| SynthError::io(dir, e))?;
        }
        Ok(())
    }

    /// Write one synthesized image and its label file under `stem`
    pub fn write(&self, stem: &str, image: &SynthesizedImage, labels: &str) -> Result<()> {
        let image_path = self.images_dir.join(format!("{stem}.jpg"));
        image
            .image
            .save(&image_path)
            .map_err(|source| SynthError::ImageWrite {
                path: image_path.clone(),
                source,
            })?;

        let label_path = self.labels_dir.join(format!("{stem}.txt"));
        fs::write(&label_path, labels).map_err(|e| SynthError::io(&label_path, e))
    }
}

/// Random file stem drawn from `rng` so seeded runs name files identically
fn random_stem<R: Rng + ?Sized>(rng: &mut R) -> String {
    uuid::Builder::from_random_bytes(rng.gen())
        .into_uuid()
        .as_hyphenated()
        .to_string()
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}

/// Run a full synthesis described by `config`
///
/// # Errors
/// Fails when an input pool is empty, an asset cannot be read, or an output
/// cannot be written.
pub fn run_synthesis(config: &SynthesisConfig) -> Result<SynthesisSummary> {
    config.validate()?;

    if config.number == 0 {
        info!("Number of repetitions is 0, nothing to synthesize");
        return Ok(SynthesisSummary::default());
    }

    let assets = discover_object_assets(&config.objects_dir)?;
    let backgrounds = discover_backgrounds(&config.backgrounds_dir)?;
    if assets.is_empty() {
        return Err(SynthError::EmptyPool {
            empty: "object images",
            dir: config.objects_dir.clone(),
        });
    }
    if backgrounds.is_empty() {
        return Err(SynthError::EmptyPool {
            empty: "background images",
            dir: config.backgrounds_dir.clone(),
        });
    }
    info!(
        "Found {} object images and {} backgrounds",
        assets.len(),
        backgrounds.len()
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let layout = OutputLayout::new(&config.output_dir);
    layout.create()?;

    let mut mapping = ClassMapping::load(&config.class_mapping_path);
    let engine = PlacementEngine::new(
        AugmentPipeline::new(config.augment.clone()),
        config.placement.clone(),
    );

    let mut pool: Vec<ObjectAsset> = Vec::with_capacity(assets.len() * config.number);
    for _ in 0..config.number {
        pool.extend(assets.iter().cloned());
    }
    pool.shuffle(&mut rng);

    let mut summary = SynthesisSummary::default();
    let (min_objects, max_objects) = config.objects_per_image;
    let pb = progress_bar(pool.len());

    while !pool.is_empty() {
        let batch_size = rng.gen_range(min_objects..=max_objects).min(pool.len());
        let batch = pool.split_off(pool.len() - batch_size);

        let background_path = backgrounds
            .choose(&mut rng)
            .ok_or_else(|| SynthError::EmptyPool {
                empty: "background images",
                dir: config.backgrounds_dir.clone(),
            })?;
        let background = load_background(background_path, config.min_background_size)?;

        let synthesized = engine.place_objects(&batch, background, &mut rng)?;
        let labels = encode_yolo_labels(&synthesized.boxes(), &mut mapping);

        let stem = random_stem(&mut rng);
        layout.write(&stem, &synthesized, &labels)?;
        debug!(
            "Wrote {stem} with {} objects on {}",
            batch.len(),
            background_path.display()
        );

        summary.images_written += 1;
        summary.objects_placed += synthesized.placed.len();
        summary.degraded_placements += synthesized.degraded_count();
        pb.inc(batch_size as u64);
    }
    pb.finish_with_message("done");

    mapping.save(&config.class_mapping_path)?;
    summary.class_count = mapping.len();

    if let Some(class_txt) = &config.class_txt_path {
        write_class_txt(&mapping, class_txt)?;
    }

    info!(
        "Synthesized {} images with {} objects ({} over the overlap limit), {} classes",
        summary.images_written,
        summary.objects_placed,
        summary.degraded_placements,
        summary.class_count
    );
    Ok(summary)
}

fn write_class_txt(mapping: &ClassMapping, path: &Path) -> Result<()> {
    let is_txt = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if !is_txt {
        warn!(
            "Class names file {} does not end in .txt, skipping",
            path.display()
        );
        return Ok(());
    }
    mapping.write_class_names(path)?;
    info!("Wrote class names to {}", path.display());
    Ok(())
}
