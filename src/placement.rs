use image::{RgbImage, RgbaImage};
use log::{debug, trace};
use rand::Rng;

use crate::augment::AugmentPipeline;
use crate::blending::{paste_with_alpha, seamless_clone, to_grayscale_rgb, CompositeMode};
use crate::collision::{check_overlap, BoundingBox};
use crate::config::PlacementConfig;
use crate::error::Result;
use crate::objects::ObjectAsset;

/// How the position search for one object ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The candidate satisfied the overlap constraint
    Accepted,
    /// Every attempt overlapped too much; the last candidate was kept
    Degraded,
}

/// Represents a placed object with its final location
#[derive(Clone, Debug)]
pub struct PlacedObject {
    pub bbox: BoundingBox,
    pub composite: CompositeMode,
    pub outcome: PlacementOutcome,
}

/// A finished background together with everything placed on it
#[derive(Clone, Debug)]
pub struct SynthesizedImage {
    pub image: RgbImage,
    pub placed: Vec<PlacedObject>,
}

impl SynthesizedImage {
    /// Boxes in placement order
    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.placed.iter().map(|p| p.bbox.clone()).collect()
    }

    pub fn degraded_count(&self) -> usize {
        self.placed
            .iter()
            .filter(|p| p.outcome == PlacementOutcome::Degraded)
            .count()
    }
}

/// Draw up to `attempts` candidates (at least one) and return the first one
/// `accept` approves. If none is approved the last candidate is returned
/// tagged [`PlacementOutcome::Degraded`].
pub fn bounded_search<T>(
    attempts: usize,
    mut candidate: impl FnMut() -> T,
    mut accept: impl FnMut(&T) -> bool,
) -> (T, PlacementOutcome) {
    let mut current = candidate();
    for attempt in 1..=attempts.max(1) {
        if accept(&current) {
            return (current, PlacementOutcome::Accepted);
        }
        if attempt < attempts {
            current = candidate();
        }
    }
    (current, PlacementOutcome::Degraded)
}

/// Places augmented objects on a background one at a time
#[derive(Clone, Debug, Default)]
pub struct PlacementEngine {
    pipeline: AugmentPipeline,
    config: PlacementConfig,
}

impl PlacementEngine {
    pub fn new(pipeline: AugmentPipeline, config: PlacementConfig) -> Self {
        PlacementEngine { pipeline, config }
    }

    /// Search a top-left position for a `obj_w`x`obj_h` object that keeps the
    /// overlap with every box in `placed` under the configured threshold.
    ///
    /// The object must fit inside the background.
    pub fn find_position<R: Rng + ?Sized>(
        &self,
        label: &str,
        obj_w: u32,
        obj_h: u32,
        bg_w: u32,
        bg_h: u32,
        placed: &[BoundingBox],
        rng: &mut R,
    ) -> (BoundingBox, PlacementOutcome) {
        debug_assert!(obj_w >= 1 && obj_w <= bg_w && obj_h >= 1 && obj_h <= bg_h);

        let max_x = bg_w - obj_w;
        let max_y = bg_h - obj_h;

        bounded_search(
            self.config.max_overlap_retry,
            || {
                let x_start = rng.gen_range(0..=max_x);
                let y_start = rng.gen_range(0..=max_y);
                BoundingBox::from_placement(label, x_start, y_start, obj_w, obj_h, bg_w, bg_h)
            },
            |candidate| {
                !check_overlap(
                    candidate,
                    placed,
                    self.config.overlap_metric,
                    self.config.max_overlap,
                )
            },
        )
    }

    /// Augment `object`, position it, and composite it into `background`.
    /// The new box is appended to `placed`.
    pub fn place_object<R: Rng + ?Sized>(
        &self,
        background: &mut RgbImage,
        object: &RgbaImage,
        label: &str,
        placed: &mut Vec<PlacedObject>,
        rng: &mut R,
    ) -> PlacedObject {
        let (bg_w, bg_h) = background.dimensions();
        let augmented = self.pipeline.apply(object, bg_w, bg_h, rng);
        let (obj_w, obj_h) = augmented.dimensions();

        let boxes: Vec<BoundingBox> = placed.iter().map(|p| p.bbox.clone()).collect();
        let (bbox, outcome) = self.find_position(label, obj_w, obj_h, bg_w, bg_h, &boxes, rng);
        if outcome == PlacementOutcome::Degraded {
            debug!(
                "No position for '{label}' under overlap {} after {} attempts, keeping ({}, {})",
                self.config.max_overlap, self.config.max_overlap_retry, bbox.x1, bbox.y1
            );
        }

        let composite = if rng.gen_bool(self.config.seamless_clone_prob) {
            let center_x = bbox.x1 + obj_w / 2;
            let center_y = bbox.y1 + obj_h / 2;
            seamless_clone(background, &augmented, center_x, center_y);
            CompositeMode::Seamless
        } else {
            paste_with_alpha(background, &augmented, bbox.x1, bbox.y1);
            CompositeMode::Alpha
        };

        if rng.gen_bool(self.config.grayscale_prob) {
            *background = to_grayscale_rgb(background);
        }

        trace!(
            "Placed '{label}' at ({}, {})-({}, {}) via {composite:?}",
            bbox.x1,
            bbox.y1,
            bbox.x2,
            bbox.y2
        );

        let placed_obj = PlacedObject {
            bbox,
            composite,
            outcome,
        };
        placed.push(placed_obj.clone());
        placed_obj
    }

    /// Place every asset of a batch, in order, onto `background`
    ///
    /// # Errors
    /// Fails on the first asset that cannot be read.
    pub fn place_objects<R: Rng + ?Sized>(
        &self,
        assets: &[ObjectAsset],
        mut background: RgbImage,
        rng: &mut R,
    ) -> Result<SynthesizedImage> {
        let mut placed: Vec<PlacedObject> = Vec::with_capacity(assets.len());

        for asset in assets {
            let object = asset.load()?;
            self.place_object(&mut background, &object, &asset.label, &mut placed, rng);
        }

        Ok(SynthesizedImage {
            image: background,
            placed,
        })
    }
}
