//! Augmentation operators applied to object cutouts before placement.
//!
//! Every operator takes an RGBA image and returns a new one; the alpha
//! channel carries the object's silhouette through the whole chain.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp, warp_into, Interpolation, Projection};
use log::trace;
use rand::Rng;

use crate::config::AugmentConfig;

/// Resize so the long edge becomes a random size in `[start_size, stop_size)`.
/// Aspect ratio is preserved and neither side drops below one pixel.
pub fn random_resize<R: Rng + ?Sized>(
    image: &RgbaImage,
    start_size: u32,
    stop_size: u32,
    rng: &mut R,
) -> RgbaImage {
    let (width, height) = image.dimensions();
    let long_edge = width.max(height).max(1);

    let target = if stop_size > start_size {
        rng.gen_range(start_size..stop_size)
    } else {
        start_size.max(1)
    };

    let new_w = ((u64::from(width) * u64::from(target)) / u64::from(long_edge)).max(1) as u32;
    let new_h = ((u64::from(height) * u64::from(target)) / u64::from(long_edge)).max(1) as u32;

    imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

/// Randomly pull the four corners inwards and warp the image onto them.
///
/// The image is split into `split` parts per axis (drawn from `split_range`);
/// each corner moves somewhere inside its own corner cell. The result is
/// cropped to the bounding rectangle of the moved corners.
pub fn random_perspective_transform<R: Rng + ?Sized>(
    image: &RgbaImage,
    split_range: (u32, u32),
    rng: &mut R,
) -> RgbaImage {
    let (w, h) = image.dimensions();
    let split = rng.gen_range(split_range.0.max(1)..=split_range.1.max(split_range.0).max(1));

    let cell_w = w / split;
    let cell_h = h / split;
    let far_x = cell_w * (split - 1);
    let far_y = cell_h * (split - 1);

    let corners = [
        (rng.gen_range(0..=cell_w), rng.gen_range(0..=cell_h)),
        (rng.gen_range(far_x..=w), rng.gen_range(0..=cell_h)),
        (rng.gen_range(0..=cell_w), rng.gen_range(far_y..=h)),
        (rng.gen_range(far_x..=w), rng.gen_range(far_y..=h)),
    ];

    let x_min = corners.iter().map(|c| c.0).min().unwrap_or(0);
    let x_max = corners.iter().map(|c| c.0).max().unwrap_or(w);
    let y_min = corners.iter().map(|c| c.1).min().unwrap_or(0);
    let y_max = corners.iter().map(|c| c.1).max().unwrap_or(h);

    if x_max <= x_min || y_max <= y_min {
        return image.clone();
    }

    let from = [
        (0.0, 0.0),
        (w as f32, 0.0),
        (0.0, h as f32),
        (w as f32, h as f32),
    ];
    let to = corners.map(|(x, y)| (x as f32, y as f32));

    let Some(projection) = Projection::from_control_points(from, to) else {
        trace!("Degenerate perspective corners {corners:?}, leaving object unwarped");
        return image.clone();
    };

    let warped = warp(image, &projection, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    imageops::crop_imm(&warped, x_min, y_min, x_max - x_min, y_max - y_min).to_image()
}

/// Size of the canvas that fully contains a `width`x`height` image rotated
/// by `degrees`
pub fn rotated_canvas_size(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let rad = degrees.to_radians();
    let (sin_a, cos_a) = (rad.sin().abs(), rad.cos().abs());
    let w = width as f32;
    let h = height as f32;

    // Round away float noise before ceil so 90° turns don't gain a pixel
    let new_w = ((w * cos_a + h * sin_a) * 1000.0).round() / 1000.0;
    let new_h = ((w * sin_a + h * cos_a) * 1000.0).round() / 1000.0;

    (new_w.ceil().max(1.0) as u32, new_h.ceil().max(1.0) as u32)
}

/// Rotate counter-clockwise by `degrees` about the image center, growing the
/// canvas so no corner is cut off. Uncovered pixels are fully transparent.
pub fn rotate_expand(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (out_w, out_h) = rotated_canvas_size(width, height, degrees);

    // Pixel centers sit on integer coordinates. Rows grow downwards, so a
    // visual counter-clockwise turn is a negative angle.
    let projection = Projection::translate((out_w as f32 - 1.0) / 2.0, (out_h as f32 - 1.0) / 2.0)
        * Projection::rotate(-degrees.to_radians())
        * Projection::translate(-(width as f32 - 1.0) / 2.0, -(height as f32 - 1.0) / 2.0);

    let mut output = RgbaImage::new(out_w, out_h);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut output,
    );
    output
}

/// Rotate by a random angle in `[-max_degree, max_degree]`, expanding the canvas
pub fn random_rotate<R: Rng + ?Sized>(image: &RgbaImage, max_degree: f32, rng: &mut R) -> RgbaImage {
    let max_degree = max_degree.abs();
    let angle = if max_degree.is_finite() && max_degree > 0.0 {
        rng.gen_range(-max_degree..=max_degree)
    } else {
        0.0
    };
    rotate_expand(image, angle)
}

/// Scale every non-zero alpha value by a random rate in `rate`
pub fn random_reduce_transparency<R: Rng + ?Sized>(
    image: &RgbaImage,
    rate: (f32, f32),
    rng: &mut R,
) -> RgbaImage {
    let rate = if rate.1 > rate.0 {
        rng.gen_range(rate.0..=rate.1)
    } else {
        rate.0
    };

    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        if pixel[3] > 0 {
            pixel[3] = (f32::from(pixel[3]) * rate) as u8;
        }
    }
    output
}

/// Downscale `image` so it fits inside `max_w`x`max_h`. Images that already
/// fit are returned unchanged.
pub fn fit_within(image: RgbaImage, max_w: u32, max_h: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width <= max_w && height <= max_h {
        return image;
    }

    let scale = (max_w as f32 / width as f32).min(max_h as f32 / height as f32);
    let new_w = ((width as f32 * scale).floor() as u32).clamp(1, max_w);
    let new_h = ((height as f32 * scale).floor() as u32).clamp(1, max_h);
    imageops::resize(&image, new_w, new_h, FilterType::Triangle)
}

/// The configurable augmentation chain run on every object before placement
#[derive(Clone, Debug, Default)]
pub struct AugmentPipeline {
    config: AugmentConfig,
}

impl AugmentPipeline {
    pub fn new(config: AugmentConfig) -> Self {
        AugmentPipeline { config }
    }

    /// Run resize, perspective warp, rotation and transparency reduction in
    /// that order. The result always fits inside the background.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        object: &RgbaImage,
        bg_w: u32,
        bg_h: u32,
        rng: &mut R,
    ) -> RgbaImage {
        let cfg = &self.config;
        let short_side = bg_w.min(bg_h) as f32;
        let min_size = (short_side * cfg.object_ratio.0) as u32;
        let max_size = (short_side * cfg.object_ratio.1) as u32;

        let mut image = random_resize(object, min_size, max_size, rng);

        if rng.gen_bool(cfg.perspective_prob) {
            image = random_perspective_transform(&image, cfg.perspective_range, rng);
        }
        if rng.gen_bool(cfg.rotate_prob) {
            image = random_rotate(&image, cfg.rotate_degree, rng);
        }
        if rng.gen_bool(cfg.transparency_prob) {
            image = random_reduce_transparency(&image, cfg.transparency_range, rng);
        }

        fit_within(image, bg_w, bg_h)
    }
}
