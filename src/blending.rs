use image::{imageops, DynamicImage, RgbImage, RgbaImage};
use ndarray::Array2;

/// Iteration cap for the Poisson solver
const SOR_MAX_ITERATIONS: usize = 1000;
const NEIGHBOURS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
/// Stop once no pixel moves by more than this between sweeps. Output is
/// rounded to u8, so finer convergence is invisible.
const SOR_TOLERANCE: f32 = 0.1;

/// How an object is merged into the background
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeMode {
    /// Straight paste using the object's alpha channel as mask
    Alpha,
    /// Gradient-domain clone centered on the object's center
    Seamless,
}

/// Blend two pixels
pub fn blend_pixel(base: u8, overlay: u8, alpha: f32) -> u8 {
    let base_val = f32::from(base);
    let overlay_val = f32::from(overlay);
    let blended = base_val * (1.0 - alpha) + overlay_val * alpha;
    blended.clamp(0.0, 255.0) as u8
}

/// Alpha-composite `object` onto `background` with its top-left corner at
/// `(x_start, y_start)`. Parts falling outside the background are dropped.
pub fn paste_with_alpha(background: &mut RgbImage, object: &RgbaImage, x_start: u32, y_start: u32) {
    let (bg_w, bg_h) = background.dimensions();

    for (px, py, pixel) in object.enumerate_pixels() {
        let mask_value = pixel[3];
        if mask_value == 0 {
            continue; // Skip transparent pixels
        }

        let target_x = x_start + px;
        let target_y = y_start + py;
        if target_x >= bg_w || target_y >= bg_h {
            continue;
        }

        let alpha = f32::from(mask_value) / 255.0;
        let base = background.get_pixel_mut(target_x, target_y);
        for c in 0..3 {
            base[c] = blend_pixel(base[c], pixel[c], alpha);
        }
    }
}

/// Poisson-blend `object` into `background` so that its center lands on
/// `(center_x, center_y)`.
///
/// Every pixel with non-zero alpha is solved for such that the result keeps
/// the object's gradients while matching the background along the mask
/// boundary. Mask pixels on the background's outermost border are left
/// untouched because they have no outside neighbour to anchor against.
///
/// The solve is iterative and runs per channel, so its cost grows with the
/// object's pixel count times its side length. A few hundred pixels square
/// takes on the order of a second in release builds.
pub fn seamless_clone(background: &mut RgbImage, object: &RgbaImage, center_x: u32, center_y: u32) {
    let (bg_w, bg_h) = background.dimensions();
    let (obj_w, obj_h) = object.dimensions();
    if bg_w < 3 || bg_h < 3 || obj_w == 0 || obj_h == 0 {
        return;
    }

    let origin_x = i64::from(center_x) - i64::from(obj_w / 2);
    let origin_y = i64::from(center_y) - i64::from(obj_h / 2);

    // Which object pixels are unknowns of the system
    let mut domain = Array2::<bool>::from_elem((obj_h as usize, obj_w as usize), false);
    let mut any_unknown = false;
    for (px, py, pixel) in object.enumerate_pixels() {
        let bx = origin_x + i64::from(px);
        let by = origin_y + i64::from(py);
        let interior =
            bx >= 1 && by >= 1 && bx < i64::from(bg_w) - 1 && by < i64::from(bg_h) - 1;
        if pixel[3] > 0 && interior {
            domain[[py as usize, px as usize]] = true;
            any_unknown = true;
        }
    }
    if !any_unknown {
        return;
    }

    // Optimal over-relaxation for a square grid of the patch's larger side
    let grid = obj_w.max(obj_h) as f32;
    let omega = 2.0 / (1.0 + (std::f32::consts::PI / (grid + 1.0)).sin());

    for c in 0..3 {
        let source = Array2::from_shape_fn((obj_h as usize, obj_w as usize), |(y, x)| {
            f32::from(object.get_pixel(x as u32, y as u32)[c])
        });
        // Start from the source shifted onto the boundary's mean level; the
        // sweeps then only need to remove the residual low-frequency error
        let offset = boundary_offset(&source, &domain, background, origin_x, origin_y, c);
        let mut solution = source.mapv(|v| v + offset);

        for _ in 0..SOR_MAX_ITERATIONS {
            let mut max_delta = 0.0f32;

            for py in 0..obj_h as usize {
                for px in 0..obj_w as usize {
                    if !domain[[py, px]] {
                        continue;
                    }

                    let g_p = source[[py, px]];
                    let mut sum = 0.0f32;
                    for (dx, dy) in NEIGHBOURS {
                        let qx = px as i64 + dx;
                        let qy = py as i64 + dy;
                        let in_patch =
                            qx >= 0 && qy >= 0 && qx < i64::from(obj_w) && qy < i64::from(obj_h);

                        if in_patch && domain[[qy as usize, qx as usize]] {
                            sum += solution[[qy as usize, qx as usize]];
                        } else {
                            // Interior pixels always have in-bounds neighbours
                            let bx = (origin_x + qx) as u32;
                            let by = (origin_y + qy) as u32;
                            sum += f32::from(background.get_pixel(bx, by)[c]);
                        }

                        if in_patch {
                            sum += g_p - source[[qy as usize, qx as usize]];
                        }
                    }

                    let current = solution[[py, px]];
                    let updated = current + omega * (sum / 4.0 - current);
                    max_delta = max_delta.max((updated - current).abs());
                    solution[[py, px]] = updated;
                }
            }

            if max_delta < SOR_TOLERANCE {
                break;
            }
        }

        for ((py, px), &inside) in domain.indexed_iter() {
            if !inside {
                continue;
            }
            let bx = (origin_x + px as i64) as u32;
            let by = (origin_y + py as i64) as u32;
            background.get_pixel_mut(bx, by)[c] = solution[[py, px]].round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Mean difference between the background just outside the mask and the
/// object pixels next to it, for channel `c`
fn boundary_offset(
    source: &Array2<f32>,
    domain: &Array2<bool>,
    background: &RgbImage,
    origin_x: i64,
    origin_y: i64,
    c: usize,
) -> f32 {
    let (rows, cols) = domain.dim();
    let mut sum = 0.0f32;
    let mut count = 0u32;

    for ((py, px), &inside) in domain.indexed_iter() {
        if !inside {
            continue;
        }
        for (dx, dy) in NEIGHBOURS {
            let qx = px as i64 + dx;
            let qy = py as i64 + dy;
            let in_patch = qx >= 0 && qy >= 0 && (qx as usize) < cols && (qy as usize) < rows;
            if in_patch && domain[[qy as usize, qx as usize]] {
                continue;
            }
            let bx = (origin_x + qx) as u32;
            let by = (origin_y + qy) as u32;
            sum += f32::from(background.get_pixel(bx, by)[c]) - source[[py, px]];
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Convert to grayscale while keeping three channels
pub fn to_grayscale_rgb(image: &RgbImage) -> RgbImage {
    DynamicImage::ImageLuma8(imageops::grayscale(image)).to_rgb8()
}
