//! Object and background asset handling
//! Includes discovery on disk and loading into working images
use glob::glob;
use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};
use log::debug;
use std::path::{Path, PathBuf};

use crate::error::{Result, SynthError};

/// File extensions treated as images (compared case-insensitively)
pub const IMG_FORMATS: &[&str] = &["png", "jpg", "jpeg"];

/// Represents an object source (lazy loading)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAsset {
    /// Path to the cutout image
    pub image_path: PathBuf,
    /// Class label, taken from the parent directory name
    pub label: String,
}

impl ObjectAsset {
    /// Build an asset from a path, deriving its label from the parent directory
    pub fn from_path(image_path: impl Into<PathBuf>) -> Self {
        let image_path = image_path.into();
        let label = image_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        ObjectAsset { image_path, label }
    }

    /// Load the object from disk with an alpha channel
    pub fn load(&self) -> Result<RgbaImage> {
        let img = image::open(&self.image_path).map_err(|source| SynthError::ImageRead {
            path: self.image_path.clone(),
            source,
        })?;
        Ok(img.to_rgba8())
    }
}

/// Whether `path` has one of the recognized image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMG_FORMATS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
}

/// Collect image files matching a glob pattern, sorted for a stable order
fn glob_images(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob(pattern).map_err(|source| SynthError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Find every object image laid out as `objects_dir/<class>/<file>`
pub fn discover_object_assets(objects_dir: &Path) -> Result<Vec<ObjectAsset>> {
    let pattern = format!("{}/*/*", glob::Pattern::escape(&objects_dir.to_string_lossy()));
    let assets: Vec<ObjectAsset> = glob_images(&pattern)?
        .into_iter()
        .map(ObjectAsset::from_path)
        .collect();
    debug!(
        "Found {} object images in {}",
        assets.len(),
        objects_dir.display()
    );
    Ok(assets)
}

/// Find every background image directly inside `backgrounds_dir`
pub fn discover_backgrounds(backgrounds_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&backgrounds_dir.to_string_lossy()));
    let backgrounds = glob_images(&pattern)?;
    debug!(
        "Found {} background images in {}",
        backgrounds.len(),
        backgrounds_dir.display()
    );
    Ok(backgrounds)
}

/// Load a background as RGB and upscale it so its short edge is at least
/// `min_size`
pub fn load_background(path: &Path, min_size: u32) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| SynthError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(adjust_background_size(img.to_rgb8(), min_size))
}

/// Return the image resized so `min(w, h) == min_size`, or unchanged when its
/// short edge already reaches `min_size`
pub fn adjust_background_size(image: RgbImage, min_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let short_edge = width.min(height);
    if short_edge >= min_size || short_edge == 0 {
        return image;
    }

    let new_w = (u64::from(width) * u64::from(min_size) / u64::from(short_edge)) as u32;
    let new_h = (u64::from(height) * u64::from(min_size) / u64::from(short_edge)) as u32;
    imageops::resize(&image, new_w, new_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};
    use std::fs;

    #[test]
    fn test_label_from_parent_directory() {
        let asset = ObjectAsset::from_path("/data/objects/Cat/img_01.png");
        assert_eq!(asset.label, "Cat");
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.png")));
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("a/b.Jpeg")));
        assert!(!is_image_file(Path::new("a/b.txt")));
        assert!(!is_image_file(Path::new("a/b")));
    }

    #[test]
    fn test_adjust_background_size_upscales_short_edge() {
        let img = RgbImage::from_pixel(200, 100, Rgb([1, 2, 3]));
        let adjusted = adjust_background_size(img, 640);
        assert_eq!(adjusted.dimensions(), (1280, 640));
    }

    #[test]
    fn test_adjust_background_size_keeps_large_images() {
        let img = RgbImage::from_pixel(800, 700, Rgb([1, 2, 3]));
        let adjusted = adjust_background_size(img, 640);
        assert_eq!(adjusted.dimensions(), (800, 700));
    }

    #[test]
    fn test_discover_assets_and_backgrounds() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let objects = temp.path().join("objects");
        let backgrounds = temp.path().join("backgrounds");
        fs::create_dir_all(objects.join("dog")).unwrap();
        fs::create_dir_all(objects.join("cat")).unwrap();
        fs::create_dir_all(&backgrounds).unwrap();

        let obj = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        obj.save(objects.join("cat/a.png")).unwrap();
        obj.save(objects.join("dog/b.png")).unwrap();
        fs::write(objects.join("cat/notes.txt"), "not an image").unwrap();
        // Files directly under objects_dir have no class and are ignored
        obj.save(objects.join("stray.png")).unwrap();

        let bg = RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]));
        bg.save(backgrounds.join("bg.jpg")).unwrap();

        let assets = discover_object_assets(&objects).unwrap();
        let labels: Vec<&str> = assets.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "dog"]);

        let found = discover_backgrounds(&backgrounds).unwrap();
        assert_eq!(found.len(), 1);

        let loaded = assets[0].load().unwrap();
        assert_eq!(loaded.dimensions(), (4, 4));
    }

    #[test]
    fn test_load_missing_asset_is_error() {
        let asset = ObjectAsset::from_path("/definitely/missing/cat/x.png");
        assert!(matches!(asset.load(), Err(SynthError::ImageRead { .. })));
    }
}
