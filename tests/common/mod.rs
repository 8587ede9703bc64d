//! Common test utilities for integration tests
//! Builds throwaway object/background trees and reads synthesized output back

#![allow(dead_code)]

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use detsynth::{PlacementConfig, SynthesisConfig};

// Distinct colors cycled by object id
const COLORS: [(u8, u8, u8); 8] = [
    (255, 0, 0),
    (0, 255, 0),
    (0, 0, 255),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
    (192, 192, 192),
    (128, 0, 0),
];

/// Generate an object cutout: a filled circle on a transparent square
pub fn generate_circle_object(radius: u32, object_id: usize) -> RgbaImage {
    let size = radius * 2 + 1;
    let mut image = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    draw_circle(&mut image, radius as i32, radius as i32, radius, object_id);
    image
}

/// Draw an opaque circle into `image`
fn draw_circle(image: &mut RgbaImage, center_x: i32, center_y: i32, radius: u32, object_id: usize) {
    let r_squared = (radius * radius) as i32;
    let radius_i32 = radius as i32;
    let (r, g, b) = COLORS[object_id % COLORS.len()];
    let (width, height) = image.dimensions();

    for y in -radius_i32..=radius_i32 {
        for x in -radius_i32..=radius_i32 {
            if x * x + y * y > r_squared {
                continue;
            }
            let px = center_x + x;
            let py = center_y + y;
            if px >= 0 && px < width as i32 && py >= 0 && py < height as i32 {
                image.put_pixel(px as u32, py as u32, Rgba([r, g, b, 255]));
            }
        }
    }
}

/// A temporary `objects/`, `backgrounds/` and output tree
pub struct DatasetFixture {
    _dir: TempDir,
    pub root: PathBuf,
    pub objects_dir: PathBuf,
    pub backgrounds_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mapping_path: PathBuf,
    next_object_id: usize,
}

impl DatasetFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().to_path_buf();
        let objects_dir = root.join("objects");
        let backgrounds_dir = root.join("backgrounds");
        fs::create_dir_all(&objects_dir).expect("create objects dir");
        fs::create_dir_all(&backgrounds_dir).expect("create backgrounds dir");

        DatasetFixture {
            output_dir: root.join("synthesis"),
            mapping_path: root.join("class_mapping.json"),
            objects_dir,
            backgrounds_dir,
            root,
            _dir: dir,
            next_object_id: 0,
        }
    }

    /// Write a circle cutout as `objects/<class>/<name>.png`
    pub fn add_object(&mut self, class: &str, name: &str, radius: u32) -> PathBuf {
        let class_dir = self.objects_dir.join(class);
        fs::create_dir_all(&class_dir).expect("create class dir");
        let path = class_dir.join(format!("{name}.png"));
        generate_circle_object(radius, self.next_object_id)
            .save(&path)
            .expect("save object");
        self.next_object_id += 1;
        path
    }

    /// Write a flat gray background as `backgrounds/<name>.png`
    pub fn add_background(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.backgrounds_dir.join(format!("{name}.png"));
        RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
            .save(&path)
            .expect("save background");
        path
    }

    /// A config pointing at this fixture, seeded, with fast compositing
    pub fn config(&self) -> SynthesisConfig {
        SynthesisConfig {
            backgrounds_dir: self.backgrounds_dir.clone(),
            objects_dir: self.objects_dir.clone(),
            output_dir: self.output_dir.clone(),
            class_mapping_path: self.mapping_path.clone(),
            min_background_size: 64,
            seed: Some(7),
            placement: PlacementConfig {
                seamless_clone_prob: 0.0,
                ..PlacementConfig::default()
            },
            ..SynthesisConfig::default()
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.output_dir.join("labels")
    }
}

/// Sorted file names inside `dir`
pub fn list_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// A parsed YOLO label line
#[derive(Clone, Debug, PartialEq)]
pub struct LabelLine {
    pub class_id: usize,
    pub values: [f64; 4],
}

/// Parse every label file in `labels_dir`, keyed by file name
pub fn read_labels(labels_dir: &Path) -> Vec<(String, Vec<LabelLine>)> {
    list_file_names(labels_dir)
        .into_iter()
        .map(|name| {
            let text = fs::read_to_string(labels_dir.join(&name)).expect("read label file");
            let lines = text.lines().map(parse_label_line).collect();
            (name, lines)
        })
        .collect()
}

fn parse_label_line(line: &str) -> LabelLine {
    let fields: Vec<&str> = line.split_whitespace().collect();
    assert_eq!(fields.len(), 5, "malformed label line: {line:?}");
    let class_id = fields[0].parse().expect("class id");
    let mut values = [0.0; 4];
    for (value, field) in values.iter_mut().zip(&fields[1..]) {
        *value = field.parse().expect("label value");
    }
    LabelLine { class_id, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_object_has_transparent_corners() {
        let obj = generate_circle_object(10, 0);
        assert_eq!(obj.dimensions(), (21, 21));
        assert_eq!(obj.get_pixel(0, 0)[3], 0);
        assert_eq!(obj.get_pixel(10, 10).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_parse_label_line() {
        let line = parse_label_line("3 0.5 0.25 1 0.125");
        assert_eq!(line.class_id, 3);
        assert_eq!(line.values, [0.5, 0.25, 1.0, 0.125]);
    }
}
