//! Class index bookkeeping and YOLO label encoding.
//!
//! The [`ClassMapping`] persists across runs as a JSON object
//! `{"label": index}` so repeated synthesis into the same dataset keeps class
//! indices stable.

use log::warn;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::collision::BoundingBox;
use crate::error::{Result, SynthError};

/// Lower-cased label to class index, remembering insertion order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassMapping {
    /// (label, index) in the order labels were first seen
    entries: Vec<(String, usize)>,
    lookup: HashMap<String, usize>,
}

impl ClassMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a mapping from `path`.
    ///
    /// A missing or unparseable file yields an empty mapping; the file is
    /// overwritten on the next [`ClassMapping::save`].
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Class mapping {} not readable ({e}), starting with an empty mapping",
                    path.display()
                );
                return Self::new();
            }
        };

        let raw: HashMap<String, usize> = match serde_json::from_reader(BufReader::new(file)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Class mapping {} is not a valid label->index object ({e}), starting with an empty mapping",
                    path.display()
                );
                return Self::new();
            }
        };

        let mut entries: Vec<(String, usize)> = raw.into_iter().collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut mapping = Self::new();
        for (label, index) in entries {
            let label = label.to_lowercase();
            if mapping.lookup.contains_key(&label) {
                warn!("Duplicate label '{label}' in class mapping, keeping the lower index");
                continue;
            }
            mapping.lookup.insert(label.clone(), index);
            mapping.entries.push((label, index));
        }
        mapping
    }

    /// Write the mapping as JSON via a temporary sibling file and a rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SynthError::io(parent, e))?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        {
            let file = File::create(&tmp_path).map_err(|e| SynthError::io(&tmp_path, e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self).map_err(|source| SynthError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            writer.flush().map_err(|e| SynthError::io(&tmp_path, e))?;
        }

        fs::rename(&tmp_path, path).map_err(|e| SynthError::io(path, e))
    }

    /// Write one label per line by ascending index.
    ///
    /// # Errors
    /// Returns [`SynthError::NonContiguousMapping`] when the indices are not
    /// exactly `0..len`, since line numbers could not match class indices.
    pub fn write_class_names(&self, path: &Path) -> Result<()> {
        let names = self.class_names()?;
        let mut contents = String::with_capacity(names.iter().map(|n| n.len() + 1).sum());
        for name in names {
            contents.push_str(name);
            contents.push('\n');
        }
        fs::write(path, contents).map_err(|e| SynthError::io(path, e))
    }

    /// Labels ordered by index, requiring indices `0..len`
    pub fn class_names(&self) -> Result<Vec<&str>> {
        let mut slots: Vec<Option<&str>> = vec![None; self.entries.len()];
        for (label, index) in &self.entries {
            match slots.get_mut(*index) {
                Some(slot) => *slot = Some(label),
                None => {
                    let missing = slots.iter().position(Option::is_none).unwrap_or(*index);
                    return Err(SynthError::NonContiguousMapping { missing });
                }
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(missing, slot)| slot.ok_or(SynthError::NonContiguousMapping { missing }))
            .collect()
    }

    /// Index of `label` (case-insensitive), assigning the next unused index
    /// when it has not been seen before
    pub fn get_or_insert(&mut self, label: &str) -> usize {
        let label = label.to_lowercase();
        if let Some(&index) = self.lookup.get(&label) {
            return index;
        }

        let index = self.next_index();
        self.lookup.insert(label.clone(), index);
        self.entries.push((label, index));
        index
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.lookup.get(&label.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (label, index) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(label, index)| (label.as_str(), *index))
    }

    /// `len` unless a loaded mapping already uses it, then the smallest
    /// free index
    fn next_index(&self) -> usize {
        let len = self.entries.len();
        let used: HashSet<usize> = self.entries.iter().map(|(_, index)| *index).collect();
        if !used.contains(&len) {
            return len;
        }
        (0..len).find(|index| !used.contains(index)).unwrap_or(len)
    }
}

impl Serialize for ClassMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut sorted: Vec<&(String, usize)> = self.entries.iter().collect();
        sorted.sort_by_key(|(_, index)| *index);

        let mut map = serializer.serialize_map(Some(sorted.len()))?;
        for (label, index) in sorted {
            map.serialize_entry(label, index)?;
        }
        map.end()
    }
}

/// Encode `boxes` as YOLO lines `class cx cy w h`, normalized by each box's
/// background size. New labels are added to `mapping`.
pub fn encode_yolo_labels(boxes: &[BoundingBox], mapping: &mut ClassMapping) -> String {
    let mut yolo_data = String::with_capacity(boxes.len() * 64);

    for bbox in boxes {
        let class_id = mapping.get_or_insert(&bbox.label);

        let bg_w = f64::from(bbox.bg_w);
        let bg_h = f64::from(bbox.bg_h);
        let x_center = (f64::from(bbox.x1) + f64::from(bbox.x2)) / 2.0 / bg_w;
        let y_center = (f64::from(bbox.y1) + f64::from(bbox.y2)) / 2.0 / bg_h;
        let width = f64::from(bbox.width()) / bg_w;
        let height = f64::from(bbox.height()) / bg_h;

        yolo_data.push_str(&format!(
            "{} {:?} {:?} {:?} {:?}\n",
            class_id, x_center, y_center, width, height
        ));
    }

    yolo_data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(label: &str, x1: u32, y1: u32, x2: u32, y2: u32) -> BoundingBox {
        BoundingBox {
            label: label.to_string(),
            x1,
            y1,
            x2,
            y2,
            bg_w: 100,
            bg_h: 200,
        }
    }

    #[test]
    fn test_full_frame_box() {
        let mut mapping = ClassMapping::new();
        let out = encode_yolo_labels(&[bbox("cat", 0, 0, 100, 200)], &mut mapping);
        assert_eq!(out, "0 0.5 0.5 1.0 1.0\n");
    }

    #[test]
    fn test_normalized_values() {
        let mut mapping = ClassMapping::new();
        let out = encode_yolo_labels(&[bbox("cat", 10, 20, 30, 60)], &mut mapping);
        assert_eq!(out, "0 0.2 0.2 0.2 0.2\n");
    }

    #[test]
    fn test_indices_assigned_in_first_seen_order() {
        let mut mapping = ClassMapping::new();
        let boxes = vec![
            bbox("Cat", 0, 0, 10, 10),
            bbox("dog", 0, 0, 10, 10),
            bbox("cat", 0, 0, 10, 10),
        ];
        let out = encode_yolo_labels(&boxes, &mut mapping);
        let classes: Vec<&str> = out
            .lines()
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(classes, vec!["0", "1", "0"]);
        assert_eq!(mapping.get("CAT"), Some(0));
        assert_eq!(mapping.get("dog"), Some(1));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_known_labels_keep_index() {
        let mut mapping = ClassMapping::new();
        mapping.get_or_insert("bird");
        mapping.get_or_insert("cat");
        let out = encode_yolo_labels(&[bbox("cat", 0, 0, 10, 10)], &mut mapping);
        assert!(out.starts_with("1 "));
    }

    #[test]
    fn test_next_index_is_len_when_free() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mapping.json");
        fs::write(&path, r#"{"cat": 0, "dog": 5}"#).unwrap();

        let mut mapping = ClassMapping::load(&path);
        let out = encode_yolo_labels(&[bbox("fox", 0, 0, 100, 200)], &mut mapping);
        assert_eq!(out, "2 0.5 0.5 1.0 1.0\n");
        assert_eq!(mapping.get_or_insert("owl"), 3);
    }

    #[test]
    fn test_next_index_fills_gap_when_len_taken() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mapping.json");
        fs::write(&path, r#"{"cat": 0, "dog": 2}"#).unwrap();

        let mut mapping = ClassMapping::load(&path);
        assert_eq!(mapping.get_or_insert("fox"), 1);
        assert_eq!(mapping.get_or_insert("owl"), 3);
        assert!(mapping.class_names().is_ok());
    }

    #[test]
    fn test_save_and_load_preserves_indices() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/mapping.json");

        let mut mapping = ClassMapping::new();
        mapping.get_or_insert("zebra");
        mapping.get_or_insert("ant");
        mapping.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.find("zebra").unwrap() < text.find("ant").unwrap());
        assert!(!temp.path().join("nested/mapping.json.tmp").exists());

        let loaded = ClassMapping::load(&path);
        assert_eq!(loaded.get("zebra"), Some(0));
        assert_eq!(loaded.get("ant"), Some(1));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let mapping = ClassMapping::load(&temp.path().join("absent.json"));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mapping.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(ClassMapping::load(&path).is_empty());

        fs::write(&path, r#"["cat", "dog"]"#).unwrap();
        assert!(ClassMapping::load(&path).is_empty());
    }

    #[test]
    fn test_write_class_names_in_index_order() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("classes.txt");

        let mut mapping = ClassMapping::new();
        for label in ["person", "car", "tree"] {
            mapping.get_or_insert(label);
        }
        mapping.write_class_names(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "person\ncar\ntree\n");
    }

    #[test]
    fn test_write_class_names_rejects_gaps() {
        let temp = tempfile::tempdir().unwrap();
        let mapping_path = temp.path().join("mapping.json");
        fs::write(&mapping_path, r#"{"cat": 0, "dog": 2}"#).unwrap();

        let mapping = ClassMapping::load(&mapping_path);
        let result = mapping.write_class_names(&temp.path().join("classes.txt"));
        assert!(matches!(
            result,
            Err(SynthError::NonContiguousMapping { missing: 1 })
        ));
    }

    #[test]
    fn test_iter_in_insertion_order() {
        let mut mapping = ClassMapping::new();
        mapping.get_or_insert("b");
        mapping.get_or_insert("a");
        let pairs: Vec<(&str, usize)> = mapping.iter().collect();
        assert_eq!(pairs, vec![("b", 0), ("a", 1)]);
    }
}
