//! Labeled descriptor gallery and nearest-label matching.

use crate::core::stabilizer::UNKNOWN_LABEL;
use crate::detection::DetectionError;
use std::collections::BTreeMap;
use std::path::Path;

/// Default maximum mean distance for a match.
pub const DEFAULT_MATCH_DISTANCE: f64 = 0.52;

/// Derive a label from a gallery file name: `anna-2.jpg` -> `anna`.
///
/// The extension is dropped, then one trailing `-<digits>` or `_<digits>`
/// suffix.
pub fn label_from_filename(file: &str) -> String {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };

    let without_digits = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() < stem.len() {
        if let Some(base) = without_digits
            .strip_suffix('-')
            .or_else(|| without_digits.strip_suffix('_'))
        {
            return base.to_string();
        }
    }
    stem.to_string()
}

/// Result of matching one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryMatch {
    pub label: String,
    pub distance: f64,
}

impl GalleryMatch {
    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

/// Reference descriptors grouped by label.
#[derive(Debug, Clone, Default)]
pub struct FaceGallery {
    labels: BTreeMap<String, Vec<Vec<f32>>>,
    max_distance: f64,
}

impl FaceGallery {
    pub fn new(max_distance: f64) -> Self {
        Self {
            labels: BTreeMap::new(),
            max_distance,
        }
    }

    /// Load a JSON object mapping gallery file names to descriptors.
    ///
    /// Files whose name yields an empty label are skipped.
    pub fn load(path: &Path, max_distance: f64) -> Result<Self, DetectionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DetectionError::Init(format!("{}: {e}", path.display())))?;
        let files: BTreeMap<String, Vec<f32>> = serde_json::from_str(&content)
            .map_err(|e| DetectionError::Init(format!("{}: {e}", path.display())))?;

        let mut gallery = Self::new(max_distance);
        for (file, descriptor) in files {
            let label = label_from_filename(&file);
            if label.is_empty() {
                continue;
            }
            gallery.add(label, descriptor);
        }
        tracing::info!(labels = gallery.len(), path = %path.display(), "loaded face gallery");
        Ok(gallery)
    }

    pub fn add(&mut self, label: impl Into<String>, descriptor: Vec<f32>) {
        self.labels.entry(label.into()).or_default().push(descriptor);
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label with the smallest mean Euclidean distance, or
    /// [`UNKNOWN_LABEL`] when that distance exceeds the maximum.
    pub fn match_descriptor(&self, descriptor: &[f32]) -> GalleryMatch {
        let best = self
            .labels
            .iter()
            .filter_map(|(label, refs)| mean_distance(descriptor, refs).map(|d| (label, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((label, distance)) if distance <= self.max_distance => GalleryMatch {
                label: label.clone(),
                distance,
            },
            Some((_, distance)) => GalleryMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance,
            },
            None => GalleryMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance: f64::INFINITY,
            },
        }
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum();
    Some(sum.sqrt())
}

fn mean_distance(descriptor: &[f32], refs: &[Vec<f32>]) -> Option<f64> {
    let distances: Vec<f64> = refs.iter().filter_map(|r| euclidean(descriptor, r)).collect();
    if distances.is_empty() {
        return None;
    }
    Some(distances.iter().sum::<f64>() / distances.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_filename() {
        assert_eq!(label_from_filename("anna-1.jpg"), "anna");
        assert_eq!(label_from_filename("known/boris_12.png"), "boris");
        assert_eq!(label_from_filename("cora.jpeg"), "cora");
        assert_eq!(label_from_filename("r2d2.jpg"), "r2d2");
        assert_eq!(label_from_filename("ann-lee-3.jpg"), "ann-lee");
        assert_eq!(label_from_filename("-4.jpg"), "");
    }

    #[test]
    fn test_match_nearest_within_distance() {
        let mut gallery = FaceGallery::new(DEFAULT_MATCH_DISTANCE);
        gallery.add("anna", vec![0.0, 0.0, 0.0]);
        gallery.add("anna", vec![0.1, 0.0, 0.0]);
        gallery.add("boris", vec![1.0, 1.0, 1.0]);

        let m = gallery.match_descriptor(&[0.05, 0.0, 0.0]);
        assert_eq!(m.label, "anna");
        assert!((m.distance - 0.05).abs() < 1e-6);
        assert!(m.is_known());
    }

    #[test]
    fn test_match_too_far_is_unknown() {
        let mut gallery = FaceGallery::new(DEFAULT_MATCH_DISTANCE);
        gallery.add("anna", vec![0.0, 0.0]);

        let m = gallery.match_descriptor(&[3.0, 4.0]);
        assert_eq!(m.label, UNKNOWN_LABEL);
        assert!((m.distance - 5.0).abs() < 1e-9);

        assert!(!FaceGallery::default().match_descriptor(&[0.0]).is_known());
    }

    #[test]
    fn test_load_gallery_file() {
        let path = std::env::temp_dir().join(format!("gallery-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"anna-1.jpg": [0.0, 0.0], "anna-2.jpg": [0.2, 0.0], "boris.png": [1.0, 1.0]}"#)
            .unwrap();

        let gallery = FaceGallery::load(&path, DEFAULT_MATCH_DISTANCE).unwrap();
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.match_descriptor(&[0.1, 0.0]).label, "anna");
        let _ = std::fs::remove_file(path);
    }
}
