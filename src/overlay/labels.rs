use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::detect::classes::COCO_CLASSES;

/// Friendlier names for detector classes whose raw label reads badly.
const FRIENDLY_NAMES: &[(&str, &str)] = &[
    ("cell phone", "Phone"),
    ("tv", "TV"),
    ("dining table", "Table"),
    ("potted plant", "Plant"),
    ("sports ball", "Ball"),
    ("teddy bear", "Teddy Bear"),
    ("hair drier", "Hair Dryer"),
    ("wine glass", "Glass"),
    ("remote", "Remote Control"),
    ("mouse", "Computer Mouse"),
];

/// Class label to display string.
#[derive(Clone, Debug)]
pub struct LabelCatalog {
    names: HashMap<String, String>,
}

impl LabelCatalog {
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    /// Merge `overrides` over the current names.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (class, name) in overrides {
            self.names.insert(class.clone(), name.clone());
        }
        self
    }

    /// Read a JSON object of `class -> display name` and merge it in.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels {}", path.display()))?;
        let overrides: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse labels {}", path.display()))?;
        Ok(self.with_overrides(&overrides))
    }

    pub fn display_name(&self, class: &str) -> String {
        match self.names.get(class) {
            Some(name) => name.clone(),
            None => capitalize(class),
        }
    }

    /// `"Cup 87%"`.
    pub fn format_label(&self, class: &str, confidence: f32) -> String {
        let pct = (confidence.clamp(0.0, 1.0) * 100.0).round() as u32;
        format!("{} {}%", self.display_name(class), pct)
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        let mut names: HashMap<String, String> = COCO_CLASSES
            .iter()
            .map(|c| (c.to_string(), capitalize(c)))
            .collect();
        for (class, name) in FRIENDLY_NAMES {
            names.insert(class.to_string(), name.to_string());
        }
        Self { names }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
