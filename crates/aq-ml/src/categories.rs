//! Sound categories built from AudioSet class groups
//!
//! The monitoring view does not care about all 521 classes. It folds related
//! classes into a handful of categories and reports each category's
//! confidence as the best score among its classes.

use serde::{Deserialize, Serialize};

/// Monitored sound category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundCategory {
    Rain,
    Wind,
    Crowd,
    Speech,
    Shout,
    Music,
    Silence,
    Echo,
    Static,
    Distortion,
    WhiteNoise,
    PinkNoise,
    SineWave,
    Hum,
}

impl SoundCategory {
    /// Get all categories
    pub fn all() -> &'static [SoundCategory] {
        &[
            SoundCategory::Rain, SoundCategory::Wind, SoundCategory::Crowd,
            SoundCategory::Speech, SoundCategory::Shout, SoundCategory::Music,
            SoundCategory::Silence, SoundCategory::Echo, SoundCategory::Static,
            SoundCategory::Distortion, SoundCategory::WhiteNoise,
            SoundCategory::PinkNoise, SoundCategory::SineWave, SoundCategory::Hum,
        ]
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            SoundCategory::Rain => "Rain",
            SoundCategory::Wind => "Wind",
            SoundCategory::Crowd => "Crowd",
            SoundCategory::Speech => "Speech",
            SoundCategory::Shout => "Shout",
            SoundCategory::Music => "Music (Tannoy)",
            SoundCategory::Silence => "Silence",
            SoundCategory::Echo => "Echo",
            SoundCategory::Static => "Static",
            SoundCategory::Distortion => "Distortion",
            SoundCategory::WhiteNoise => "White Noise",
            SoundCategory::PinkNoise => "Pink Noise",
            SoundCategory::SineWave => "Sine Wave",
            SoundCategory::Hum => "Hum",
        }
    }

    /// AudioSet class indices folded into this category
    pub fn class_indices(&self) -> &'static [usize] {
        match self {
            SoundCategory::Rain => &[282, 283, 284, 285, 286, 438, 439, 442, 443, 444, 445, 446],
            SoundCategory::Wind => &[36, 40, 190, 277, 278, 279, 453],
            SoundCategory::Crowd => &[27, 61, 62, 64],
            SoundCategory::Speech => &[0, 1, 2, 3, 4],
            SoundCategory::Shout => &[6, 7, 9, 11],
            SoundCategory::Music => &[132],
            SoundCategory::Silence => &[494],
            SoundCategory::Echo => &[506],
            SoundCategory::Static => &[509],
            SoundCategory::Distortion => &[511],
            SoundCategory::WhiteNoise => &[514],
            SoundCategory::PinkNoise => &[515],
            SoundCategory::SineWave => &[495],
            SoundCategory::Hum => &[510],
        }
    }

    /// Category a class index belongs to, if any
    pub fn from_class_index(idx: usize) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.class_indices().contains(&idx))
    }

    /// Best score among this category's classes, clamped to [0, 1].
    /// Indices beyond `scores` count as zero.
    pub fn confidence(&self, scores: &[f32]) -> f32 {
        self.class_indices()
            .iter()
            .map(|&i| scores.get(i).copied().unwrap_or(0.0))
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0)
    }
}

/// Confidence of one category for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfidence {
    pub category: SoundCategory,
    pub confidence: f32,
}

/// Confidence of every category, in [`SoundCategory::all`] order
pub fn category_confidences(scores: &[f32]) -> Vec<CategoryConfidence> {
    SoundCategory::all()
        .iter()
        .map(|&category| CategoryConfidence {
            category,
            confidence: category.confidence(scores),
        })
        .collect()
}

/// Distinct categories hit by a set of class indices, first hit first
pub fn categories_for(indices: &[usize]) -> Vec<SoundCategory> {
    let mut found: Vec<SoundCategory> = Vec::new();
    for category in indices.iter().filter_map(|&i| SoundCategory::from_class_index(i)) {
        if !found.contains(&category) {
            found.push(category);
        }
    }
    found
}
