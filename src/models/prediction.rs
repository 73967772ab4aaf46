use serde::{Deserialize, Serialize};

/// One class label with the model's confidence in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class", alias = "class_name", alias = "label")]
    pub class_name: String,
    pub confidence: f32,
}

/// Display bucket used to color a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }

    pub fn band(&self) -> ConfidenceBand {
        if self.confidence >= 0.9 {
            ConfidenceBand::High
        } else if self.confidence >= 0.7 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    /// Confidence as a percentage with one decimal, e.g. `92.0%`
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// Ordered predictions for one image, in the order the server returned them
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ClassificationResult {
    predictions: Vec<Prediction>,
}

impl ClassificationResult {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self { predictions }
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Highest-confidence prediction, regardless of server order
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}
