use std::str::FromStr;

use image::{DynamicImage, RgbImage};

use crate::error::{AppError, ModelError};
use crate::labels::LabelTable;
use crate::model::Classifier;
use crate::preprocess::{self, ImageTensor, TensorLayout, IMAGE_SIZE};

/// How raw scores turn into a reported prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Index of the highest raw score, no confidence.
    Argmax,
    /// Softmax over the scores; the max probability is reported as confidence.
    Confidence,
}

impl FromStr for OutputPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "argmax" => Ok(OutputPolicy::Argmax),
            "confidence" | "probability" => Ok(OutputPolicy::Confidence),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: Option<f32>,
}

/// The classifier and its label table, built once at startup and shared
/// read-only by every request.
pub struct InferenceService {
    classifier: Box<dyn Classifier>,
    labels: LabelTable,
    layout: TensorLayout,
    policy: OutputPolicy,
}

impl InferenceService {
    pub fn new(
        classifier: Box<dyn Classifier>,
        labels: LabelTable,
        layout: TensorLayout,
        policy: OutputPolicy,
    ) -> Self {
        InferenceService {
            classifier,
            labels,
            layout,
            policy,
        }
    }

    pub fn policy(&self) -> OutputPolicy {
        self.policy
    }

    /// Runs a blank image through the classifier and checks the label table
    /// covers every output position. Returns the output dimensionality.
    pub fn warm_up(&self) -> Result<usize, ModelError> {
        let blank = DynamicImage::ImageRgb8(RgbImage::new(IMAGE_SIZE, IMAGE_SIZE));
        let input = preprocess::preprocess_image(&blank, self.layout);
        let scores = self.classifier.scores(&input)?;
        if scores.len() > self.labels.len() {
            return Err(ModelError::LabelOutOfRange {
                index: scores.len() - 1,
                len: self.labels.len(),
            });
        }
        Ok(scores.len())
    }

    /// Decode, preprocess, classify and map to a label.
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction, AppError> {
        let input = preprocess::preprocess(bytes, self.layout)?;
        Ok(self.classify(&input)?)
    }

    pub fn classify(&self, input: &ImageTensor) -> Result<Prediction, ModelError> {
        let scores = self.classifier.scores(input)?;

        let (index, confidence) = match self.policy {
            OutputPolicy::Argmax => {
                let (index, _) = argmax(&scores).ok_or(ModelError::EmptyOutput)?;
                (index, None)
            }
            OutputPolicy::Confidence => {
                let probabilities = softmax(&scores);
                let (index, p) = argmax(&probabilities).ok_or(ModelError::EmptyOutput)?;
                (index, Some(p))
            }
        };

        let label = self
            .labels
            .get(index)
            .ok_or(ModelError::LabelOutOfRange {
                index,
                len: self.labels.len(),
            })?
            .to_string();

        Ok(Prediction { label, confidence })
    }
}

/// Numerically stable softmax. Non-finite inputs yield a uniform distribution.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        let uniform = 1.0 / scores.len() as f32;
        return vec![uniform; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// First index of the maximum value. NaNs never win.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}
