//! Whole-image bill classification.

use std::fmt;
use std::path::Path;

use image::DynamicImage;

use crate::bundle::ModelBundle;
use crate::config::{ClassifierSettings, TensorLayout};
use crate::error::{Error, Result};
use crate::labels::ClassLabels;
use crate::preprocess;
use crate::runtime::{self, ModelSource, OnnxPlan};

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
    /// The full output vector, one score per class.
    pub raw: Vec<f32>,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Predicted class: {}", self.class_name)?;
        writeln!(f, "Confidence: {}", self.confidence)?;
        write!(f, "Raw output: {:?}", self.raw)
    }
}

/// An opened classification model.
///
/// Create it once with [`Classifier::open`], pass it to every
/// [`Classifier::classify`] call and release it with [`Classifier::close`].
pub struct Classifier {
    plan: OnnxPlan,
    labels: ClassLabels,
    input_size: u32,
    layout: TensorLayout,
    norm_mean: f32,
    norm_std: f32,
}

impl Classifier {
    pub fn open<P: AsRef<Path>>(
        model_path: P,
        labels: ClassLabels,
        settings: &ClassifierSettings,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = preprocess::input_shape(settings.input_size, settings.layout);
        let plan = runtime::load(ModelSource::Path(model_path), &shape)?;
        log::info!(
            "classifier loaded from {} ({} classes, input {:?})",
            model_path.display(),
            labels.len(),
            shape
        );
        Ok(Self {
            plan,
            labels,
            input_size: settings.input_size,
            layout: settings.layout,
            norm_mean: settings.norm_mean,
            norm_std: settings.norm_std,
        })
    }

    /// Open the model packed in a bundle, using its sidecar labels and
    /// normalisation parameters.
    pub fn from_bundle(bundle: &ModelBundle) -> Result<Self> {
        let meta = bundle.metadata();
        let settings = meta.classifier_settings()?;
        let labels = bundle.class_labels();
        let shape = preprocess::input_shape(settings.input_size, settings.layout);
        let plan = runtime::load(ModelSource::Bytes(bundle.model_bytes()), &shape)?;
        log::info!(
            "classifier '{}' loaded from bundle ({} classes, input {:?})",
            meta.name,
            labels.len(),
            shape
        );
        Ok(Self {
            plan,
            labels,
            input_size: settings.input_size,
            layout: settings.layout,
            norm_mean: settings.norm_mean,
            norm_std: settings.norm_std,
        })
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn classify(&self, img: &DynamicImage) -> Result<Prediction> {
        let input = preprocess::to_tensor(
            img,
            self.input_size,
            self.layout,
            self.norm_mean,
            self.norm_std,
        );
        let (raw, shape) = runtime::run_first_output(&self.plan, input)?;
        log::debug!("classifier output shape {:?}", shape);

        let (class_index, confidence) =
            top_class(&raw).ok_or_else(|| Error::Model("model returned an empty output".to_string()))?;
        if class_index >= self.labels.len() {
            log::warn!(
                "class index {} has no label ({} labels loaded)",
                class_index,
                self.labels.len()
            );
        }

        Ok(Prediction {
            class_index,
            class_name: self.labels.name(class_index).to_string(),
            confidence,
            raw,
        })
    }

    pub fn close(self) {
        log::debug!("classifier closed");
    }
}

/// Index and value of the highest score; the first index wins ties.
pub fn top_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_class_picks_highest_and_first_on_tie() {
        assert_eq!(top_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(top_class(&[0.4, 0.4, 0.2]), Some((0, 0.4)));
        assert_eq!(top_class(&[]), None);
    }

    #[test]
    fn prediction_prints_three_lines() {
        let p = Prediction {
            class_index: 3,
            class_name: "Twenty Dollar".to_string(),
            confidence: 0.75,
            raw: vec![0.0, 0.05, 0.2, 0.75],
        };
        let text = p.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Predicted class: Twenty Dollar");
        assert_eq!(lines[1], "Confidence: 0.75");
        assert!(lines[2].starts_with("Raw output: [0.0, 0.05"));
    }
}
