//! Model bundles: an opaque model with its sidecar metadata.
//!
//! A bundle is a `tar.zst` archive holding
//! - `model.onnx`, the model bytes, never interpreted here;
//! - `labels.txt`, the class labels in output order;
//! - `metadata.json`, input size, tensor layout and normalisation.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

use crate::config::{ClassifierSettings, TensorLayout};
use crate::error::{Error, Result};
use crate::labels::ClassLabels;

pub const MODEL_FILE_NAME: &str = "model.onnx";
pub const LABELS_FILE_NAME: &str = "labels.txt";
pub const METADATA_FILE_NAME: &str = "metadata.json";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub name: String,
    pub input_size: u32,
    pub layout: TensorLayout,
    pub norm_mean: f32,
    pub norm_std: f32,
    /// Member holding the labels, `None` when the bundle carries none.
    pub labels_file: Option<String>,
}

impl Default for BundleMetadata {
    fn default() -> Self {
        Self {
            name: "bill_classifier".to_string(),
            input_size: 224,
            layout: TensorLayout::Nhwc,
            norm_mean: 0.0,
            norm_std: 1.0,
            labels_file: None,
        }
    }
}

impl BundleMetadata {
    /// Classifier settings described by this metadata, validated like the
    /// `[classifier]` config section.
    pub fn classifier_settings(&self) -> Result<ClassifierSettings> {
        let settings = ClassifierSettings {
            model_path: None,
            labels_path: None,
            input_size: self.input_size,
            layout: self.layout,
            norm_mean: self.norm_mean,
            norm_std: self.norm_std,
        };
        settings
            .validate()
            .map_err(|e| Error::Bundle(format!("bundle '{}': {}", self.name, e)))?;
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct ModelBundle {
    metadata: BundleMetadata,
    model: Vec<u8>,
    labels: Option<ClassLabels>,
}

impl ModelBundle {
    pub fn new(model: Vec<u8>, labels: Option<ClassLabels>, mut metadata: BundleMetadata) -> Self {
        metadata.labels_file = labels.as_ref().map(|_| LABELS_FILE_NAME.to_string());
        Self {
            metadata,
            model,
            labels,
        }
    }

    /// Read `model_path` and write a bundle with the given labels to `out`.
    pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        labels: Option<ClassLabels>,
        metadata: BundleMetadata,
        out: Q,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = fs::read(model_path).map_err(|e| Error::io(model_path, e))?;
        let bundle = Self::new(model, labels, metadata);
        bundle.write(out)?;
        Ok(bundle)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.metadata.classifier_settings()?;
        if let Some(labels) = &self.labels {
            check_sidecar_names(labels)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }

        let out = File::create(path).map_err(|e| Error::io(path, e))?;
        let encoder = ZstdEncoder::new(out, ZSTD_LEVEL).map_err(|e| Error::io(path, e))?;
        let mut tar = Builder::new(encoder);

        let metadata = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|e| Error::Bundle(format!("failed to encode metadata: {}", e)))?;
        append(&mut tar, METADATA_FILE_NAME, &metadata, path)?;
        append(&mut tar, MODEL_FILE_NAME, &self.model, path)?;
        if let Some(labels) = &self.labels {
            append(&mut tar, LABELS_FILE_NAME, labels.to_text().as_bytes(), path)?;
        }

        // Finish tar, then finish zstd stream
        let encoder = tar.into_inner().map_err(|e| Error::io(path, e))?;
        encoder.finish().map_err(|e| Error::io(path, e))?;
        log::info!("wrote model bundle {}", path.display());
        Ok(())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let decoder = ZstdDecoder::new(file).map_err(|e| Error::io(path, e))?;
        let mut archive = Archive::new(decoder);

        let mut metadata: Option<BundleMetadata> = None;
        let mut model: Option<Vec<u8>> = None;
        let mut labels: Option<ClassLabels> = None;

        let entries = archive
            .entries()
            .map_err(|e| Error::Bundle(format!("{} is not a bundle archive: {}", path.display(), e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| Error::io(path, e))?;
            let name = entry
                .path()
                .map_err(|e| Error::io(path, e))?
                .to_string_lossy()
                .into_owned();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(|e| Error::io(path, e))?;

            match name.as_str() {
                METADATA_FILE_NAME => {
                    metadata = Some(serde_json::from_slice(&bytes).map_err(|e| {
                        Error::Bundle(format!("invalid {}: {}", METADATA_FILE_NAME, e))
                    })?);
                }
                MODEL_FILE_NAME => model = Some(bytes),
                LABELS_FILE_NAME => {
                    let text = String::from_utf8(bytes).map_err(|_| {
                        Error::Bundle(format!("{} is not UTF-8", LABELS_FILE_NAME))
                    })?;
                    labels = Some(ClassLabels::parse(&text));
                }
                other => log::debug!("ignoring bundle member {}", other),
            }
        }

        let metadata = metadata
            .ok_or_else(|| Error::Bundle(format!("{} has no {}", path.display(), METADATA_FILE_NAME)))?;
        let model =
            model.ok_or_else(|| Error::Bundle(format!("{} has no {}", path.display(), MODEL_FILE_NAME)))?;

        Ok(Self {
            metadata,
            model,
            labels,
        })
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn model_bytes(&self) -> &[u8] {
        &self.model
    }

    /// Sidecar labels, if the bundle carries any.
    pub fn labels(&self) -> Option<&ClassLabels> {
        self.labels.as_ref()
    }

    /// Sidecar labels, or the bill classes when the bundle has none.
    pub fn class_labels(&self) -> ClassLabels {
        match &self.labels {
            Some(labels) => labels.clone(),
            None => {
                log::warn!(
                    "bundle '{}' has no labels, using the bill classes",
                    self.metadata.name
                );
                ClassLabels::default_bills()
            }
        }
    }

    pub fn metadata_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| Error::Bundle(format!("failed to encode metadata: {}", e)))
    }
}

/// `labels.txt` holds one trimmed name per line, so a name that is empty,
/// padded or multi-line would not come back at the same index.
fn check_sidecar_names(labels: &ClassLabels) -> Result<()> {
    for (index, name) in labels.names().iter().enumerate() {
        if name.is_empty() || name.trim() != name.as_str() || name.contains(['\n', '\r']) {
            return Err(Error::Bundle(format!(
                "label {} ({:?}) cannot be stored in {}",
                index, name, LABELS_FILE_NAME
            )));
        }
    }
    Ok(())
}

fn append<W: std::io::Write>(
    tar: &mut Builder<W>,
    name: &str,
    bytes: &[u8],
    archive: &Path,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    tar.append_data(&mut header, name, bytes)
        .map_err(|e| Error::io(archive, e))
}
