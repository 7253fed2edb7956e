use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_CLASSIFIER_INPUT: u32 = 224;
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 100;
const DEFAULT_OUTPUT_DIR: &str = "inference_output";
const DEFAULT_DATASET_YAML: &str = "billvision_config.yaml";
const DEFAULT_DATASET_DIR: &str = "USD_Total-1";
const DEFAULT_WORKSPACE: &str = "jm-cbkgb";
const DEFAULT_PROJECT: &str = "usd_total";
const DEFAULT_VERSION: u32 = 1;
const DEFAULT_FORMAT: &str = "yolov8";
const DEFAULT_API_URL: &str = "https://api.roboflow.com";

pub const CONFIG_ENV: &str = "BILLVISION_CONFIG";
pub const API_KEY_ENV: &str = "ROBOFLOW_API_KEY";

/// Memory order of the image tensor a model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `(1, H, W, 3)`, what Keras exports produce.
    #[default]
    Nhwc,
    /// `(1, 3, H, W)`, what YOLO exports produce.
    Nchw,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    classifier: Option<ClassifierFile>,
    detector: Option<DetectorFile>,
    dataset: Option<DatasetFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierFile {
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    layout: Option<TensorLayout>,
    norm_mean: Option<f32>,
    norm_std: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorFile {
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    output_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DatasetFile {
    config_yaml: Option<PathBuf>,
    dir: Option<PathBuf>,
    workspace: Option<String>,
    project: Option<String>,
    version: Option<u32>,
    format: Option<String>,
    api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub layout: TensorLayout,
    pub norm_mean: f32,
    pub norm_std: f32,
}

impl ClassifierSettings {
    /// Input size above zero, finite mean, finite positive std.
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::Configuration("input size must be greater than zero".to_string()));
        }
        if !self.norm_mean.is_finite() {
            return Err(Error::Configuration(format!(
                "norm_mean {} is not a finite number",
                self.norm_mean
            )));
        }
        // NaN fails this comparison too.
        if !(self.norm_std.is_finite() && self.norm_std > 0.0) {
            return Err(Error::Configuration(format!(
                "norm_std {} must be a finite number greater than zero",
                self.norm_std
            )));
        }
        Ok(())
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            labels_path: None,
            input_size: DEFAULT_CLASSIFIER_INPUT,
            layout: TensorLayout::Nhwc,
            norm_mean: 0.0,
            norm_std: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            labels_path: None,
            input_size: DEFAULT_DETECTOR_INPUT,
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            font_path: None,
        }
    }
}

/// Where the training dataset lives locally and on the hosting service.
#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub config_yaml: PathBuf,
    pub dir: PathBuf,
    pub workspace: String,
    pub project: String,
    pub version: u32,
    pub format: String,
    pub api_url: String,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            config_yaml: PathBuf::from(DEFAULT_DATASET_YAML),
            dir: PathBuf::from(DEFAULT_DATASET_DIR),
            workspace: DEFAULT_WORKSPACE.to_string(),
            project: DEFAULT_PROJECT.to_string(),
            version: DEFAULT_VERSION,
            format: DEFAULT_FORMAT.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl DatasetSettings {
    /// The dataset host API key from `ROBOFLOW_API_KEY`.
    pub fn api_key(&self) -> Result<String> {
        api_key_from(std::env::var(API_KEY_ENV).ok())
    }
}

pub(crate) fn api_key_from(value: Option<String>) -> Result<String> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::Configuration(format!(
            "{} is not set; it is required to reach the dataset host",
            API_KEY_ENV
        ))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub classifier: ClassifierSettings,
    pub detector: DetectorSettings,
    pub dataset: DatasetSettings,
}

impl Config {
    /// Load from `path`, or from `BILLVISION_CONFIG`, or use defaults, then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid config: {}", e)))?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let c = file.classifier.unwrap_or_default();
        let d = file.detector.unwrap_or_default();
        let s = file.dataset.unwrap_or_default();
        let classifier_defaults = ClassifierSettings::default();
        let detector_defaults = DetectorSettings::default();
        let dataset_defaults = DatasetSettings::default();

        Self {
            classifier: ClassifierSettings {
                model_path: c.model_path,
                labels_path: c.labels_path,
                input_size: c.input_size.unwrap_or(classifier_defaults.input_size),
                layout: c.layout.unwrap_or(classifier_defaults.layout),
                norm_mean: c.norm_mean.unwrap_or(classifier_defaults.norm_mean),
                norm_std: c.norm_std.unwrap_or(classifier_defaults.norm_std),
            },
            detector: DetectorSettings {
                model_path: d.model_path,
                labels_path: d.labels_path,
                input_size: d.input_size.unwrap_or(detector_defaults.input_size),
                confidence_threshold: d
                    .confidence_threshold
                    .unwrap_or(detector_defaults.confidence_threshold),
                iou_threshold: d.iou_threshold.unwrap_or(detector_defaults.iou_threshold),
                max_detections: d.max_detections.unwrap_or(detector_defaults.max_detections),
                output_dir: d.output_dir.unwrap_or(detector_defaults.output_dir),
                font_path: d.font_path,
            },
            dataset: DatasetSettings {
                config_yaml: s.config_yaml.unwrap_or(dataset_defaults.config_yaml),
                dir: s.dir.unwrap_or(dataset_defaults.dir),
                workspace: s.workspace.unwrap_or(dataset_defaults.workspace),
                project: s.project.unwrap_or(dataset_defaults.project),
                version: s.version.unwrap_or(dataset_defaults.version),
                format: s.format.unwrap_or(dataset_defaults.format),
                api_url: s.api_url.unwrap_or(dataset_defaults.api_url),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("BILLVISION_CLASSIFIER_MODEL") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("BILLVISION_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var("BILLVISION_CONFIDENCE") {
            self.detector.confidence_threshold = value.trim().parse().map_err(|_| {
                Error::Configuration("BILLVISION_CONFIDENCE must be a number".to_string())
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.detector.confidence_threshold) {
            return Err(Error::Configuration(format!(
                "confidence threshold {} is outside [0, 1]",
                self.detector.confidence_threshold
            )));
        }
        if !unit.contains(&self.detector.iou_threshold) {
            return Err(Error::Configuration(format!(
                "iou threshold {} is outside [0, 1]",
                self.detector.iou_threshold
            )));
        }
        if self.detector.input_size == 0 {
            return Err(Error::Configuration("input size must be greater than zero".to_string()));
        }
        self.classifier.validate()
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.is_file() {
        return Err(Error::Configuration(format!(
            "config file '{}' not found",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    toml::from_str(&raw).map_err(|e| {
        Error::Configuration(format!("invalid config '{}': {}", path.display(), e))
    })
}
