pub mod bundle;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod label_map;
pub mod labels;
pub mod preprocess;
pub mod record;
pub mod runtime;

pub use bundle::{BundleMetadata, ModelBundle};
pub use classifier::{Classifier, Prediction};
pub use config::{Config, TensorLayout};
pub use detection::yolo::Detector;
pub use detection::{Annotation, BoundingBox, Detection, Partition, annotate, partition};
pub use error::{Error, Result};
pub use label_map::{LabelEntry, LabelMap};
pub use labels::ClassLabels;
