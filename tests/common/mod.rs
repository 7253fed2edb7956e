mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from billvision for tests
pub use billvision::record::{Example, Feature, RecordWriter};
pub use billvision::{ClassLabels, LabelEntry, LabelMap};
