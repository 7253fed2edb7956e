//! ONNX model loading and execution through tract.

use std::io::Cursor;
use std::path::Path;

use tract_onnx::prelude::*;

use crate::error::{Error, Result};

pub type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Where the model bytes come from.
pub enum ModelSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

/// Load an ONNX model, pin its first input to an f32 tensor of `shape`,
/// optimise it and make it runnable.
pub fn load(source: ModelSource<'_>, shape: &[usize]) -> Result<OnnxPlan> {
    let onnx = tract_onnx::onnx();
    let model = match source {
        ModelSource::Path(path) => onnx.model_for_path(path).map_err(|e| {
            Error::Model(format!("failed to load ONNX model from {}: {:#}", path.display(), e))
        })?,
        ModelSource::Bytes(bytes) => onnx
            .model_for_read(&mut Cursor::new(bytes))
            .map_err(|e| Error::Model(format!("failed to decode ONNX model: {:#}", e)))?,
    };

    let shape: TVec<usize> = shape.iter().copied().collect();
    model
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
        .map_err(|e| Error::Model(format!("failed to set input fact: {:#}", e)))?
        .into_optimized()
        .map_err(|e| Error::Model(format!("failed to optimize ONNX model: {:#}", e)))?
        .into_runnable()
        .map_err(|e| Error::Model(format!("failed to build runnable ONNX model: {:#}", e)))
}

/// Run the plan and return the first output flattened, with its shape.
pub fn run_first_output(plan: &OnnxPlan, input: Tensor) -> Result<(Vec<f32>, Vec<usize>)> {
    let outputs = plan
        .run(tvec!(input.into()))
        .map_err(|e| Error::Model(format!("ONNX inference failed: {:#}", e)))?;
    let output = outputs
        .first()
        .ok_or_else(|| Error::Model("model produced no outputs".to_string()))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| Error::Model(format!("model output tensor was not f32: {:#}", e)))?;
    Ok((view.iter().copied().collect(), view.shape().to_vec()))
}
