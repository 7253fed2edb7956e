use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tract_onnx::prelude::*;

use crate::config::TensorLayout;
use crate::error::{Error, Result};

/// Open and decode an image file.
pub fn open_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    let img = ImageReader::open(path)
        .map_err(|e| Error::io(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::io(path, e))?
        .decode()
        .map_err(|e| Error::Image {
            path: path.to_path_buf(),
            source: e,
        })?;
    log::debug!("loaded {} ({}x{})", path.display(), img.width(), img.height());
    Ok(img)
}

/// Resize to `size` x `size`, scale to [0, 1], then apply `(v - mean) / std`.
pub fn to_array(
    img: &DynamicImage,
    size: u32,
    layout: TensorLayout,
    mean: f32,
    std: f32,
) -> tract_ndarray::Array4<f32> {
    let rgb = image::imageops::resize(&img.to_rgb8(), size, size, FilterType::Triangle);
    let s = size as usize;
    let value = |x: usize, y: usize, c: usize| {
        let v = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (v - mean) / std
    };

    match layout {
        TensorLayout::Nhwc => {
            tract_ndarray::Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| value(x, y, c))
        }
        TensorLayout::Nchw => {
            tract_ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| value(x, y, c))
        }
    }
}

pub fn to_tensor(
    img: &DynamicImage,
    size: u32,
    layout: TensorLayout,
    mean: f32,
    std: f32,
) -> Tensor {
    to_array(img, size, layout, mean, std).into_tensor()
}

/// Input shape matching [`to_array`].
pub fn input_shape(size: u32, layout: TensorLayout) -> [usize; 4] {
    let s = size as usize;
    match layout {
        TensorLayout::Nhwc => [1, s, s, 3],
        TensorLayout::Nchw => [1, 3, s, s],
    }
}
