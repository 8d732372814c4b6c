//! Image preprocessing for the ConVIRT image encoder.
//!
//! The encoder was trained on chest radiographs:
//! - Grayscale input, replicated to three channels
//! - Input size: 224×224 pixels
//! - Normalization: (pixel/255 - mean) / std with dataset statistics
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of channels fed to the backbone.
const CHANNELS: usize = 3;

/// Pixel mean of the pretraining radiographs.
pub const NORM_MEAN: f32 = 0.586_278_6;

/// Pixel standard deviation of the pretraining radiographs.
pub const NORM_STD: f32 = 0.279_500_9;

/// Preprocess a radiograph for inference.
///
/// Resizes to `image_size × image_size`, converts to grayscale, normalizes,
/// and returns a `[1, 3, image_size, image_size]` tensor.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::Triangle,
    );
    let gray = resized.to_luma8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    for (i, &val) in gray.as_raw().iter().enumerate() {
        let y = i / size;
        let x = i % size;
        let v = (val as f32 / 255.0 - NORM_MEAN) / NORM_STD;
        for c in 0..CHANNELS {
            tensor[[0, c, y, x]] = v;
        }
    }

    tensor
}
