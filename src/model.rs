use std::path::Path;

use image::{
    imageops, imageops::FilterType, DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage,
    Rgba, RgbaImage,
};
use imageproc::map::map_colors;
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider,
};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;

use crate::errors::{BgArbiterError, Result};
use crate::traits::SegmentationModel;

/// U²-Net family input edge length, used when the model metadata reports a
/// dynamic dimension.
pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// Probability above which a mask pixel counts as foreground.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Segmentation adapter around a pretrained U²-Net-style ONNX model.
///
/// The session is created once, warmed up, and shared read-only for the
/// rest of the process; the mutex only satisfies ort's `&mut self` run
/// signature.
pub struct U2NetModel {
    input_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl U2NetModel {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = build_session(model_path, device_id, "segmentation model")?;

        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();
        let input_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0)
            .map_or(DEFAULT_INPUT_SIZE, |dim| dim as u32);

        warm_up(&mut session, &input_name, input_size)?;

        Ok(Self {
            input_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    /// Runs the network on a preprocessed `(1, 3, S, S)` tensor and returns
    /// the `(1, 1, S, S)` probability mask.
    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let mask = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        let size = self.input_size as usize;
        let expected = [1, 1, size, size];
        if mask.shape() != expected {
            return Err(BgArbiterError::InferenceShape {
                expected: expected.to_vec(),
                actual: mask.shape().to_vec(),
            });
        }

        Ok(mask.into_dimensionality::<Ix4>()?.to_owned())
    }
}

impl SegmentationModel for U2NetModel {
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let tensor = preprocess(&rgb, self.input_size);
        let output = self.predict(tensor.view())?;
        let mask = postprocess_mask(output, self.input_size, width, height);

        Ok(apply_binary_mask(&rgb, &mask))
    }
}

pub(crate) fn build_session(
    model_path: &Path,
    device_id: i32,
    what: &str,
) -> Result<Session> {
    SessionBuilder::new()
        .map_err(|e| BgArbiterError::Model {
            operation: format!("{what}: session builder initialization"),
            source: Box::new(e),
        })?
        .with_execution_providers([
            TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| BgArbiterError::Model {
            operation: format!("{what}: execution provider setup"),
            source: Box::new(e),
        })?
        .with_memory_pattern(true)
        .map_err(|e| BgArbiterError::Model {
            operation: format!("{what}: memory pattern setup"),
            source: Box::new(e),
        })?
        .commit_from_file(model_path)
        .map_err(|e| BgArbiterError::Model {
            operation: format!("{what}: loading {}", model_path.display()),
            source: Box::new(e),
        })
}

/// First inference allocates the runtime's workspaces; running it on a zero
/// tensor at startup keeps that cost out of the first real image.
pub(crate) fn warm_up(session: &mut Session, input_name: &str, input_size: u32) -> Result<()> {
    let data = Array4::<f32>::zeros((1, 3, input_size as usize, input_size as usize));
    session
        .run(ort::inputs![
            input_name => TensorRef::from_array_view(&data).map_err(|e| BgArbiterError::Model {
                operation: "warm-up tensor creation".to_string(),
                source: Box::new(e),
            })?
        ])
        .map_err(|e| BgArbiterError::Model {
            operation: "warm-up inference".to_string(),
            source: Box::new(e),
        })?;
    Ok(())
}

/// Resizes to the fixed square input, scales into `[0, 1]` and lays the
/// pixels out as a CHW tensor with a leading batch axis.
pub fn preprocess(image: &RgbImage, input_size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, input_size, input_size, FilterType::Lanczos3);
    resized
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .map(|&v| f32::from(v) / 255.0)
}

/// Drops the batch and channel axes, resizes the probability mask back to
/// the original dimensions and thresholds it into a binary `{0, 255}` mask.
pub fn postprocess_mask(output: Array4<f32>, input_size: u32, width: u32, height: u32) -> GrayImage {
    let raw = output.into_raw_vec_and_offset().0;
    // Length is guaranteed by the shape check in predict.
    let mask: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(input_size, input_size, raw).unwrap();
    let mask = imageops::resize(&mask, width, height, FilterType::Triangle);
    map_colors(&mask, |Luma([probability])| {
        Luma([if probability > MASK_THRESHOLD { 255u8 } else { 0 }])
    })
}

/// Attaches the binary mask as the alpha channel, zeroing the color of
/// masked-out pixels.
pub fn apply_binary_mask(image: &RgbImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let Luma([alpha]) = *mask.get_pixel(x, y);
        Rgba([r & alpha, g & alpha, b & alpha, alpha])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_produces_a_normalized_chw_batch() {
        let image = RgbImage::from_pixel(100, 50, Rgb([255, 128, 0]));
        let tensor = preprocess(&image, 320);

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]]).abs() < 1e-6);
    }

    #[test]
    fn postprocess_thresholds_and_restores_dimensions() {
        let size = 4u32;
        let mut output = Array4::<f32>::zeros((1, 1, size as usize, size as usize));
        output.slice_mut(s![0, 0, ..2, ..]).fill(0.9);
        output.slice_mut(s![0, 0, 2.., ..]).fill(0.1);

        let mask = postprocess_mask(output, size, 4, 4);
        assert_eq!(mask.dimensions(), (4, 4));
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(0, 3).0[0], 0);
    }

    #[test]
    fn binary_mask_zeroes_background_and_sets_alpha() {
        let image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let mut mask = GrayImage::from_pixel(2, 1, Luma([255]));
        mask.put_pixel(1, 0, Luma([0]));

        let result = apply_binary_mask(&image, &mask);
        assert_eq!(*result.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
        assert_eq!(*result.get_pixel(1, 0), Rgba([0, 0, 0, 0]));
    }
}
