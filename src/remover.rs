use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, ImageBuffer, Luma, Rgb, Rgba, RgbaImage};
use ndarray::prelude::*;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;

use crate::errors::{BgArbiterError, Result};
use crate::model::{build_session, preprocess, warm_up, DEFAULT_INPUT_SIZE};
use crate::traits::BackgroundRemover;

/// External background-removal adapter backed by a second pretrained ONNX
/// matting model.
///
/// Stands in for the dynamically-typed removal library of the original
/// system: the pipeline only sees the [`BackgroundRemover`] trait and treats
/// this as an opaque routine returning an RGBA image. Unlike the
/// segmentation adapter, the soft mask becomes the alpha channel directly —
/// no thresholding, original colors kept.
pub struct OnnxRemover {
    input_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxRemover {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = build_session(model_path, device_id, "external remover model")?;

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

    fn soft_mask(&self, image: &DynamicImage) -> Result<ImageBuffer<Luma<f32>, Vec<f32>>> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let tensor = preprocess(&rgb, self.input_size);
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

        let raw = mask.into_dimensionality::<Ix4>()?.to_owned();
        let raw = raw.into_raw_vec_and_offset().0;
        // Length is guaranteed by the shape check above.
        let mask: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(self.input_size, self.input_size, raw).unwrap();
        Ok(imageops::resize(&mask, width, height, FilterType::Triangle))
    }
}

impl BackgroundRemover for OnnxRemover {
    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mask = self
            .soft_mask(image)
            .map_err(|e| BgArbiterError::ExternalRemoval {
                source: Box::new(e),
            })?;

        let rgb = image.to_rgb8();
        Ok(RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
            let Luma([probability]) = *mask.get_pixel(x, y);
            let alpha = (probability.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgba([r, g, b, alpha])
        }))
    }
}
