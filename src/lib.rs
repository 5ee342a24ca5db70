pub mod compositor;
pub mod config;
pub mod decision;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod remover;
pub mod saliency;
pub mod traits;

pub mod mocks;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use walkdir::WalkDir;

pub use config::Config;
pub use decision::{decide, Candidate, Decision, Method, ScoreSet};
pub use errors::{BgArbiterError, Result};
pub use model::U2NetModel;
pub use remover::OnnxRemover;
pub use traits::{BackgroundRemover, SegmentationModel};

/// Directory driver: runs both removal methods per image, arbitrates, and
/// writes the flattened winner as a PNG.
pub struct ImageProcessor<M, R> {
    model: M,
    remover: R,
    config: Config,
}

impl<M: SegmentationModel, R: BackgroundRemover> ImageProcessor<M, R> {
    pub const fn new(model: M, remover: R, config: Config) -> Self {
        Self {
            model,
            remover,
            config,
        }
    }

    /// Processes every supported image under the input directory, returning
    /// the number that completed. A failing image aborts only itself; the
    /// failure is logged and the batch continues.
    pub fn process_directory(&self) -> Result<usize> {
        let input_dir = &self.config.input_dir;
        let output_dir = &self.config.output_dir;

        if !input_dir.exists() {
            return Err(BgArbiterError::FileSystem {
                path: input_dir.clone(),
                operation: "input directory lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        fs::create_dir_all(output_dir).map_err(|e| BgArbiterError::FileSystem {
            path: output_dir.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files(input_dir);
        if image_files.is_empty() {
            log::info!("no image files found under {}", input_dir.display());
            return Ok(0);
        }

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        let failures = AtomicUsize::new(0);
        image_files.par_iter().for_each(|input_file| {
            match self.process_single_image(input_file) {
                Ok(method) => {
                    log::info!("{}: selected {}", input_file.display(), method.label());
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("{}: {e}", input_file.display());
                }
            }
            pb.inc(1);
        });
        pb.finish();

        let failed = failures.into_inner();
        if failed > 0 {
            log::warn!("{failed} of {} images failed", image_files.len());
        }
        Ok(image_files.len() - failed)
    }

    fn collect_image_files(&self, input_dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(input_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                entry.path().is_file() && self.is_supported_image_format(entry.path())
            })
            .map(walkdir::DirEntry::into_path)
            .collect()
    }

    pub fn is_supported_image_format(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
    }

    /// Full pipeline for one image: decode, run both removal methods, gate
    /// on saliency, arbitrate, flatten onto white, write the PNG. Returns
    /// the method the comparator selected.
    pub fn process_single_image(&self, input_file: &Path) -> Result<Method> {
        let image = image::open(input_file).map_err(|e| BgArbiterError::Decode {
            path: input_file.display().to_string(),
            source: e,
        })?;

        let network = Candidate::network(self.model.segment(&image)?);
        let external = Candidate::external(self.remover.remove(&image)?);

        // A gate failure is inconclusive, not fatal: without a saliency
        // verdict the fallback path stays closed and the candidates compete
        // on scores alone.
        let needs_removal = match saliency::needs_background_removal(&image) {
            Ok(gate) => gate,
            Err(e) => {
                log::warn!(
                    "{}: saliency gate failed, assuming a clear subject: {e}",
                    input_file.display()
                );
                false
            }
        };

        let decision = decision::decide(network, external, &image, needs_removal)?;
        let flattened = compositor::flatten_rgba(&decision.image);

        let output_file = self.output_path_for(input_file)?;
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| BgArbiterError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }
        // Inputs that differ only by extension map to the same PNG; the
        // last writer wins, but the collision deserves a trace.
        if output_file.exists() {
            log::warn!(
                "{}: output {} already exists and will be replaced",
                input_file.display(),
                output_file.display()
            );
        }
        write_png(&flattened, input_file, &output_file)?;

        Ok(decision.method)
    }

    pub fn output_path_for(&self, input_file: &Path) -> Result<PathBuf> {
        input_file
            .strip_prefix(&self.config.input_dir)
            .map(|relative| self.config.output_dir.join(relative).with_extension("png"))
            .map_err(|_| BgArbiterError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path resolution".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is not inside the input directory",
                ),
            })
    }
}

impl ImageProcessor<U2NetModel, OnnxRemover> {
    /// Constructor wiring up both production ONNX backends.
    pub fn with_onnx_backends(config: Config) -> Result<Self> {
        let model = U2NetModel::new(&config.model_path, config.device_id)?;
        let remover = OnnxRemover::new(&config.remover_model_path, config.device_id)?;
        Ok(Self::new(model, remover, config))
    }
}

/// Encodes the flattened result as an opaque RGB PNG via a temporary
/// sibling, renaming into place so an interrupted run never leaves a
/// truncated output.
///
/// The temporary name embeds the source extension: inputs that share a
/// basename (`x.jpg`, `x.png`) collide on the final PNG path, and a shared
/// temp path would let two workers interleave their bytes. Distinct temp
/// files keep every rename a complete image.
fn write_png(image: &RgbaImage, input_file: &Path, output_file: &Path) -> Result<()> {
    let rgb = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, _]) = *image.get_pixel(x, y);
        Rgb([r, g, b])
    });

    let source_ext = input_file
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png")
        .to_lowercase();
    let tmp = output_file.with_extension(format!("{source_ext}.tmp"));
    if let Err(e) = rgb.save_with_format(&tmp, ImageFormat::Png) {
        let _ = fs::remove_file(&tmp);
        return Err(BgArbiterError::Encode {
            path: output_file.display().to_string(),
            source: e,
        });
    }
    fs::rename(&tmp, output_file).map_err(|e| BgArbiterError::FileSystem {
        path: output_file.to_path_buf(),
        operation: "temporary output rename".to_string(),
        source: e,
    })
}
