use anyhow::{ensure, Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;

use bg_arbiter::{Config, ImageProcessor};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    ensure!(
        config.model_path.exists(),
        "Segmentation model path does not exist"
    );
    ensure!(
        config.remover_model_path.exists(),
        "Remover model path does not exist"
    );
    ensure!(config.input_dir.exists(), "Input directory does not exist");

    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    let processor = ImageProcessor::with_onnx_backends(config)
        .context("Failed to initialize the inference backends")?;
    let processed = processor.process_directory()?;
    log::info!("{processed} images processed");

    Ok(())
}
