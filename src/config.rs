use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Directory of input images (jpg/jpeg/png, case-insensitive).
    pub input_dir: PathBuf,

    /// Directory the flattened PNGs are written to; created if absent.
    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Path to the pretrained segmentation model (U²-Net family ONNX).
    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Path to the external background-remover model (ONNX).
    #[arg(short, long)]
    pub remover_model_path: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(short, long, default_value_t = default_num_threads())]
    pub num_threads: usize,
}

fn default_num_threads() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
