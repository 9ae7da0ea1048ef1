pub mod commands;
pub mod config;
pub mod error;
pub mod extractor;
pub mod image_decode;
pub mod image_processing;
pub mod parser;
pub mod scanner;
pub mod workflow;

pub use extractor::{extract_from_workflow, MetadataResult};

/// Process-wide setup shared by the binaries: logging, decoder hooks, and the
/// rayon pool that converts frames and scans inputs in parallel.
pub fn init_runtime() {
    env_logger::init();
    image_decode::ensure_jxl_decoder_registered();

    let cpu_count = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(8);
    let rayon_threads = cpu_count.saturating_sub(1).max(2);
    if rayon::ThreadPoolBuilder::new()
        .num_threads(rayon_threads)
        .build_global()
        .is_ok()
    {
        log::info!(
            "Configured rayon global thread pool with {} workers ({} CPUs detected)",
            rayon_threads,
            cpu_count
        );
    }
}
