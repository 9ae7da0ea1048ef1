use comfy_meta_link_lib::commands::{self, LoadImageRequest, NODE_DISPLAY_NAME, NODE_ID};
use comfy_meta_link_lib::config::{LoaderConfig, INPUT_DIR_ENV};
use comfy_meta_link_lib::extractor::MetadataResult;
use comfy_meta_link_lib::parser::{self, GenerationDefaults};
use comfy_meta_link_lib::scanner;
use rayon::prelude::*;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct CliOptions {
    config_dir: Option<PathBuf>,
    input_dir: Option<PathBuf>,
    load: bool,
    images: Vec<String>,
}

#[derive(Serialize)]
struct InspectReport {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MetadataResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loaded: Option<LoadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct LoadSummary {
    frames: usize,
    width: u32,
    height: u32,
    settings: GenerationDefaults,
}

fn usage() {
    println!("{} ({})", NODE_DISPLAY_NAME, NODE_ID);
    println!("Prints the generation metadata embedded in image workflow graphs as JSON lines.");
    println!();
    println!("Usage:");
    println!("  inspect_prompt_metadata [--config-dir DIR] [--input-dir DIR] [--load] [IMAGE...]");
    println!();
    println!("IMAGE is a file path or a name inside the input directory.");
    println!("Without IMAGE arguments the loadable input images are listed.");
    println!(
        "The input directory comes from --input-dir, {}, or comfy_meta_link.yaml.",
        INPUT_DIR_ENV
    );
}

fn parse_args() -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "--config-dir" => {
                let Some(path) = args.next() else {
                    return Err("Missing path after --config-dir".to_string());
                };
                options.config_dir = Some(PathBuf::from(path));
            }
            "--input-dir" => {
                let Some(path) = args.next() else {
                    return Err("Missing path after --input-dir".to_string());
                };
                options.input_dir = Some(PathBuf::from(path));
            }
            "--load" => options.load = true,
            unknown if unknown.starts_with("--") => {
                return Err(format!("Unknown argument: {}", unknown));
            }
            image => options.images.push(image.to_string()),
        }
    }
    Ok(options)
}

/// Direct file paths are loaded from their own directory; anything else is an input name.
fn resolve_target(config: &LoaderConfig, image: &str) -> (LoaderConfig, String) {
    let path = Path::new(image);
    if path.is_file() {
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            return (
                LoaderConfig::with_input_dir(parent),
                name.to_string_lossy().to_string(),
            );
        }
    }
    (config.clone(), image.to_string())
}

fn inspect(config: &LoaderConfig, image: &str, load: bool) -> InspectReport {
    let (config, name) = resolve_target(config, image);
    let mut report = InspectReport {
        file: config.annotated_path(&name).display().to_string(),
        content_hash: None,
        metadata: None,
        loaded: None,
        error: None,
    };

    if let Err(error) = commands::validate_inputs(&config, &name) {
        report.error = Some(error);
        return report;
    }
    report.content_hash = commands::is_changed(&config, &name).ok();

    let metadata = scanner::extract_prompt_metadata(&config.annotated_path(&name))
        .map_err(|error| error.to_string())
        .and_then(|prompt| match prompt {
            Some(prompt) => parser::extract_from_prompt_text(&prompt).map_err(|e| e.to_string()),
            None => Err("No workflow prompt metadata found".to_string()),
        });
    match metadata {
        Ok(metadata) => report.metadata = Some(metadata),
        Err(error) => report.error = Some(error),
    }

    if load {
        let request = LoadImageRequest {
            image: name,
            defaults: GenerationDefaults::default(),
        };
        match commands::load_image(&config, &request) {
            Ok(loaded) => {
                report.loaded = Some(LoadSummary {
                    frames: loaded.image.frames,
                    width: loaded.image.width,
                    height: loaded.image.height,
                    settings: GenerationDefaults {
                        positive_prompt: loaded.positive_prompt,
                        negative_prompt: loaded.negative_prompt,
                        seed: loaded.seed,
                        steps: loaded.steps,
                        cfg: loaded.cfg,
                    },
                })
            }
            Err(error) => report.error = Some(error.to_string()),
        }
    }

    report
}

fn main() {
    comfy_meta_link_lib::init_runtime();

    let options = match parse_args() {
        Ok(options) => options,
        Err(error) => {
            eprintln!("{}", error);
            usage();
            std::process::exit(1);
        }
    };

    let config_dir = options.config_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = LoaderConfig::load(&config_dir);
    if let Some(input_dir) = options.input_dir.clone() {
        config.input_dir = input_dir;
    }
    log::info!("Using input directory: {}", config.input_dir.display());

    if options.images.is_empty() {
        let input_types = commands::input_types(&config);
        if input_types.images.is_empty() {
            eprintln!("No loadable images in {}", config.input_dir.display());
        }
        for image in input_types.images {
            println!("{}", image);
        }
        return;
    }

    let reports: Vec<InspectReport> = options
        .images
        .par_iter()
        .map(|image| inspect(&config, image, options.load))
        .collect();

    let mut failures = 0usize;
    for report in &reports {
        if report.error.is_some() {
            failures += 1;
        }
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(error) => eprintln!("Failed to serialize report for {}: {}", report.file, error),
        }
    }

    if failures > 0 {
        log::warn!("{} of {} image(s) had no usable metadata", failures, reports.len());
        std::process::exit(2);
    }
}
