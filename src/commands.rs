use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::image_processing::{ImageTensor, MaskTensor};
use crate::parser::{self, GenerationDefaults};
use crate::{image_decode, image_processing, scanner};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const NODE_ID: &str = "LoadImageX";
pub const NODE_DISPLAY_NAME: &str = "Load Image And Display Prompt Metadata";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadImageRequest {
    pub image: String,
    #[serde(default)]
    pub defaults: GenerationDefaults,
}

/// Node outputs: image batch, mask batch, and the resolved generation settings.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedImage {
    pub image: ImageTensor,
    pub mask: MaskTensor,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i128,
    pub steps: i128,
    pub cfg: f64,
}

/// Selectable inputs for the node's `image` widget.
#[derive(Debug, Clone, Serialize)]
pub struct InputTypes {
    pub images: Vec<String>,
    pub defaults: GenerationDefaults,
}

// ────────────────────────── Node surface ──────────────────────────

pub fn input_types(config: &LoaderConfig) -> InputTypes {
    InputTypes {
        images: scanner::list_input_images(&config.input_dir),
        defaults: GenerationDefaults::default(),
    }
}

/// Loads an input image and the prompt metadata embedded in it.
///
/// Unreadable metadata never fails the load; the request defaults are kept.
pub fn load_image(
    config: &LoaderConfig,
    request: &LoadImageRequest,
) -> Result<LoadedImage, LoadError> {
    let path = config.annotated_path(&request.image);
    if !path.is_file() {
        return Err(LoadError::InvalidInput(request.image.clone()));
    }
    let started = std::time::Instant::now();

    let settings = parser::resolve_generation(
        read_prompt_chunk(&path).as_deref(),
        request.defaults.clone(),
    );

    let frames = image_decode::decode_frames(&path)?;
    let (image, mask) = image_processing::build_tensors(&frames)?;

    log::info!(
        "Loaded {} ({} frame(s), {}x{}) in {:.1} ms",
        path.display(),
        image.frames,
        image.width,
        image.height,
        started.elapsed().as_secs_f64() * 1000.0
    );

    Ok(LoadedImage {
        image,
        mask,
        positive_prompt: settings.positive_prompt,
        negative_prompt: settings.negative_prompt,
        seed: settings.seed,
        steps: settings.steps,
        cfg: settings.cfg,
    })
}

fn read_prompt_chunk(path: &Path) -> Option<String> {
    match scanner::extract_prompt_metadata(path) {
        Ok(prompt) => prompt,
        Err(error) => {
            log::debug!("No prompt metadata in {}: {}", path.display(), error);
            None
        }
    }
}

/// Content fingerprint the host compares to decide whether cached outputs are stale.
pub fn is_changed(config: &LoaderConfig, image: &str) -> Result<String, LoadError> {
    let path = config.annotated_path(image);
    Ok(scanner::compute_content_hash(&path)?)
}

pub fn validate_inputs(config: &LoaderConfig, image: &str) -> Result<(), String> {
    if !config.annotated_path_exists(image) {
        return Err(format!("Invalid image file: {}", image));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::{text_chunk, unique_temp_path};
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, Rgba, RgbaImage};
    use std::fs;
    use std::path::PathBuf;

    const PROMPT_GRAPH: &str = r#"{
        "3": {"class_type": "KSampler", "inputs": {"seed": 42, "steps": 25, "cfg": 6.5, "positive": ["6", 0], "negative": ["7", 0]}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a snowy mountain"}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "blurry"}}
    }"#;

    /// Encodes a real 2x1 RGBA PNG and splices a `prompt` text chunk after IHDR.
    fn png_with_prompt(prompt: Option<&str>) -> Vec<u8> {
        let mut pixels = RgbaImage::new(2, 1);
        pixels.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        pixels.put_pixel(1, 0, Rgba([0, 0, 0, 0]));

        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded)
            .write_image(pixels.as_raw(), 2, 1, image::ExtendedColorType::Rgba8)
            .expect("failed to encode png");

        let Some(prompt) = prompt else {
            return encoded;
        };

        // Signature (8) + IHDR length/tag/body/crc (4 + 4 + 13 + 4).
        let ihdr_end = 8 + 25;
        let (tag, data) = text_chunk("prompt", prompt);
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
        chunk.extend_from_slice(&tag);
        chunk.extend_from_slice(&data);
        chunk.extend_from_slice(&crc32(&[&tag[..], &data[..]].concat()).to_be_bytes());

        let mut bytes = encoded[..ihdr_end].to_vec();
        bytes.extend_from_slice(&chunk);
        bytes.extend_from_slice(&encoded[ihdr_end..]);
        bytes
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xffff_ffffu32;
        for &byte in bytes {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xedb8_8320 & mask);
            }
        }
        !crc
    }

    fn input_dir_with(name: &str, bytes: &[u8]) -> PathBuf {
        let dir = unique_temp_path("commands", "d");
        fs::create_dir_all(&dir).expect("failed to create input dir");
        fs::write(dir.join(name), bytes).expect("failed to write input image");
        dir
    }

    fn defaults() -> GenerationDefaults {
        GenerationDefaults {
            positive_prompt: "keep me".into(),
            negative_prompt: "keep me too".into(),
            seed: 7,
            steps: 8,
            cfg: 9.0,
        }
    }

    #[test]
    fn test_load_image_merges_embedded_metadata() {
        let dir = input_dir_with("render.png", &png_with_prompt(Some(PROMPT_GRAPH)));
        let config = LoaderConfig::with_input_dir(&dir);
        let request = LoadImageRequest {
            image: "render.png [input]".into(),
            defaults: defaults(),
        };

        let loaded = load_image(&config, &request).expect("load should succeed");
        assert_eq!(loaded.positive_prompt, "a snowy mountain");
        assert_eq!(loaded.negative_prompt, "blurry");
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.steps, 25);
        assert_eq!(loaded.cfg, 6.5);

        assert_eq!(
            (loaded.image.frames, loaded.image.height, loaded.image.width),
            (1, 1, 2)
        );
        assert_eq!(loaded.image.pixel(0, 0, 0), Some([1.0, 1.0, 1.0]));
        assert_eq!(loaded.mask.value(0, 0, 0), Some(0.0));
        assert_eq!(loaded.mask.value(0, 0, 1), Some(1.0));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_image_keeps_defaults_without_metadata() {
        let dir = input_dir_with("plain.png", &png_with_prompt(None));
        let config = LoaderConfig::with_input_dir(&dir);
        let request = LoadImageRequest {
            image: "plain.png".into(),
            defaults: defaults(),
        };

        let loaded = load_image(&config, &request).expect("load should succeed");
        assert_eq!(loaded.positive_prompt, "keep me");
        assert_eq!(loaded.negative_prompt, "keep me too");
        assert_eq!((loaded.seed, loaded.steps, loaded.cfg), (7, 8, 9.0));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_image_keeps_defaults_for_broken_metadata() {
        let dir = input_dir_with("broken.png", &png_with_prompt(Some("{\"3\": ")));
        let config = LoaderConfig::with_input_dir(&dir);
        let request = LoadImageRequest {
            image: "broken.png".into(),
            defaults: defaults(),
        };

        let loaded = load_image(&config, &request).expect("load should succeed");
        assert_eq!(loaded.positive_prompt, "keep me");
        assert_eq!(loaded.seed, 7);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_image_missing_file_is_an_error() {
        let config = LoaderConfig::with_input_dir(unique_temp_path("empty", "d"));
        let request = LoadImageRequest {
            image: "nope.png".into(),
            defaults: GenerationDefaults::default(),
        };
        assert!(matches!(
            load_image(&config, &request),
            Err(LoadError::InvalidInput(name)) if name == "nope.png"
        ));
    }

    #[test]
    fn test_validate_inputs_reports_missing_file() {
        let dir = input_dir_with("exists.png", b"x");
        let config = LoaderConfig::with_input_dir(&dir);

        assert!(validate_inputs(&config, "exists.png").is_ok());
        assert!(validate_inputs(&config, "exists.png [input]").is_ok());
        assert_eq!(
            validate_inputs(&config, "missing.png"),
            Err("Invalid image file: missing.png".to_string())
        );

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_is_changed_tracks_file_content() {
        let dir = input_dir_with("a.png", b"first");
        let config = LoaderConfig::with_input_dir(&dir);

        let before = is_changed(&config, "a.png").expect("hash");
        assert_eq!(before.len(), 64);
        assert_eq!(before, is_changed(&config, "a.png").expect("hash"));

        fs::write(dir.join("a.png"), b"second").expect("rewrite");
        assert_ne!(before, is_changed(&config, "a.png").expect("hash"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_input_types_lists_images() {
        let dir = input_dir_with("b.png", b"x");
        fs::write(dir.join("a.webp"), b"x").expect("write");
        fs::write(dir.join("readme.md"), b"x").expect("write");
        let config = LoaderConfig::with_input_dir(&dir);

        let types = input_types(&config);
        assert_eq!(types.images, vec!["a.webp", "b.png"]);
        assert_eq!(types.defaults, GenerationDefaults::default());

        fs::remove_dir_all(&dir).ok();
    }
}
