use crate::error::LoadError;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Once;

static JXL_DECODER_HOOK: Once = Once::new();

pub fn ensure_jxl_decoder_registered() {
    JXL_DECODER_HOOK.call_once(|| {
        let registered = jxl_oxide::integration::register_image_decoding_hook();
        if registered {
            log::info!("Registered JPEG XL decoder hook");
        }
    });
}

/// Decodes every frame of an image file.
///
/// Animated GIFs yield one composited RGBA frame per animation frame. Every
/// other format yields a single frame with its EXIF orientation applied.
pub fn decode_frames(path: &Path) -> Result<Vec<DynamicImage>, LoadError> {
    ensure_jxl_decoder_registered();

    let is_gif = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case("gif"))
        .unwrap_or(false);
    if is_gif {
        return decode_gif_frames(path);
    }

    Ok(vec![open_oriented(path)?])
}

/// Opens a single-frame image and rotates/flips it upright.
pub fn open_oriented(path: &Path) -> Result<DynamicImage, LoadError> {
    ensure_jxl_decoder_registered();

    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn decode_gif_frames(path: &Path) -> Result<Vec<DynamicImage>, LoadError> {
    let reader = BufReader::new(File::open(path)?);
    let frames = GifDecoder::new(reader)?.into_frames().collect_frames()?;
    log::debug!("Decoded {} GIF frames from {}", frames.len(), path.display());
    Ok(frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect())
}
