use crate::error::LoadError;
use image::{DynamicImage, GrayImage, Luma};
use rayon::prelude::*;
use serde::Serialize;
use std::borrow::Cow;

/// Side length of the placeholder mask used for frames without alpha.
pub const DEFAULT_MASK_SIZE: u32 = 64;

/// Float image batch in `(frame, height, width, channel)` layout, RGB in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageTensor {
    pub frames: usize,
    pub height: u32,
    pub width: u32,
    pub data: Vec<f32>,
}

/// Float mask batch in `(frame, height, width)` layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskTensor {
    pub frames: usize,
    pub height: u32,
    pub width: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    /// RGB triple at `(frame, y, x)`.
    pub fn pixel(&self, frame: usize, y: u32, x: u32) -> Option<[f32; 3]> {
        if frame >= self.frames || y >= self.height || x >= self.width {
            return None;
        }
        let plane = self.height as usize * self.width as usize;
        let offset =
            (frame * plane + y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        let rgb = &self.data[offset..offset + Self::CHANNELS];
        Some([rgb[0], rgb[1], rgb[2]])
    }
}

impl MaskTensor {
    pub fn value(&self, frame: usize, y: u32, x: u32) -> Option<f32> {
        if frame >= self.frames || y >= self.height || x >= self.width {
            return None;
        }
        let plane = self.height as usize * self.width as usize;
        self.data
            .get(frame * plane + y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Converts decoded frames into a concatenated image batch and mask batch.
///
/// All frames must share the first frame's dimensions, for both the image and
/// the mask (a frame with alpha next to one without is a mismatch too).
pub fn build_tensors(frames: &[DynamicImage]) -> Result<(ImageTensor, MaskTensor), LoadError> {
    if frames.is_empty() {
        return Err(LoadError::Empty);
    }

    let converted: Vec<(ImageTensor, MaskTensor)> =
        frames.par_iter().map(frame_to_tensors).collect();

    let mut parts = converted.into_iter();
    let (mut image, mut mask) = parts.next().ok_or(LoadError::Empty)?;
    for (index, (next_image, next_mask)) in parts.enumerate() {
        let index = index + 1;
        ensure_same_size(
            index,
            (image.width, image.height),
            (next_image.width, next_image.height),
        )?;
        ensure_same_size(
            index,
            (mask.width, mask.height),
            (next_mask.width, next_mask.height),
        )?;
        image.frames += next_image.frames;
        image.data.extend(next_image.data);
        mask.frames += next_mask.frames;
        mask.data.extend(next_mask.data);
    }

    Ok((image, mask))
}

fn ensure_same_size(
    index: usize,
    (expected_width, expected_height): (u32, u32),
    (width, height): (u32, u32),
) -> Result<(), LoadError> {
    if (width, height) == (expected_width, expected_height) {
        return Ok(());
    }
    Err(LoadError::FrameMismatch {
        index,
        width,
        height,
        expected_width,
        expected_height,
    })
}

/// Converts one frame to a single-frame image tensor and mask tensor.
pub fn frame_to_tensors(frame: &DynamicImage) -> (ImageTensor, MaskTensor) {
    let rgb = rescale_wide_luma(frame).to_rgb8();
    let image = ImageTensor {
        frames: 1,
        height: rgb.height(),
        width: rgb.width(),
        data: rgb.as_raw().iter().map(|&value| unit(value)).collect(),
    };

    let mask = if frame.color().has_alpha() {
        let rgba = frame.to_rgba8();
        MaskTensor {
            frames: 1,
            height: rgba.height(),
            width: rgba.width(),
            data: rgba.pixels().map(|pixel| 1.0 - unit(pixel.0[3])).collect(),
        }
    } else {
        let side = DEFAULT_MASK_SIZE as usize;
        MaskTensor {
            frames: 1,
            height: DEFAULT_MASK_SIZE,
            width: DEFAULT_MASK_SIZE,
            data: vec![0.0; side * side],
        }
    };

    (image, mask)
}

/// 16-bit grayscale frames are scaled by 1/255 and saturated to 8 bits.
///
/// Any other frame passes through unchanged.
fn rescale_wide_luma(frame: &DynamicImage) -> Cow<'_, DynamicImage> {
    let DynamicImage::ImageLuma16(wide) = frame else {
        return Cow::Borrowed(frame);
    };
    let narrow = GrayImage::from_fn(wide.width(), wide.height(), |x, y| {
        let value = f32::from(wide.get_pixel(x, y).0[0]) / 255.0;
        Luma([value.min(255.0) as u8])
    });
    Cow::Owned(DynamicImage::ImageLuma8(narrow))
}

fn unit(value: u8) -> f32 {
    f32::from(value) / 255.0
}
