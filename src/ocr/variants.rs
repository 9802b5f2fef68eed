//! Preprocessed image variants for extra OCR passes

use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use super::profile::Profile;
use crate::error::{Error, Result};

pub const ORIGINAL_VARIANT: &str = "original";
pub const ENHANCE_2X: &str = "enhance2x";
pub const GRAY_2X: &str = "gray2x";
pub const ENHANCE_2X_ROT180: &str = "enhance2x_rot180";

const UPSCALE: u32 = 2;
const CONTRAST_FACTOR: f32 = 1.15;
const SHARPNESS_FACTOR: f32 = 1.6;
const SHARPEN_SIGMA: f32 = 1.0;

/// A named alternate rendering of the source image
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: &'static str,
    pub image: DynamicImage,
}

impl Variant {
    /// Write the variant as `<dir>/<name>.png`.
    pub fn save_png(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.png", self.name));
        self.image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| Error::Preprocess {
                variant: self.name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(path)
    }
}

/// Build the extra variants for a profile.
///
/// Nothing is produced for multipass level 0, a missing image or the
/// `default` profile. For `pdf`: `enhance2x` always, `gray2x` from level 2,
/// and a 180° copy of `enhance2x` when rotation correction is requested.
pub fn build_variants(
    image: Option<&DynamicImage>,
    profile: Profile,
    multipass: u8,
    rotate180: bool,
) -> Vec<Variant> {
    let Some(image) = image else {
        return Vec::new();
    };
    if multipass == 0 || profile != Profile::Pdf {
        return Vec::new();
    }

    let base = image.to_rgb8();
    let mut variants = Vec::new();

    let enhanced = enhance_2x(&base);
    variants.push(Variant {
        name: ENHANCE_2X,
        image: DynamicImage::ImageRgb8(enhanced.clone()),
    });

    if multipass >= 2 {
        variants.push(Variant {
            name: GRAY_2X,
            image: DynamicImage::ImageRgb8(gray_2x(image)),
        });
    }

    if rotate180 {
        variants.push(Variant {
            name: ENHANCE_2X_ROT180,
            image: DynamicImage::ImageRgb8(imageops::rotate180(&enhanced)),
        });
    }

    debug!(
        count = variants.len(),
        width = base.width(),
        height = base.height(),
        "Built variants"
    );
    variants
}

fn upscale_rgb(img: &RgbImage) -> RgbImage {
    imageops::resize(
        img,
        img.width() * UPSCALE,
        img.height() * UPSCALE,
        imageops::FilterType::CatmullRom,
    )
}

/// Upscale, stretch contrast, boost contrast, sharpen.
fn enhance_2x(base: &RgbImage) -> RgbImage {
    let mut up = upscale_rgb(base);
    autocontrast_rgb(&mut up);
    adjust_contrast(&mut up, CONTRAST_FACTOR);
    sharpen(&up, SHARPNESS_FACTOR)
}

/// Grayscale, stretch contrast, upscale, back to RGB.
fn gray_2x(image: &DynamicImage) -> RgbImage {
    let mut gray = image.to_luma8();
    autocontrast_gray(&mut gray);
    let up = imageops::resize(
        &gray,
        gray.width() * UPSCALE,
        gray.height() * UPSCALE,
        imageops::FilterType::CatmullRom,
    );
    DynamicImage::ImageLuma8(up).to_rgb8()
}

fn stretch_lut(lo: u8, hi: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = if hi <= lo {
            i as u8
        } else {
            let v = (i as f32 - lo as f32) * 255.0 / (hi as f32 - lo as f32);
            v.round().clamp(0.0, 255.0) as u8
        };
    }
    lut
}

/// Per-channel histogram stretch to the full range.
fn autocontrast_rgb(img: &mut RgbImage) {
    let mut lo = [u8::MAX; 3];
    let mut hi = [u8::MIN; 3];
    for px in img.pixels() {
        for c in 0..3 {
            lo[c] = lo[c].min(px[c]);
            hi[c] = hi[c].max(px[c]);
        }
    }
    let luts = [
        stretch_lut(lo[0], hi[0]),
        stretch_lut(lo[1], hi[1]),
        stretch_lut(lo[2], hi[2]),
    ];
    for px in img.pixels_mut() {
        for c in 0..3 {
            px[c] = luts[c][px[c] as usize];
        }
    }
}

fn autocontrast_gray(img: &mut GrayImage) {
    let (lo, hi) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), px| (lo.min(px[0]), hi.max(px[0])));
    let lut = stretch_lut(lo, hi);
    for px in img.pixels_mut() {
        px[0] = lut[px[0] as usize];
    }
}

/// Blend away from the mean luminance by `factor`.
fn adjust_contrast(img: &mut RgbImage, factor: f32) {
    let pixels = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img
        .pixels()
        .map(|px| {
            let [r, g, b] = px.0;
            ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u64
        })
        .sum();
    let mean = (sum as f32 / pixels as f32).round();
    for px in img.pixels_mut() {
        for c in 0..3 {
            let v = mean + factor * (px[c] as f32 - mean);
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Unsharp blend: `blurred + factor * (img - blurred)`.
fn sharpen(img: &RgbImage, factor: f32) -> RgbImage {
    let blurred = gaussian_blur_f32(img, SHARPEN_SIGMA);
    let mut out = img.clone();
    for (px, soft) in out.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let v = soft[c] as f32 + factor * (px[c] as f32 - soft[c] as f32);
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
