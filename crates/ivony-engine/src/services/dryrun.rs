use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ivony_contracts::settings::{AspectRatio, ImageStyle};
use sha2::{Digest, Sha256};

use super::{ImagePayload, ImageService, SourceImage};

const DRYRUN_LONGEST_SIDE: u32 = 64;

/// Offline service that paints deterministic placeholder images.
pub struct DryrunService;

impl ImageService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload> {
        let (width, height) = aspect_ratio.dims_for_longest_side(DRYRUN_LONGEST_SIDE);
        let (r, g, b) = color_from_prompt(prompt, style.as_str());
        let mut image = RgbImage::new(width, height);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        encode_png(image)
    }

    fn edit(&self, prompt: &str, source: &SourceImage) -> Result<ImagePayload> {
        let bytes = BASE64
            .decode(source.data.as_bytes())
            .context("dryrun source image base64 decode failed")?;
        let mut image = image::load_from_memory(&bytes)
            .context("dryrun could not decode source image")?
            .to_rgb8();
        let (r, g, b) = color_from_prompt(prompt, "edit");
        for pixel in image.pixels_mut() {
            let [pr, pg, pb] = pixel.0;
            *pixel = Rgb([mix(pr, r), mix(pg, g), mix(pb, b)]);
        }
        encode_png(image)
    }
}

fn encode_png(image: RgbImage) -> Result<ImagePayload> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dryrun png encode failed")?;
    Ok(ImagePayload {
        data: BASE64.encode(bytes),
        mime_type: "image/png".to_string(),
    })
}

fn mix(base: u8, tint: u8) -> u8 {
    ((u16::from(base) + u16::from(tint)) / 2) as u8
}

fn color_from_prompt(prompt: &str, salt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
