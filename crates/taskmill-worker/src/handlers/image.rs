/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! `process_image` handler.
//!
//! Applies the requested adjustments in a fixed order (grayscale, invert,
//! blur, sharpen, gamma, saturation, contrast, brightness) and writes the
//! result next to the input with a UUID suffix, never overwriting the
//! source.

use anyhow::Context;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use taskmill::payload::ProcessImagePayload;
use taskmill::TaskHandler;

/// Executes `process_image` tasks.
pub struct ImageHandler;

#[async_trait]
impl TaskHandler for ImageHandler {
    async fn execute(&self, payload: &Value) -> anyhow::Result<()> {
        let payload: ProcessImagePayload =
            serde_json::from_value(payload.clone()).context("payload does not match schema")?;

        // Decoding and pixel work are CPU-bound.
        let output = tokio::task::spawn_blocking(move || process(&payload))
            .await
            .context("image task panicked")??;

        info!(output = %output.display(), "processed image");
        Ok(())
    }
}

fn process(payload: &ProcessImagePayload) -> anyhow::Result<PathBuf> {
    let mut image = image::open(&payload.path)
        .with_context(|| format!("failed to open source image {}", payload.path))?;

    if payload.grayscale {
        image = image.grayscale();
    }
    if payload.invert {
        image.invert();
    }
    if payload.blur > 0.0 {
        image = image.blur(payload.blur);
    }
    if payload.sharpen > 0.0 {
        image = image.unsharpen(payload.sharpen, 1);
    }

    let mut rgb = image.to_rgb8();
    if payload.gamma > 0.0 {
        rgb = adjust_gamma(rgb, payload.gamma);
    }
    if payload.saturation != 0.0 {
        rgb = adjust_saturation(rgb, payload.saturation);
    }

    let mut image = DynamicImage::ImageRgb8(rgb);
    if payload.contrast != 0.0 {
        image = image.adjust_contrast(payload.contrast);
    }
    if payload.brightness != 0.0 {
        image = image.brighten(brightness_offset(payload.brightness));
    }

    let output = output_path(&payload.path);
    image
        .save(&output)
        .with_context(|| format!("failed to save image {}", output.display()))?;
    Ok(output)
}

/// Maps a `[-100, 100]` percentage shift onto an 8-bit channel offset.
fn brightness_offset(percent: f32) -> i32 {
    (percent / 100.0 * 255.0).round() as i32
}

/// Gamma correction (`out = in^(1/gamma)`) via a per-channel lookup table.
fn adjust_gamma(mut image: RgbImage, gamma: f32) -> RgbImage {
    let inverse = 1.0 / gamma;
    let lut: Vec<u8> = (0..256u32)
        .map(|v| {
            let normalized = v as f32 / 255.0;
            (normalized.powf(inverse) * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect();

    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = lut[*channel as usize];
        }
    }
    image
}

/// Saturation shift: scales each channel's distance from the pixel's luma
/// by `1 + percent/100`.
fn adjust_saturation(mut image: RgbImage, percent: f32) -> RgbImage {
    let factor = 1.0 + percent / 100.0;

    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        for (channel, value) in pixel.0.iter_mut().zip([r, g, b]) {
            let adjusted = luma + (value as f32 - luma) * factor;
            *channel = adjusted.round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}

/// Builds the destination path: `dir/stem_<uuid>.ext`.
fn output_path(input: &str) -> PathBuf {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let suffix = Uuid::new_v4();

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{}_{}.{}", stem, suffix, ext)),
        None => path.with_file_name(format!("{}_{}", stem, suffix)),
    }
}
