// Preview thumbnail shown in the annotation window

use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

pub const MAX_PREVIEW_WIDTH: u32 = 400;
pub const MAX_PREVIEW_HEIGHT: u32 = 300;

/// Scale `(width, height)` down to fit inside the bounds, keeping aspect ratio
///
/// Images already inside the bounds keep their size; nothing is upscaled.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let width_scale = (max_width as f64 / width as f64).min(1.0);
    let height_scale = (max_height as f64 / height as f64).min(1.0);
    let scale = width_scale.min(height_scale);

    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, width);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, height);
    (scaled_width, scaled_height)
}

/// Where the preview for `image` is written
pub fn preview_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "capture".to_string());
    image.with_file_name(format!("{stem}.preview.png"))
}

/// Render a preview of `image` that fits the annotation window
pub fn render_preview(image: &Path) -> Result<PathBuf> {
    let source =
        image::open(image).with_context(|| format!("Failed to decode {}", image.display()))?;

    let (width, height) = fit_within(
        source.width(),
        source.height(),
        MAX_PREVIEW_WIDTH,
        MAX_PREVIEW_HEIGHT,
    );
    let preview = if (width, height) == (source.width(), source.height()) {
        source
    } else {
        source.resize_exact(width, height, FilterType::Triangle)
    };

    let target = preview_path(image);
    preview
        .save_with_format(&target, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write preview {}", target.display()))?;
    Ok(target)
}
