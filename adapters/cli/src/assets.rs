use std::path::Path;

use anyhow::{Context, Result};
use mask_trace_core::Bitmap;

/// Decodes a ground-truth mask image into a coverage bitmap.
pub(crate) fn load_mask(path: &Path) -> Result<Bitmap> {
    let image = image::open(path)
        .with_context(|| format!("failed to open mask image at {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Bitmap::from_rgba(width, height, image.as_raw())
        .with_context(|| format!("mask image at {} has unusable dimensions", path.display()))
}
