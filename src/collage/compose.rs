use chrono::NaiveDate;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use super::{CollageLayout, ComposeError};
use crate::artwork::cache::partial_path;

/// Decodes a cached artwork file, sniffing the format from its content since
/// the cache stores response bodies verbatim under a `.jpg` name.
pub fn load_artwork(path: &Path) -> Result<DynamicImage, ComposeError> {
    let decode_error = |source| ComposeError::Decode {
        path: path.to_path_buf(),
        source,
    };

    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(decode_error)
}

/// Stretches `img` to exactly one cell (aspect ratio is not kept).
pub fn fit_to_cell(img: &DynamicImage, cell_size: u32) -> RgbImage {
    img.resize_exact(cell_size, cell_size, FilterType::Lanczos3).to_rgb8()
}

/// Decodes the artwork at `path` and shrinks it to a tile right away; the
/// full-size image is dropped before returning.
pub fn load_tile(path: &Path, cell_size: u32) -> Result<RgbImage, ComposeError> {
    let img = load_artwork(path)?;
    Ok(fit_to_cell(&img, cell_size))
}

/// Tiles `tiles` onto a canvas in row-major order.
///
/// Tiles not already cell-sized are stretched to one cell. Each tile replaces
/// the background pixels underneath it; unused trailing cells keep the
/// background color.
pub fn compose(
    tiles: &[RgbImage],
    cell_size: u32,
    background: Rgb<u8>,
) -> Result<(RgbImage, CollageLayout), ComposeError> {
    let layout = CollageLayout::calculate(tiles.len(), cell_size)?;

    let mut canvas =
        RgbImage::from_pixel(layout.canvas_width(), layout.canvas_height(), background);

    for (idx, tile) in tiles.iter().enumerate() {
        let (x, y) = layout.position(idx);
        debug!("Placing tile {} at ({}, {})", idx, x, y);
        if tile.dimensions() == (layout.cell_width, layout.cell_height) {
            imageops::replace(&mut canvas, tile, x as i64, y as i64);
        } else {
            let fitted = imageops::resize(
                tile,
                layout.cell_width,
                layout.cell_height,
                FilterType::Lanczos3,
            );
            imageops::replace(&mut canvas, &fitted, x as i64, y as i64);
        }
    }

    Ok((canvas, layout))
}

pub fn collage_path(output_dir: &Path, date: NaiveDate) -> PathBuf {
    output_dir.join(format!("{}_collage.jpg", date.format("%Y-%m-%d")))
}

/// Encodes `canvas` as JPEG at `path`, going through a temporary file so a
/// failed write never leaves a truncated collage behind.
pub fn write_collage(canvas: &RgbImage, path: &Path) -> Result<(), ComposeError> {
    let temp_path = partial_path(path);

    let written = canvas
        .save_with_format(&temp_path, ImageFormat::Jpeg)
        .map_err(ComposeError::from)
        .and_then(|_| fs::rename(&temp_path, path).map_err(ComposeError::from));

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}
