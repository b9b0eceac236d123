use std::path::PathBuf;

pub mod compose;
pub mod layout;

pub use compose::{collage_path, compose, fit_to_cell, load_artwork, load_tile, write_collage};
pub use layout::CollageLayout;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Cannot build a collage from zero images")]
    Empty,
    #[error("Collage of {photo_count} cells at {cell_size}px does not fit in a single image")]
    CanvasTooLarge { photo_count: usize, cell_size: u32 },
    #[error("Failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Failed to encode collage: {0}")]
    Encode(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
