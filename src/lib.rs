pub mod artwork;
pub mod collage;
pub mod config;
pub mod episode;
pub mod grouping;
pub mod pipeline;
pub mod source;
