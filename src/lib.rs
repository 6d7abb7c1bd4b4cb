pub mod catalog;
pub mod config;
pub mod error;
pub mod exif_reader;
pub mod exif_rewrite;
pub mod fraction;
pub mod gps;
pub mod hashing;
pub mod jpeg;
pub mod metadata;
pub mod orientation;
pub mod raster;
pub mod sync;
pub mod thumbnail;
pub mod walker;

#[cfg(test)]
mod test_support;
