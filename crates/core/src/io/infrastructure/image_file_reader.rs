use std::fs;
use std::path::{Path, PathBuf};

use crate::io::domain::image_reader::{ImageReadError, ImageReader};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Decodes image files with the `image` crate, converting any pixel format
/// to 8-bit RGB.
#[derive(Default)]
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, ImageReadError> {
        let rgb = image::open(path)
            .map_err(|e| ImageReadError::Decode {
                path: path.to_path_buf(),
                source: e,
            })?
            .to_rgb8();

        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageReadError::Empty(path.to_path_buf()));
        }
        Ok(Frame::new(rgb.into_raw(), width, height, 3))
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expands directories into the image files they directly contain, sorted by
/// path. Plain file arguments are passed through unchanged.
pub fn collect_image_paths(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}
