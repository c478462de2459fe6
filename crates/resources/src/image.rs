//! Image decoding to raw RGBA8 pixel buffers.
//!
//! Decoding is delegated to the `image` crate; the rest of the engine only
//! ever sees the decoded pixels.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// A decoded image: raw RGBA8 pixels plus dimensions.
///
/// Width and height are stored independently.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 pixel data, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes an image file into RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be decoded.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let decoded = image::open(path)?.to_rgba8();
        let (width, height) = decoded.dimensions();

        info!("Decoded image {:?}: {}x{}", path, width, height);

        Ok(Self {
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size of the pixel buffer in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_square_dimensions_stay_independent() {
        let data = ImageData {
            width: 4,
            height: 2,
            pixels: vec![0u8; 4 * 2 * 4],
        };

        assert_eq!(data.width(), 4);
        assert_eq!(data.height(), 2);
        assert_ne!(data.width(), data.height());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ImageData::load(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
