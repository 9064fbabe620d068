//! Image dimension probing
//!
//! Decodes just enough of an image payload to learn its intrinsic pixel
//! dimensions. The format is sniffed from the bytes, never assumed; the
//! decoder is scoped to the call and released on every path.

use std::fmt::{self, Display, Formatter};
use std::io::Cursor;

use image::ImageReader;
use serde::{Deserialize, Serialize};

/// Intrinsic pixel dimensions of a decoded image
///
/// Both components are positive; a zero dimension fails the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Display for ImageDimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The payload is not a decodable raster image
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The format sniffer could not read the payload
    #[error("unreadable image payload: {0}")]
    Unreadable(#[from] std::io::Error),

    /// The payload is not a raster image this pipeline can decode
    #[error("undecodable image payload: {0}")]
    Undecodable(#[from] image::ImageError),

    /// The header decoded but one dimension is zero
    #[error("decoded image has a zero dimension ({width}x{height})")]
    ZeroDimension {
        /// Decoded width
        width: u32,
        /// Decoded height
        height: u32,
    },
}

/// Probe the intrinsic dimensions of an image payload
///
/// Reads only the image header, whatever the container format turns out to
/// be.
///
/// # Errors
/// Returns [`DecodeError`] if the payload cannot be identified or decoded
/// as a raster image, or decodes to a zero dimension.
pub fn probe_dimensions(payload: &[u8]) -> Result<ImageDimensions, DecodeError> {
    let reader = ImageReader::new(Cursor::new(payload)).with_guessed_format()?;
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroDimension { width, height });
    }
    Ok(ImageDimensions { width, height })
}
