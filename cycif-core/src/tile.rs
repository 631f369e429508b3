//! Tile addressing and decoded tile bitmaps.
//!
//! Deep-zoom tile URLs look like `<prefix>/<branch>/<level>/<col>_<row>.png`.
//! Every channel (and the label image) is its own pyramid, so the same
//! level/coordinate in another channel is found by swapping the branch
//! segment.

use std::fmt;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileAddress {
    url: String,
    /// Byte range of the branch segment inside `url`.
    branch: (usize, usize),
}

impl TileAddress {
    pub fn parse(url: &str) -> Result<Self> {
        let slashes: Vec<usize> = url.match_indices('/').map(|(i, _)| i).collect();
        // Need "<branch>/<level>/<file>": at least two separators after the branch start.
        if slashes.len() < 2 || url.ends_with('/') {
            return Err(Error::MalformedAddress(url.to_string()));
        }
        let level_sep = slashes[slashes.len() - 2];
        let start = if slashes.len() >= 3 { slashes[slashes.len() - 3] + 1 } else { 0 };
        if start >= level_sep {
            return Err(Error::MalformedAddress(url.to_string()));
        }
        Ok(Self { url: url.to_string(), branch: (start, level_sep) })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The pyramid segment this tile belongs to.
    pub fn branch(&self) -> &str {
        &self.url[self.branch.0..self.branch.1]
    }

    /// Address of the same level/coordinate in another pyramid.
    pub fn with_branch(&self, branch: &str) -> Self {
        let (s, e) = self.branch;
        let url = format!("{}{}{}", &self.url[..s], branch, &self.url[e..]);
        Self { url, branch: (s, s + branch.len()) }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Last non-empty path segment of a pyramid's tile URL prefix.
///
/// `"/tiles/DNA_1_files/"` -> `"DNA_1_files"`.
pub fn branch_of_prefix(prefix: &str) -> Option<&str> {
    prefix.split('/').rev().find(|s| !s.is_empty())
}

/// Decoded tile image (RGBA, 4 bytes per pixel).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TileBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::UnsupportedLayout(format!(
                "{}x{} tile needs {} bytes, got {}",
                width, height, expected, pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Decode a PNG tile payload into RGBA8.
    ///
    /// Palette and 16-bit images are normalised to 8-bit colour first.
    pub fn decode_png(bytes: &[u8]) -> Result<Self> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;
        buf.truncate(info.buffer_size());

        let pixels = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => buf
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            png::ColorType::GrayscaleAlpha => buf
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            png::ColorType::Indexed => {
                return Err(Error::UnsupportedLayout("palette not expanded".into()));
            }
        };
        Self::new(info.width, info.height, pixels)
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// 16-bit intensity packed into the green (high) and blue (low) planes.
#[inline]
pub fn intensity(px: &[u8]) -> u16 {
    (px[1] as u16) << 8 | px[2] as u16
}

/// Entity id packed into the RGB planes of a label tile.
///
/// Packed value 0 is background and decodes to `None`.
#[inline]
pub fn label_id(px: &[u8]) -> Option<u32> {
    let packed = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
    packed.checked_sub(1)
}
