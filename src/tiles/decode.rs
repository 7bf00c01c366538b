use crate::core::constants::MIN_VALID_TILE_WIDTH;
use crate::core::geo::TileKey;
use crate::prelude::Arc;
use crate::{Result, TileError};
use once_cell::sync::Lazy;

/// Gray checkerboard shown where no real imagery exists
static DEFAULT_PLACEHOLDER: Lazy<Arc<Bitmap>> = Lazy::new(|| {
    const SIZE: u32 = 32;
    let mut rgba = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let shade = if (x / 8 + y / 8) % 2 == 0 { 0xc8 } else { 0xa0 };
            rgba.extend_from_slice(&[shade, shade, shade, 0xff]);
        }
    }
    Arc::new(Bitmap::new(SIZE, SIZE, rgba))
});

/// Decoded RGBA8 tile image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Uniformly filled bitmap
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::new(width, height, rgba)
    }

    /// The process-wide default placeholder. Every call returns the same
    /// allocation so it can be recognised with [`Bitmap::is_default_placeholder`].
    pub fn default_placeholder() -> Arc<Self> {
        Arc::clone(&DEFAULT_PLACEHOLDER)
    }

    pub fn is_default_placeholder(bitmap: &Arc<Self>) -> bool {
        Arc::ptr_eq(bitmap, &DEFAULT_PLACEHOLDER)
    }

    /// Narrow images are error pages or truncated downloads, not tiles
    pub fn is_plausible_tile(&self) -> bool {
        self.width > MIN_VALID_TILE_WIDTH
    }

    pub fn byte_size(&self) -> usize {
        self.rgba.len()
    }
}

/// Opaque bytes → bitmap step
pub trait TileDecoder: Send + Sync {
    fn decode(&self, key: TileKey, bytes: &[u8]) -> Result<Bitmap>;
}

/// Default decoder backed by the `image` crate (PNG and JPEG)
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl TileDecoder for ImageDecoder {
    fn decode(&self, key: TileKey, bytes: &[u8]) -> Result<Bitmap> {
        let image = image::load_from_memory(bytes).map_err(|e| TileError::Decode {
            key,
            reason: e.to_string(),
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Bitmap::new(width, height, rgba.into_raw()))
    }
}

/// Decode and reject implausibly small results
pub(crate) fn decode_checked(
    decoder: &dyn TileDecoder,
    key: TileKey,
    bytes: &[u8],
) -> Result<Arc<Bitmap>> {
    let bitmap = decoder.decode(key, bytes)?;
    if !bitmap.is_plausible_tile() {
        return Err(TileError::Decode {
            key,
            reason: format!("bitmap width {} px is too small", bitmap.width),
        });
    }
    Ok(Arc::new(bitmap))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// Encode a solid PNG for use as fake tile bytes
    pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut out), image::ImageOutputFormat::Png)
            .expect("png encode");
        out
    }
}
