//! crates/toy_stories_core/src/imaging.rs
//!
//! Turns a toy photo into the small monochrome bitmap shown on embedded
//! soundboard displays.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Edge length of the square canvas.
pub const DEFAULT_TARGET_SIZE: u32 = 120;
/// Grey levels below this become black.
pub const DEFAULT_THRESHOLD: u8 = 128;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;
const PALETTE_LEN: u32 = 8;
const PIXELS_PER_METER: i32 = 2835;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image has no pixels")]
    Empty,
    #[error("Target size must be positive")]
    InvalidTargetSize,
}

/// A 1-bit image; `true` pixels are white.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_white(&self, x: u32, y: u32) -> bool {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Encodes an uncompressed 1 bpp Windows BMP with a black/white palette.
    pub fn encode_bmp(&self) -> Vec<u8> {
        let row_stride = ((self.width + 31) / 32) * 4;
        let image_len = row_stride * self.height;
        let pixel_offset = FILE_HEADER_LEN + INFO_HEADER_LEN + PALETTE_LEN;
        let file_len = pixel_offset + image_len;

        let mut out = Vec::with_capacity(file_len as usize);

        out.extend_from_slice(b"BM");
        out.extend_from_slice(&file_len.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&pixel_offset.to_le_bytes());

        out.extend_from_slice(&INFO_HEADER_LEN.to_le_bytes());
        out.extend_from_slice(&(self.width as i32).to_le_bytes());
        out.extend_from_slice(&(self.height as i32).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&image_len.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        // Palette entries are BGRX.
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&[255, 255, 255, 0]);

        // Rows are stored bottom-up, most significant bit first.
        for y in (0..self.height).rev() {
            let mut row = vec![0u8; row_stride as usize];
            for x in 0..self.width {
                if self.is_white(x, y) {
                    row[(x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
            out.extend_from_slice(&row);
        }

        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageProcessor {
    target_size: u32,
    threshold: u8,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ImageProcessor {
    pub fn new(target_size: u32) -> Result<Self, ImageError> {
        if target_size == 0 {
            return Err(ImageError::InvalidTargetSize);
        }
        Ok(Self {
            target_size,
            ..Self::default()
        })
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Decodes, fits the longer side to the target, centres the result on a
    /// white square, converts to grey and thresholds.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Bitmap, ImageError> {
        let source = image::load_from_memory(bytes)?;
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }

        let (new_width, new_height) = fitted_dimensions(width, height, self.target_size);
        let resized = source
            .resize_exact(new_width, new_height, FilterType::Lanczos3)
            .to_rgba8();

        let size = self.target_size;
        let mut canvas = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
        let x_offset = (size - new_width) / 2;
        let y_offset = (size - new_height) / 2;
        imageops::overlay(&mut canvas, &resized, x_offset as i64, y_offset as i64);

        let grey = DynamicImage::ImageRgba8(canvas).to_luma8();
        let pixels = grey.pixels().map(|p| p.0[0] >= self.threshold).collect();

        Ok(Bitmap {
            width: size,
            height: size,
            pixels,
        })
    }

    /// `normalize` followed by BMP encoding.
    pub fn to_bmp(&self, bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
        Ok(self.normalize(bytes)?.encode_bmp())
    }
}

/// Scales so the longer side equals `target`; the shorter side is truncated.
fn fitted_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    let aspect = width as f64 / height as f64;
    if width > height {
        (target, ((target as f64 / aspect) as u32).clamp(1, target))
    } else {
        (((target as f64 * aspect) as u32).clamp(1, target), target)
    }
}
