//! RGB color images: decoding and resampling.

use std::path::Path;

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SensorError, SensorResult};

/// An 8-bit RGB image in row-major order.
///
/// # Example
///
/// ```
/// use sensor_types::ColorImage;
///
/// let img = ColorImage::filled(4, 3, [10, 20, 30]);
/// assert_eq!(img.get(3, 2), Some([10, 20, 30]));
/// assert_eq!(img.dimensions(), (4, 3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorImage {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl ColorImage {
    /// Create from a row-major pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::BufferSizeMismatch`] if `pixels.len()` is not
    /// `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<[u8; 3]>) -> SensorResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SensorError::buffer_mismatch(expected, pixels.len()));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create an image where every pixel has the same color.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgb; width as usize * height as usize],
        }
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major pixels.
    #[must_use]
    pub fn pixels(&self) -> &[[u8; 3]] {
        &self.pixels
    }

    /// Pixel at `(col, row)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, col: u32, row: u32) -> Option<[u8; 3]> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.pixels
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Rec. 601 luma of every pixel in `[0, 1]`, row-major.
    #[must_use]
    pub fn luminance(&self) -> Vec<f32> {
        self.pixels
            .iter()
            .map(|&[r, g, b]| {
                (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)) / 255.0
            })
            .collect()
    }

    /// Resample to exactly `width × height` with bilinear filtering.
    ///
    /// Returns a clone when the size already matches.
    #[must_use]
    pub fn resize_to(&self, width: u32, height: u32) -> Self {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        let resized = image::imageops::resize(&self.to_rgb_image(), width, height, FilterType::Triangle);
        Self::from(resized)
    }

    /// Downscale so the longest side is at most `limit`, keeping the aspect
    /// ratio.
    ///
    /// `limit == 0` and images already within the limit are returned
    /// unchanged. The filter support widens with the scale factor, so each
    /// output pixel averages the source area it covers.
    #[must_use]
    pub fn limit_longest_side(&self, limit: u32) -> Self {
        let longest = self.width.max(self.height);
        if limit == 0 || longest <= limit {
            return self.clone();
        }
        let scale = f64::from(limit) / f64::from(longest);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
        self.resize_to(scaled(self.width), scaled(self.height))
    }

    /// Convert to an `image` crate buffer.
    #[must_use]
    pub fn to_rgb_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Rgb(self.pixels[y as usize * self.width as usize + x as usize])
        })
    }
}

impl From<RgbImage> for ColorImage {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let pixels = img.pixels().map(|p| p.0).collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Decode an encoded image (PNG, JPEG, BMP) into RGB.
///
/// Alpha is dropped and grayscale is expanded to three channels.
///
/// # Errors
///
/// Returns [`SensorError::Decode`] if the bytes are not a supported image.
pub fn decode_image(bytes: &[u8]) -> SensorResult<ColorImage> {
    let img = image::load_from_memory(bytes)?;
    Ok(ColorImage::from(img.to_rgb8()))
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns [`SensorError::Io`] if the file cannot be read, or
/// [`SensorError::Decode`] if it is not a supported image.
pub fn load_image<P: AsRef<Path>>(path: P) -> SensorResult<ColorImage> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}
