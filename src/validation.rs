//! Validation System - palette conformance of program images
//!
//! The scan is exhaustive: every pixel is checked and every distinct
//! offending color is reported, never just the first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::palette::{Color, Palette};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Pixel buffer holds {actual} pixels, expected {width}x{height}")]
pub struct ImageShapeError {
    pub width: u32,
    pub height: u32,
    pub actual: usize,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Shape(#[from] ImageShapeError),
}

/// Decoded program as an RGB grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl ProgramImage {
    pub fn new(width: u32, height: u32, pixels: Vec<Color>) -> Result<Self, ImageShapeError> {
        if pixels.len() as u64 != width as u64 * height as u64 {
            return Err(ImageShapeError {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Build from rows of equal length.
    pub fn from_rows(rows: &[Vec<Color>]) -> Result<Self, ImageShapeError> {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.len());
        let pixels: Vec<Color> = rows.iter().flatten().copied().collect();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ImageShapeError {
                width: width as u32,
                height,
                actual: pixels.len(),
            });
        }
        let width = width as u32;
        Self::new(width, height, pixels)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = color;
        }
    }

    pub fn rows(&self) -> std::slice::Chunks<'_, Color> {
        self.pixels.chunks(self.width.max(1) as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Decode PNG, GIF or BMP bytes into an RGB grid. Alpha is dropped and only
/// the first frame of an animation is read.
pub fn decode_program(bytes: &[u8]) -> Result<ProgramImage, DecodeError> {
    // into_rgb8 discards alpha without blending, so a transparent pixel keeps
    // its stored color and is judged by it.
    let rgb = image::load_from_memory(bytes)?.into_rgb8();
    let (width, height) = rgb.dimensions();
    let pixels = rgb
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            Color::rgb(r, g, b)
        })
        .collect();
    Ok(ProgramImage::new(width, height, pixels)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub offending_colors: BTreeSet<Color>,
    /// Pixels holding an offending color. Informational only.
    pub offending_pixels: u64,
    pub width: u32,
    pub height: u32,
}

impl ValidationResult {
    pub fn success(image: &ProgramImage) -> Self {
        Self::from_offenders(image, BTreeSet::new(), 0)
    }

    fn from_offenders(image: &ProgramImage, offending_colors: BTreeSet<Color>, offending_pixels: u64) -> Self {
        Self {
            valid: offending_colors.is_empty(),
            offending_colors,
            offending_pixels,
            width: image.width,
            height: image.height,
        }
    }
}

/// Checks program images against a palette.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'p> {
    palette: &'p Palette,
}

impl<'p> Validator<'p> {
    pub fn new(palette: &'p Palette) -> Self {
        Self { palette }
    }

    /// Scan every pixel once. A zero-sized image is trivially valid.
    pub fn validate(&self, image: &ProgramImage) -> ValidationResult {
        if image.is_empty() {
            return ValidationResult::success(image);
        }

        let mut offenders = BTreeSet::new();
        let mut offending_pixels = 0u64;
        for &color in image.pixels() {
            if !self.palette.is_legal(color) {
                offenders.insert(color);
                offending_pixels += 1;
            }
        }

        ValidationResult::from_offenders(image, offenders, offending_pixels)
    }
}

impl Default for Validator<'static> {
    fn default() -> Self {
        Self::new(Palette::piet())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ILLEGAL_A: Color = Color::from_u32(0x123456);
    const ILLEGAL_B: Color = Color::from_u32(0xfefefe);
    const ILLEGAL_C: Color = Color::from_u32(0xc0c0c0);

    #[test]
    fn test_single_black_pixel_valid() {
        let result = Validator::default().validate(&ProgramImage::filled(1, 1, Color::BLACK));
        assert!(result.valid);
        assert!(result.offending_colors.is_empty());
    }

    #[test]
    fn test_single_illegal_pixel_invalid() {
        let result = Validator::default().validate(&ProgramImage::filled(1, 1, ILLEGAL_A));
        assert!(!result.valid);
        assert_eq!(result.offending_colors, BTreeSet::from([ILLEGAL_A]));
    }

    #[test]
    fn test_offenders_deduplicated() {
        let mut image = ProgramImage::filled(10, 10, ILLEGAL_A);
        image.set(3, 3, ILLEGAL_B);
        let result = Validator::default().validate(&image);
        assert_eq!(result.offending_colors, BTreeSet::from([ILLEGAL_A, ILLEGAL_B]));
        assert_eq!(result.offending_pixels, 100);
    }

    #[test]
    fn test_scan_continues_after_first_violation() {
        let mut image = ProgramImage::filled(4, 4, Color::WHITE);
        image.set(0, 0, ILLEGAL_A);
        image.set(2, 1, ILLEGAL_B);
        image.set(3, 3, ILLEGAL_C);
        let result = Validator::default().validate(&image);
        assert_eq!(result.offending_colors.len(), 3);
        assert_eq!(result.offending_pixels, 3);
    }

    #[test]
    fn test_zero_sized_image_valid() {
        for (w, h) in [(0, 0), (0, 5), (5, 0)] {
            let image = ProgramImage::new(w, h, vec![]).unwrap();
            let result = Validator::default().validate(&image);
            assert!(result.valid);
            assert_eq!(result.offending_pixels, 0);
        }
    }

    #[test]
    fn test_custom_palette() {
        let palette = Palette::new([ILLEGAL_A]).unwrap();
        let result = Validator::new(&palette).validate(&ProgramImage::filled(2, 2, Color::BLACK));
        assert_eq!(result.offending_colors, BTreeSet::from([Color::BLACK]));
    }

    #[test]
    fn test_shape_checked() {
        let err = ProgramImage::new(2, 2, vec![Color::BLACK; 3]).unwrap_err();
        assert_eq!(err.actual, 3);
        assert!(ProgramImage::from_rows(&[vec![Color::BLACK; 2], vec![Color::WHITE]]).is_err());
    }

    #[test]
    fn test_rows_and_get() {
        let image = ProgramImage::from_rows(&[
            vec![Color::BLACK, Color::WHITE],
            vec![ILLEGAL_A, ILLEGAL_B],
        ])
        .unwrap();
        assert_eq!(image.get(0, 1), Some(ILLEGAL_A));
        assert_eq!(image.get(2, 0), None);
        assert_eq!(image.rows().count(), 2);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_program(b"definitely not an image"),
            Err(DecodeError::Image(_))
        ));
    }
}
