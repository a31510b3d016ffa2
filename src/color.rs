// src/color.rs
use crossterm::style::Color;

use crate::config::Tuning;
use crate::noise::NoiseField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_color(self) -> Color {
        Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Bucket index for `value`: the smallest `i` with `value <= thresholds[i]`,
/// or `thresholds.len()` when no threshold matches. Ties at a boundary land
/// in the earlier bucket. Total over [0, 255] for any ascending list.
pub fn classify(value: u8, thresholds: &[u8]) -> usize {
    thresholds
        .iter()
        .position(|&t| value <= t)
        .unwrap_or(thresholds.len())
}

/// Finished false-color output: `height` rows by `width` columns of RGB
/// triples, one byte per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColorBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Classify every cell of `field` and paint it with the bucket's palette
/// color. The field is read-only; every call builds a fresh buffer.
pub fn colorize(field: &NoiseField, tuning: &Tuning) -> ColorBuffer {
    let thresholds = tuning.thresholds();
    let colors = tuning.colors();

    let mut data = Vec::with_capacity(field.cells().len() * 3);
    for &v in field.cells() {
        let c = colors[classify(v, thresholds)];
        data.extend_from_slice(&[c.r, c.g, c.b]);
    }

    ColorBuffer {
        width: field.width(),
        height: field.height(),
        data,
    }
}
