// src/config.rs
use anyhow::{bail, Result};

use crate::color::Rgb;

/// Colors the `c` key cycles a bucket through.
pub const SWATCHES: [Rgb; 8] = [
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(0, 0, 255),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 255, 0),
    Rgb::new(255, 0, 255),
    Rgb::new(255, 140, 0),
    Rgb::new(240, 240, 240),
];

/// The retunable part of the render: K ascending thresholds plus K+1 bucket
/// colors. Mutation is staged here and only reaches the display on the next
/// recolor trigger; every accepted mutation leaves the invariants intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    thresholds: Vec<u8>,
    colors: Vec<Rgb>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            thresholds: vec![64, 128, 192],
            colors: vec![SWATCHES[0], SWATCHES[1], SWATCHES[2], SWATCHES[3]],
        }
    }
}

impl Tuning {
    /// Whole-config replacement. Rejects an empty or non-ascending threshold
    /// list and any palette whose length is not `thresholds.len() + 1`.
    pub fn new(thresholds: Vec<u8>, colors: Vec<Rgb>) -> Result<Self> {
        if thresholds.is_empty() {
            bail!("threshold list must not be empty");
        }
        if !thresholds.windows(2).all(|w| w[0] < w[1]) {
            bail!("thresholds must be strictly ascending, got {thresholds:?}");
        }
        if colors.len() != thresholds.len() + 1 {
            bail!(
                "palette needs {} colors for {} thresholds, got {}",
                thresholds.len() + 1,
                thresholds.len(),
                colors.len()
            );
        }
        Ok(Self { thresholds, colors })
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Bucket count, always `thresholds.len() + 1`.
    pub fn bands(&self) -> usize {
        self.colors.len()
    }

    /// Move one threshold. Rejected if `index` is out of range or `value`
    /// would break the ascending order against either neighbor; the state is
    /// unchanged on rejection.
    pub fn set_threshold(&mut self, index: usize, value: u8) -> Result<()> {
        if index >= self.thresholds.len() {
            bail!(
                "threshold index {index} out of range 0..{}",
                self.thresholds.len()
            );
        }
        if index > 0 && value <= self.thresholds[index - 1] {
            bail!(
                "threshold {value} at index {index} would not ascend past {}",
                self.thresholds[index - 1]
            );
        }
        if index + 1 < self.thresholds.len() && value >= self.thresholds[index + 1] {
            bail!(
                "threshold {value} at index {index} would collide with {}",
                self.thresholds[index + 1]
            );
        }
        self.thresholds[index] = value;
        Ok(())
    }

    /// Recolor one bucket. A single-slot write cannot break the palette
    /// length invariant, so only the index is checked.
    pub fn set_color(&mut self, index: usize, color: Rgb) -> Result<()> {
        if index >= self.colors.len() {
            bail!("color index {index} out of range 0..{}", self.colors.len());
        }
        self.colors[index] = color;
        Ok(())
    }
}
