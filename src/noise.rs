// src/noise.rs
use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Map `v` from `[old_min, old_max]` onto `[new_min, new_max]`, linear in
/// between. Endpoints map exactly: `remap(a, a, b, c, d) == c` and
/// `remap(b, a, b, c, d) == d`.
pub fn remap(v: f32, old_min: f32, old_max: f32, new_min: f32, new_max: f32) -> f32 {
    ((v - old_min) * (new_max - new_min)) / (old_max - old_min) + new_min
}

/// Everything the generator needs. Fixed for the lifetime of a worker; the
/// same parameters always produce the same field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub offset: f32,
    pub octaves: u32,
    pub seed: u64,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 512,
            scale: 5.0,
            offset: 10.0,
            octaves: 2,
            seed: 0x5EED,
        }
    }
}

impl FieldParams {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "field dimensions must be positive, got {}x{}",
                self.width,
                self.height
            );
        }
        if self.octaves == 0 {
            bail!("octave count must be positive");
        }
        Ok(())
    }
}

/// A computed scalar field: `height` rows by `width` columns of values in
/// [0, 255], row-major. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseField {
    width: u32,
    height: u32,
    cells: Vec<u8>,
}

impl NoiseField {
    pub fn from_cells(width: u32, height: u32, cells: Vec<u8>) -> Result<Self> {
        if cells.len() != width as usize * height as usize {
            bail!(
                "cell count {} does not match {}x{}",
                cells.len(),
                width,
                height
            );
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Value at row `row`, column `col`.
    pub fn get(&self, row: u32, col: u32) -> u8 {
        self.cells[row as usize * self.width as usize + col as usize]
    }
}

const GRADS: [[f32; 2]; 8] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [0.7071, 0.7071],
    [-0.7071, 0.7071],
    [0.7071, -0.7071],
    [-0.7071, -0.7071],
];

/// Classic 2D Perlin over a shuffled 256-entry permutation table. The table
/// is the only source of randomness; a fixed seed fixes the whole lattice.
pub struct Perlin {
    perm: [u8; 512],
}

impl Perlin {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm = [0u8; 512];
        for i in 0..256 {
            perm[i] = i as u8;
        }
        // Fisher-Yates
        for i in (1..256).rev() {
            let j = rng.gen_range(0..=i);
            perm.swap(i, j);
        }
        for i in 0..256 {
            perm[256 + i] = perm[i];
        }
        Self { perm }
    }

    #[inline]
    fn fade(t: f32) -> f32 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    #[inline]
    fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + t * (b - a)
    }

    #[inline]
    fn grad(&self, hash: usize, x: f32, y: f32) -> f32 {
        let g = &GRADS[hash & 7];
        g[0] * x + g[1] * y
    }

    /// Single-octave sample, nominally in [-1, 1].
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let xi = x.floor() as i32;
        let yi = y.floor() as i32;
        let xf = x - xi as f32;
        let yf = y - yi as f32;

        let xi = (xi & 255) as usize;
        let yi = (yi & 255) as usize;

        let aa = self.perm[self.perm[xi] as usize + yi] as usize;
        let ab = self.perm[self.perm[xi] as usize + yi + 1] as usize;
        let ba = self.perm[self.perm[xi + 1] as usize + yi] as usize;
        let bb = self.perm[self.perm[xi + 1] as usize + yi + 1] as usize;

        let g00 = self.grad(aa, xf, yf);
        let g10 = self.grad(ba, xf - 1.0, yf);
        let g01 = self.grad(ab, xf, yf - 1.0);
        let g11 = self.grad(bb, xf - 1.0, yf - 1.0);

        let u = Self::fade(xf);
        let v = Self::fade(yf);

        Self::lerp(Self::lerp(g00, g10, u), Self::lerp(g01, g11, u), v)
    }

    /// Fractal sum: `octaves` layers, frequency doubling and amplitude
    /// halving per layer, normalized back to [-1, 1].
    pub fn fractal(&self, x: f32, y: f32, octaves: u32) -> f32 {
        let mut total = 0.0f32;
        let mut amplitude = 1.0f32;
        let mut frequency = 1.0f32;
        let mut max_value = 0.0f32;

        for _ in 0..octaves {
            total += self.sample(x * frequency, y * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        total / max_value
    }
}

/// Build the full field. Cell (row, col) samples the lattice at
/// `(offset + row/height * scale, offset + col/width * scale)` and the
/// [-1, 1] result is remapped onto [0, 255].
pub fn generate(params: &FieldParams) -> Result<NoiseField> {
    params.validate()?;

    let noise = Perlin::new(params.seed);
    let w = params.width as usize;
    let h = params.height as usize;
    let mut cells = Vec::with_capacity(w * h);

    for row in 0..h {
        let nx = params.offset + row as f32 / params.height as f32 * params.scale;
        for col in 0..w {
            let ny = params.offset + col as f32 / params.width as f32 * params.scale;
            let n = noise.fractal(nx, ny, params.octaves);
            let v = remap(n, -1.0, 1.0, 0.0, 255.0).round().clamp(0.0, 255.0);
            cells.push(v as u8);
        }
    }

    NoiseField::from_cells(params.width, params.height, cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_hits_endpoints() {
        assert_eq!(remap(-1.0, -1.0, 1.0, 0.0, 255.0), 0.0);
        assert_eq!(remap(1.0, -1.0, 1.0, 0.0, 255.0), 255.0);
        assert_eq!(remap(0.0, -1.0, 1.0, 0.0, 255.0), 127.5);
    }

    #[test]
    fn remap_is_monotonic() {
        let mut prev = remap(0.0, 0.0, 10.0, 0.0, 255.0);
        for i in 1..=100 {
            let v = remap(i as f32 * 0.1, 0.0, 10.0, 0.0, 255.0);
            assert!(v >= prev, "not monotonic at step {i}: {v} < {prev}");
            prev = v;
        }
    }

    #[test]
    fn remap_handles_shifted_ranges() {
        assert_eq!(remap(5.0, 5.0, 15.0, -2.0, 2.0), -2.0);
        assert_eq!(remap(15.0, 5.0, 15.0, -2.0, 2.0), 2.0);
        assert_eq!(remap(10.0, 5.0, 15.0, -2.0, 2.0), 0.0);
    }

    #[test]
    fn generate_is_deterministic() {
        let params = FieldParams {
            width: 64,
            height: 32,
            ..FieldParams::default()
        };
        let a = generate(&params).unwrap();
        let b = generate(&params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(&FieldParams {
            width: 64,
            height: 32,
            seed: 1,
            ..FieldParams::default()
        })
        .unwrap();
        let b = generate(&FieldParams {
            width: 64,
            height: 32,
            seed: 2,
            ..FieldParams::default()
        })
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_degenerate_params() {
        assert!(generate(&FieldParams {
            width: 0,
            ..FieldParams::default()
        })
        .is_err());
        assert!(generate(&FieldParams {
            height: 0,
            ..FieldParams::default()
        })
        .is_err());
        assert!(generate(&FieldParams {
            octaves: 0,
            ..FieldParams::default()
        })
        .is_err());
    }

    #[test]
    fn field_shape_matches_params() {
        let params = FieldParams {
            width: 48,
            height: 16,
            ..FieldParams::default()
        };
        let field = generate(&params).unwrap();
        assert_eq!(field.width(), 48);
        assert_eq!(field.height(), 16);
        assert_eq!(field.cells().len(), 48 * 16);
    }

    #[test]
    fn from_cells_rejects_mismatched_len() {
        assert!(NoiseField::from_cells(4, 4, vec![0u8; 15]).is_err());
        assert!(NoiseField::from_cells(4, 4, vec![0u8; 16]).is_ok());
    }
}
