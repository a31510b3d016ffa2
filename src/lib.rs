//! False-color viewer core for a 2D fractal noise field: deterministic
//! generation, threshold classification, and the worker-to-terminal render
//! pipeline. The binary in `main.rs` owns the terminal and the key handling.

pub mod color;
pub mod config;
pub mod noise;
pub mod pipeline;
