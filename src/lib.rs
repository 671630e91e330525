//! Bit-packed, dual-orientation storage for diploid genotype matrices, with
//! allele ranking, reference masks, IBS distances and genetic-map interpolation.

pub mod bits;
pub mod codec;
pub mod error;
pub mod genetic_map;
pub mod ibs;
pub mod mask;
pub mod model;
pub mod output;
pub mod ranker;
pub mod reader;
pub mod store;

pub use error::{GenoError, Result};
