//! Per-cell annotations derived from a packed matrix.

mod cache;
mod distance;
mod reference;

pub use cache::LruCache;
pub use distance::{DISTANCE_CACHE_CAPACITY, GeneticDistanceMask, distance_byte};
pub use reference::ReferenceMask;

use crate::error::Result;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Calls compared against a reference taxon or reference calls.
    Reference,
    /// Calls that were filled in by imputation.
    Imputed,
    /// Calls compared between two matrices.
    Compared,
}

/// 24-bit `0xRRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskLabel {
    pub name: String,
    pub color: Option<Rgb>,
    pub kind: MaskKind,
}

impl MaskLabel {
    pub fn new(name: impl Into<String>, color: Option<Rgb>, kind: MaskKind) -> Self {
        Self {
            name: name.into(),
            color,
            kind,
        }
    }

    pub fn set_color(&mut self, color: Option<Rgb>) {
        self.color = color;
    }
}

impl fmt::Display for MaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.color {
            None => f.write_str(&self.name),
            Some(c) => write!(
                f,
                "{} (Red: {}  Green: {}  Blue: {})",
                self.name,
                c.red(),
                c.green(),
                c.blue()
            ),
        }
    }
}

/// Hands out distinct display colours for successive masks. Owned by the
/// caller, so independent sessions do not share state.
#[derive(Debug, Clone)]
pub struct ColorSequence {
    last: Option<u32>,
    increment: u32,
}

impl ColorSequence {
    const FIRST: u32 = 0x7D_00_00;
    const BASE_INCREMENT: u32 = 0x7D;
    const MODULUS: u32 = 0xFF_FF_FF;

    pub fn new() -> Self {
        Self {
            last: None,
            increment: Self::BASE_INCREMENT,
        }
    }

    pub fn next_color(&mut self) -> Rgb {
        let color = match self.last {
            None => Self::FIRST,
            Some(last) => {
                let color = (last + self.increment) % Self::MODULUS;
                let shifted = ((u64::from(self.increment) << 8) % u64::from(Self::MODULUS)) as u32;
                self.increment = if shifted == 0 {
                    Self::BASE_INCREMENT
                } else {
                    shifted
                };
                color
            }
        };
        self.last = Some(color);
        Rgb(color)
    }
}

impl Default for ColorSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for ColorSequence {
    type Item = Rgb;

    fn next(&mut self) -> Option<Rgb> {
        Some(self.next_color())
    }
}

/// Byte-valued annotation over taxa × sites.
pub trait GenotypeMask: Send + Sync {
    fn label(&self) -> &MaskLabel;

    fn mask(&self, taxon: usize, site: usize) -> Result<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_sequence_matches_known_values() {
        let colors: Vec<u32> = ColorSequence::new().take(5).map(|c| c.0).collect();
        assert_eq!(colors, vec![0x7D0000, 0x7D007D, 0x7D7D7D, 0xFA7D7D, 0xFA7DFA]);
    }

    #[test]
    fn sequences_are_independent() {
        let mut a = ColorSequence::new();
        a.next_color();
        a.next_color();
        let mut b = ColorSequence::default();
        assert_eq!(b.next_color(), Rgb(0x7D0000));
    }

    #[test]
    fn label_display_includes_color_components() {
        let mut label = MaskLabel::new("T1 Reference", None, MaskKind::Reference);
        assert_eq!(label.to_string(), "T1 Reference");
        label.set_color(Some(Rgb(0x7D007D)));
        assert_eq!(
            label.to_string(),
            "T1 Reference (Red: 125  Green: 0  Blue: 125)"
        );
    }
}
