use bitvec::prelude::*;

pub const WORD_BITS: usize = 64;

pub fn words_for(n_bits: usize) -> usize {
    n_bits.div_ceil(WORD_BITS)
}

/// Fixed-length presence vector packed LSB-first into 64-bit words.
/// Bits past `len` in the last word are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPlane {
    bits: BitVec<u64, Lsb0>,
}

impl BitPlane {
    pub fn new(len: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; len],
        }
    }

    pub fn from_words(words: Vec<u64>, len: usize) -> Self {
        let mut bits = BitVec::<u64, Lsb0>::from_vec(words);
        bits.resize(len, false);
        let mut plane = Self { bits };
        plane.clear_padding();
        plane
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, idx: usize) -> bool {
        self.bits.get(idx).is_some_and(|b| *b)
    }

    pub fn set(&mut self, idx: usize) {
        self.bits.set(idx, true);
    }

    pub fn clear(&mut self, idx: usize) {
        self.bits.set(idx, false);
    }

    pub fn words(&self) -> &[u64] {
        self.bits.as_raw_slice()
    }

    pub fn num_words(&self) -> usize {
        words_for(self.len())
    }

    /// Overwrite one whole word.
    pub fn set_word(&mut self, word: usize, value: u64) {
        self.bits.as_raw_mut_slice()[word] = value;
        if word + 1 == self.num_words() {
            self.clear_padding();
        }
    }

    pub fn cardinality(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn union_with(&mut self, other: &BitPlane) {
        self.zip_words(other, |a, b| a | b);
    }

    pub fn intersect_with(&mut self, other: &BitPlane) {
        self.zip_words(other, |a, b| a & b);
    }

    pub fn and_not(&mut self, other: &BitPlane) {
        self.zip_words(other, |a, b| a & !b);
    }

    pub fn xor_with(&mut self, other: &BitPlane) {
        self.zip_words(other, |a, b| a ^ b);
    }

    pub fn intersection_count(&self, other: &BitPlane) -> usize {
        self.words()
            .iter()
            .zip(other.words())
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    fn zip_words(&mut self, other: &BitPlane, op: impl Fn(u64, u64) -> u64) {
        for (a, &b) in self.bits.as_raw_mut_slice().iter_mut().zip(other.words()) {
            *a = op(*a, b);
        }
        self.clear_padding();
    }

    fn clear_padding(&mut self) {
        let len = self.len();
        let tail = len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.bits.as_raw_mut_slice().last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

/// Swap rows and columns of a bit matrix: `rows[r]` bit `c` becomes `out[c]` bit `r`.
pub fn transpose(rows: &[BitPlane], n_cols: usize) -> Vec<BitPlane> {
    let mut out: Vec<BitPlane> = (0..n_cols).map(|_| BitPlane::new(rows.len())).collect();
    for (r, row) in rows.iter().enumerate() {
        for c in row.iter_ones() {
            out[c].set(r);
        }
    }
    out
}
