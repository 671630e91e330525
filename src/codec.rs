use crate::error::{GenoError, Result};
use std::fmt;
use std::sync::OnceLock;

/// 4-bit allele code.
pub type Allele = u8;

pub const A_ALLELE: Allele = 0x0;
pub const C_ALLELE: Allele = 0x1;
pub const G_ALLELE: Allele = 0x2;
pub const T_ALLELE: Allele = 0x3;
pub const INSERT_ALLELE: Allele = 0x4;
pub const GAP_ALLELE: Allele = 0x5;
pub const RARE_ALLELE: Allele = 0xE;
pub const UNKNOWN_ALLELE: Allele = 0xF;

pub const NUM_NUCLEOTIDE_ALLELES: usize = 6;
/// Codes 0..=13; 0xE and 0xF are sentinels.
pub const MAX_ALLELE_CODES: usize = 14;

/// Rendering for bytes the decode table has no entry for.
pub const UNMAPPED: &str = "?";

const NUCLEOTIDE_LETTERS: [&str; NUM_NUCLEOTIDE_ALLELES] = ["A", "C", "G", "T", "+", "-"];

/// Two alleles packed into one byte: high nibble first gamete, low nibble second.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiploidCall(pub u8);

impl DiploidCall {
    pub const UNKNOWN: DiploidCall = DiploidCall(0xFF);
    pub const UNDEFINED: DiploidCall = DiploidCall(0x66);
    pub const GAP: DiploidCall = DiploidCall(0x55);

    pub const fn from_alleles(first: Allele, second: Allele) -> Self {
        DiploidCall(((first & 0xF) << 4) | (second & 0xF))
    }

    pub const fn homozygous(allele: Allele) -> Self {
        Self::from_alleles(allele, allele)
    }

    pub const fn first(self) -> Allele {
        self.0 >> 4
    }

    pub const fn second(self) -> Allele {
        self.0 & 0xF
    }

    pub const fn alleles(self) -> [Allele; 2] {
        [self.first(), self.second()]
    }

    pub const fn swapped(self) -> Self {
        Self::from_alleles(self.second(), self.first())
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }

    /// Both gametes called and different.
    pub const fn is_heterozygous(self) -> bool {
        let (a, b) = (self.first(), self.second());
        a != UNKNOWN_ALLELE && b != UNKNOWN_ALLELE && a != b
    }

    /// Unordered comparison where a fully unknown call matches anything.
    pub const fn is_equal_or_unknown(self, other: DiploidCall) -> bool {
        if self.is_unknown() || other.is_unknown() {
            return true;
        }
        self.0 == other.0 || self.swapped().0 == other.0
    }

    /// Unordered comparison without the unknown wildcard.
    pub const fn is_same_genotype(self, other: DiploidCall) -> bool {
        self.0 == other.0 || self.swapped().0 == other.0
    }
}

impl fmt::Display for DiploidCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(decode_diploid(*self))
    }
}

fn pair_nibble(symbol: u8) -> Option<Allele> {
    match symbol {
        b'A' => Some(A_ALLELE),
        b'C' => Some(C_ALLELE),
        b'G' => Some(G_ALLELE),
        b'T' => Some(T_ALLELE),
        b'+' => Some(INSERT_ALLELE),
        b'-' => Some(GAP_ALLELE),
        b'Z' => Some(RARE_ALLELE),
        b'N' | b'X' | b'?' => Some(UNKNOWN_ALLELE),
        _ => None,
    }
}

fn single_symbol_table() -> &'static [Option<DiploidCall>; 256] {
    static TABLE: OnceLock<[Option<DiploidCall>; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [None; 256];
        for symbol in [b'A', b'C', b'G', b'T', b'+', b'-', b'Z', b'N', b'X', b'?'] {
            if let Some(allele) = pair_nibble(symbol) {
                table[symbol as usize] = Some(DiploidCall::homozygous(allele));
            }
        }
        // IUPAC ambiguity codes
        table[b'R' as usize] = Some(DiploidCall(0x02));
        table[b'Y' as usize] = Some(DiploidCall(0x13));
        table[b'S' as usize] = Some(DiploidCall(0x21));
        table[b'W' as usize] = Some(DiploidCall(0x03));
        table[b'K' as usize] = Some(DiploidCall(0x23));
        table[b'M' as usize] = Some(DiploidCall(0x01));
        table[b'0' as usize] = Some(DiploidCall::from_alleles(GAP_ALLELE, INSERT_ALLELE));
        table
    })
}

fn heterozygous_code(a: Allele, b: Allele) -> &'static str {
    match (a.min(b), a.max(b)) {
        (A_ALLELE, C_ALLELE) => "M",
        (A_ALLELE, G_ALLELE) => "R",
        (A_ALLELE, T_ALLELE) => "W",
        (C_ALLELE, G_ALLELE) => "S",
        (C_ALLELE, T_ALLELE) => "Y",
        (G_ALLELE, T_ALLELE) => "K",
        _ => "0",
    }
}

fn iupac_table() -> &'static [&'static str; 256] {
    static TABLE: OnceLock<[&'static str; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [UNMAPPED; 256];
        for a in 0..NUM_NUCLEOTIDE_ALLELES as u8 {
            for b in 0..NUM_NUCLEOTIDE_ALLELES as u8 {
                table[DiploidCall::from_alleles(a, b).0 as usize] = if a == b {
                    NUCLEOTIDE_LETTERS[a as usize]
                } else {
                    heterozygous_code(a, b)
                };
            }
            let letter = NUCLEOTIDE_LETTERS[a as usize];
            for sentinel in [RARE_ALLELE, UNKNOWN_ALLELE] {
                table[DiploidCall::from_alleles(a, sentinel).0 as usize] = letter;
                table[DiploidCall::from_alleles(sentinel, a).0 as usize] = letter;
            }
        }
        table[0xEE] = "Z";
        table[0xEF] = "N";
        table[0xFE] = "N";
        table[DiploidCall::UNKNOWN.0 as usize] = UNMAPPED;
        table
    })
}

/// Parse one diploid token, case-insensitively.
pub fn encode_diploid(token: &str) -> Result<DiploidCall> {
    let trimmed = token.trim();
    let upper = trimmed.to_ascii_uppercase();
    match upper.as_bytes() {
        [symbol] => single_symbol_table()[*symbol as usize]
            .ok_or_else(|| GenoError::invalid_symbol(token)),
        [first, second] => match (pair_nibble(*first), pair_nibble(*second)) {
            (Some(a), Some(b)) => Ok(DiploidCall::from_alleles(a, b)),
            _ => Err(GenoError::invalid_symbol(token)),
        },
        _ => Err(GenoError::invalid_symbol(token)),
    }
}

/// IUPAC rendering of a packed call. Never fails; unmapped bytes give [`UNMAPPED`].
pub fn decode_diploid(call: DiploidCall) -> &'static str {
    iupac_table()[call.0 as usize]
}

pub fn encode_haploid(symbol: char) -> Result<Allele> {
    let upper = symbol.to_ascii_uppercase();
    if !upper.is_ascii() {
        return Err(GenoError::invalid_symbol(&symbol.to_string()));
    }
    pair_nibble(upper as u8).ok_or_else(|| GenoError::invalid_symbol(&symbol.to_string()))
}

pub fn haploid_str(allele: Allele) -> &'static str {
    match allele {
        0..=5 => NUCLEOTIDE_LETTERS[allele as usize],
        RARE_ALLELE => "Z",
        UNKNOWN_ALLELE => "N",
        _ => "X",
    }
}

pub fn complement(allele: Allele) -> Allele {
    match allele {
        A_ALLELE => T_ALLELE,
        T_ALLELE => A_ALLELE,
        C_ALLELE => G_ALLELE,
        G_ALLELE => C_ALLELE,
        other => other,
    }
}

pub fn complement_diploid(call: DiploidCall) -> DiploidCall {
    DiploidCall::from_alleles(complement(call.first()), complement(call.second()))
}

/// Strategy for turning tokens into calls and calls back into text.
pub trait AlleleCodec: Send + Sync + fmt::Debug {
    fn encode(&self, token: &str) -> Result<DiploidCall>;
    fn render(&self, call: DiploidCall) -> String;
    fn allele_str(&self, allele: Allele) -> String;
    /// Number of distinct non-sentinel allele codes this codec can produce.
    fn max_alleles(&self) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NucleotideCodec;

impl AlleleCodec for NucleotideCodec {
    fn encode(&self, token: &str) -> Result<DiploidCall> {
        encode_diploid(token)
    }

    fn render(&self, call: DiploidCall) -> String {
        decode_diploid(call).to_string()
    }

    fn allele_str(&self, allele: Allele) -> String {
        haploid_str(allele).to_string()
    }

    fn max_alleles(&self) -> usize {
        NUM_NUCLEOTIDE_ALLELES
    }
}

/// Arbitrary named allele states, written `a`, `a:b` or `a/b`.
#[derive(Debug, Clone)]
pub struct TextCodec {
    states: Vec<String>,
}

impl TextCodec {
    pub fn new(states: Vec<String>) -> Result<Self> {
        if states.is_empty() || states.len() > MAX_ALLELE_CODES {
            return Err(GenoError::InvalidConfig {
                reason: format!(
                    "text codec needs 1 to {MAX_ALLELE_CODES} states (got {})",
                    states.len()
                ),
            });
        }
        for (i, state) in states.iter().enumerate() {
            if state.is_empty()
                || state.contains([':', '/'])
                || state == "N"
                || state == "?"
                || states[..i].contains(state)
            {
                return Err(GenoError::InvalidConfig {
                    reason: format!("invalid or repeated text allele state {state:?}"),
                });
            }
        }
        Ok(Self { states })
    }

    fn lookup(&self, name: &str) -> Option<Allele> {
        match name {
            "N" | "?" => Some(UNKNOWN_ALLELE),
            _ => self
                .states
                .iter()
                .position(|s| s == name)
                .map(|i| i as Allele),
        }
    }
}

impl AlleleCodec for TextCodec {
    fn encode(&self, token: &str) -> Result<DiploidCall> {
        let token = token.trim();
        let (first, second) = token.split_once([':', '/']).unwrap_or((token, token));
        match (self.lookup(first), self.lookup(second)) {
            (Some(a), Some(b)) => Ok(DiploidCall::from_alleles(a, b)),
            _ => Err(GenoError::invalid_symbol(token)),
        }
    }

    fn render(&self, call: DiploidCall) -> String {
        if call.is_unknown() {
            return UNMAPPED.to_string();
        }
        format!(
            "{}:{}",
            self.allele_str(call.first()),
            self.allele_str(call.second())
        )
    }

    fn allele_str(&self, allele: Allele) -> String {
        match allele {
            RARE_ALLELE => "Z".to_string(),
            UNKNOWN_ALLELE => "N".to_string(),
            _ => self
                .states
                .get(allele as usize)
                .cloned()
                .unwrap_or_else(|| UNMAPPED.to_string()),
        }
    }

    fn max_alleles(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letters_are_homozygous() {
        assert_eq!(encode_diploid("A").unwrap(), DiploidCall(0x00));
        assert_eq!(encode_diploid("t").unwrap(), DiploidCall(0x33));
        assert_eq!(encode_diploid("+").unwrap(), DiploidCall(0x44));
        assert_eq!(encode_diploid("-").unwrap(), DiploidCall::GAP);
        assert_eq!(encode_diploid("Z").unwrap(), DiploidCall(0xEE));
    }

    #[test]
    fn unknown_spellings_share_one_byte() {
        for token in ["N", "n", "X", "?", "??", "NN", "xn"] {
            assert_eq!(encode_diploid(token).unwrap(), DiploidCall::UNKNOWN, "{token}");
        }
    }

    #[test]
    fn ambiguity_codes_encode_to_pairs() {
        assert_eq!(encode_diploid("R").unwrap(), DiploidCall(0x02));
        assert_eq!(encode_diploid("y").unwrap(), DiploidCall(0x13));
        assert_eq!(encode_diploid("S").unwrap(), DiploidCall(0x21));
        assert_eq!(encode_diploid("W").unwrap(), DiploidCall(0x03));
        assert_eq!(encode_diploid("K").unwrap(), DiploidCall(0x23));
        assert_eq!(encode_diploid("M").unwrap(), DiploidCall(0x01));
        assert_eq!(encode_diploid("0").unwrap(), DiploidCall(0x54));
    }

    #[test]
    fn pairs_keep_their_order() {
        assert_eq!(encode_diploid("AC").unwrap(), DiploidCall(0x01));
        assert_eq!(encode_diploid("CA").unwrap(), DiploidCall(0x10));
        assert_eq!(encode_diploid("-+").unwrap(), DiploidCall(0x54));
        assert_eq!(encode_diploid("+-").unwrap(), DiploidCall(0x45));
        assert_eq!(encode_diploid("AN").unwrap(), DiploidCall(0x0F));
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        for token in ["", "B", "AB", "ACG", "RA", "é"] {
            match encode_diploid(token).unwrap_err() {
                GenoError::InvalidAlleleSymbol { token: t, .. } => assert_eq!(t, token),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn decode_is_order_insensitive_for_heterozygotes() {
        assert_eq!(decode_diploid(DiploidCall(0x01)), "M");
        assert_eq!(decode_diploid(DiploidCall(0x10)), "M");
        assert_eq!(decode_diploid(DiploidCall(0x32)), "K");
        assert_eq!(decode_diploid(DiploidCall(0x04)), "0");
        assert_eq!(decode_diploid(DiploidCall(0x45)), "0");
    }

    #[test]
    fn decode_sentinels() {
        assert_eq!(decode_diploid(DiploidCall::UNKNOWN), "?");
        assert_eq!(decode_diploid(DiploidCall::UNDEFINED), UNMAPPED);
        assert_eq!(decode_diploid(DiploidCall(0x0F)), "A");
        assert_eq!(decode_diploid(DiploidCall(0xF2)), "G");
        assert_eq!(decode_diploid(DiploidCall(0xEE)), "Z");
        assert_eq!(decode_diploid(DiploidCall(0xEF)), "N");
        assert_eq!(decode_diploid(DiploidCall(0x77)), UNMAPPED);
    }

    #[test]
    fn decode_of_encode_ignores_case() {
        for token in ["a", "ac", "Ga", "r", "+-", "0", "tt", "n", "-"] {
            let lower = decode_diploid(encode_diploid(&token.to_lowercase()).unwrap());
            let upper = decode_diploid(encode_diploid(&token.to_uppercase()).unwrap());
            assert_eq!(lower, upper, "{token}");
        }
        assert_eq!(decode_diploid(encode_diploid("ga").unwrap()), "R");
    }

    #[test]
    fn packed_to_string_to_packed_is_stable() {
        for byte in 0..=u8::MAX {
            let rendered = decode_diploid(DiploidCall(byte));
            if rendered == UNMAPPED {
                continue;
            }
            let reencoded = encode_diploid(rendered).unwrap();
            if rendered == "N" {
                assert!(reencoded.is_unknown(), "byte {byte:#04x}");
            } else {
                assert_eq!(decode_diploid(reencoded), rendered, "byte {byte:#04x}");
            }
        }
    }

    #[test]
    fn haploid_codes() {
        assert_eq!(encode_haploid('g').unwrap(), G_ALLELE);
        assert_eq!(encode_haploid('N').unwrap(), UNKNOWN_ALLELE);
        assert!(encode_haploid('R').is_err());
        assert_eq!(haploid_str(GAP_ALLELE), "-");
        assert_eq!(haploid_str(9), "X");
        assert_eq!(haploid_str(RARE_ALLELE), "Z");
    }

    #[test]
    fn complements() {
        assert_eq!(complement(A_ALLELE), T_ALLELE);
        assert_eq!(complement(G_ALLELE), C_ALLELE);
        assert_eq!(complement(GAP_ALLELE), GAP_ALLELE);
        assert_eq!(complement_diploid(DiploidCall(0x02)), DiploidCall(0x31));
        assert_eq!(complement_diploid(DiploidCall::UNKNOWN), DiploidCall::UNKNOWN);
    }

    #[test]
    fn unordered_comparisons() {
        let ac = DiploidCall(0x01);
        assert!(ac.is_equal_or_unknown(DiploidCall(0x10)));
        assert!(ac.is_equal_or_unknown(DiploidCall::UNKNOWN));
        assert!(!ac.is_equal_or_unknown(DiploidCall(0x00)));
        assert!(!ac.is_same_genotype(DiploidCall::UNKNOWN));
        assert!(ac.is_heterozygous());
        assert!(!DiploidCall(0x0F).is_heterozygous());
    }

    #[test]
    fn text_codec_round_trip() {
        let codec = TextCodec::new(vec!["short".into(), "tall".into()]).unwrap();
        let call = codec.encode("short:tall").unwrap();
        assert_eq!(call, DiploidCall(0x01));
        assert_eq!(codec.render(call), "short:tall");
        assert_eq!(codec.encode("tall").unwrap(), DiploidCall(0x11));
        assert_eq!(codec.encode("?").unwrap(), DiploidCall::UNKNOWN);
        assert!(codec.encode("medium").is_err());
    }

    #[test]
    fn text_codec_rejects_repeated_states() {
        let err = TextCodec::new(vec!["a".into(), "a".into()]).unwrap_err();
        match err {
            GenoError::InvalidConfig { reason } => assert!(reason.contains("\"a\"")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
