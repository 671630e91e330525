use crate::codec::DiploidCall;
use crate::error::{GenoError, Result};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Physical layouts a matrix can maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Orientation {
    /// One plane per site, one bit per taxon.
    SiteMajor,
    /// One plane per taxon, one bit per site.
    TaxonMajor,
    Both,
}

impl Orientation {
    pub fn has_site_major(self) -> bool {
        matches!(self, Orientation::SiteMajor | Orientation::Both)
    }

    pub fn has_taxon_major(self) -> bool {
        matches!(self, Orientation::TaxonMajor | Orientation::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gamete {
    First,
    Second,
}

impl Gamete {
    pub fn index(self) -> usize {
        match self {
            Gamete::First => 0,
            Gamete::Second => 1,
        }
    }
}

/// Ordered, uniquely named taxa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxa {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl Taxa {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut taxa = Taxa::default();
        for name in names {
            taxa.push(name)?;
        }
        Ok(taxa)
    }

    pub fn push(&mut self, name: String) -> Result<usize> {
        if self.lookup.contains_key(&name) {
            return Err(GenoError::DuplicateTaxon { name });
        }
        let idx = self.names.len();
        self.lookup.insert(name.clone(), idx);
        self.names.push(name);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, idx: usize) -> Result<&str> {
        self.names
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| GenoError::out_of_range("taxon", idx, self.names.len()))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Per-site metadata carried alongside the planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub snp_id: String,
    pub locus: String,
    pub position: Option<u32>,
    pub reference: DiploidCall,
}

impl SiteInfo {
    pub fn new(snp_id: impl Into<String>, locus: impl Into<String>, position: Option<u32>) -> Self {
        Self {
            snp_id: snp_id.into(),
            locus: locus.into(),
            position,
            reference: DiploidCall::UNKNOWN,
        }
    }

    pub fn with_reference(mut self, reference: DiploidCall) -> Self {
        self.reference = reference;
        self
    }

    /// Order used when compacting: locus, then position with absent positions first.
    pub fn physical_cmp(&self, other: &SiteInfo) -> Ordering {
        compare_loci(&self.locus, &other.locus).then_with(|| self.position.cmp(&other.position))
    }
}

/// Numeric locus names compare numerically and sort before non-numeric ones.
pub fn compare_loci(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxa_reject_duplicates() {
        let err = Taxa::new(vec!["T1".into(), "T2".into(), "T1".into()]).unwrap_err();
        match err {
            GenoError::DuplicateTaxon { name } => assert_eq!(name, "T1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn taxa_lookup() {
        let taxa = Taxa::new(vec!["T1".into(), "T2".into()]).unwrap();
        assert_eq!(taxa.index_of("T2"), Some(1));
        assert_eq!(taxa.index_of("T3"), None);
        assert_eq!(taxa.name(0).unwrap(), "T1");
        assert!(matches!(
            taxa.name(2),
            Err(GenoError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn loci_sort_numerically() {
        let mut loci = vec!["10", "X", "2", "1", "Pt"];
        loci.sort_by(|a, b| compare_loci(a, b));
        assert_eq!(loci, vec!["1", "2", "10", "Pt", "X"]);
    }

    #[test]
    fn missing_positions_sort_first() {
        let a = SiteInfo::new("s1", "1", None);
        let b = SiteInfo::new("s2", "1", Some(5));
        let c = SiteInfo::new("s3", "2", Some(1));
        assert_eq!(a.physical_cmp(&b), Ordering::Less);
        assert_eq!(b.physical_cmp(&c), Ordering::Less);
    }
}
