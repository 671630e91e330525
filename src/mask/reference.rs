use super::{GenotypeMask, MaskKind, MaskLabel, Rgb};
use crate::bits::BitPlane;
use crate::codec::DiploidCall;
use crate::error::{GenoError, Result};
use crate::store::GenotypeMatrix;
use rayon::prelude::*;
use tracing::debug;

/// One bit per cell: set where a call differs from what it is compared with.
#[derive(Debug, Clone)]
pub struct ReferenceMask {
    label: MaskLabel,
    n_sites: usize,
    rows: Vec<BitPlane>,
}

impl ReferenceMask {
    /// Compare every taxon with one taxon of the same matrix. The reference
    /// row is all zero.
    pub fn against_taxon(
        matrix: &GenotypeMatrix,
        taxon: usize,
        color: Option<Rgb>,
    ) -> Result<Self> {
        let name = format!("{} Reference", matrix.taxa().name(taxon)?);
        let reference = (0..matrix.n_sites())
            .map(|site| matrix.get_diploid(taxon, site))
            .collect::<Result<Vec<_>>>()?;
        Self::against_alleles(matrix, &reference, name, color)
    }

    /// Compare every taxon with one call per site. A call matches when it is
    /// unknown or equal to the reference in either allele order.
    pub fn against_alleles(
        matrix: &GenotypeMatrix,
        reference: &[DiploidCall],
        name: impl Into<String>,
        color: Option<Rgb>,
    ) -> Result<Self> {
        if reference.len() != matrix.n_sites() {
            return Err(GenoError::DimensionMismatch {
                what: "reference calls",
                expected: matrix.n_sites(),
                found: reference.len(),
            });
        }
        let label = MaskLabel::new(name, color, MaskKind::Reference);
        Self::build(label, matrix.n_taxa(), matrix.n_sites(), |taxon, site| {
            Ok(!matrix
                .get_diploid(taxon, site)?
                .is_equal_or_unknown(reference[site]))
        })
    }

    /// Compare against the reference call recorded in each site's metadata.
    pub fn against_site_references(matrix: &GenotypeMatrix, color: Option<Rgb>) -> Result<Self> {
        let reference: Vec<DiploidCall> = matrix.sites().iter().map(|s| s.reference).collect();
        Self::against_alleles(matrix, &reference, "Alignment Reference", color)
    }

    /// Cell-by-cell comparison of two matrices with the same shape. Allele
    /// order does not matter; unknown only matches unknown.
    pub fn compare_matrices(
        first: &GenotypeMatrix,
        second: &GenotypeMatrix,
        name: impl Into<String>,
        kind: MaskKind,
        color: Option<Rgb>,
    ) -> Result<Self> {
        if first.n_taxa() != second.n_taxa() {
            return Err(GenoError::DimensionMismatch {
                what: "taxa",
                expected: first.n_taxa(),
                found: second.n_taxa(),
            });
        }
        if first.n_sites() != second.n_sites() {
            return Err(GenoError::DimensionMismatch {
                what: "sites",
                expected: first.n_sites(),
                found: second.n_sites(),
            });
        }
        let label = MaskLabel::new(name, color, kind);
        Self::build(label, first.n_taxa(), first.n_sites(), |taxon, site| {
            let a = first.get_diploid(taxon, site)?;
            let b = second.get_diploid(taxon, site)?;
            Ok(!a.is_same_genotype(b))
        })
    }

    fn build<F>(label: MaskLabel, n_taxa: usize, n_sites: usize, differs: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> Result<bool> + Sync,
    {
        let rows = (0..n_taxa)
            .into_par_iter()
            .map(|taxon| {
                let mut row = BitPlane::new(n_sites);
                for site in 0..n_sites {
                    if differs(taxon, site)? {
                        row.set(site);
                    }
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(mask = %label.name, n_taxa, n_sites, "built reference mask");
        Ok(Self {
            label,
            n_sites,
            rows,
        })
    }

    pub fn label_mut(&mut self) -> &mut MaskLabel {
        &mut self.label
    }

    pub fn n_taxa(&self) -> usize {
        self.rows.len()
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn row(&self, taxon: usize) -> Result<&BitPlane> {
        self.rows
            .get(taxon)
            .ok_or_else(|| GenoError::out_of_range("taxon", taxon, self.rows.len()))
    }

    pub fn is_set(&self, taxon: usize, site: usize) -> Result<bool> {
        let row = self.row(taxon)?;
        if site >= self.n_sites {
            return Err(GenoError::out_of_range("site", site, self.n_sites));
        }
        Ok(row.get(site))
    }

    pub fn differing_sites(&self, taxon: usize) -> Result<usize> {
        Ok(self.row(taxon)?.cardinality())
    }
}

impl GenotypeMask for ReferenceMask {
    fn label(&self) -> &MaskLabel {
        &self.label
    }

    fn mask(&self, taxon: usize, site: usize) -> Result<u8> {
        Ok(u8::from(self.is_set(taxon, site)?))
    }
}
