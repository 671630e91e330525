use crate::bits::BitPlane;
use crate::error::{GenoError, Result};
use crate::model::Orientation;
use crate::store::GenotypeMatrix;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::izip;
use rayon::prelude::*;
use std::borrow::Cow;
use tracing::debug;

/// Distance for one pair of taxa and the number of sites it was estimated from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IbsDistance {
    pub distance: f64,
    pub sites: u32,
}

impl IbsDistance {
    const SELF: IbsDistance = IbsDistance {
        distance: 0.0,
        sites: 0,
    };
}

/// Identity-by-state distance over major/minor presence words of two taxa.
/// A site where either taxon is heterozygous counts as half identical; sites
/// missing in either taxon are skipped. The distance is NaN unless more than
/// `min_sites` sites were compared.
pub fn het_bit_distance(
    i_major: &[u64],
    i_minor: &[u64],
    j_major: &[u64],
    j_minor: &[u64],
    min_sites: usize,
) -> IbsDistance {
    let (mut same_count, mut diff_count, mut het_count) = (0u32, 0u32, 0u32);
    for (&im, &in_, &jm, &jn) in izip!(i_major, i_minor, j_major, j_minor) {
        let same = (im & jm) | (in_ & jn);
        let diff = (im & jn) | (in_ & jm);
        same_count += same.count_ones();
        diff_count += diff.count_ones();
        het_count += (same & diff).count_ones();
    }
    let sites = same_count + diff_count - het_count;
    let distance = if sites as usize > min_sites {
        1.0 - (same_count as f64 - 0.5 * het_count as f64) / sites as f64
    } else {
        f64::NAN
    };
    IbsDistance { distance, sites }
}

/// Major and minor presence rows of one taxon.
#[derive(Debug, Clone)]
pub(crate) struct TaxonWords<'a> {
    major: Cow<'a, BitPlane>,
    minor: Cow<'a, BitPlane>,
}

impl TaxonWords<'_> {
    pub(crate) fn distance(&self, other: &TaxonWords<'_>, min_sites: usize) -> IbsDistance {
        het_bit_distance(
            self.major.words(),
            self.minor.words(),
            other.major.words(),
            other.minor.words(),
            min_sites,
        )
    }
}

/// Needs taxon-major planes. A matrix ranking a single allele has an empty
/// minor row.
pub(crate) fn taxon_words(matrix: &GenotypeMatrix, taxon: usize) -> Result<TaxonWords<'_>> {
    let major = matrix.allele_presence_for_all_sites(taxon, 0)?;
    let minor = if matrix.config().max_alleles >= 2 {
        matrix.allele_presence_for_all_sites(taxon, 1)?
    } else {
        Cow::Owned(BitPlane::new(matrix.n_sites()))
    };
    Ok(TaxonWords { major, minor })
}

/// Distance between two taxa of a matrix that keeps taxon-major planes.
pub fn taxon_distance(
    matrix: &GenotypeMatrix,
    taxon1: usize,
    taxon2: usize,
    min_sites: usize,
) -> Result<IbsDistance> {
    let first = taxon_words(matrix, taxon1)?;
    let second = taxon_words(matrix, taxon2)?;
    Ok(first.distance(&second, min_sites))
}

fn progress_bar(len: u64, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:30} {pos}/{len} taxa",
    )?);
    Ok(pb)
}

/// Symmetric pairwise IBS distances over all taxa of a matrix.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    taxa: Vec<String>,
    n_taxa: usize,
    distances: Vec<f64>, // Flat (n x n) row-major
    sites: Vec<u32>,
    average_sites: f64,
}

impl DistanceMatrix {
    /// Diagonal entries are 0 unless `true_ibs` asks for each taxon to be
    /// compared with itself.
    pub fn compute(
        matrix: &GenotypeMatrix,
        min_sites: usize,
        true_ibs: bool,
        show_progress: bool,
    ) -> Result<Self> {
        Self::build(matrix, min_sites, true_ibs, show_progress, false)
    }

    /// Same as [`DistanceMatrix::compute`], one taxon row per rayon task.
    pub fn compute_parallel(
        matrix: &GenotypeMatrix,
        min_sites: usize,
        true_ibs: bool,
        show_progress: bool,
    ) -> Result<Self> {
        Self::build(matrix, min_sites, true_ibs, show_progress, true)
    }

    fn build(
        matrix: &GenotypeMatrix,
        min_sites: usize,
        true_ibs: bool,
        show_progress: bool,
        parallel: bool,
    ) -> Result<Self> {
        let matrix: Cow<'_, GenotypeMatrix> = if matrix.orientation().has_taxon_major() {
            Cow::Borrowed(matrix)
        } else {
            Cow::Owned(matrix.clone().with_orientation(Orientation::Both))
        };
        let n_taxa = matrix.n_taxa();
        let rows = (0..n_taxa)
            .map(|taxon| taxon_words(&matrix, taxon))
            .collect::<Result<Vec<_>>>()?;

        let pb = progress_bar(n_taxa as u64, show_progress)?;
        let upper_row = |i: usize| -> Vec<IbsDistance> {
            let row = (i..n_taxa)
                .map(|j| {
                    if i == j && !true_ibs {
                        IbsDistance::SELF
                    } else {
                        rows[i].distance(&rows[j], min_sites)
                    }
                })
                .collect();
            pb.inc(1);
            row
        };
        let upper: Vec<Vec<IbsDistance>> = if parallel {
            (0..n_taxa).into_par_iter().map(upper_row).collect()
        } else {
            (0..n_taxa).map(upper_row).collect()
        };
        pb.abandon();

        let mut distances = vec![0.0; n_taxa * n_taxa];
        let mut sites = vec![0; n_taxa * n_taxa];
        let (mut total_sites, mut compared) = (0u64, 0u64);
        for (i, row) in upper.into_iter().enumerate() {
            for (j, pair) in (i..n_taxa).zip(row) {
                if i != j || true_ibs {
                    total_sites += u64::from(pair.sites);
                    compared += 1;
                }
                distances[i * n_taxa + j] = pair.distance;
                distances[j * n_taxa + i] = pair.distance;
                sites[i * n_taxa + j] = pair.sites;
                sites[j * n_taxa + i] = pair.sites;
            }
        }
        let average_sites = if compared == 0 {
            f64::NAN
        } else {
            total_sites as f64 / compared as f64
        };
        debug!(n_taxa, min_sites, average_sites, "computed IBS distance matrix");

        Ok(Self {
            taxa: matrix.taxa().names().to_vec(),
            n_taxa,
            distances,
            sites,
            average_sites,
        })
    }

    pub fn n_taxa(&self) -> usize {
        self.n_taxa
    }

    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn idx(&self, i: usize, j: usize) -> Result<usize> {
        if i >= self.n_taxa {
            return Err(GenoError::out_of_range("taxon", i, self.n_taxa));
        }
        if j >= self.n_taxa {
            return Err(GenoError::out_of_range("taxon", j, self.n_taxa));
        }
        Ok(self.n_taxa * i + j)
    }

    pub fn distance(&self, i: usize, j: usize) -> Result<f64> {
        Ok(self.distances[self.idx(i, j)?])
    }

    pub fn sites(&self, i: usize, j: usize) -> Result<u32> {
        Ok(self.sites[self.idx(i, j)?])
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn sites_compared(&self) -> &[u32] {
        &self.sites
    }

    /// Mean number of compared sites over every computed pair.
    pub fn average_sites(&self) -> f64 {
        self.average_sites
    }

    /// Upper-triangle pairs `(i, j)` with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_taxa).flat_map(move |i| ((i + 1)..self.n_taxa).map(move |j| (i, j)))
    }
}
