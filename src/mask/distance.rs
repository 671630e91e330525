use super::{GenotypeMask, LruCache, MaskKind, MaskLabel, Rgb};
use crate::error::{GenoError, Result};
use crate::ibs::taxon_distance;
use crate::model::Orientation;
use crate::store::GenotypeMatrix;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

pub const DISTANCE_CACHE_CAPACITY: usize = 100;

/// Scale a distance in `[0, 1]` to a byte. NaN maps to 0.
pub fn distance_byte(distance: f64) -> u8 {
    if distance.is_nan() {
        return 0;
    }
    (distance * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Every cell of a taxon row holds that taxon's IBS distance to the
/// reference taxon, scaled to a byte. Rows are computed on first access.
#[derive(Debug)]
pub struct GeneticDistanceMask {
    label: MaskLabel,
    matrix: Arc<GenotypeMatrix>,
    taxon_major: OnceLock<Arc<GenotypeMatrix>>,
    reference_taxon: usize,
    min_sites: usize,
    cache: LruCache<usize, u8>,
    computations: AtomicUsize,
}

impl GeneticDistanceMask {
    pub fn new(
        matrix: Arc<GenotypeMatrix>,
        reference_taxon: usize,
        color: Option<Rgb>,
    ) -> Result<Self> {
        let name = format!("{} Genetic Distance", matrix.taxa().name(reference_taxon)?);
        Ok(Self {
            label: MaskLabel::new(name, color, MaskKind::Reference),
            matrix,
            taxon_major: OnceLock::new(),
            reference_taxon,
            min_sites: 0,
            cache: LruCache::new(DISTANCE_CACHE_CAPACITY),
            computations: AtomicUsize::new(0),
        })
    }

    pub fn for_taxon_name(
        matrix: Arc<GenotypeMatrix>,
        name: &str,
        color: Option<Rgb>,
    ) -> Result<Self> {
        let taxon = matrix
            .taxa()
            .index_of(name)
            .ok_or_else(|| GenoError::UnknownTaxon {
                name: name.to_string(),
            })?;
        Self::new(matrix, taxon, color)
    }

    /// Distances from fewer than `min_sites + 1` compared sites become NaN,
    /// which maps to byte 0.
    pub fn with_min_sites(mut self, min_sites: usize) -> Self {
        self.min_sites = min_sites;
        self.cache.clear();
        self
    }

    pub fn reference_taxon(&self) -> usize {
        self.reference_taxon
    }

    pub fn label_mut(&mut self) -> &mut MaskLabel {
        &mut self.label
    }

    /// Number of distances computed so far, cache misses only.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn cached_taxa(&self) -> usize {
        self.cache.len()
    }

    fn taxon_major(&self) -> &GenotypeMatrix {
        self.taxon_major.get_or_init(|| {
            if self.matrix.orientation().has_taxon_major() {
                Arc::clone(&self.matrix)
            } else {
                Arc::new(
                    self.matrix
                        .as_ref()
                        .clone()
                        .with_orientation(Orientation::TaxonMajor),
                )
            }
        })
    }

    /// Byte distance of one taxon row to the reference row.
    pub fn row_value(&self, taxon: usize) -> Result<u8> {
        if taxon >= self.matrix.n_taxa() {
            return Err(GenoError::out_of_range("taxon", taxon, self.matrix.n_taxa()));
        }
        if taxon == self.reference_taxon {
            return Ok(0);
        }
        self.cache.get_or_insert_with(taxon, || {
            self.computations.fetch_add(1, Ordering::Relaxed);
            let d = taxon_distance(
                self.taxon_major(),
                taxon,
                self.reference_taxon,
                self.min_sites,
            )?;
            trace!(
                taxon,
                reference = self.reference_taxon,
                distance = d.distance,
                sites = d.sites,
                "computed distance"
            );
            Ok(distance_byte(d.distance))
        })
    }
}

impl GenotypeMask for GeneticDistanceMask {
    fn label(&self) -> &MaskLabel {
        &self.label
    }

    fn mask(&self, taxon: usize, site: usize) -> Result<u8> {
        if site >= self.matrix.n_sites() {
            return Err(GenoError::out_of_range("site", site, self.matrix.n_sites()));
        }
        self.row_value(taxon)
    }
}
