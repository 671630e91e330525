mod mutable;
mod pack;

pub use mutable::AlleleDepth;
pub use pack::Packer;

use crate::bits::{BitPlane, transpose, words_for};
use crate::codec::{Allele, AlleleCodec, DiploidCall, RARE_ALLELE, UNKNOWN_ALLELE};
use crate::error::{GenoError, Result};
use crate::genetic_map::GeneticMap;
use crate::model::{Gamete, Orientation, SiteInfo, Taxa};
use crate::ranker::SiteAlleles;
use mutable::Staging;
use std::borrow::Cow;
use std::sync::Arc;

/// Packing parameters shared by every site of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub max_alleles: usize,
    pub retain_rare: bool,
    pub phased: bool,
    pub orientation: Orientation,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_alleles: 2,
            retain_rare: false,
            phased: false,
            orientation: Orientation::Both,
        }
    }
}

impl StoreConfig {
    /// Ranked planes plus the rare plane when it is kept.
    pub fn num_planes(&self) -> usize {
        self.max_alleles + usize::from(self.retain_rare)
    }

    /// Gamete layers: one when unphased, two when phased.
    pub fn num_layers(&self) -> usize {
        if self.phased { 2 } else { 1 }
    }

    pub fn rare_plane(&self) -> Option<usize> {
        self.retain_rare.then_some(self.max_alleles)
    }

    pub fn validate(&self, codec: &dyn AlleleCodec) -> Result<()> {
        if self.max_alleles == 0 || self.max_alleles > codec.max_alleles() {
            return Err(GenoError::InvalidConfig {
                reason: format!(
                    "max alleles must be between 1 and {} (got {})",
                    codec.max_alleles(),
                    self.max_alleles
                ),
            });
        }
        Ok(())
    }
}

/// Presence planes for one orientation, indexed `[layer][plane][row]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Planes {
    layers: Vec<Vec<Vec<BitPlane>>>,
}

impl Planes {
    fn empty(config: &StoreConfig, n_rows: usize, row_len: usize) -> Self {
        let rows = vec![BitPlane::new(row_len); n_rows];
        Self {
            layers: vec![vec![rows; config.num_planes()]; config.num_layers()],
        }
    }

    fn row(&self, layer: usize, plane: usize, row: usize) -> &BitPlane {
        &self.layers[layer][plane][row]
    }

    fn transposed(&self, row_len: usize) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|planes| planes.iter().map(|rows| transpose(rows, row_len)).collect())
                .collect(),
        }
    }

    /// Union of the gamete layers for one plane and row.
    fn merged_row(&self, plane: usize, row: usize) -> Cow<'_, BitPlane> {
        match self.layers.as_slice() {
            [single] => Cow::Borrowed(&single[plane][row]),
            layers => {
                let mut merged = layers[0][plane][row].clone();
                for layer in &layers[1..] {
                    merged.union_with(&layer[plane][row]);
                }
                Cow::Owned(merged)
            }
        }
    }
}

/// Queryable, packed state. Replaced wholesale by compact.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatrixState {
    taxa: Taxa,
    sites: Vec<SiteInfo>,
    alleles: Vec<SiteAlleles>,
    site_major: Option<Planes>,
    taxon_major: Option<Planes>,
    depth: Option<Vec<Vec<AlleleDepth>>>,
}

/// Bit-packed diploid genotypes for taxa × sites.
#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    codec: Arc<dyn AlleleCodec>,
    config: StoreConfig,
    state: MatrixState,
    staging: Option<Staging>,
    dirty: bool,
    genetic_map: Option<Arc<GeneticMap>>,
}

impl GenotypeMatrix {
    pub fn codec(&self) -> &dyn AlleleCodec {
        self.codec.as_ref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_phased(&self) -> bool {
        self.config.phased
    }

    pub fn orientation(&self) -> Orientation {
        match (self.state.site_major.is_some(), self.state.taxon_major.is_some()) {
            (true, true) => Orientation::Both,
            (false, true) => Orientation::TaxonMajor,
            _ => Orientation::SiteMajor,
        }
    }

    pub fn taxa(&self) -> &Taxa {
        &self.state.taxa
    }

    pub fn n_taxa(&self) -> usize {
        self.state.taxa.len()
    }

    pub fn n_sites(&self) -> usize {
        self.state.sites.len()
    }

    pub fn sites(&self) -> &[SiteInfo] {
        &self.state.sites
    }

    pub fn site(&self, site: usize) -> Result<&SiteInfo> {
        self.check_site(site)?;
        Ok(&self.state.sites[site])
    }

    fn check_site(&self, site: usize) -> Result<()> {
        if site >= self.n_sites() {
            return Err(GenoError::out_of_range("site", site, self.n_sites()));
        }
        Ok(())
    }

    fn check_taxon(&self, taxon: usize) -> Result<()> {
        if taxon >= self.n_taxa() {
            return Err(GenoError::out_of_range("taxon", taxon, self.n_taxa()));
        }
        Ok(())
    }

    fn check_plane(&self, rank: usize) -> Result<()> {
        if rank >= self.config.num_planes() {
            return Err(GenoError::out_of_range(
                "allele rank",
                rank,
                self.config.num_planes(),
            ));
        }
        Ok(())
    }

    fn is_set(&self, layer: usize, plane: usize, taxon: usize, site: usize) -> bool {
        match (&self.state.site_major, &self.state.taxon_major) {
            (Some(planes), _) => planes.row(layer, plane, site).get(taxon),
            (None, Some(planes)) => planes.row(layer, plane, taxon).get(site),
            (None, None) => false,
        }
    }

    /// First set plane in rank order for one gamete layer.
    fn scan_layer(&self, layer: usize, taxon: usize, site: usize) -> Allele {
        let alleles = &self.state.alleles[site];
        for rank in 0..alleles.len() {
            if self.is_set(layer, rank, taxon, site) {
                return alleles.ranked()[rank].allele;
            }
        }
        match self.config.rare_plane() {
            Some(rare) if self.is_set(layer, rare, taxon, site) => RARE_ALLELE,
            _ => UNKNOWN_ALLELE,
        }
    }

    /// Rebuild the diploid call from the presence planes. Unphased matrices
    /// return the alleles in rank order.
    pub fn get_diploid(&self, taxon: usize, site: usize) -> Result<DiploidCall> {
        self.check_taxon(taxon)?;
        self.check_site(site)?;

        if self.config.phased {
            return Ok(DiploidCall::from_alleles(
                self.scan_layer(0, taxon, site),
                self.scan_layer(1, taxon, site),
            ));
        }

        let alleles = &self.state.alleles[site];
        let mut result = [UNKNOWN_ALLELE; 2];
        let mut found = 0;
        for rank in 0..alleles.len() {
            if found == 2 {
                break;
            }
            if self.is_set(0, rank, taxon, site) {
                let allele = alleles.ranked()[rank].allele;
                if found == 0 {
                    result = [allele, allele];
                } else {
                    result[1] = allele;
                }
                found += 1;
            }
        }
        if let Some(rare) = self.config.rare_plane() {
            if found < 2 && self.is_set(0, rare, taxon, site) {
                if found == 0 {
                    result = [RARE_ALLELE, RARE_ALLELE];
                } else {
                    result[1] = RARE_ALLELE;
                }
            }
        }
        Ok(DiploidCall::from_alleles(result[0], result[1]))
    }

    /// Rendered with the matrix codec.
    pub fn get_diploid_string(&self, taxon: usize, site: usize) -> Result<String> {
        Ok(self.codec.render(self.get_diploid(taxon, site)?))
    }

    pub fn site_calls(&self, site: usize) -> Result<Vec<DiploidCall>> {
        self.check_site(site)?;
        (0..self.n_taxa())
            .map(|taxon| self.get_diploid(taxon, site))
            .collect()
    }

    fn site_planes(&self) -> Result<&Planes> {
        self.state
            .site_major
            .as_ref()
            .ok_or(GenoError::MissingOrientation {
                orientation: "site-major",
            })
    }

    fn taxon_planes(&self) -> Result<&Planes> {
        self.state
            .taxon_major
            .as_ref()
            .ok_or(GenoError::MissingOrientation {
                orientation: "taxon-major",
            })
    }

    /// Bit per taxon for one ranked allele at a site. Phased matrices give the
    /// union of both gametes.
    pub fn allele_presence_for_all_taxa(
        &self,
        site: usize,
        rank: usize,
    ) -> Result<Cow<'_, BitPlane>> {
        self.check_site(site)?;
        self.check_plane(rank)?;
        Ok(self.site_planes()?.merged_row(rank, site))
    }

    pub fn phased_allele_presence_for_all_taxa(
        &self,
        site: usize,
        gamete: Gamete,
        rank: usize,
    ) -> Result<&BitPlane> {
        self.check_site(site)?;
        self.check_plane(rank)?;
        let layer = self.layer_for(gamete);
        Ok(self.site_planes()?.row(layer, rank, site))
    }

    /// Bit per site for one ranked allele in a taxon.
    pub fn allele_presence_for_all_sites(
        &self,
        taxon: usize,
        rank: usize,
    ) -> Result<Cow<'_, BitPlane>> {
        self.check_taxon(taxon)?;
        self.check_plane(rank)?;
        Ok(self.taxon_planes()?.merged_row(rank, taxon))
    }

    pub fn phased_allele_presence_for_all_sites(
        &self,
        taxon: usize,
        gamete: Gamete,
        rank: usize,
    ) -> Result<&BitPlane> {
        self.check_taxon(taxon)?;
        self.check_plane(rank)?;
        let layer = self.layer_for(gamete);
        Ok(self.taxon_planes()?.row(layer, rank, taxon))
    }

    /// Raw words `[start_word, end_word)` of a taxon's presence row.
    pub fn allele_presence_for_sites_block(
        &self,
        taxon: usize,
        rank: usize,
        start_word: usize,
        end_word: usize,
    ) -> Result<Cow<'_, [u64]>> {
        let n_words = words_for(self.n_sites());
        if start_word > end_word {
            return Err(GenoError::out_of_range("word", start_word, end_word));
        }
        if end_word > n_words {
            return Err(GenoError::out_of_range("word", end_word, n_words));
        }
        Ok(match self.allele_presence_for_all_sites(taxon, rank)? {
            Cow::Borrowed(row) => Cow::Borrowed(&row.words()[start_word..end_word]),
            Cow::Owned(row) => Cow::Owned(row.words()[start_word..end_word].to_vec()),
        })
    }

    fn layer_for(&self, gamete: Gamete) -> usize {
        if self.config.phased { gamete.index() } else { 0 }
    }

    pub fn site_alleles(&self, site: usize) -> Result<&SiteAlleles> {
        self.check_site(site)?;
        Ok(&self.state.alleles[site])
    }

    pub fn major_allele(&self, site: usize) -> Result<Allele> {
        Ok(self.site_alleles(site)?.major())
    }

    pub fn minor_allele(&self, site: usize) -> Result<Allele> {
        Ok(self.site_alleles(site)?.minor())
    }

    pub fn allele_frequency(&self, site: usize, rank: usize) -> Result<f64> {
        Ok(self.site_alleles(site)?.frequency(rank))
    }

    pub fn major_allele_frequency(&self, site: usize) -> Result<f64> {
        Ok(self.site_alleles(site)?.major_frequency())
    }

    pub fn minor_allele_frequency(&self, site: usize) -> Result<f64> {
        Ok(self.site_alleles(site)?.minor_frequency())
    }

    pub fn total_gametes_not_missing(&self, site: usize) -> Result<u32> {
        Ok(self.site_alleles(site)?.total_gametes())
    }

    pub fn is_polymorphic(&self, site: usize) -> Result<bool> {
        Ok(self.site_alleles(site)?.is_polymorphic())
    }

    pub fn is_heterozygous(&self, taxon: usize, site: usize) -> Result<bool> {
        Ok(self.get_diploid(taxon, site)?.is_heterozygous())
    }

    pub fn heterozygous_count(&self, site: usize) -> Result<usize> {
        self.check_site(site)?;
        match &self.state.site_major {
            Some(planes) if !self.config.phased => {
                // A taxon is heterozygous when two planes of the site are set
                let rows: Vec<&BitPlane> = (0..self.config.num_planes())
                    .map(|plane| planes.row(0, plane, site))
                    .collect();
                let mut het = BitPlane::new(self.n_taxa());
                for (i, a) in rows.iter().enumerate() {
                    for b in &rows[i + 1..] {
                        let mut both = (*a).clone();
                        both.intersect_with(b);
                        het.union_with(&both);
                    }
                }
                Ok(het.cardinality())
            }
            _ => {
                let mut count = 0;
                for taxon in 0..self.n_taxa() {
                    if self.get_diploid(taxon, site)?.is_heterozygous() {
                        count += 1;
                    }
                }
                Ok(count)
            }
        }
    }

    /// Per-allele read depth for a cell, when depth was recorded.
    pub fn depth(&self, taxon: usize, site: usize) -> Result<Option<AlleleDepth>> {
        self.check_taxon(taxon)?;
        self.check_site(site)?;
        Ok(self.state.depth.as_ref().map(|d| d[site][taxon]))
    }

    /// Keep exactly the requested layouts, transposing to build a missing one.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        let (n_taxa, n_sites) = (self.n_taxa(), self.n_sites());
        if orientation.has_taxon_major() && self.state.taxon_major.is_none() {
            self.state.taxon_major = self.state.site_major.as_ref().map(|p| p.transposed(n_taxa));
        }
        if orientation.has_site_major() && self.state.site_major.is_none() {
            self.state.site_major = self.state.taxon_major.as_ref().map(|p| p.transposed(n_sites));
        }
        if !orientation.has_site_major() {
            self.state.site_major = None;
        }
        if !orientation.has_taxon_major() {
            self.state.taxon_major = None;
        }
        self.config.orientation = orientation;
        self
    }

    pub fn with_genetic_map(mut self, map: Arc<GeneticMap>) -> Self {
        self.genetic_map = Some(map);
        self
    }

    pub fn genetic_map(&self) -> Option<&GeneticMap> {
        self.genetic_map.as_deref()
    }

    /// Interpolated genetic position of a site, if a map is attached and the
    /// site has a physical position.
    pub fn genetic_position(&self, site: usize) -> Result<Option<f64>> {
        let info = self.site(site)?;
        match (&self.genetic_map, info.position) {
            (Some(map), Some(position)) => {
                map.genetic_from_physical(&info.locus, position).map(Some)
            }
            _ => Ok(None),
        }
    }
}
