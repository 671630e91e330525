use super::{GenotypeMatrix, MatrixState, Planes, StoreConfig};
use crate::bits::{BitPlane, WORD_BITS};
use crate::codec::{AlleleCodec, DiploidCall, RARE_ALLELE, UNKNOWN_ALLELE};
use crate::error::{GenoError, Result};
use crate::model::{SiteInfo, Taxa};
use crate::ranker::SiteAlleles;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Output of one worker: the ranked alleles and planes for at most 64 sites.
struct PackedBlock {
    start_site: usize,
    alleles: Vec<SiteAlleles>,
    /// `[site offset][layer][plane]`, each plane over taxa
    site_major: Option<Vec<Vec<Vec<BitPlane>>>>,
    /// `[layer][plane][taxon]`, one word holding the block's site bits
    taxon_major: Option<Vec<Vec<Vec<u64>>>>,
}

/// Plane index for every allele code at a site; `None` sets no bit.
fn plane_lookup(alleles: &SiteAlleles, config: &StoreConfig) -> [Option<usize>; 16] {
    let rare = config.rare_plane();
    let mut lookup = [rare; 16];
    lookup[UNKNOWN_ALLELE as usize] = None;
    lookup[RARE_ALLELE as usize] = rare;
    for (rank, count) in alleles.ranked().iter().enumerate() {
        lookup[count.allele as usize] = Some(rank);
    }
    lookup
}

fn pack_block(
    start_site: usize,
    columns: &[Vec<DiploidCall>],
    n_taxa: usize,
    config: &StoreConfig,
) -> PackedBlock {
    debug_assert!(columns.len() <= WORD_BITS);
    let (n_layers, n_planes) = (config.num_layers(), config.num_planes());
    let mut alleles = Vec::with_capacity(columns.len());
    let mut site_major = config
        .orientation
        .has_site_major()
        .then(|| Vec::with_capacity(columns.len()));
    let mut taxon_major = config
        .orientation
        .has_taxon_major()
        .then(|| vec![vec![vec![0u64; n_taxa]; n_planes]; n_layers]);

    for (offset, column) in columns.iter().enumerate() {
        let ranked = SiteAlleles::rank(column.iter().copied(), config.max_alleles);
        let lookup = plane_lookup(&ranked, config);
        let mut planes = site_major
            .as_ref()
            .map(|_| vec![vec![BitPlane::new(n_taxa); n_planes]; n_layers]);

        for (taxon, call) in column.iter().enumerate() {
            for (gamete, allele) in call.alleles().into_iter().enumerate() {
                let Some(plane) = lookup[allele as usize] else {
                    continue;
                };
                let layer = if config.phased { gamete } else { 0 };
                if let Some(planes) = planes.as_mut() {
                    planes[layer][plane].set(taxon);
                }
                if let Some(words) = taxon_major.as_mut() {
                    words[layer][plane][taxon] |= 1u64 << offset;
                }
            }
        }

        if let (Some(out), Some(planes)) = (site_major.as_mut(), planes) {
            out.push(planes);
        }
        alleles.push(ranked);
    }

    PackedBlock {
        start_site,
        alleles,
        site_major,
        taxon_major,
    }
}

/// Collects worker blocks into full planes. Blocks never overlap, so each one
/// only moves whole site planes or whole words into place.
struct Assembler {
    alleles: Vec<Option<SiteAlleles>>,
    site_major: Option<Planes>,
    taxon_major: Option<Planes>,
}

impl Assembler {
    fn new(n_taxa: usize, n_sites: usize, config: StoreConfig) -> Self {
        Self {
            alleles: vec![None; n_sites],
            site_major: config
                .orientation
                .has_site_major()
                .then(|| Planes::empty(&config, n_sites, n_taxa)),
            taxon_major: config
                .orientation
                .has_taxon_major()
                .then(|| Planes::empty(&config, n_taxa, n_sites)),
        }
    }

    fn apply(&mut self, block: PackedBlock) {
        let start = block.start_site;
        if let (Some(planes), Some(sites)) = (self.site_major.as_mut(), block.site_major) {
            for (offset, layers) in sites.into_iter().enumerate() {
                for (layer, site_planes) in layers.into_iter().enumerate() {
                    for (plane, bits) in site_planes.into_iter().enumerate() {
                        planes.layers[layer][plane][start + offset] = bits;
                    }
                }
            }
        }
        if let (Some(planes), Some(words)) = (self.taxon_major.as_mut(), block.taxon_major) {
            let word = start / WORD_BITS;
            for (layer, layer_words) in words.into_iter().enumerate() {
                for (plane, taxon_words) in layer_words.into_iter().enumerate() {
                    for (taxon, value) in taxon_words.into_iter().enumerate() {
                        planes.layers[layer][plane][taxon].set_word(word, value);
                    }
                }
            }
        }
        for (offset, alleles) in block.alleles.into_iter().enumerate() {
            self.alleles[start + offset] = Some(alleles);
        }
    }

    fn first_packed(&self, sites: Range<usize>) -> Option<usize> {
        let start = sites.start;
        self.alleles[sites]
            .iter()
            .position(Option::is_some)
            .map(|offset| start + offset)
    }

    fn packed_sites(&self) -> usize {
        self.alleles.iter().filter(|a| a.is_some()).count()
    }

    fn finish(self, taxa: Taxa, sites: Vec<SiteInfo>) -> Result<MatrixState> {
        let packed = self.packed_sites();
        if packed != sites.len() {
            return Err(GenoError::DimensionMismatch {
                what: "packed sites",
                expected: sites.len(),
                found: packed,
            });
        }
        Ok(MatrixState {
            taxa,
            sites,
            alleles: self.alleles.into_iter().flatten().collect(),
            site_major: self.site_major,
            taxon_major: self.taxon_major,
            depth: None,
        })
    }
}

fn check_columns(columns: &[Vec<DiploidCall>], n_taxa: usize) -> Result<()> {
    match columns.iter().find(|c| c.len() != n_taxa) {
        Some(column) => Err(GenoError::DimensionMismatch {
            what: "taxa per site",
            expected: n_taxa,
            found: column.len(),
        }),
        None => Ok(()),
    }
}

/// Pack `columns` starting at `start_site` as disjoint 64-site blocks on the
/// current rayon pool.
fn pack_parallel(
    start_site: usize,
    columns: &[Vec<DiploidCall>],
    n_taxa: usize,
    config: &StoreConfig,
) -> Vec<PackedBlock> {
    columns
        .par_chunks(WORD_BITS)
        .enumerate()
        .map(|(i, chunk)| pack_block(start_site + i * WORD_BITS, chunk, n_taxa, config))
        .collect()
}

impl MatrixState {
    /// Rank and pack a complete site-major call matrix whose shape was already checked.
    pub(crate) fn build(
        taxa: Taxa,
        sites: Vec<SiteInfo>,
        columns: &[Vec<DiploidCall>],
        config: &StoreConfig,
    ) -> Result<Self> {
        let mut assembler = Assembler::new(taxa.len(), sites.len(), *config);
        for block in pack_parallel(0, columns, taxa.len(), config) {
            assembler.apply(block);
        }
        assembler.finish(taxa, sites)
    }
}

/// Incremental packing for loaders that produce sites block by block.
pub struct Packer {
    taxa: Taxa,
    sites: Vec<SiteInfo>,
    codec: Arc<dyn AlleleCodec>,
    config: StoreConfig,
    assembler: Assembler,
}

impl Packer {
    pub fn new(
        taxa: Taxa,
        sites: Vec<SiteInfo>,
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate(codec.as_ref())?;
        let assembler = Assembler::new(taxa.len(), sites.len(), config);
        Ok(Self {
            taxa,
            sites,
            codec,
            config,
            assembler,
        })
    }

    /// Pack `block[site offset][taxon]` at `start_site`. Every check runs before
    /// any plane is written.
    pub fn pack_block(&mut self, start_site: usize, block: &[Vec<DiploidCall>]) -> Result<()> {
        if self.config.orientation.has_taxon_major() && start_site % WORD_BITS != 0 {
            return Err(GenoError::UnalignedBlockError { start_site });
        }
        let n_sites = self.sites.len();
        let end_site = start_site
            .checked_add(block.len())
            .filter(|&end| end <= n_sites)
            .ok_or_else(|| {
                let last = start_site
                    .checked_add(block.len())
                    .map_or(start_site, |end| end.saturating_sub(1));
                GenoError::out_of_range("site", last, n_sites)
            })?;
        if let Some(site) = self.assembler.first_packed(start_site..end_site) {
            return Err(GenoError::BlockOverlap { site });
        }
        check_columns(block, self.taxa.len())?;

        debug!(start_site, n_sites = block.len(), "packing block");
        for packed in pack_parallel(start_site, block, self.taxa.len(), &self.config) {
            self.assembler.apply(packed);
        }
        Ok(())
    }

    pub fn packed_sites(&self) -> usize {
        self.assembler.packed_sites()
    }

    pub fn finish(self) -> Result<GenotypeMatrix> {
        let state = self.assembler.finish(self.taxa, self.sites)?;
        Ok(GenotypeMatrix::from_state(self.codec, self.config, state))
    }
}

impl GenotypeMatrix {
    pub(crate) fn from_state(
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
        state: MatrixState,
    ) -> Self {
        Self {
            codec,
            config,
            state,
            staging: None,
            dirty: false,
            genetic_map: None,
        }
    }

    /// Build a fixed matrix from site-major calls, `calls[site][taxon]`.
    pub fn pack(
        taxa: Taxa,
        sites: Vec<SiteInfo>,
        calls: &[Vec<DiploidCall>],
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate(codec.as_ref())?;
        if calls.len() != sites.len() {
            return Err(GenoError::DimensionMismatch {
                what: "sites",
                expected: sites.len(),
                found: calls.len(),
            });
        }
        check_columns(calls, taxa.len())?;

        debug!(
            n_taxa = taxa.len(),
            n_sites = sites.len(),
            ?config,
            "packing genotype matrix"
        );
        let state = MatrixState::build(taxa, sites, calls, &config)?;
        Ok(Self::from_state(codec, config, state))
    }

    /// Parse textual tokens with the codec, then pack.
    pub fn pack_tokens<S>(
        taxa: Taxa,
        sites: Vec<SiteInfo>,
        tokens: &[Vec<S>],
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
    ) -> Result<Self>
    where
        S: AsRef<str> + Sync,
    {
        if tokens.len() != sites.len() {
            return Err(GenoError::DimensionMismatch {
                what: "sites",
                expected: sites.len(),
                found: tokens.len(),
            });
        }
        let calls = tokens
            .par_iter()
            .enumerate()
            .map(|(site, row)| {
                if row.len() != taxa.len() {
                    return Err(GenoError::DimensionMismatch {
                        what: "taxa per site",
                        expected: taxa.len(),
                        found: row.len(),
                    });
                }
                row.iter()
                    .enumerate()
                    .map(|(taxon, token)| {
                        codec
                            .encode(token.as_ref())
                            .map_err(|e| e.at(taxon, site))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Self::pack(taxa, sites, &calls, codec, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NucleotideCodec;
    use crate::model::Orientation;
    use crate::store::tests::{calls, sites, taxa};

    fn packer(n_taxa: usize, n_sites: usize, orientation: Orientation) -> Packer {
        let config = StoreConfig {
            orientation,
            ..StoreConfig::default()
        };
        Packer::new(taxa(n_taxa), sites(n_sites), Arc::new(NucleotideCodec), config).unwrap()
    }

    fn block(n_sites: usize, n_taxa: usize) -> Vec<Vec<DiploidCall>> {
        (0..n_sites)
            .map(|s| {
                (0..n_taxa)
                    .map(|t| {
                        if (s + t) % 2 == 0 {
                            DiploidCall(0x00)
                        } else {
                            DiploidCall(0x22)
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn unaligned_taxon_major_block_is_rejected() {
        let mut packer = packer(3, 128, Orientation::TaxonMajor);
        let err = packer.pack_block(50, &block(20, 3)).unwrap_err();
        match err {
            GenoError::UnalignedBlockError { start_site } => assert_eq!(start_site, 50),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(packer.packed_sites(), 0);
        let planes = packer.assembler.taxon_major.as_ref().unwrap();
        assert!(
            planes.layers.iter().flatten().flatten().all(|p| p.cardinality() == 0),
            "no plane may be touched by a rejected block"
        );
    }

    #[test]
    fn unaligned_block_is_fine_for_site_major() {
        let mut packer = packer(3, 70, Orientation::SiteMajor);
        packer.pack_block(50, &block(20, 3)).unwrap();
        packer.pack_block(0, &block(50, 3)).unwrap();
        let matrix = packer.finish().unwrap();
        assert_eq!(matrix.n_sites(), 70);
    }

    #[test]
    fn blocks_assemble_like_a_single_pack() {
        let all = block(150, 4);
        let mut packer = packer(4, 150, Orientation::Both);
        packer.pack_block(128, &all[128..]).unwrap();
        packer.pack_block(0, &all[..128]).unwrap();
        let blocked = packer.finish().unwrap();

        let whole = GenotypeMatrix::pack(
            taxa(4),
            sites(150),
            &all,
            Arc::new(NucleotideCodec),
            StoreConfig::default(),
        )
        .unwrap();
        assert_eq!(blocked.state, whole.state);
    }

    #[test]
    fn unfinished_packer_reports_missing_sites() {
        let mut packer = packer(2, 100, Orientation::Both);
        packer.pack_block(0, &block(64, 2)).unwrap();
        match packer.finish().unwrap_err() {
            GenoError::DimensionMismatch {
                expected, found, ..
            } => assert_eq!((expected, found), (100, 64)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn block_past_the_end_is_rejected() {
        let mut packer = packer(2, 64, Orientation::Both);
        assert!(matches!(
            packer.pack_block(0, &block(65, 2)),
            Err(GenoError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn repacking_a_site_is_rejected() {
        let mut packer = packer(2, 100, Orientation::SiteMajor);
        packer.pack_block(0, &block(64, 2)).unwrap();
        match packer.pack_block(60, &block(10, 2)).unwrap_err() {
            GenoError::BlockOverlap { site } => assert_eq!(site, 60),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(packer.packed_sites(), 64);
        packer.pack_block(64, &block(36, 2)).unwrap();
        assert_eq!(packer.finish().unwrap().n_sites(), 100);
    }

    #[test]
    fn block_start_near_usize_max_is_out_of_range() {
        let mut packer = packer(2, 10, Orientation::SiteMajor);
        match packer.pack_block(usize::MAX, &block(2, 2)).unwrap_err() {
            GenoError::IndexOutOfRange { what, index, len } => {
                assert_eq!((what, index, len), ("site", usize::MAX, 10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pack_rejects_wrong_dimensions() {
        let err = GenotypeMatrix::pack(
            taxa(3),
            sites(2),
            &calls(&[&["A", "C", "G"]]),
            Arc::new(NucleotideCodec),
            StoreConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenoError::DimensionMismatch {
                what: "sites",
                expected: 2,
                found: 1
            }
        ));

        let err = GenotypeMatrix::pack(
            taxa(3),
            sites(1),
            &calls(&[&["A", "C"]]),
            Arc::new(NucleotideCodec),
            StoreConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GenoError::DimensionMismatch {
                what: "taxa per site",
                ..
            }
        ));
    }

    #[test]
    fn pack_tokens_reports_coordinates() {
        let tokens = vec![vec!["A", "C"], vec!["G", "QQ"]];
        let err = GenotypeMatrix::pack_tokens(
            taxa(2),
            sites(2),
            &tokens,
            Arc::new(NucleotideCodec),
            StoreConfig::default(),
        )
        .unwrap_err();
        match err {
            GenoError::InvalidAlleleSymbol { token, taxon, site } => {
                assert_eq!(token, "QQ");
                assert_eq!((taxon, site), (Some(1), Some(1)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StoreConfig {
            max_alleles: 7,
            ..StoreConfig::default()
        };
        assert!(matches!(
            Packer::new(taxa(2), sites(1), Arc::new(NucleotideCodec), config),
            Err(GenoError::InvalidConfig { .. })
        ));
    }
}
