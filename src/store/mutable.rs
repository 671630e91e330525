use super::{GenotypeMatrix, MatrixState, StoreConfig};
use crate::codec::{AlleleCodec, DiploidCall, NUM_NUCLEOTIDE_ALLELES};
use crate::error::{GenoError, Result};
use crate::model::{SiteInfo, Taxa};
use std::sync::Arc;
use tracing::debug;

/// Read depth per nucleotide allele for one cell.
pub type AlleleDepth = [u16; NUM_NUCLEOTIDE_ALLELES];

/// Unpacked, editable copy of a mutable matrix. Indexed `[site][taxon]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Staging {
    taxa: Taxa,
    sites: Vec<SiteInfo>,
    calls: Vec<Vec<DiploidCall>>,
    removal: Vec<bool>,
    depth: Option<Vec<Vec<AlleleDepth>>>,
}

impl Staging {
    fn check_site(&self, site: usize) -> Result<()> {
        if site >= self.sites.len() {
            return Err(GenoError::out_of_range("site", site, self.sites.len()));
        }
        Ok(())
    }

    fn check_taxon(&self, taxon: usize) -> Result<()> {
        if taxon >= self.taxa.len() {
            return Err(GenoError::out_of_range("taxon", taxon, self.taxa.len()));
        }
        Ok(())
    }
}

impl GenotypeMatrix {
    /// Empty mutable matrix over `taxa`; sites are added with [`GenotypeMatrix::add_site`].
    pub fn new_mutable(
        taxa: Taxa,
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate(codec.as_ref())?;
        let state = MatrixState::build(taxa.clone(), Vec::new(), &[], &config)?;
        let mut matrix = Self::from_state(codec, config, state);
        matrix.staging = Some(Staging {
            taxa,
            sites: Vec::new(),
            calls: Vec::new(),
            removal: Vec::new(),
            depth: None,
        });
        Ok(matrix)
    }

    /// Decode the packed planes into an editable copy. Unphased heterozygotes
    /// come back in rank order.
    pub fn into_mutable(mut self) -> Result<Self> {
        if self.staging.is_some() {
            return Ok(self);
        }
        let calls = (0..self.n_sites())
            .map(|site| self.site_calls(site))
            .collect::<Result<Vec<_>>>()?;
        self.staging = Some(Staging {
            taxa: self.state.taxa.clone(),
            sites: self.state.sites.clone(),
            removal: vec![false; calls.len()],
            calls,
            depth: self.state.depth.clone(),
        });
        Ok(self)
    }

    pub fn is_mutable(&self) -> bool {
        self.staging.is_some()
    }

    /// Whether staged edits are waiting for [`GenotypeMatrix::compact`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn staged_sites(&self) -> usize {
        self.staging.as_ref().map_or(self.n_sites(), |s| s.sites.len())
    }

    pub fn staged_taxa(&self) -> usize {
        self.staging.as_ref().map_or(self.n_taxa(), |s| s.taxa.len())
    }

    /// Run one staged edit; the matrix only becomes dirty when it succeeds.
    fn mutate<T>(
        &mut self,
        operation: &'static str,
        edit: impl FnOnce(&mut Staging) -> Result<T>,
    ) -> Result<T> {
        let staging = self
            .staging
            .as_mut()
            .ok_or(GenoError::UnsupportedMutation { operation })?;
        let out = edit(staging)?;
        self.dirty = true;
        Ok(out)
    }

    /// Append a site whose calls are all unknown. Returns its staged index.
    pub fn add_site(&mut self, info: SiteInfo) -> Result<usize> {
        self.mutate("add_site", |staging| {
            let n_taxa = staging.taxa.len();
            staging.sites.push(info);
            staging.calls.push(vec![DiploidCall::UNKNOWN; n_taxa]);
            staging.removal.push(false);
            if let Some(depth) = staging.depth.as_mut() {
                depth.push(vec![[0; NUM_NUCLEOTIDE_ALLELES]; n_taxa]);
            }
            Ok(staging.sites.len() - 1)
        })
    }

    /// Append a taxon with unknown calls at every site.
    pub fn add_taxon(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        self.mutate("add_taxon", |staging| {
            let idx = staging.taxa.push(name)?;
            for column in &mut staging.calls {
                column.push(DiploidCall::UNKNOWN);
            }
            if let Some(depth) = staging.depth.as_mut() {
                for column in depth {
                    column.push([0; NUM_NUCLEOTIDE_ALLELES]);
                }
            }
            Ok(idx)
        })
    }

    /// Drop a staged site immediately; later staged indices shift down.
    pub fn remove_site(&mut self, site: usize) -> Result<()> {
        self.mutate("remove_site", |staging| {
            staging.check_site(site)?;
            staging.sites.remove(site);
            staging.calls.remove(site);
            staging.removal.remove(site);
            if let Some(depth) = staging.depth.as_mut() {
                depth.remove(site);
            }
            Ok(())
        })
    }

    /// Mark a site to be dropped by the next compact; indices stay stable until then.
    pub fn clear_site_for_removal(&mut self, site: usize) -> Result<()> {
        self.mutate("clear_site_for_removal", |staging| {
            staging.check_site(site)?;
            staging.removal[site] = true;
            staging.calls[site].fill(DiploidCall::UNKNOWN);
            Ok(())
        })
    }

    pub fn set_call(&mut self, taxon: usize, site: usize, call: DiploidCall) -> Result<()> {
        self.mutate("set_call", |staging| {
            staging.check_taxon(taxon)?;
            staging.check_site(site)?;
            staging.calls[site][taxon] = call;
            Ok(())
        })
    }

    pub fn set_call_token(&mut self, taxon: usize, site: usize, token: &str) -> Result<()> {
        let call = self.codec.encode(token).map_err(|e| e.at(taxon, site))?;
        self.set_call(taxon, site, call)
    }

    pub fn set_site_info(&mut self, site: usize, info: SiteInfo) -> Result<()> {
        self.mutate("set_site_info", |staging| {
            staging.check_site(site)?;
            staging.sites[site] = info;
            Ok(())
        })
    }

    pub fn set_depth(&mut self, taxon: usize, site: usize, depth: AlleleDepth) -> Result<()> {
        self.mutate("set_depth", |staging| {
            staging.check_taxon(taxon)?;
            staging.check_site(site)?;
            let (n_taxa, n_sites) = (staging.taxa.len(), staging.sites.len());
            let cells = staging
                .depth
                .get_or_insert_with(|| vec![vec![[0; NUM_NUCLEOTIDE_ALLELES]; n_taxa]; n_sites]);
            cells[site][taxon] = depth;
            Ok(())
        })
    }

    /// Drop sites marked for removal, sort the rest by (locus, position), re-rank
    /// and re-pack every plane, then swap the new state in. A clean or fixed
    /// matrix is left untouched.
    pub fn compact(&mut self) -> Result<()> {
        let Some(staging) = self.staging.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..staging.sites.len())
            .filter(|&site| !staging.removal[site])
            .collect();
        order.sort_by(|&a, &b| staging.sites[a].physical_cmp(&staging.sites[b]));

        let sites: Vec<SiteInfo> = order.iter().map(|&s| staging.sites[s].clone()).collect();
        let calls: Vec<Vec<DiploidCall>> =
            order.iter().map(|&s| staging.calls[s].clone()).collect();
        let depth: Option<Vec<Vec<AlleleDepth>>> = staging
            .depth
            .as_ref()
            .map(|d| order.iter().map(|&s| d[s].clone()).collect());

        let mut state =
            MatrixState::build(staging.taxa.clone(), sites.clone(), &calls, &self.config)?;
        state.depth = depth.clone();
        let next = Staging {
            taxa: staging.taxa.clone(),
            removal: vec![false; sites.len()],
            sites,
            calls,
            depth,
        };
        debug!(
            dropped = staging.sites.len() - order.len(),
            n_sites = order.len(),
            n_taxa = next.taxa.len(),
            "compacted genotype matrix"
        );

        self.state = state;
        self.staging = Some(next);
        self.dirty = false;
        Ok(())
    }
}
