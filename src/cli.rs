use crate::{DistanceArgs, InputArgs, SummaryArgs};
use genobits::codec::NucleotideCodec;
use genobits::error::{GenoError, Result};
use genobits::ibs::DistanceMatrix;
use genobits::mask::{ColorSequence, GeneticDistanceMask, GenotypeMask, ReferenceMask};
use genobits::output::{
    write_ibs_distances, write_ibs_npz, write_reference_mask, write_site_summary,
};
use genobits::reader::GenotypeTable;
use genobits::store::{GenotypeMatrix, StoreConfig};
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const PARALLEL_THRESHOLD: usize = 500;

impl InputArgs {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_alleles: self.max_alleles,
            retain_rare: self.retain_rare,
            phased: false,
            orientation: self.orientation,
        }
    }
}

fn load_matrix(input: &InputArgs) -> Result<GenotypeMatrix> {
    let table = GenotypeTable::read(&input.input)?;
    info!(
        "Read {} taxa x {} sites from {}",
        table.n_taxa(),
        table.n_sites(),
        input.input.display()
    );
    table.into_matrix(Arc::new(NucleotideCodec), input.store_config())
}

/// Run `f` inside a dedicated pool when a thread count was requested.
fn with_threads<T, F>(threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    match threads {
        Some(n) => ThreadPoolBuilder::new().num_threads(n).build()?.install(f),
        None => f(),
    }
}

pub fn run_summary(args: &SummaryArgs, output_dir: &Path) -> Result<()> {
    with_threads(args.input.threads, || {
        let matrix = load_matrix(&args.input)?;
        let summary_path = output_dir.join("site_summary.csv");
        info!("Writing site summary to {}...", summary_path.display());
        write_site_summary(&matrix, &summary_path)
    })
}

pub fn run_distance(args: &DistanceArgs, output_dir: &Path) -> Result<()> {
    let threads = args.input.threads;
    with_threads(threads, || {
        let matrix = load_matrix(&args.input)?;
        if matrix.n_taxa() < 2 {
            return Err(GenoError::TaxonCount {
                n_taxa: matrix.n_taxa(),
            });
        }
        if matrix.n_sites() == 0 {
            return Err(GenoError::SiteCount { n_sites: 0 });
        }

        let distances =
            if (threads.is_none() && matrix.n_taxa() < PARALLEL_THRESHOLD) || threads == Some(1) {
                DistanceMatrix::compute(&matrix, args.min_sites, false, true)?
            } else {
                DistanceMatrix::compute_parallel(&matrix, args.min_sites, false, true)?
            };
        info!(
            "Average sites compared per pair: {:.1}",
            distances.average_sites()
        );

        if args.npz {
            let npz_path = output_dir.join("ibs_distances.npz");
            info!("Writing pairwise distances to {}...", npz_path.display());
            write_ibs_npz(&distances, &npz_path)?;
        } else {
            let csv_path = output_dir.join("ibs_distances.csv");
            info!("Writing pairwise distances to {}...", csv_path.display());
            write_ibs_distances(&distances, &csv_path)?;
        }

        if let Some(name) = &args.reference_taxon {
            let taxon = matrix
                .taxa()
                .index_of(name)
                .ok_or_else(|| GenoError::UnknownTaxon { name: name.clone() })?;
            let mut colors = ColorSequence::new();
            let reference =
                ReferenceMask::against_taxon(&matrix, taxon, Some(colors.next_color()))?;
            let matrix = Arc::new(matrix);
            let distance =
                GeneticDistanceMask::new(Arc::clone(&matrix), taxon, Some(colors.next_color()))?
                    .with_min_sites(args.min_sites);
            info!("Built masks {} and {}", reference.label(), distance.label());

            let mask_path = output_dir.join("reference_mask.csv");
            info!("Writing reference mask summary to {}...", mask_path.display());
            write_reference_mask(&matrix, &reference, &distance, &mask_path)?;
        }
        Ok(())
    })
}
