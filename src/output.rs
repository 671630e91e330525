use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::NpzWriter;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{GenoError, Result};
use crate::ibs::DistanceMatrix;
use crate::mask::{GeneticDistanceMask, ReferenceMask};
use crate::store::GenotypeMatrix;

fn flush(wtr: &mut csv::Writer<File>, path: &Path) -> Result<()> {
    wtr.flush().map_err(|e| GenoError::Write {
        source: e,
        path: path.into(),
    })
}

/// One row per site: ranked alleles, frequencies and heterozygote count.
pub fn write_site_summary(matrix: &GenotypeMatrix, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "id",
        "chrom",
        "pos",
        "major",
        "major_freq",
        "minor",
        "minor_freq",
        "n_gametes",
        "n_het",
    ])?;

    let codec = matrix.codec();
    for (site, info) in matrix.sites().iter().enumerate() {
        let alleles = matrix.site_alleles(site)?;
        let position = info.position.map(|p| p.to_string()).unwrap_or_default();
        wtr.serialize((
            info.snp_id.as_str(),
            info.locus.as_str(),
            position,
            codec.allele_str(alleles.major()),
            alleles.major_frequency(),
            codec.allele_str(alleles.minor()),
            alleles.minor_frequency(),
            alleles.total_gametes(),
            matrix.heterozygous_count(site)?,
        ))?;
    }
    flush(&mut wtr, path)
}

pub fn write_ibs_distances(distances: &DistanceMatrix, path: &Path) -> Result<()> {
    let taxa = distances.taxa();
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["id1", "id2", "n_sites", "distance"])?;

    for (i, j) in distances.pairs() {
        wtr.serialize((
            taxa[i].as_str(),
            taxa[j].as_str(),
            distances.sites(i, j)?,
            distances.distance(i, j)?,
        ))?;
    }
    flush(&mut wtr, path)
}

/// Square `distances` and `sites` arrays plus a `taxa.json` entry naming the rows.
pub fn write_ibs_npz(distances: &DistanceMatrix, path: &Path) -> Result<()> {
    let n = distances.n_taxa();
    let shape_err = |_| GenoError::DimensionMismatch {
        what: "distance matrix",
        expected: n * n,
        found: distances.distances().len(),
    };
    let d = Array2::from_shape_vec((n, n), distances.distances().to_vec()).map_err(shape_err)?;
    let s = Array2::from_shape_vec((n, n), distances.sites_compared().to_vec()).map_err(shape_err)?;

    let file = File::create(path).map_err(|e| GenoError::Write {
        source: e,
        path: path.into(),
    })?;
    let mut npz = NpzWriter::new(file);
    npz.add_array("distances", &d)?;
    npz.add_array("sites", &s)?;
    npz.finish()?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| GenoError::Write {
            source: e,
            path: path.into(),
        })?;
    let mut zip = ZipWriter::new_append(file)?;
    zip.start_file("taxa.json", SimpleFileOptions::default())?;
    let json = serde_json::to_vec(distances.taxa())?;
    zip.write_all(&json).map_err(|e| GenoError::Write {
        source: e,
        path: path.into(),
    })?;
    zip.finish()?;
    Ok(())
}

/// Per-taxon summary of a reference mask and the distance mask for the same
/// reference taxon.
pub fn write_reference_mask(
    matrix: &GenotypeMatrix,
    reference: &ReferenceMask,
    distance: &GeneticDistanceMask,
    path: &Path,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["taxon", "n_differing_sites", "distance_byte"])?;
    for (taxon, name) in matrix.taxa().names().iter().enumerate() {
        wtr.serialize((
            name.as_str(),
            reference.differing_sites(taxon)?,
            distance.row_value(taxon)?,
        ))?;
    }
    flush(&mut wtr, path)
}
