use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenoError {
    #[error("invalid allele symbol {token:?}{}", coordinates(.taxon, .site))]
    InvalidAlleleSymbol {
        token: String,
        taxon: Option<usize>,
        site: Option<usize>,
    },

    #[error("dimension mismatch for {what}: expected {expected}, got {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("taxon-major block must start on a 64-site boundary (got start site {start_site})")]
    UnalignedBlockError { start_site: usize },

    #[error("site {site} was already packed by an earlier block")]
    BlockOverlap { site: usize },

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error(
        "inconsistent map order on chromosome {chromosome}: markers {first} and {second} disagree on genetic and physical order"
    )]
    InconsistentMapOrder {
        chromosome: String,
        first: String,
        second: String,
    },

    #[error("{operation} is not supported on a fixed genotype matrix")]
    UnsupportedMutation { operation: &'static str },

    #[error("duplicate taxon name {name:?}")]
    DuplicateTaxon { name: String },

    #[error("{orientation} planes are not maintained by this matrix")]
    MissingOrientation { orientation: &'static str },

    #[error("need at least 2 markers with physical positions on chromosome {chromosome} (got {found})")]
    InsufficientMarkers { chromosome: String, found: usize },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("could not read {path}")]
    ReadWithPath {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[error("could not write to {path}")]
    Write {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[error("could not create output directory")]
    OutputDir {
        #[source]
        source: std::io::Error,
    },

    #[error("expected {expected} fields (got {n_fields}) in line {line_num} of genotype table")]
    TableFields {
        line_num: usize,
        n_fields: usize,
        expected: usize,
    },

    #[error("genotype table header needs id, chrom and pos columns followed by taxa")]
    TableHeader,

    #[error("could not parse position {value:?} in line {line_num} of genotype table")]
    TablePosition {
        #[source]
        source: std::num::ParseIntError,
        line_num: usize,
        value: String,
    },

    #[error("could not write to CSV")]
    CsvWrite(#[from] csv::Error),

    #[error("could not write npz archive")]
    NpzWrite(#[from] ndarray_npy::WriteNpzError),

    #[error("could not append to npz archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("could not serialize taxa")]
    Json(#[from] serde_json::Error),

    #[error("invalid progress bar template")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),

    #[error("could not build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("unknown taxon {name:?}")]
    UnknownTaxon { name: String },

    #[error("need at least 2 taxa (got {n_taxa})")]
    TaxonCount { n_taxa: usize },

    #[error("need at least 1 site (got {n_sites})")]
    SiteCount { n_sites: usize },
}

fn coordinates(taxon: &Option<usize>, site: &Option<usize>) -> String {
    match (taxon, site) {
        (Some(t), Some(s)) => format!(" at taxon {t}, site {s}"),
        (None, Some(s)) => format!(" at site {s}"),
        (Some(t), None) => format!(" at taxon {t}"),
        (None, None) => String::new(),
    }
}

impl GenoError {
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        GenoError::IndexOutOfRange { what, index, len }
    }

    pub fn invalid_symbol(token: &str) -> Self {
        GenoError::InvalidAlleleSymbol {
            token: token.to_string(),
            taxon: None,
            site: None,
        }
    }

    /// Attach a matrix coordinate to an allele parse failure.
    pub fn at(self, taxon: usize, site: usize) -> Self {
        match self {
            GenoError::InvalidAlleleSymbol { token, .. } => GenoError::InvalidAlleleSymbol {
                token,
                taxon: Some(taxon),
                site: Some(site),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_symbol_message_names_coordinates() {
        let err = GenoError::invalid_symbol("QQ").at(3, 17);
        assert_eq!(
            err.to_string(),
            "invalid allele symbol \"QQ\" at taxon 3, site 17"
        );
    }

    #[test]
    fn invalid_symbol_without_coordinates() {
        let err = GenoError::invalid_symbol("J");
        assert_eq!(err.to_string(), "invalid allele symbol \"J\"");
    }
}
