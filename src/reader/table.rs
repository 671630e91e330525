use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::AlleleCodec;
use crate::error::{GenoError, Result};
use crate::model::{SiteInfo, Taxa};
use crate::store::{GenotypeMatrix, StoreConfig};

/// Leading columns before the taxa: id, chrom, pos.
pub(crate) const SITE_FIELDS: usize = 3;
const ABSENT_POSITIONS: [&str; 2] = ["-1", "NA"];

/// Whitespace-delimited genotype table, one site per line, tokens unparsed.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeTable {
    pub taxa: Vec<String>,
    pub sites: Vec<SiteInfo>,
    pub tokens: Vec<Vec<String>>,
}

impl GenotypeTable {
    pub fn read(path: &impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path).map_err(|e| GenoError::ReadWithPath {
            source: e,
            path: path.as_ref().to_path_buf(),
        })?;
        let table = Self::from_reader(BufReader::new(f), path)?;
        debug!(
            path = %path.as_ref().display(),
            n_taxa = table.taxa.len(),
            n_sites = table.sites.len(),
            "read genotype table"
        );
        Ok(table)
    }

    fn from_reader(reader: impl BufRead, path: &impl AsRef<Path>) -> Result<Self> {
        let mut header: Option<Vec<String>> = None;
        let mut sites = Vec::new();
        let mut tokens = Vec::new();

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| GenoError::ReadWithPath {
                source: e,
                path: path.as_ref().to_path_buf(),
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();

            let columns = match &header {
                Some(columns) => columns,
                None => {
                    if fields.len() <= SITE_FIELDS {
                        return Err(GenoError::TableHeader);
                    }
                    header = Some(fields.iter().map(|f| f.to_string()).collect());
                    continue;
                }
            };
            if fields.len() != columns.len() {
                return Err(GenoError::TableFields {
                    line_num: line_idx + 1,
                    n_fields: fields.len(),
                    expected: columns.len(),
                });
            }

            let position = parse_position(fields[2], line_idx + 1)?;
            sites.push(SiteInfo::new(fields[0], fields[1], position));
            tokens.push(
                fields[SITE_FIELDS..]
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            );
        }

        let Some(mut columns) = header else {
            return Err(GenoError::TableHeader);
        };
        if sites.is_empty() {
            warn!(path = %path.as_ref().display(), "genotype table has no sites");
        }
        let taxa = columns.split_off(SITE_FIELDS);
        Ok(Self {
            taxa,
            sites,
            tokens,
        })
    }

    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn n_sites(&self) -> usize {
        self.sites.len()
    }

    /// Parse every token with `codec` and pack.
    pub fn into_matrix(
        self,
        codec: Arc<dyn AlleleCodec>,
        config: StoreConfig,
    ) -> Result<GenotypeMatrix> {
        let taxa = Taxa::new(self.taxa)?;
        GenotypeMatrix::pack_tokens(taxa, self.sites, &self.tokens, codec, config)
    }
}

fn parse_position(value: &str, line_num: usize) -> Result<Option<u32>> {
    if ABSENT_POSITIONS.iter().any(|a| value.eq_ignore_ascii_case(a)) {
        return Ok(None);
    }
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|source| GenoError::TablePosition {
            source,
            line_num,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NucleotideCodec;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<GenotypeTable> {
        GenotypeTable::from_reader(Cursor::new(text), &"table.txt")
    }

    #[test]
    fn reads_header_sites_and_tokens() {
        let table = parse(
            "# comment\nid chrom pos T1 T2 T3\ns1 1 100 A AC ??\n\ns2 2 NA G G -\ns3 X -1 T N C\n",
        )
        .unwrap();
        assert_eq!(table.taxa, vec!["T1", "T2", "T3"]);
        assert_eq!(table.n_sites(), 3);
        assert_eq!(table.sites[0].position, Some(100));
        assert_eq!(table.sites[1].position, None);
        assert_eq!(table.sites[2].position, None);
        assert_eq!(table.sites[2].locus, "X");
        assert_eq!(table.tokens[0], vec!["A", "AC", "??"]);
    }

    #[test]
    fn packs_into_matrix() {
        let table = parse("id chrom pos T1 T2 T3\ns1 1 100 A AC ??\n").unwrap();
        let matrix = table
            .into_matrix(Arc::new(NucleotideCodec), StoreConfig::default())
            .unwrap();
        assert_eq!(matrix.major_allele_frequency(0).unwrap(), 0.75);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse("id chrom pos T1 T2\ns1 1 100 A\n").unwrap_err();
        match err {
            GenoError::TableFields {
                line_num,
                n_fields,
                expected,
            } => assert_eq!((line_num, n_fields, expected), (2, 4, 5)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_or_short_header() {
        assert!(matches!(parse(""), Err(GenoError::TableHeader)));
        assert!(matches!(parse("id chrom pos\n"), Err(GenoError::TableHeader)));
    }

    #[test]
    fn rejects_bad_position() {
        let err = parse("id chrom pos T1\ns1 1 abc A\n").unwrap_err();
        assert!(matches!(err, GenoError::TablePosition { line_num: 2, .. }));
    }

    #[test]
    fn bad_token_reports_coordinates() {
        let table = parse("id chrom pos T1 T2\ns1 1 1 A A\ns2 1 2 A QQ\n").unwrap();
        let err = table
            .into_matrix(Arc::new(NucleotideCodec), StoreConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid allele symbol \"QQ\" at taxon 1, site 1");
    }
}
