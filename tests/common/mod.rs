use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

const TABLE: &str = "\
# four taxa, four sites
id chrom pos T1 T2 T3 T4
s1 1 100 A AC N A
s2 1 200 G G G T
s3 2 NA C T T T
s4 2 50 AG A A NN
";

pub struct Dataset {
    pub table: PathBuf,
    pub output_dir: PathBuf,
}

fn dataset_dir(label: &str) -> io::Result<PathBuf> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base_dir = std::env::temp_dir().join("genobits-tests").join(format!(
        "{}-{}-{}",
        std::process::id(),
        id,
        label
    ));
    fs::create_dir_all(&base_dir)?;
    Ok(base_dir)
}

pub fn create_dataset(label: &str) -> io::Result<Dataset> {
    create_dataset_from(label, TABLE)
}

pub fn create_dataset_from(label: &str, contents: &str) -> io::Result<Dataset> {
    let base_dir = dataset_dir(label)?;
    let table = base_dir.join("genotypes.txt");
    fs::write(&table, contents)?;
    Ok(Dataset {
        table,
        output_dir: base_dir.join("output"),
    })
}

pub fn expected_taxa() -> Vec<String> {
    ["T1", "T2", "T3", "T4"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteStats {
    pub major: &'static str,
    pub major_freq: f64,
    pub minor: &'static str,
    pub minor_freq: f64,
    pub n_gametes: u32,
    pub n_het: usize,
}

pub fn expected_site_stats() -> BTreeMap<String, SiteStats> {
    let stats = [
        (
            "s1",
            SiteStats {
                major: "A",
                major_freq: 5.0 / 6.0,
                minor: "C",
                minor_freq: 1.0 / 6.0,
                n_gametes: 6,
                n_het: 1,
            },
        ),
        (
            "s2",
            SiteStats {
                major: "G",
                major_freq: 0.75,
                minor: "T",
                minor_freq: 0.25,
                n_gametes: 8,
                n_het: 0,
            },
        ),
        (
            "s3",
            SiteStats {
                major: "T",
                major_freq: 0.75,
                minor: "C",
                minor_freq: 0.25,
                n_gametes: 8,
                n_het: 0,
            },
        ),
        (
            "s4",
            SiteStats {
                major: "A",
                major_freq: 5.0 / 6.0,
                minor: "G",
                minor_freq: 1.0 / 6.0,
                n_gametes: 6,
                n_het: 1,
            },
        ),
    ];
    stats.into_iter().map(|(id, s)| (id.to_string(), s)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairStats {
    pub n_sites: u32,
    pub distance: f64,
}

/// Upper-triangle pairs keyed by (id1, id2).
pub fn expected_pair_stats() -> BTreeMap<(String, String), PairStats> {
    let pairs = [
        ("T1", "T2", 4, 0.5),
        ("T1", "T3", 3, 0.5),
        ("T1", "T4", 3, 2.0 / 3.0),
        ("T2", "T3", 3, 0.0),
        ("T2", "T4", 3, 0.5),
        ("T3", "T4", 2, 0.5),
    ];
    pairs
        .into_iter()
        .map(|(a, b, n_sites, distance)| {
            (
                (a.to_string(), b.to_string()),
                PairStats { n_sites, distance },
            )
        })
        .collect()
}

/// (taxon, differing sites, distance byte) against T1.
pub fn expected_reference_mask() -> Vec<(String, usize, u8)> {
    vec![
        ("T1".to_string(), 0, 0),
        ("T2".to_string(), 3, 128),
        ("T3".to_string(), 2, 128),
        ("T4".to_string(), 2, 170),
    ]
}
