pub mod table;

pub use table::GenotypeTable;
