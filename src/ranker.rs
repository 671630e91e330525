use crate::codec::{Allele, DiploidCall, MAX_ALLELE_CODES, RARE_ALLELE, UNKNOWN_ALLELE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlleleCount {
    pub allele: Allele,
    pub count: u32,
}

/// Ranked allele table for one site.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiteAlleles {
    ranked: Vec<AlleleCount>,
    rare_count: u32,
    total_gametes: u32,
}

impl SiteAlleles {
    /// Rank the alleles in one column of calls. Both gametes are counted, so a
    /// homozygous call contributes two to its allele.
    pub fn rank<I>(calls: I, max_alleles: usize) -> Self
    where
        I: IntoIterator<Item = DiploidCall>,
    {
        let mut counts = [0u32; MAX_ALLELE_CODES];
        let mut rare_count = 0u32;
        for call in calls {
            for allele in call.alleles() {
                match allele {
                    UNKNOWN_ALLELE => {}
                    RARE_ALLELE => rare_count += 1,
                    code => counts[code as usize] += 1,
                }
            }
        }

        let mut ranked: Vec<AlleleCount> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(allele, &count)| AlleleCount {
                allele: allele as Allele,
                count,
            })
            .collect();
        // Stable sort keeps ascending allele code among equal counts
        ranked.sort_by(|a, b| b.count.cmp(&a.count));

        let total_gametes = rare_count + ranked.iter().map(|c| c.count).sum::<u32>();
        if ranked.len() > max_alleles {
            rare_count += ranked[max_alleles..].iter().map(|c| c.count).sum::<u32>();
            ranked.truncate(max_alleles);
        }

        Self {
            ranked,
            rare_count,
            total_gametes,
        }
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn ranked(&self) -> &[AlleleCount] {
        &self.ranked
    }

    pub fn allele(&self, rank: usize) -> Option<Allele> {
        self.ranked.get(rank).map(|c| c.allele)
    }

    pub fn count(&self, rank: usize) -> u32 {
        self.ranked.get(rank).map_or(0, |c| c.count)
    }

    pub fn rank_of(&self, allele: Allele) -> Option<usize> {
        self.ranked.iter().position(|c| c.allele == allele)
    }

    /// Gametes whose allele fell outside the ranked table.
    pub fn rare_count(&self) -> u32 {
        self.rare_count
    }

    pub fn total_gametes(&self) -> u32 {
        self.total_gametes
    }

    pub fn frequency(&self, rank: usize) -> f64 {
        if self.total_gametes == 0 {
            return f64::NAN;
        }
        self.count(rank) as f64 / self.total_gametes as f64
    }

    pub fn major(&self) -> Allele {
        self.allele(0).unwrap_or(UNKNOWN_ALLELE)
    }

    pub fn minor(&self) -> Allele {
        self.allele(1).unwrap_or(UNKNOWN_ALLELE)
    }

    pub fn major_frequency(&self) -> f64 {
        self.frequency(0)
    }

    pub fn minor_frequency(&self) -> f64 {
        self.frequency(1)
    }

    pub fn is_polymorphic(&self) -> bool {
        self.ranked.len() > 1 || (!self.ranked.is_empty() && self.rare_count > 0)
    }
}
