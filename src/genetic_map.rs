//! Genetic ↔ physical position translation for mapped markers.

use crate::error::{GenoError, Result};
use crate::model::compare_loci;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub id: String,
    pub chromosome: String,
    /// Centimorgans; NaN when unknown.
    pub genetic_position: f64,
    pub physical_position: Option<u32>,
}

impl MapMarker {
    pub fn new(
        id: impl Into<String>,
        chromosome: impl Into<String>,
        genetic_position: f64,
        physical_position: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            chromosome: chromosome.into(),
            genetic_position,
            physical_position,
        }
    }

    /// Negative physical positions mean "absent".
    pub fn from_sentinel(
        id: impl Into<String>,
        chromosome: impl Into<String>,
        genetic_position: f64,
        physical_position: i64,
    ) -> Self {
        Self::new(
            id,
            chromosome,
            genetic_position,
            u32::try_from(physical_position).ok(),
        )
    }

    fn is_interpolable(&self) -> bool {
        self.physical_position.is_some() && !self.genetic_position.is_nan()
    }
}

/// Total order once the map is known to be consistent: chromosome, genetic
/// position, markers without a physical position first, then physical position.
fn marker_cmp(a: &MapMarker, b: &MapMarker) -> Ordering {
    compare_loci(&a.chromosome, &b.chromosome)
        .then_with(|| a.genetic_position.total_cmp(&b.genetic_position))
        .then_with(|| a.physical_position.is_some().cmp(&b.physical_position.is_some()))
        .then_with(|| a.physical_position.cmp(&b.physical_position))
}

#[derive(Debug, Clone, Default)]
pub struct GeneticMap {
    name: String,
    markers: Vec<MapMarker>,
    index: HashMap<String, usize>,
    /// Physical-complete markers per chromosome as (physical, genetic), sorted and deduplicated.
    points: HashMap<String, Vec<(u32, f64)>>,
}

impl GeneticMap {
    pub fn new(name: impl Into<String>, mut markers: Vec<MapMarker>) -> Result<Self> {
        let points = interpolation_points(&markers)?;
        markers.sort_by(marker_cmp);
        let index = markers
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        Ok(Self {
            name: name.into(),
            markers,
            index,
            points,
        })
    }

    /// Insert one marker, rejecting it if it contradicts the existing order.
    pub fn add_marker(&mut self, marker: MapMarker) -> Result<()> {
        let mut markers = self.markers.clone();
        markers.push(marker);
        *self = Self::new(self.name.clone(), markers)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn markers(&self) -> &[MapMarker] {
        &self.markers
    }

    pub fn marker(&self, idx: usize) -> Result<&MapMarker> {
        self.markers
            .get(idx)
            .ok_or_else(|| GenoError::out_of_range("marker", idx, self.markers.len()))
    }

    pub fn marker_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn chromosomes(&self) -> Vec<&str> {
        self.markers
            .iter()
            .map(|m| m.chromosome.as_str())
            .dedup()
            .collect()
    }

    fn points(&self, chromosome: &str) -> Result<&[(u32, f64)]> {
        match self.points.get(chromosome) {
            Some(points) if points.len() >= 2 => Ok(points.as_slice()),
            other => Err(GenoError::InsufficientMarkers {
                chromosome: chromosome.to_string(),
                found: other.map_or(0, Vec::len),
            }),
        }
    }

    pub fn genetic_from_physical(&self, chromosome: &str, position: u32) -> Result<f64> {
        let points = self.points(chromosome)?;
        match points.binary_search_by_key(&position, |p| p.0) {
            Ok(i) => Ok(points[i].1),
            Err(i) => {
                let (a, b) = bracket(points.len(), i);
                Ok(interpolate(
                    (points[a].0 as f64, points[a].1),
                    (points[b].0 as f64, points[b].1),
                    position as f64,
                ))
            }
        }
    }

    pub fn physical_from_genetic(&self, chromosome: &str, genetic: f64) -> Result<f64> {
        let points = self.points(chromosome)?;
        let i = points.partition_point(|p| p.1 < genetic);
        if i < points.len() && points[i].1 == genetic {
            return Ok(points[i].0 as f64);
        }
        let (a, b) = bracket(points.len(), i);
        Ok(interpolate(
            (points[a].1, points[a].0 as f64),
            (points[b].1, points[b].0 as f64),
            genetic,
        ))
    }
}

/// Neighbouring pair around insertion point `i`, clamped to the edge pair.
fn bracket(len: usize, i: usize) -> (usize, usize) {
    if i == 0 {
        (0, 1)
    } else if i >= len {
        (len - 2, len - 1)
    } else {
        (i - 1, i)
    }
}

fn interpolate((x0, y0): (f64, f64), (x1, y1): (f64, f64), x: f64) -> f64 {
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

fn interpolation_points(markers: &[MapMarker]) -> Result<HashMap<String, Vec<(u32, f64)>>> {
    let mut by_chromosome: HashMap<String, Vec<&MapMarker>> = HashMap::new();
    for marker in markers.iter().filter(|m| m.is_interpolable()) {
        by_chromosome
            .entry(marker.chromosome.clone())
            .or_default()
            .push(marker);
    }

    let mut points = HashMap::with_capacity(by_chromosome.len());
    for (chromosome, mut complete) in by_chromosome {
        complete.sort_by(|a, b| {
            a.physical_position
                .cmp(&b.physical_position)
                .then_with(|| a.genetic_position.total_cmp(&b.genetic_position))
        });
        for (a, b) in complete.iter().tuple_windows() {
            let same_physical = a.physical_position == b.physical_position;
            let inverted = a.genetic_position > b.genetic_position;
            if inverted || (same_physical && a.genetic_position != b.genetic_position) {
                return Err(GenoError::InconsistentMapOrder {
                    chromosome,
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
        }
        let chromosome_points: Vec<(u32, f64)> = complete
            .iter()
            .filter_map(|m| m.physical_position.map(|p| (p, m.genetic_position)))
            .dedup_by(|a, b| a.0 == b.0)
            .collect();
        points.insert(chromosome, chromosome_points);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> GeneticMap {
        GeneticMap::new(
            "test",
            vec![
                MapMarker::new("m3", "1", 20.0, Some(3000)),
                MapMarker::new("m1", "1", 0.0, Some(1000)),
                MapMarker::new("m2", "1", 10.0, Some(2000)),
                MapMarker::from_sentinel("u1", "1", 10.0, -1),
                MapMarker::new("n1", "1", f64::NAN, Some(1500)),
                MapMarker::new("c2", "2", 5.0, Some(100)),
                MapMarker::new("c2b", "2", 7.0, Some(300)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn markers_sort_with_unplaced_first_on_ties() {
        let map = map();
        let ids: Vec<&str> = map.markers().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "u1", "m2", "m3", "n1", "c2", "c2b"]);
        assert_eq!(map.marker_index("m2"), Some(2));
        assert_eq!(map.chromosomes(), vec!["1", "2"]);
    }

    #[test]
    fn exact_hits_return_stored_values() {
        let map = map();
        assert_eq!(map.genetic_from_physical("1", 2000).unwrap(), 10.0);
        assert_eq!(map.physical_from_genetic("1", 20.0).unwrap(), 3000.0);
    }

    #[test]
    fn interpolates_between_markers() {
        let map = map();
        assert!((map.genetic_from_physical("1", 1500).unwrap() - 5.0).abs() < 1e-12);
        assert!((map.physical_from_genetic("2", 6.0).unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn extrapolates_from_edge_pairs() {
        let map = map();
        assert!((map.genetic_from_physical("1", 500).unwrap() + 5.0).abs() < 1e-12);
        assert!((map.genetic_from_physical("1", 4000).unwrap() - 30.0).abs() < 1e-12);
        assert!((map.physical_from_genetic("2", 9.0).unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn genetic_position_is_monotone_over_physical_range() {
        let map = map();
        let mut last = f64::NEG_INFINITY;
        for position in (0..=4000).step_by(37) {
            let genetic = map.genetic_from_physical("1", position).unwrap();
            assert!(genetic >= last, "non-monotone at {position}");
            last = genetic;
        }
    }

    #[test]
    fn inversions_are_rejected() {
        let err = GeneticMap::new(
            "bad",
            vec![
                MapMarker::new("a", "1", 5.0, Some(100)),
                MapMarker::new("b", "1", 4.0, Some(200)),
            ],
        )
        .unwrap_err();
        match err {
            GenoError::InconsistentMapOrder { chromosome, first, second } => {
                assert_eq!((chromosome.as_str(), first.as_str(), second.as_str()), ("1", "a", "b"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn same_physical_position_with_different_genetic_is_rejected() {
        let result = GeneticMap::new(
            "bad",
            vec![
                MapMarker::new("a", "1", 5.0, Some(100)),
                MapMarker::new("b", "1", 6.0, Some(100)),
            ],
        );
        assert!(matches!(result, Err(GenoError::InconsistentMapOrder { .. })));
    }

    #[test]
    fn add_marker_keeps_order_and_validates() {
        let mut map = map();
        map.add_marker(MapMarker::new("m4", "1", 30.0, Some(4000))).unwrap();
        assert_eq!(map.len(), 8);
        assert_eq!(map.genetic_from_physical("1", 4000).unwrap(), 30.0);

        let err = map
            .add_marker(MapMarker::new("bad", "1", 1.0, Some(3500)))
            .unwrap_err();
        assert!(matches!(err, GenoError::InconsistentMapOrder { .. }));
        assert_eq!(map.len(), 8);
        assert_eq!(map.name(), "test");
    }

    #[test]
    fn unknown_chromosome_needs_markers() {
        match map().genetic_from_physical("9", 10).unwrap_err() {
            GenoError::InsufficientMarkers { chromosome, found } => {
                assert_eq!((chromosome.as_str(), found), ("9", 0))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
