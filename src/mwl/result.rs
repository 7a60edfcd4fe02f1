use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::FitMethod;
use crate::mwl::basis::Basis;

/// Values stored per feature slot: depth, position, width, width2.
pub const N_ATTRIBUTES: usize = 4;

/// Named per-feature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Attribute {
    Depth,
    Pos,
    /// Symmetric width, or the width left of the position for asymmetric fits.
    Width,
    /// Width right of the position; NaN for symmetric fits.
    Width2,
}

impl Attribute {
    pub const ALL: [Attribute; N_ATTRIBUTES] = [
        Attribute::Depth,
        Attribute::Pos,
        Attribute::Width,
        Attribute::Width2,
    ];

    pub fn index(self) -> usize {
        match self {
            Attribute::Depth => 0,
            Attribute::Pos => 1,
            Attribute::Width => 2,
            Attribute::Width2 => 3,
        }
    }

    /// Stable names consumed by downstream renderers.
    pub fn name(self, symmetric: bool) -> &'static str {
        match self {
            Attribute::Depth => "depth",
            Attribute::Pos => "pos",
            Attribute::Width if symmetric => "width",
            Attribute::Width => "width1",
            Attribute::Width2 => "width2",
        }
    }
}

impl FromStr for Attribute {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depth" => Ok(Attribute::Depth),
            "pos" | "position" => Ok(Attribute::Pos),
            "width" | "width1" => Ok(Attribute::Width),
            "width2" => Ok(Attribute::Width2),
            other => Err(QueryError::UnknownAttribute(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    Rank { rank: isize, n_features: usize },
    Unit { unit: usize, n_units: usize },
    UnknownAttribute(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Rank { rank, n_features } => write!(
                f,
                "feature rank {} is out of range for {} features per unit",
                rank, n_features
            ),
            QueryError::Unit { unit, n_units } => {
                write!(f, "unit {} is out of range ({} units)", unit, n_units)
            }
            QueryError::UnknownAttribute(name) => write!(f, "unknown feature attribute '{}'", name),
        }
    }
}

impl std::error::Error for QueryError {}

/// One fitted feature. An unresolved slot has every field set to NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Feature {
    pub depth: f64,
    pub pos: f64,
    pub width: f64,
    pub width2: f64,
}

impl Feature {
    pub fn nan() -> Self {
        Self {
            depth: f64::NAN,
            pos: f64::NAN,
            width: f64::NAN,
            width2: f64::NAN,
        }
    }

    pub fn from_slot(slot: &[f64]) -> Self {
        Self {
            depth: slot[0],
            pos: slot[1],
            width: slot[2],
            width2: slot[3],
        }
    }

    pub fn to_array(&self) -> [f64; N_ATTRIBUTES] {
        [self.depth, self.pos, self.width, self.width2]
    }

    pub fn get(&self, attribute: Attribute) -> f64 {
        self.to_array()[attribute.index()]
    }

    pub fn is_valid(&self) -> bool {
        self.depth.is_finite() && self.pos.is_finite()
    }

    fn in_range(&self, lo: f64, hi: f64) -> bool {
        self.is_valid() && self.pos >= lo && self.pos <= hi
    }
}

/// Failure bookkeeping of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub units: usize,
    pub failed_units: usize,
    pub attempted_features: usize,
    pub failed_features: usize,
}

impl BatchStats {
    pub fn merge(self, other: BatchStats) -> BatchStats {
        BatchStats {
            units: self.units + other.units,
            failed_units: self.failed_units + other.failed_units,
            attempted_features: self.attempted_features + other.attempted_features,
            failed_features: self.failed_features + other.failed_features,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.units == 0 {
            0.0
        } else {
            self.failed_units as f64 / self.units as f64
        }
    }
}

// Descending with NaN last.
fn deeper_first(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

// Ascending with NaN last.
fn smaller_first(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Fitted features of every unit, stored as `[unit][slot][attribute]`.
#[derive(Debug, Clone, Serialize)]
pub struct MwlResult {
    n_units: usize,
    n_features: usize,
    symmetric: bool,
    minima: bool,
    #[serde(skip)]
    method: FitMethod,
    data: Vec<f64>,
    stats: BatchStats,
}

impl MwlResult {
    pub fn new(
        n_units: usize,
        n_features: usize,
        symmetric: bool,
        minima: bool,
        method: FitMethod,
        data: Vec<f64>,
        stats: BatchStats,
    ) -> Self {
        debug_assert_eq!(data.len(), n_units * n_features * N_ATTRIBUTES);
        Self {
            n_units,
            n_features,
            symmetric,
            minima,
            method,
            data,
            stats,
        }
    }

    /// Builds a result from per-unit feature lists, padding short lists with NaN.
    pub fn from_features(
        features: &[Vec<Feature>],
        n_features: usize,
        symmetric: bool,
        minima: bool,
        method: FitMethod,
    ) -> Self {
        let mut data = Vec::with_capacity(features.len() * n_features * N_ATTRIBUTES);
        for unit in features {
            for k in 0..n_features {
                let f = unit.get(k).copied().unwrap_or_else(Feature::nan);
                data.extend_from_slice(&f.to_array());
            }
        }
        let stats = BatchStats {
            units: features.len(),
            ..BatchStats::default()
        };
        Self::new(
            features.len(),
            n_features,
            symmetric,
            minima,
            method,
            data,
            stats,
        )
    }

    pub fn n_units(&self) -> usize {
        self.n_units
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Attribute names in slot order, as exposed to renderers.
    pub fn attribute_names(&self) -> [&'static str; N_ATTRIBUTES] {
        Attribute::ALL.map(|a| a.name(self.symmetric))
    }

    fn stride(&self) -> usize {
        self.n_features * N_ATTRIBUTES
    }

    fn unit_features(&self, unit: usize) -> impl Iterator<Item = Feature> + '_ {
        let start = unit * self.stride();
        self.data[start..start + self.stride()]
            .chunks(N_ATTRIBUTES)
            .map(Feature::from_slot)
    }

    pub fn feature(&self, unit: usize, slot: usize) -> Result<Feature, QueryError> {
        if unit >= self.n_units {
            return Err(QueryError::Unit {
                unit,
                n_units: self.n_units,
            });
        }
        if slot >= self.n_features {
            return Err(QueryError::Rank {
                rank: slot as isize,
                n_features: self.n_features,
            });
        }
        let start = unit * self.stride() + slot * N_ATTRIBUTES;
        Ok(Feature::from_slot(&self.data[start..start + N_ATTRIBUTES]))
    }

    /// `attribute` of the rank-th feature of every unit.
    ///
    /// Non-negative ranks address slots directly. Negative ranks count back
    /// from each unit's last resolved feature, so after [sort_by_depth]
    /// `-1` is the shallowest resolved feature; units with fewer resolved
    /// features than `|rank|` give NaN.
    ///
    /// [sort_by_depth]: MwlResult::sort_by_depth
    pub fn get(&self, rank: isize, attribute: Attribute) -> Result<Vec<f64>, QueryError> {
        let n = self.n_features as isize;
        if rank >= n || rank < -n {
            return Err(QueryError::Rank {
                rank,
                n_features: self.n_features,
            });
        }

        if rank >= 0 {
            let offset = rank as usize * N_ATTRIBUTES + attribute.index();
            return Ok((0..self.n_units)
                .map(|u| self.data[u * self.stride() + offset])
                .collect());
        }

        Ok((0..self.n_units)
            .map(|u| {
                let resolved: Vec<Feature> =
                    self.unit_features(u).filter(Feature::is_valid).collect();
                let back = rank.unsigned_abs();
                if back > resolved.len() {
                    f64::NAN
                } else {
                    resolved[resolved.len() - back].get(attribute)
                }
            })
            .collect())
    }

    fn sort_slots_by<F>(&mut self, compare: F)
    where
        F: Fn(&Feature, &Feature) -> Ordering,
    {
        let stride = self.stride();
        if stride == 0 {
            return;
        }
        for block in self.data.chunks_mut(stride) {
            let mut features: Vec<Feature> =
                block.chunks(N_ATTRIBUTES).map(Feature::from_slot).collect();
            features.sort_by(&compare);
            for (slot, f) in block.chunks_mut(N_ATTRIBUTES).zip(features.iter()) {
                slot.copy_from_slice(&f.to_array());
            }
        }
    }

    /// Deepest feature first in every unit; unresolved slots go last.
    pub fn sort_by_depth(&mut self) {
        self.sort_slots_by(|a, b| deeper_first(a.depth, b.depth));
    }

    /// Feature closest to `reference` first in every unit.
    pub fn sort_by_pos(&mut self, reference: f64) {
        self.sort_slots_by(|a, b| {
            smaller_first((a.pos - reference).abs(), (b.pos - reference).abs())
        });
    }

    fn select_in_range<F>(&self, lo: f64, hi: f64, better: F) -> Vec<Feature>
    where
        F: Fn(&Feature, &Feature) -> bool,
    {
        (0..self.n_units)
            .map(|u| {
                self.unit_features(u)
                    .filter(|f| f.in_range(lo, hi))
                    .fold(None, |best: Option<Feature>, f| match best {
                        Some(b) if !better(&f, &b) => Some(b),
                        _ => Some(f),
                    })
                    .unwrap_or_else(Feature::nan)
            })
            .collect()
    }

    /// Per unit, the deepest feature positioned within `[lo, hi]`.
    pub fn deepest(&self, lo: f64, hi: f64) -> Vec<Feature> {
        self.select_in_range(lo, hi, |f, best| f.depth > best.depth)
    }

    /// Per unit, the shallowest feature positioned within `[lo, hi]`.
    pub fn shallowest(&self, lo: f64, hi: f64) -> Vec<Feature> {
        self.select_in_range(lo, hi, |f, best| f.depth < best.depth)
    }

    /// Per unit, the feature within `[lo, hi]` positioned closest to `target`.
    pub fn closest(&self, target: f64, lo: f64, hi: f64) -> Vec<Feature> {
        self.select_in_range(lo, hi, |f, best| {
            (f.pos - target).abs() < (best.pos - target).abs()
        })
    }

    /// Number of resolved features per unit.
    pub fn valid_count(&self) -> Vec<usize> {
        (0..self.n_units)
            .map(|u| self.unit_features(u).filter(Feature::is_valid).count())
            .collect()
    }

    /// Reconstructs the detrended spectrum of `unit` from its fitted features.
    pub fn evaluate(&self, unit: usize, wavelengths: &[f64]) -> Result<Vec<f64>, QueryError> {
        if unit >= self.n_units {
            return Err(QueryError::Unit {
                unit,
                n_units: self.n_units,
            });
        }

        let basis = Basis::for_method(self.method);
        let features: Vec<Feature> = self
            .unit_features(unit)
            .filter(Feature::is_valid)
            .collect();
        let sign = if self.minima { -1.0 } else { 1.0 };

        Ok(wavelengths
            .iter()
            .map(|&x| {
                let total: f64 = features
                    .iter()
                    .map(|f| {
                        let w2 = if self.symmetric { f.width } else { f.width2 };
                        basis.eval(x, f.depth, f.pos, f.width, w2)
                    })
                    .sum();
                1.0 + sign * total
            })
            .collect())
    }
}

impl fmt::Display for MwlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MwlResult {{ units: {}, features: {}, attributes: {:?}, failed units: {} }}",
            self.n_units,
            self.n_features,
            self.attribute_names(),
            self.stats.failed_units
        )
    }
}
