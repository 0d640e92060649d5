//! Two ways to turn a measured execution time into a discrete bin index:
//! relative to a frame's declared mean, or absolute (geometric from 1 ms).

use crate::{BinIndex, Seconds};

/// The 22 fixed deviation centers of the mean-relative ladder (see GLOSSARY).
pub const MEAN_RELATIVE_CENTERS: [f64; 22] = [
    -1.0, -0.5, -0.4, -0.3, -0.2, -0.1, -0.05, -0.025, -0.0125, 0.0, 0.0125, 0.025, 0.05, 0.1,
    0.2, 0.5, 1.0, 4.0, 6.0, 8.0, 16.0, 32.0,
];

const ABSOLUTE_NUM_BINS: usize = 20;
const ABSOLUTE_FLOOR: f64 = 0.001;
const ABSOLUTE_RATIO: f64 = 1.5;

/// Shared edge geometry: bin boundaries are midpoints between neighbouring
/// centers, with the outermost edge reflected from its inner neighbour.
fn edges(centers: &[f64], i: BinIndex) -> (f64, f64) {
    let last = centers.len() - 1;
    let mid = |a: usize, b: usize| (centers[a] + centers[b]) / 2.0;

    let upper = if i == last { centers[i] + (centers[i] - mid(i - 1, i)) } else { mid(i, i + 1) };
    let lower = if i == 0 { centers[i] - (mid(i, i + 1) - centers[i]) } else { mid(i - 1, i) };
    (lower, upper)
}

/// A discretisation of execution time (or execution-time deviation) into
/// bins, exposing `center`/`lower_edge`/`upper_edge` per `spec.md` §4.D.
pub trait ExecTimeBinning {
    fn num_bins(&self) -> usize;
    fn center(&self, i: BinIndex) -> f64;
    fn lower_edge(&self, i: BinIndex) -> f64;
    fn upper_edge(&self, i: BinIndex) -> f64;
}

/// Bins a measured time by its fractional deviation from a reference mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanRelativeBinning;

impl MeanRelativeBinning {
    /// Bin `exec` seconds against `mean` seconds by nearest deviation center.
    pub fn bin(&self, exec: Seconds, mean: Seconds) -> BinIndex {
        let deviation = exec / mean - 1.0;
        MEAN_RELATIVE_CENTERS
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (deviation - *a).abs().partial_cmp(&(deviation - *b).abs()).expect("not NaN")
            })
            .map(|(i, _)| i)
            .expect("centers is non-empty")
    }
}

impl ExecTimeBinning for MeanRelativeBinning {
    fn num_bins(&self) -> usize {
        MEAN_RELATIVE_CENTERS.len()
    }

    fn center(&self, i: BinIndex) -> f64 {
        MEAN_RELATIVE_CENTERS[i]
    }

    fn lower_edge(&self, i: BinIndex) -> f64 {
        edges(&MEAN_RELATIVE_CENTERS, i).0
    }

    fn upper_edge(&self, i: BinIndex) -> f64 {
        edges(&MEAN_RELATIVE_CENTERS, i).1
    }
}

/// Bins a measured time geometrically, independent of any objective.
#[derive(Debug, Clone)]
pub struct AbsoluteBinning {
    centers: [f64; ABSOLUTE_NUM_BINS],
}

impl Default for AbsoluteBinning {
    fn default() -> Self {
        let mut centers = [0.0; ABSOLUTE_NUM_BINS];
        let mut v = ABSOLUTE_FLOOR;
        for c in &mut centers {
            *c = v;
            v *= ABSOLUTE_RATIO;
        }
        Self { centers }
    }
}

impl AbsoluteBinning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Divide `value` by 1.5 until it drops to or below the 1 ms floor,
    /// counting divisions; clamp to the last bin.
    pub fn bin(&self, value: Seconds) -> BinIndex {
        let mut cur = value;
        let mut count = 0usize;
        while cur > ABSOLUTE_FLOOR && count < ABSOLUTE_NUM_BINS - 1 {
            cur /= ABSOLUTE_RATIO;
            count += 1;
        }
        count.min(ABSOLUTE_NUM_BINS - 1)
    }
}

impl ExecTimeBinning for AbsoluteBinning {
    fn num_bins(&self) -> usize {
        ABSOLUTE_NUM_BINS
    }

    fn center(&self, i: BinIndex) -> f64 {
        self.centers[i]
    }

    fn lower_edge(&self, i: BinIndex) -> f64 {
        edges(&self.centers, i).0
    }

    fn upper_edge(&self, i: BinIndex) -> f64 {
        edges(&self.centers, i).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_binning_round_trip_p7() {
        let scheme = AbsoluteBinning::new();
        for i in 0..scheme.num_bins() {
            assert_eq!(scheme.bin(scheme.center(i)), i, "center({i}) should land back in bin {i}");
        }
    }

    #[test]
    fn mean_relative_round_trip_p7() {
        let scheme = MeanRelativeBinning;
        let mean = 2.0;
        for i in 0..scheme.num_bins() {
            let exec = mean * (1.0 + scheme.center(i));
            assert_eq!(scheme.bin(exec, mean), i, "deviation center {i} should land back in bin {i}");
        }
    }

    #[test]
    fn absolute_binning_clamps_to_last_bin() {
        let scheme = AbsoluteBinning::new();
        assert_eq!(scheme.bin(1_000_000.0), scheme.num_bins() - 1);
    }

    #[test]
    fn edges_are_ordered_and_contiguous() {
        let scheme = AbsoluteBinning::new();
        for i in 0..scheme.num_bins() - 1 {
            assert!(scheme.lower_edge(i) < scheme.center(i));
            assert!(scheme.center(i) < scheme.upper_edge(i));
            assert!((scheme.upper_edge(i) - scheme.lower_edge(i + 1)).abs() < 1e-12);
        }
    }
}
