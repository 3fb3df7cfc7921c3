//! Descriptive statistics and the two-proportion z-test used by the report.

use std::collections::BTreeMap;

/// Round half to even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Complementary error function.
///
/// Chebyshev fit with fractional error below 1.2e-7 everywhere.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Two-sided p-value of a standard normal statistic.
pub fn two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

/// Result of a two-proportion z-test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    pub z_stat: f64,
    pub p_value: f64,
}

/// Pooled two-proportion z-test, two-sided.
///
/// `None` when a group is empty or the pooled variance is zero.
pub fn two_proportion_ztest(count_a: usize, nobs_a: usize, count_b: usize, nobs_b: usize) -> Option<ZTest> {
    if nobs_a == 0 || nobs_b == 0 {
        return None;
    }
    let (na, nb) = (nobs_a as f64, nobs_b as f64);
    let (pa, pb) = (count_a as f64 / na, count_b as f64 / nb);
    let pooled = (count_a + count_b) as f64 / (na + nb);
    let variance = pooled * (1.0 - pooled) * (1.0 / na + 1.0 / nb);
    if variance <= 0.0 {
        return None;
    }

    let z_stat = (pa - pb) / variance.sqrt();
    Some(ZTest {
        z_stat,
        p_value: two_sided_p(z_stat),
    })
}

/// Summary statistics of a numeric column (missing values already removed).
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; needs two values.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl Describe {
    /// (label, value) pairs in the conventional order.
    pub fn rows(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("count", Some(self.count as f64)),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.q25),
            ("50%", self.q50),
            ("75%", self.q75),
            ("max", self.max),
        ]
    }
}

pub fn describe(values: &[f64]) -> Describe {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let mean = (n > 0).then(|| sorted.iter().sum::<f64>() / n as f64);
    let std = match (mean, n) {
        (Some(m), n) if n > 1 => {
            let ss: f64 = sorted.iter().map(|v| (v - m).powi(2)).sum();
            Some((ss / (n - 1) as f64).sqrt())
        }
        _ => None,
    };

    Describe {
        count: n,
        mean,
        std,
        min: sorted.first().copied(),
        q25: quantile(&sorted, 0.25),
        q50: quantile(&sorted, 0.50),
        q75: quantile(&sorted, 0.75),
        max: sorted.last().copied(),
    }
}

/// Linear-interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// One histogram bin, `[lower, upper)` except the last which is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// `n + 1` evenly spaced edges from `start` to `stop`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    let step = (stop - start) / n as f64;
    let mut edges: Vec<f64> = (0..=n).map(|i| start + i as f64 * step).collect();
    if let Some(last) = edges.last_mut() {
        *last = stop;
    }
    edges
}

/// Count values into the bins delimited by `edges`.
///
/// Values outside `[edges[0], edges[last]]` are not counted.
pub fn bin_counts(values: &[f64], edges: &[f64]) -> Vec<Bin> {
    let mut bins: Vec<Bin> = edges
        .windows(2)
        .map(|w| Bin {
            lower: w[0],
            upper: w[1],
            count: 0,
        })
        .collect();

    for &v in values {
        if let Some(i) = bin_index(v, edges) {
            bins[i].count += 1;
        }
    }
    bins
}

fn bin_index(value: f64, edges: &[f64]) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if edges.len() < 2 || value < first || value > last || value.is_nan() {
        return None;
    }
    if value == last {
        return Some(edges.len() - 2);
    }
    // first edge strictly above the value, minus one
    Some(edges.partition_point(|&e| e <= value) - 1)
}

/// Equal-width histogram over the data range.
///
/// A constant column gets the range `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let (lo, hi) = if min == max { (min - 0.5, max + 0.5) } else { (min, max) };
    bin_counts(values, &linspace(lo, hi, bins))
}

/// Occurrences per label, most frequent first, ties by label.
pub fn value_counts<K: Ord + Clone>(items: impl IntoIterator<Item = K>) -> Vec<(K, usize)> {
    let mut counts: BTreeMap<K, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut out: Vec<(K, usize)> = counts.into_iter().collect();
    // stable: equal counts keep label order
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}
