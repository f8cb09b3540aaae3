//! Point estimation over parallel `(x, y)` samples.
//!
//! [`estimate`] scans `x` linearly and works for any sample order.
//! [`estimate_ordered`] binary-searches samples known to follow a sorted
//! [`Order`] and falls back to the scan for `Unordered`. Both pick the same
//! samples, duplicates included.

use mx_types::{Element, EstimationMethod, Order};

use crate::SeriesError;

pub(crate) fn ensure_supported(method: EstimationMethod) -> Result<(), SeriesError> {
    if method.is_supported() {
        Ok(())
    } else {
        Err(SeriesError::UnsupportedMethod(method))
    }
}

/// Where a query point sits among the samples. `lower` and `upper` are the
/// first positions holding the greatest value below and the least value
/// above the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Neighbours {
    exact: Option<usize>,
    lower: Option<usize>,
    upper: Option<usize>,
}

fn neighbours_linear(x: &[f64], xq: f64) -> Neighbours {
    let mut lower: Option<usize> = None;
    let mut upper: Option<usize> = None;
    for (pos, &xi) in x.iter().enumerate() {
        if xi < xq && lower.is_none_or(|l| xi > x[l]) {
            lower = Some(pos);
        } else if xi > xq && upper.is_none_or(|u| xi < x[u]) {
            upper = Some(pos);
        }
    }
    Neighbours {
        exact: x.iter().position(|&xi| xi == xq),
        lower,
        upper,
    }
}

fn neighbours_sorted(x: &[f64], xq: f64, increasing: bool) -> Neighbours {
    let run_start = |v: f64| {
        if increasing {
            x.partition_point(|&w| w < v)
        } else {
            x.partition_point(|&w| w > v)
        }
    };
    let (before_end, after_start) = if increasing {
        (
            x.partition_point(|&w| w < xq),
            x.partition_point(|&w| w <= xq),
        )
    } else {
        (
            x.partition_point(|&w| w > xq),
            x.partition_point(|&w| w >= xq),
        )
    };
    let exact = (before_end < after_start).then_some(before_end);
    let before = before_end.checked_sub(1).map(|i| run_start(x[i]));
    let after = (after_start < x.len()).then_some(after_start);
    if increasing {
        Neighbours {
            exact,
            lower: before,
            upper: after,
        }
    } else {
        Neighbours {
            exact,
            lower: after,
            upper: before,
        }
    }
}

fn neighbours(x: &[f64], xq: f64, order: Order) -> Neighbours {
    if order.is_sorted() {
        neighbours_sorted(x, xq, order.is_increasing())
    } else {
        neighbours_linear(x, xq)
    }
}

/// Closer of the two neighbours; equal distances go to the lower one.
fn closer(x: &[f64], xq: f64, found: Neighbours) -> Option<usize> {
    match (found.lower, found.upper) {
        (Some(l), Some(u)) if xq - x[l] <= x[u] - xq => Some(l),
        (_, Some(u)) => Some(u),
        (lower, None) => lower,
    }
}

/// Position in `x` closest to `xq`.
///
/// Equal distances prefer the lower `x` value, then the earlier position.
#[must_use]
pub fn nearest_position(x: &[f64], xq: f64) -> Option<usize> {
    nearest_position_ordered(x, xq, Order::Unordered)
}

/// [`nearest_position`] for samples already following `order`.
#[must_use]
pub fn nearest_position_ordered(x: &[f64], xq: f64, order: Order) -> Option<usize> {
    let found = neighbours(x, xq, order);
    found.exact.or_else(|| closer(x, xq, found))
}

/// Estimate the value at `xq` from samples `y` taken at `x`.
///
/// An exact hit on `x` returns the stored sample for every method. `Nearlin`
/// interpolates between the bracketing samples and falls back to the nearest
/// sample when `xq` lies outside the samples or `T` cannot interpolate.
/// Empty samples estimate nothing.
pub fn estimate<T: Element>(
    x: &[f64],
    y: &[T],
    xq: f64,
    method: EstimationMethod,
) -> Result<Option<T>, SeriesError> {
    estimate_ordered(x, y, xq, method, Order::Unordered)
}

/// [`estimate`] for samples whose `x` already follows `order`.
pub fn estimate_ordered<T: Element>(
    x: &[f64],
    y: &[T],
    xq: f64,
    method: EstimationMethod,
    order: Order,
) -> Result<Option<T>, SeriesError> {
    if x.len() != y.len() {
        return Err(SeriesError::LengthMismatch {
            index_len: x.len(),
            data_len: y.len(),
        });
    }
    ensure_supported(method)?;
    if xq.is_nan() {
        return Err(SeriesError::NanQuery);
    }

    let found = neighbours(x, xq, order);
    if let Some(pos) = found.exact {
        return Ok(Some(y[pos].clone()));
    }

    if method == EstimationMethod::Nearlin {
        if let (Some(lo), Some(hi)) = (found.lower, found.upper) {
            let t = (xq - x[lo]) / (x[hi] - x[lo]);
            if let Some(value) = T::lerp(&y[lo], &y[hi], t) {
                return Ok(Some(value));
            }
        }
    }

    Ok(closer(x, xq, found).map(|pos| y[pos].clone()))
}
