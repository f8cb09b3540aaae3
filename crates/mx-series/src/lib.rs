#![forbid(unsafe_code)]

//! Sparse ordered series.
//!
//! An [`OrderedSeries`] pairs an `f64` index with optional values. A `None`
//! value is a gap: the index exists but its value is missing. Gaps are filled
//! and off-index points estimated from the present values only.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use log::warn;
use mx_types::{Element, EstimationMethod, Order, SeriesConfig, clip_cell};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod estimate;

pub use estimate::{estimate, estimate_ordered, nearest_position, nearest_position_ordered};

use estimate::ensure_supported;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("index length ({index_len}) does not match data length ({data_len})")]
    LengthMismatch { index_len: usize, data_len: usize },
    #[error("index value {value} at position {position} violates {order} order")]
    OrderViolation {
        position: usize,
        value: f64,
        order: Order,
    },
    #[error("index contains NaN at position {position}")]
    NanIndex { position: usize },
    #[error("index value {value} at position {position} is not finite")]
    NonFiniteIndex { position: usize, value: f64 },
    #[error("cannot estimate at a NaN index")]
    NanQuery,
    #[error("estimation method '{0}' is not supported")]
    UnsupportedMethod(EstimationMethod),
    #[error("cadence start {start} step {step} cannot generate {count} ordered points")]
    InvalidCadence { start: f64, step: f64, count: usize },
    #[error("element type {0} has no numeric difference")]
    NonNumeric(&'static str),
}

/// The non-missing rows of a series and where they sat.
#[derive(Debug, Clone, PartialEq)]
pub struct Present<T> {
    pub index: Vec<f64>,
    pub data: Vec<T>,
    pub locations: Vec<usize>,
}

impl<T> Present<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedSeries<T> {
    name: Option<String>,
    order: Order,
    index: Vec<f64>,
    data: Vec<Option<T>>,
    max_column_width: Option<usize>,
}

// Deserialized series go through the same validation as `from_parts`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for OrderedSeries<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw<T> {
            #[serde(default)]
            name: Option<String>,
            order: Order,
            index: Vec<f64>,
            data: Vec<Option<T>>,
            #[serde(default)]
            max_column_width: Option<usize>,
        }
        let raw = Raw::<T>::deserialize(deserializer)?;
        let mut series =
            Self::from_parts(raw.data, raw.index, raw.order).map_err(serde::de::Error::custom)?;
        series.name = raw.name;
        series.max_column_width = raw.max_column_width;
        Ok(series)
    }
}

fn validate_index(index: &[f64], data_len: usize, order: Order) -> Result<(), SeriesError> {
    if index.len() != data_len {
        return Err(SeriesError::LengthMismatch {
            index_len: index.len(),
            data_len,
        });
    }
    if let Some(position) = index.iter().position(|v| v.is_nan()) {
        return Err(SeriesError::NanIndex { position });
    }
    if let Some(position) = index.iter().position(|v| v.is_infinite()) {
        return Err(SeriesError::NonFiniteIndex {
            position,
            value: index[position],
        });
    }
    if let Some(position) = order.first_violation(index) {
        return Err(SeriesError::OrderViolation {
            position,
            value: index[position],
            order,
        });
    }
    Ok(())
}

fn cadence(start: f64, step: f64, count: usize) -> Result<Vec<f64>, SeriesError> {
    if !start.is_finite() || !step.is_finite() || (step == 0.0 && count > 1) {
        return Err(SeriesError::InvalidCadence { start, step, count });
    }
    Ok((0..count).map(|i| start + step * i as f64).collect())
}

impl<T> OrderedSeries<T> {
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            name: None,
            order,
            index: Vec::new(),
            data: Vec::new(),
            max_column_width: None,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, order: Order) -> Self {
        Self::new(order).with_name(name)
    }

    /// Build from parallel arrays whose index already respects `order`.
    pub fn from_parts(
        data: Vec<Option<T>>,
        index: Vec<f64>,
        order: Order,
    ) -> Result<Self, SeriesError> {
        validate_index(&index, data.len(), order)?;
        Ok(Self {
            name: None,
            order,
            index,
            data,
            max_column_width: None,
        })
    }

    /// Build with the index `start, start + step, start + 2 * step, ...`.
    pub fn from_cadence(
        data: Vec<Option<T>>,
        start: f64,
        step: f64,
        order: Order,
    ) -> Result<Self, SeriesError> {
        let index = cadence(start, step, data.len())?;
        Self::from_parts(data, index, order)
    }

    /// Build from rows in any order, stably sorting them into `order` first.
    ///
    /// Repeated index values still fail under a strict order.
    pub fn from_unsorted(
        data: Vec<Option<T>>,
        index: Vec<f64>,
        order: Order,
    ) -> Result<Self, SeriesError> {
        if index.len() != data.len() {
            return Err(SeriesError::LengthMismatch {
                index_len: index.len(),
                data_len: data.len(),
            });
        }
        let mut rows: Vec<(f64, Option<T>)> = index.into_iter().zip(data).collect();
        rows.sort_by(|a, b| order.compare(a.0, b.0));
        let (index, data) = rows.into_iter().unzip();
        Self::from_parts(data, index, order)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn with_max_column_width(mut self, width: usize) -> Self {
        self.max_column_width = Some(width);
        self
    }

    #[must_use]
    pub fn max_column_width(&self) -> Option<usize> {
        self.max_column_width
    }

    #[must_use]
    pub fn order(&self) -> Order {
        self.order
    }

    #[must_use]
    pub fn index(&self) -> &[f64] {
        &self.index
    }

    #[must_use]
    pub fn data(&self) -> &[Option<T>] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, Option<&T>)> + '_ {
        self.index
            .iter()
            .copied()
            .zip(self.data.iter().map(Option::as_ref))
    }

    #[must_use]
    pub fn row(&self, position: usize) -> Option<(f64, Option<&T>)> {
        Some((*self.index.get(position)?, self.data[position].as_ref()))
    }

    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_none()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.data.iter().all(Option::is_some)
    }

    /// Slot where `index` belongs: after any run of equal values for sorted
    /// orders, at the tail for `Unordered`.
    fn insertion_slot(&self, index: f64) -> usize {
        if self.order.is_increasing() {
            self.index.partition_point(|&v| v <= index)
        } else if self.order.is_decreasing() {
            self.index.partition_point(|&v| v >= index)
        } else {
            self.index.len()
        }
    }

    /// First position holding exactly `index`.
    #[must_use]
    pub fn position_of(&self, index: f64) -> Option<usize> {
        let start = if self.order.is_increasing() {
            self.index.partition_point(|&v| v < index)
        } else if self.order.is_decreasing() {
            self.index.partition_point(|&v| v > index)
        } else {
            return self.index.iter().position(|&v| v == index);
        };
        (self.index.get(start) == Some(&index)).then_some(start)
    }

    #[must_use]
    pub fn contains_index(&self, index: f64) -> bool {
        self.position_of(index).is_some()
    }

    /// Push a row at the tail.
    ///
    /// With `verify`, the row is refused (returning `false`, nothing changed)
    /// when it would break the series order. Without it the caller vouches
    /// for the order.
    pub fn append(&mut self, value: impl Into<Option<T>>, index: f64, verify: bool) -> bool {
        if !index.is_finite() {
            warn!("append refused: non-finite index {index}");
            return false;
        }
        if verify {
            if let Some(&last) = self.index.last() {
                if !self.order.admits(last, index) {
                    warn!(
                        "append refused: index {index} after {last} violates {} order",
                        self.order
                    );
                    return false;
                }
            }
        }
        self.index.push(index);
        self.data.push(value.into());
        true
    }

    /// Insert a row at its sorted slot, shifting later rows.
    ///
    /// With `verify`, a strict series refuses an index it already holds.
    pub fn insert(&mut self, value: impl Into<Option<T>>, index: f64, verify: bool) -> bool {
        if !index.is_finite() {
            warn!("insert refused: non-finite index {index}");
            return false;
        }
        if verify && self.order.is_unique() && self.contains_index(index) {
            warn!(
                "insert refused: index {index} already present in {} series",
                self.order
            );
            return false;
        }
        let slot = self.insertion_slot(index);
        self.index.insert(slot, index);
        self.data.insert(slot, value.into());
        true
    }

    /// Overwrite the value at `index`, inserting a row when it is absent.
    pub fn assign(&mut self, value: impl Into<Option<T>>, index: f64) -> bool {
        match self.position_of(index) {
            Some(position) => {
                self.data[position] = value.into();
                true
            }
            None => self.insert(value, index, true),
        }
    }

    /// Add a gap at `index` unless the index is already tracked.
    pub fn ensure_index(&mut self, index: f64) -> bool {
        if self.contains_index(index) {
            return false;
        }
        self.insert(None, index, false)
    }

    /// Add a gap for every value of `incoming` not yet in the index.
    ///
    /// When both this series and `incoming` follow the same sorted order the
    /// two are merged in one pass; otherwise each value goes through
    /// [`ensure_index`](Self::ensure_index). Non-finite values are skipped.
    /// Returns the number of gaps added.
    pub fn merge_index(&mut self, incoming: &[f64]) -> usize {
        let order = self.order;
        let sorted = order.is_sorted()
            && incoming
                .windows(2)
                .all(|pair| order.compare(pair[0], pair[1]) != Ordering::Greater);
        if !sorted {
            return incoming
                .iter()
                .filter(|x| x.is_finite())
                .filter(|&&x| self.ensure_index(x))
                .count();
        }

        let old_index = std::mem::take(&mut self.index);
        let old_data = std::mem::take(&mut self.data);
        let mut index = Vec::with_capacity(old_index.len() + incoming.len());
        let mut data = Vec::with_capacity(old_index.len() + incoming.len());
        let mut rows = old_index.into_iter().zip(old_data).peekable();
        let mut added = 0;
        for &x in incoming.iter().filter(|x| x.is_finite()) {
            while let Some((v, value)) =
                rows.next_if(|(v, _)| order.compare(*v, x) == Ordering::Less)
            {
                index.push(v);
                data.push(value);
            }
            let tracked = index.last() == Some(&x) || rows.peek().is_some_and(|(v, _)| *v == x);
            if !tracked {
                index.push(x);
                data.push(None);
                added += 1;
            }
        }
        for (v, value) in rows {
            index.push(v);
            data.push(value);
        }
        self.index = index;
        self.data = data;
        added
    }

    /// The row closest to `index`; equal distances prefer the lower index.
    #[must_use]
    pub fn get_nearest(&self, index: f64) -> Option<(f64, Option<&T>)> {
        let position = nearest_position_ordered(&self.index, index, self.order)?;
        self.row(position)
    }

    /// Up to `n` rows ordered by distance to `index`, ties by lower index
    /// value and then position.
    #[must_use]
    pub fn get_n_nearest(&self, n: usize, index: f64) -> Vec<(f64, Option<&T>)> {
        let mut positions: Vec<usize> = (0..self.len()).collect();
        positions.sort_by(|&a, &b| {
            let da = (self.index[a] - index).abs();
            let db = (self.index[b] - index).abs();
            da.total_cmp(&db)
                .then(self.index[a].total_cmp(&self.index[b]))
        });
        positions
            .into_iter()
            .take(n)
            .filter_map(|position| self.row(position))
            .collect()
    }

    /// Rows at positions `range`, clamped to the series length.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self
    where
        T: Clone,
    {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            name: self.name.clone(),
            order: self.order,
            index: self.index[start..end].to_vec(),
            data: self.data[start..end].to_vec(),
            max_column_width: self.max_column_width,
        }
    }

    /// Rows whose index lies in `[lo, hi]`, keeping series order.
    #[must_use]
    pub fn between(&self, lo: f64, hi: f64) -> Self
    where
        T: Clone,
    {
        let (index, data) = self
            .index
            .iter()
            .zip(&self.data)
            .filter(|(x, _)| **x >= lo && **x <= hi)
            .map(|(x, v)| (*x, v.clone()))
            .unzip();
        Self {
            name: self.name.clone(),
            order: self.order,
            index,
            data,
            max_column_width: self.max_column_width,
        }
    }

    #[must_use]
    pub fn present(&self) -> Present<T>
    where
        T: Clone,
    {
        let mut present = Present {
            index: Vec::new(),
            data: Vec::new(),
            locations: Vec::new(),
        };
        for (location, (x, value)) in self.index.iter().zip(&self.data).enumerate() {
            if let Some(value) = value {
                present.index.push(*x);
                present.data.push(value.clone());
                present.locations.push(location);
            }
        }
        present
    }

    /// Same index and gaps, values passed through `f`.
    #[must_use]
    pub fn map_values<U>(&self, mut f: impl FnMut(&T) -> U) -> OrderedSeries<U> {
        OrderedSeries {
            name: self.name.clone(),
            order: self.order,
            index: self.index.clone(),
            data: self.data.iter().map(|v| v.as_ref().map(&mut f)).collect(),
            max_column_width: self.max_column_width,
        }
    }
}

impl<T: Element> OrderedSeries<T> {
    /// Estimate the value at `index` from the present rows.
    pub fn query(&self, index: f64, method: EstimationMethod) -> Result<Option<T>, SeriesError> {
        let present = self.present();
        estimate_ordered(&present.index, &present.data, index, method, self.order)
    }

    pub fn query_many(
        &self,
        indices: &[f64],
        method: EstimationMethod,
    ) -> Result<Vec<Option<T>>, SeriesError> {
        ensure_supported(method)?;
        let present = self.present();
        indices
            .iter()
            .map(|&x| estimate_ordered(&present.index, &present.data, x, method, self.order))
            .collect()
    }

    /// Replace every gap by an estimate at its own index.
    ///
    /// Estimates come from the rows present before the pass, so filling is
    /// idempotent. A series with no present rows is left as is.
    pub fn fill(&mut self, method: EstimationMethod) -> Result<(), SeriesError> {
        ensure_supported(method)?;
        if self.is_complete() {
            return Ok(());
        }
        let present = self.present();
        if present.is_empty() {
            return Ok(());
        }
        for (x, value) in self.index.iter().zip(self.data.iter_mut()) {
            if value.is_none() {
                *value = estimate_ordered(&present.index, &present.data, *x, method, self.order)?;
            }
        }
        Ok(())
    }

    pub fn filled(&self, method: EstimationMethod) -> Result<Self, SeriesError> {
        let mut out = self.clone();
        out.fill(method)?;
        Ok(out)
    }

    /// `count` rows at the cadence `start + i * step`, each estimated from
    /// this series.
    pub fn resample(
        &self,
        start: f64,
        step: f64,
        count: usize,
        method: EstimationMethod,
    ) -> Result<Self, SeriesError> {
        ensure_supported(method)?;
        let index = cadence(start, step, count)?;
        let data = self.query_many(&index, method)?;
        Ok(Self {
            name: self.name.clone(),
            order: Order::for_step(step),
            index,
            data,
            max_column_width: self.max_column_width,
        })
    }

    /// `self - other`, with `other` estimated at each of this series's
    /// indices. A gap on either side stays a gap, as does an integer
    /// overflow; a non-numeric value is an error.
    pub fn minus(&self, other: &Self, method: EstimationMethod) -> Result<Self, SeriesError> {
        ensure_supported(method)?;
        let theirs = other.present();
        let mut data = Vec::with_capacity(self.len());
        for (x, mine) in self.iter() {
            let theirs_at = estimate_ordered(&theirs.index, &theirs.data, x, method, other.order)?;
            let diff = match (mine, theirs_at) {
                (Some(a), Some(b)) => match a.difference(&b) {
                    Some(d) => Some(d),
                    None if a.to_f64().is_none() || b.to_f64().is_none() => {
                        return Err(SeriesError::NonNumeric(std::any::type_name::<T>()));
                    }
                    None => None,
                },
                _ => None,
            };
            data.push(diff);
        }
        Ok(Self {
            name: self.name.clone(),
            order: self.order,
            index: self.index.clone(),
            data,
            max_column_width: self.max_column_width,
        })
    }

    /// Mean squared difference over rows present on both sides; NaN when
    /// no row overlaps.
    pub fn mse(&self, other: &Self, method: EstimationMethod) -> Result<f64, SeriesError> {
        ensure_supported(method)?;
        let theirs = other.present();
        let mut sum = 0.0;
        let mut count = 0_usize;
        for (x, mine) in self.iter() {
            let Some(a) = mine else {
                continue;
            };
            let Some(b) = estimate_ordered(&theirs.index, &theirs.data, x, method, other.order)?
            else {
                continue;
            };
            let (Some(a), Some(b)) = (a.to_f64(), b.to_f64()) else {
                return Err(SeriesError::NonNumeric(std::any::type_name::<T>()));
            };
            sum += (a - b).powi(2);
            count += 1;
        }
        if count == 0 {
            return Ok(f64::NAN);
        }
        Ok(sum / count as f64)
    }

    pub fn rms(&self, other: &Self, method: EstimationMethod) -> Result<f64, SeriesError> {
        Ok(self.mse(other, method)?.sqrt())
    }

    #[must_use]
    pub fn render_plain(&self) -> String {
        let width = self
            .max_column_width
            .unwrap_or(SeriesConfig::DEFAULT_COLUMN_WIDTH)
            .max(1);
        let header = clip_cell(self.name.as_deref().unwrap_or("value"), width);
        let mut out = format!("{:>width$}  {header:>width$}\n", clip_cell("index", width));
        for (x, value) in self.iter() {
            let cell = value.map_or_else(|| "NA".to_owned(), |v| v.to_scalar().to_string());
            out.push_str(&format!(
                "{:>width$}  {:>width$}\n",
                clip_cell(&x.to_string(), width),
                clip_cell(&cell, width)
            ));
        }
        out
    }
}

impl<T: Element> fmt::Display for OrderedSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

#[cfg(test)]
mod tests {
    use mx_types::{EstimationMethod, Order, Scalar};

    use super::{OrderedSeries, SeriesError};

    fn sample() -> OrderedSeries<f64> {
        OrderedSeries::from_parts(
            vec![Some(0.0), None, Some(2.0), None, Some(8.0)],
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            Order::StrictlyIncreasing,
        )
        .expect("sample series")
    }

    #[test]
    fn construction_rejects_order_violation() {
        let err = OrderedSeries::from_parts(
            vec![Some(1), Some(2), Some(3)],
            vec![0.0, 2.0, 1.0],
            Order::StrictlyIncreasing,
        )
        .expect_err("must fail");
        assert_eq!(
            err,
            SeriesError::OrderViolation {
                position: 2,
                value: 1.0,
                order: Order::StrictlyIncreasing
            }
        );
    }

    #[test]
    fn construction_rejects_duplicates_only_when_strict() {
        assert!(
            OrderedSeries::from_parts(vec![Some(1), Some(2)], vec![1.0, 1.0], Order::Increasing)
                .is_ok()
        );
        assert!(
            OrderedSeries::from_parts(
                vec![Some(1), Some(2)],
                vec![1.0, 1.0],
                Order::StrictlyIncreasing
            )
            .is_err()
        );
    }

    #[test]
    fn construction_rejects_length_mismatch_and_nan() {
        assert_eq!(
            OrderedSeries::<i64>::from_parts(vec![Some(1)], vec![0.0, 1.0], Order::Unordered)
                .expect_err("must fail"),
            SeriesError::LengthMismatch {
                index_len: 2,
                data_len: 1
            }
        );
        assert_eq!(
            OrderedSeries::from_parts(vec![Some(1)], vec![f64::NAN], Order::Unordered)
                .expect_err("must fail"),
            SeriesError::NanIndex { position: 0 }
        );
    }

    #[test]
    fn cadence_builds_index() {
        let series = OrderedSeries::from_cadence(
            vec![Some(1.0), Some(2.0), Some(3.0)],
            10.0,
            -2.5,
            Order::StrictlyDecreasing,
        )
        .expect("cadence");
        assert_eq!(series.index(), &[10.0, 7.5, 5.0]);
        assert!(
            OrderedSeries::from_cadence(
                vec![Some(1.0), Some(2.0)],
                0.0,
                0.0,
                Order::Increasing
            )
            .is_err()
        );
    }

    #[test]
    fn from_unsorted_sorts_stably() {
        let series = OrderedSeries::from_unsorted(
            vec![Some("c"), Some("a"), Some("b"), Some("a2")],
            vec![3.0, 1.0, 2.0, 1.0],
            Order::Increasing,
        )
        .expect("sorted");
        assert_eq!(series.index(), &[1.0, 1.0, 2.0, 3.0]);
        assert_eq!(
            series.data(),
            &[Some("a"), Some("a2"), Some("b"), Some("c")]
        );
    }

    #[test]
    fn append_out_of_order_is_refused_without_mutation() {
        let mut series = OrderedSeries::<f64>::new(Order::StrictlyIncreasing);
        assert!(series.append(1.0, 1.0, true));
        assert!(series.append(2.0, 2.0, true));
        let before = series.clone();
        assert!(!series.append(0.5, 1.5, true));
        assert!(!series.append(0.5, 2.0, true));
        assert!(!series.append(0.5, f64::NAN, true));
        assert_eq!(series, before);
        assert!(series.append(None, 3.0, true));
        assert_eq!(series.missing_count(), 1);
    }

    #[test]
    fn decreasing_series_appends_downwards() {
        let mut series = OrderedSeries::<i64>::new(Order::Decreasing);
        assert!(series.append(1, 5.0, true));
        assert!(series.append(2, 5.0, true));
        assert!(series.append(3, 4.0, true));
        assert!(!series.append(4, 4.5, true));
        assert_eq!(series.index(), &[5.0, 5.0, 4.0]);
    }

    #[test]
    fn insert_finds_sorted_slot() {
        let mut series = sample();
        assert!(series.insert(5.0, 2.5, true));
        assert_eq!(series.index(), &[0.0, 1.0, 2.0, 2.5, 3.0, 4.0]);
        assert_eq!(series.data()[3], Some(5.0));
        assert!(!series.insert(9.0, 2.5, true));
        assert_eq!(series.len(), 6);
    }

    #[test]
    fn insert_into_decreasing_and_unordered() {
        let mut down = OrderedSeries::from_parts(
            vec![Some(1), Some(2)],
            vec![10.0, 0.0],
            Order::StrictlyDecreasing,
        )
        .expect("down");
        assert!(down.insert(3, 5.0, true));
        assert_eq!(down.index(), &[10.0, 5.0, 0.0]);

        let mut loose = OrderedSeries::from_parts(
            vec![Some(1), Some(2)],
            vec![10.0, 0.0],
            Order::Unordered,
        )
        .expect("loose");
        assert!(loose.insert(3, 5.0, true));
        assert_eq!(loose.index(), &[10.0, 0.0, 5.0]);
        assert_eq!(loose.position_of(0.0), Some(1));
    }

    #[test]
    fn assign_overwrites_or_inserts() {
        let mut series = sample();
        assert!(series.assign(7.0, 1.0));
        assert_eq!(series.data()[1], Some(7.0));
        assert!(series.assign(9.0, 10.0));
        assert_eq!(series.index().last(), Some(&10.0));
    }

    #[test]
    fn get_nearest_prefers_lower_index_on_tie() {
        let series = OrderedSeries::from_parts(
            vec![Some(0.0), Some(2.0)],
            vec![0.0, 2.0],
            Order::StrictlyIncreasing,
        )
        .expect("series");
        assert_eq!(series.get_nearest(1.0), Some((0.0, Some(&0.0))));
        let nearest = series.get_n_nearest(5, 1.9);
        assert_eq!(nearest, vec![(2.0, Some(&2.0)), (0.0, Some(&0.0))]);
        assert!(OrderedSeries::<f64>::new(Order::Increasing).get_nearest(1.0).is_none());
    }

    #[test]
    fn query_exact_index_returns_stored_value() {
        let series = sample();
        for method in [EstimationMethod::Nearest, EstimationMethod::Nearlin] {
            assert_eq!(series.query(4.0, method).expect("query"), Some(8.0));
        }
    }

    #[test]
    fn query_interpolates_over_present_rows() {
        let series = sample();
        assert_eq!(
            series.query(3.0, EstimationMethod::Nearlin).expect("query"),
            Some(5.0)
        );
        assert_eq!(
            series.query(3.0, EstimationMethod::Nearest).expect("query"),
            Some(2.0)
        );
        assert_eq!(
            series
                .query_many(&[-1.0, 1.0, 9.0], EstimationMethod::Nearlin)
                .expect("query"),
            vec![Some(0.0), Some(1.0), Some(8.0)]
        );
    }

    #[test]
    fn query_on_empty_series_is_empty() {
        let series = OrderedSeries::<f64>::new(Order::StrictlyIncreasing);
        assert_eq!(series.query(1.0, EstimationMethod::Nearlin).expect("query"), None);
        assert!(
            series
                .query_many(&[], EstimationMethod::Nearest)
                .expect("query")
                .is_empty()
        );
    }

    #[test]
    fn unsupported_method_is_an_error_everywhere() {
        let mut series = sample();
        let method = EstimationMethod::Linreg;
        assert_eq!(
            series.query(1.0, method),
            Err(SeriesError::UnsupportedMethod(method))
        );
        assert!(series.query_many(&[], method).is_err());
        assert!(series.fill(method).is_err());
        assert!(series.resample(0.0, 1.0, 3, method).is_err());
        assert!(series.minus(&sample(), method).is_err());
    }

    #[test]
    fn fill_is_idempotent() {
        let mut series = sample();
        series.fill(EstimationMethod::Nearlin).expect("fill");
        assert_eq!(
            series.data(),
            &[Some(0.0), Some(1.0), Some(2.0), Some(5.0), Some(8.0)]
        );
        let once = series.clone();
        series.fill(EstimationMethod::Nearlin).expect("fill");
        assert_eq!(series, once);
        assert!(series.is_complete());
    }

    #[test]
    fn fill_with_nearest_on_text() {
        let mut series = OrderedSeries::from_parts(
            vec![Some("a".to_owned()), None, None, Some("b".to_owned())],
            vec![0.0, 1.0, 2.0, 3.0],
            Order::StrictlyIncreasing,
        )
        .expect("series");
        series.fill(EstimationMethod::Nearlin).expect("fill");
        let values: Vec<_> = series.data().iter().map(|v| v.as_deref()).collect();
        assert_eq!(values, vec![Some("a"), Some("a"), Some("b"), Some("b")]);
    }

    #[test]
    fn fill_without_present_rows_is_noop() {
        let mut series: OrderedSeries<f64> =
            OrderedSeries::from_parts(vec![None, None], vec![0.0, 1.0], Order::Increasing)
                .expect("series");
        series.fill(EstimationMethod::Nearest).expect("fill");
        assert_eq!(series.missing_count(), 2);
    }

    #[test]
    fn resample_uses_cadence_and_step_order() {
        let series = sample();
        let out = series
            .resample(4.0, -1.5, 3, EstimationMethod::Nearlin)
            .expect("resample");
        assert_eq!(out.index(), &[4.0, 2.5, 1.0]);
        assert_eq!(out.order(), Order::StrictlyDecreasing);
        assert_eq!(out.data(), &[Some(8.0), Some(3.5), Some(1.0)]);
        assert!(matches!(
            series.resample(0.0, 0.0, 2, EstimationMethod::Nearest),
            Err(SeriesError::InvalidCadence { .. })
        ));
        assert_eq!(
            series
                .resample(0.0, 0.0, 1, EstimationMethod::Nearest)
                .expect("single point")
                .len(),
            1
        );
    }

    #[test]
    fn minus_mse_rms() {
        let truth = OrderedSeries::from_parts(
            vec![Some(0.0), Some(2.0), Some(4.0)],
            vec![0.0, 2.0, 4.0],
            Order::StrictlyIncreasing,
        )
        .expect("truth");
        let model = OrderedSeries::from_parts(
            vec![Some(1.0), Some(1.0), None],
            vec![0.0, 1.0, 3.0],
            Order::StrictlyIncreasing,
        )
        .expect("model");

        let diff = truth.minus(&model, EstimationMethod::Nearlin).expect("minus");
        assert_eq!(diff.index(), truth.index());
        assert_eq!(diff.data(), &[Some(-1.0), Some(1.0), Some(3.0)]);

        let mse = truth.mse(&model, EstimationMethod::Nearlin).expect("mse");
        assert!((mse - 11.0 / 3.0).abs() < 1e-12);
        let rms = truth.rms(&model, EstimationMethod::Nearlin).expect("rms");
        assert!((rms - (11.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mse_without_overlap_is_nan() {
        let empty = OrderedSeries::<f64>::new(Order::StrictlyIncreasing);
        assert!(
            sample()
                .mse(&empty, EstimationMethod::Nearest)
                .expect("mse")
                .is_nan()
        );
    }

    #[test]
    fn text_series_has_no_difference() {
        let text = OrderedSeries::from_parts(
            vec![Some("a".to_owned())],
            vec![0.0],
            Order::StrictlyIncreasing,
        )
        .expect("text");
        assert!(matches!(
            text.minus(&text, EstimationMethod::Nearest),
            Err(SeriesError::NonNumeric(_))
        ));
        assert!(matches!(
            text.mse(&text, EstimationMethod::Nearest),
            Err(SeriesError::NonNumeric(_))
        ));
    }

    #[test]
    fn present_reports_locations() {
        let present = sample().present();
        assert_eq!(present.index, vec![0.0, 2.0, 4.0]);
        assert_eq!(present.data, vec![0.0, 2.0, 8.0]);
        assert_eq!(present.locations, vec![0, 2, 4]);
    }

    #[test]
    fn slice_and_between() {
        let series = sample();
        assert_eq!(series.slice(1..3).index(), &[1.0, 2.0]);
        assert_eq!(series.slice(3..99).len(), 2);
        assert_eq!(series.between(0.5, 3.0).index(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn render_marks_gaps() {
        let text = sample().with_name("y").with_max_column_width(5).render_plain();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with('y'));
        assert!(lines[2].ends_with("NA"));
    }

    #[test]
    fn serde_round_trip_revalidates() {
        let series = sample().with_name("y");
        let json = serde_json::to_string(&series).expect("serialize");
        let back: OrderedSeries<f64> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, series);

        let broken = r#"{"order":"strictly_increasing","index":[1.0,0.0],"data":[1.0,null]}"#;
        assert!(serde_json::from_str::<OrderedSeries<f64>>(broken).is_err());
    }

    #[test]
    fn infinite_indices_are_rejected() {
        assert_eq!(
            OrderedSeries::from_parts(
                vec![Some(0.0), Some(10.0)],
                vec![f64::NEG_INFINITY, 10.0],
                Order::StrictlyIncreasing,
            )
            .expect_err("must fail"),
            SeriesError::NonFiniteIndex {
                position: 0,
                value: f64::NEG_INFINITY
            }
        );

        let mut series = sample();
        assert!(!series.append(1.0, f64::INFINITY, false));
        assert!(!series.insert(1.0, f64::NEG_INFINITY, false));
        assert_eq!(series, sample());
        series.fill(EstimationMethod::Nearlin).expect("fill");
        assert!(series.data().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn merge_index_adds_missing_values_as_gaps() {
        let mut series = OrderedSeries::from_parts(
            vec![Some(1), Some(2), Some(3)],
            vec![1.0, 3.0, 3.0],
            Order::Increasing,
        )
        .expect("series");
        assert_eq!(series.merge_index(&[0.0, 3.0, 4.0, 4.0, f64::INFINITY]), 2);
        assert_eq!(series.index(), &[0.0, 1.0, 3.0, 3.0, 4.0]);
        assert_eq!(series.data(), &[None, Some(1), Some(2), Some(3), None]);

        let mut down = OrderedSeries::from_parts(
            vec![Some(5.0), Some(1.0)],
            vec![5.0, 1.0],
            Order::StrictlyDecreasing,
        )
        .expect("series");
        assert_eq!(down.merge_index(&[6.0, 3.0, 1.0, 0.0]), 3);
        assert_eq!(down.index(), &[6.0, 5.0, 3.0, 1.0, 0.0]);

        let mut loose = OrderedSeries::from_parts(
            vec![Some(1.0)],
            vec![2.0],
            Order::Unordered,
        )
        .expect("series");
        assert_eq!(loose.merge_index(&[9.0, 2.0, 0.0]), 2);
        assert_eq!(loose.index(), &[2.0, 9.0, 0.0]);
    }

    #[test]
    fn merge_matches_one_by_one_insertion() {
        let base = OrderedSeries::from_parts(
            vec![Some(0_i64), None, Some(4)],
            vec![0.0, 2.0, 4.0],
            Order::StrictlyIncreasing,
        )
        .expect("series");
        let incoming = [-1.0, 1.0, 2.0, 3.0, 5.0];

        let mut merged = base.clone();
        merged.merge_index(&incoming);
        let mut stepwise = base;
        for &x in &incoming {
            stepwise.ensure_index(x);
        }
        assert_eq!(merged, stepwise);
    }

    #[test]
    fn large_sorted_series_merge_and_fill() {
        let n = 200_000;
        let evens: Vec<f64> = (0..n).map(|i| f64::from(2 * i)).collect();
        let odds: Vec<f64> = (0..n).map(|i| f64::from(2 * i + 1)).collect();
        let mut series = OrderedSeries::from_parts(
            evens.iter().map(|&x| Some(x)).collect(),
            evens,
            Order::StrictlyIncreasing,
        )
        .expect("series");

        assert_eq!(series.merge_index(&odds), n as usize);
        assert_eq!(series.missing_count(), n as usize);
        series.fill(EstimationMethod::Nearlin).expect("fill");
        assert!(series.is_complete());
        for (x, value) in series.iter().take(1_000) {
            assert_eq!(value, Some(&x));
        }
    }

    #[test]
    fn minus_rejects_boolean_values_in_every_form() {
        let flags = OrderedSeries::from_parts(
            vec![Some(true), Some(false)],
            vec![0.0, 1.0],
            Order::StrictlyIncreasing,
        )
        .expect("flags");
        assert!(matches!(
            flags.minus(&flags, EstimationMethod::Nearest),
            Err(SeriesError::NonNumeric(_))
        ));

        let scalars = flags.map_values(|&b| Scalar::Bool(b));
        assert!(matches!(
            scalars.minus(&scalars, EstimationMethod::Nearest),
            Err(SeriesError::NonNumeric(_))
        ));

        let mixed = OrderedSeries::from_parts(
            vec![Some(Scalar::Int64(3)), Some(Scalar::Float64(1.5))],
            vec![0.0, 1.0],
            Order::StrictlyIncreasing,
        )
        .expect("mixed");
        let ones = mixed.map_values(|_| Scalar::Int64(1));
        let diff = mixed.minus(&ones, EstimationMethod::Nearest).expect("minus");
        assert_eq!(
            diff.data(),
            &[Some(Scalar::Int64(2)), Some(Scalar::Float64(0.5))]
        );
    }
}

