#![forbid(unsafe_code)]

//! Calendar-indexed view over [`OrderedSeries`].
//!
//! A [`TimeSeries`] stores its rows under Unix-epoch seconds, with the
//! sub-second part as the fraction, and speaks `DateTime<Utc>` at its
//! surface. Every stored index maps back to a representable timestamp.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use mx_series::{OrderedSeries, SeriesError};
use mx_types::{Element, EstimationMethod, Order, SeriesConfig, clip_cell};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeSeriesError {
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("index {0} is outside the representable timestamp range")]
    OutOfRange(f64),
}

const NANOS_PER_SECOND: f64 = 1e9;

/// Seconds since the Unix epoch, fraction included.
#[must_use]
pub fn to_index(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / NANOS_PER_SECOND
}

/// Inverse of [`to_index`], rounded to the nearest nanosecond. `None` for
/// non-finite values and values outside chrono's range.
#[must_use]
pub fn from_index(index: f64) -> Option<DateTime<Utc>> {
    if !index.is_finite() {
        return None;
    }
    let whole = index.floor();
    let nanos = ((index - whole) * NANOS_PER_SECOND).round();
    let (secs, nanos) = if nanos >= NANOS_PER_SECOND {
        (whole + 1.0, 0.0)
    } else {
        (whole, nanos)
    };
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, nanos as u32).single()
}

fn duration_seconds(step: Duration) -> f64 {
    step.num_seconds() as f64 + f64::from(step.subsec_nanos()) / NANOS_PER_SECOND
}

fn render_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Non-missing rows with their timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedPresent<T> {
    pub timestamps: Vec<DateTime<Utc>>,
    pub data: Vec<T>,
    pub locations: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    series: OrderedSeries<T>,
}

impl<T> TimeSeries<T> {
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            series: OrderedSeries::new(order),
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, order: Order) -> Self {
        Self {
            series: OrderedSeries::named(name, order),
        }
    }

    pub fn from_parts(
        data: Vec<Option<T>>,
        timestamps: &[DateTime<Utc>],
        order: Order,
    ) -> Result<Self, TimeSeriesError> {
        let index = timestamps.iter().copied().map(to_index).collect();
        Ok(Self {
            series: OrderedSeries::from_parts(data, index, order)?,
        })
    }

    /// Rows at `start`, `start + step`, ... one per value.
    pub fn from_cadence(
        data: Vec<Option<T>>,
        start: DateTime<Utc>,
        step: Duration,
        order: Order,
    ) -> Result<Self, TimeSeriesError> {
        let series =
            OrderedSeries::from_cadence(data, to_index(start), duration_seconds(step), order)?;
        Self::from_series(series)
    }

    /// Adopt a series whose index already holds epoch seconds.
    pub fn from_series(series: OrderedSeries<T>) -> Result<Self, TimeSeriesError> {
        if let Some(&bad) = series.index().iter().find(|&&x| from_index(x).is_none()) {
            return Err(TimeSeriesError::OutOfRange(bad));
        }
        Ok(Self { series })
    }

    #[must_use]
    pub fn into_series(self) -> OrderedSeries<T> {
        self.series
    }

    #[must_use]
    pub fn as_series(&self) -> &OrderedSeries<T> {
        &self.series
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.series.name()
    }

    #[must_use]
    pub fn order(&self) -> Order {
        self.series.order()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.series.is_complete()
    }

    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.series.missing_count()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.series.index().iter().filter_map(|&x| from_index(x)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, Option<&T>)> + '_ {
        self.series
            .iter()
            .filter_map(|(x, value)| Some((from_index(x)?, value)))
    }

    pub fn append(&mut self, value: impl Into<Option<T>>, at: DateTime<Utc>, verify: bool) -> bool {
        self.series.append(value, to_index(at), verify)
    }

    pub fn insert(&mut self, value: impl Into<Option<T>>, at: DateTime<Utc>, verify: bool) -> bool {
        self.series.insert(value, to_index(at), verify)
    }

    pub fn assign(&mut self, value: impl Into<Option<T>>, at: DateTime<Utc>) -> bool {
        self.series.assign(value, to_index(at))
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.series.contains_index(to_index(at))
    }

    #[must_use]
    pub fn get_nearest(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, Option<&T>)> {
        let (x, value) = self.series.get_nearest(to_index(at))?;
        Some((from_index(x)?, value))
    }

    #[must_use]
    pub fn get_n_nearest(&self, n: usize, at: DateTime<Utc>) -> Vec<(DateTime<Utc>, Option<&T>)> {
        self.series
            .get_n_nearest(n, to_index(at))
            .into_iter()
            .filter_map(|(x, value)| Some((from_index(x)?, value)))
            .collect()
    }

    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self
    where
        T: Clone,
    {
        Self {
            series: self.series.slice(range),
        }
    }

    /// Rows stamped within `[from, to]`.
    #[must_use]
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self
    where
        T: Clone,
    {
        Self {
            series: self.series.between(to_index(from), to_index(to)),
        }
    }

    #[must_use]
    pub fn present(&self) -> TimedPresent<T>
    where
        T: Clone,
    {
        let present = self.series.present();
        TimedPresent {
            timestamps: present.index.iter().filter_map(|&x| from_index(x)).collect(),
            data: present.data,
            locations: present.locations,
        }
    }
}

impl<T: Element> TimeSeries<T> {
    pub fn query(
        &self,
        at: DateTime<Utc>,
        method: EstimationMethod,
    ) -> Result<Option<T>, TimeSeriesError> {
        Ok(self.series.query(to_index(at), method)?)
    }

    pub fn query_many(
        &self,
        at: &[DateTime<Utc>],
        method: EstimationMethod,
    ) -> Result<Vec<Option<T>>, TimeSeriesError> {
        let index: Vec<f64> = at.iter().copied().map(to_index).collect();
        Ok(self.series.query_many(&index, method)?)
    }

    pub fn fill(&mut self, method: EstimationMethod) -> Result<(), TimeSeriesError> {
        Ok(self.series.fill(method)?)
    }

    pub fn filled(&self, method: EstimationMethod) -> Result<Self, TimeSeriesError> {
        Ok(Self {
            series: self.series.filled(method)?,
        })
    }

    /// `count` rows at `start + i * step`, estimated from this series.
    pub fn resample(
        &self,
        start: DateTime<Utc>,
        step: Duration,
        count: usize,
        method: EstimationMethod,
    ) -> Result<Self, TimeSeriesError> {
        let series =
            self.series
                .resample(to_index(start), duration_seconds(step), count, method)?;
        Self::from_series(series)
    }

    pub fn minus(&self, other: &Self, method: EstimationMethod) -> Result<Self, TimeSeriesError> {
        Ok(Self {
            series: self.series.minus(&other.series, method)?,
        })
    }

    pub fn mse(&self, other: &Self, method: EstimationMethod) -> Result<f64, TimeSeriesError> {
        Ok(self.series.mse(&other.series, method)?)
    }

    pub fn rms(&self, other: &Self, method: EstimationMethod) -> Result<f64, TimeSeriesError> {
        Ok(self.series.rms(&other.series, method)?)
    }

    /// Timestamps print in full RFC 3339; only the value column is clipped.
    #[must_use]
    pub fn render_plain(&self) -> String {
        let width = self
            .series
            .max_column_width()
            .unwrap_or(SeriesConfig::DEFAULT_COLUMN_WIDTH)
            .max(1);
        let rows: Vec<(String, String)> = self
            .iter()
            .map(|(at, value)| {
                let cell = value.map_or_else(|| "NA".to_owned(), |v| v.to_scalar().to_string());
                (render_timestamp(at), clip_cell(&cell, width))
            })
            .collect();
        let time_width = rows.iter().map(|(t, _)| t.len()).max().unwrap_or(0).max(4);

        let header = clip_cell(self.name().unwrap_or("value"), width);
        let mut out = format!("{:<time_width$}  {header:>width$}\n", "time");
        for (at, cell) in rows {
            out.push_str(&format!("{at:<time_width$}  {cell:>width$}\n"));
        }
        out
    }
}

impl<T: Element> fmt::Display for TimeSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}
