#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction an index sequence must respect.
///
/// The strict variants additionally forbid repeated index values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Unordered,
    Increasing,
    #[default]
    StrictlyIncreasing,
    Decreasing,
    StrictlyDecreasing,
}

impl Order {
    #[must_use]
    pub fn is_sorted(self) -> bool {
        !matches!(self, Self::Unordered)
    }

    #[must_use]
    pub fn is_unique(self) -> bool {
        matches!(self, Self::StrictlyIncreasing | Self::StrictlyDecreasing)
    }

    #[must_use]
    pub fn is_increasing(self) -> bool {
        matches!(self, Self::Increasing | Self::StrictlyIncreasing)
    }

    #[must_use]
    pub fn is_decreasing(self) -> bool {
        matches!(self, Self::Decreasing | Self::StrictlyDecreasing)
    }

    /// Order of a fixed cadence `start + i * step`.
    #[must_use]
    pub fn for_step(step: f64) -> Self {
        if step < 0.0 {
            Self::StrictlyDecreasing
        } else {
            Self::StrictlyIncreasing
        }
    }

    /// Whether `next` may directly follow `prev` in a sequence of this order.
    #[must_use]
    pub fn admits(self, prev: f64, next: f64) -> bool {
        match self {
            Self::Unordered => true,
            Self::Increasing => prev <= next,
            Self::StrictlyIncreasing => prev < next,
            Self::Decreasing => prev >= next,
            Self::StrictlyDecreasing => prev > next,
        }
    }

    /// Comparator placing `a` relative to `b` in this order's direction.
    ///
    /// `Unordered` treats every pair as equal so stable sorts keep input order.
    #[must_use]
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        let natural = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        if self.is_decreasing() {
            natural.reverse()
        } else if self.is_increasing() {
            natural
        } else {
            Ordering::Equal
        }
    }

    /// Index of the first pair violating the order, if any.
    #[must_use]
    pub fn first_violation(self, index: &[f64]) -> Option<usize> {
        index
            .windows(2)
            .position(|pair| !self.admits(pair[0], pair[1]))
            .map(|pos| pos + 1)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unordered => "unordered",
            Self::Increasing => "increasing",
            Self::StrictlyIncreasing => "strictly increasing",
            Self::Decreasing => "decreasing",
            Self::StrictlyDecreasing => "strictly decreasing",
        };
        f.write_str(label)
    }
}

/// Estimation vocabulary accepted by query, fill and resample.
///
/// Only `Nearest` and `Nearlin` have kernels; the rest are reserved names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    Nearest,
    #[default]
    Nearlin,
    Linreg,
    Linterp,
    Next,
    Previous,
    Spline,
    Gaussproc,
}

impl EstimationMethod {
    #[must_use]
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Nearest | Self::Nearlin)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Nearlin => "nearlin",
            Self::Linreg => "linreg",
            Self::Linterp => "linterp",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Spline => "spline",
            Self::Gaussproc => "gaussproc",
        }
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    Int64,
    Float64,
    Utf8,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
        };
        f.write_str(label)
    }
}

/// A single present cell value. Missing cells are `Option::None` around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("expected dtype {expected} but found {found}")]
    DtypeMismatch { expected: DType, found: DType },
}

/// Value types a series can hold.
///
/// The defaults describe a value with no arithmetic: not interpolable, not
/// numeric, no difference. Estimation falls back to nearest-neighbour for
/// such types.
pub trait Element: Clone + PartialEq + fmt::Debug {
    /// Value at fraction `t` of the way from `lo` to `hi`.
    fn lerp(_lo: &Self, _hi: &Self, _t: f64) -> Option<Self> {
        None
    }

    fn to_f64(&self) -> Option<f64> {
        None
    }

    /// `self - other`.
    fn difference(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn to_scalar(&self) -> Scalar;
}

impl Element for f64 {
    fn lerp(lo: &Self, hi: &Self, t: f64) -> Option<Self> {
        Some(lo + (hi - lo) * t)
    }

    fn to_f64(&self) -> Option<f64> {
        Some(*self)
    }

    fn difference(&self, other: &Self) -> Option<Self> {
        Some(self - other)
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Float64(*self)
    }
}

impl Element for f32 {
    fn lerp(lo: &Self, hi: &Self, t: f64) -> Option<Self> {
        Some((f64::from(*lo) + (f64::from(*hi) - f64::from(*lo)) * t) as f32)
    }

    fn to_f64(&self) -> Option<f64> {
        Some(f64::from(*self))
    }

    fn difference(&self, other: &Self) -> Option<Self> {
        Some(self - other)
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Float64(f64::from(*self))
    }
}

// Integers interpolate through f64 and round to the nearest representable value.
impl Element for i64 {
    fn lerp(lo: &Self, hi: &Self, t: f64) -> Option<Self> {
        let value = (*lo as f64 + (*hi as f64 - *lo as f64) * t).round();
        (value.is_finite() && value >= i64::MIN as f64 && value <= i64::MAX as f64)
            .then_some(value as i64)
    }

    fn to_f64(&self) -> Option<f64> {
        Some(*self as f64)
    }

    fn difference(&self, other: &Self) -> Option<Self> {
        self.checked_sub(*other)
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Int64(*self)
    }
}

impl Element for i32 {
    fn lerp(lo: &Self, hi: &Self, t: f64) -> Option<Self> {
        let value = (f64::from(*lo) + (f64::from(*hi) - f64::from(*lo)) * t).round();
        (value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX)).then_some(value as i32)
    }

    fn to_f64(&self) -> Option<f64> {
        Some(f64::from(*self))
    }

    fn difference(&self, other: &Self) -> Option<Self> {
        self.checked_sub(*other)
    }

    fn to_scalar(&self) -> Scalar {
        Scalar::Int64(i64::from(*self))
    }
}

impl Element for bool {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }
}

impl Element for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::Utf8(self.clone())
    }
}

impl Element for Scalar {
    fn lerp(lo: &Self, hi: &Self, t: f64) -> Option<Self> {
        match (lo, hi) {
            (Self::Float64(a), Self::Float64(b)) => f64::lerp(a, b, t).map(Self::Float64),
            (Self::Int64(a), Self::Int64(b)) => i64::lerp(a, b, t).map(Self::Int64),
            _ => None,
        }
    }

    // Booleans are flags here, as for plain `bool`: neither variant of
    // text or truth value takes part in arithmetic.
    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(_) | Self::Float64(_) => Scalar::to_f64(self).ok(),
            Self::Bool(_) | Self::Utf8(_) => None,
        }
    }

    fn difference(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.checked_sub(*b).map(Self::Int64),
            _ => Some(Self::Float64(
                Element::to_f64(self)? - Element::to_f64(other)?,
            )),
        }
    }

    fn to_scalar(&self) -> Scalar {
        self.clone()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("series config is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("max_column_width must be at least 1")]
    ZeroColumnWidth,
}

/// Defaults shared by tables and views: the estimation method used when a
/// caller does not name one, and the render width cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    pub method: EstimationMethod,
    pub max_column_width: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self::nearlin()
    }
}

impl SeriesConfig {
    pub const DEFAULT_COLUMN_WIDTH: usize = 12;

    #[must_use]
    pub fn nearest() -> Self {
        Self {
            method: EstimationMethod::Nearest,
            max_column_width: Self::DEFAULT_COLUMN_WIDTH,
        }
    }

    #[must_use]
    pub fn nearlin() -> Self {
        Self {
            method: EstimationMethod::Nearlin,
            max_column_width: Self::DEFAULT_COLUMN_WIDTH,
        }
    }

    #[must_use]
    pub fn with_max_column_width(mut self, width: usize) -> Self {
        self.max_column_width = width;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        if config.max_column_width == 0 {
            return Err(ConfigError::ZeroColumnWidth);
        }
        Ok(config)
    }
}

/// Truncate `text` to `width` characters, marking the cut with `~`.
#[must_use]
pub fn clip_cell(text: &str, width: usize) -> String {
    if text.chars().count() <= width || width == 0 {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}
