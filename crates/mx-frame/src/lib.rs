#![forbid(unsafe_code)]

use std::fmt;

use log::{debug, warn};
use mx_series::{OrderedSeries, SeriesError};
use mx_types::{DType, Element, EstimationMethod, Order, Scalar, SeriesConfig, clip_cell};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("column '{name}' is {found} but the table is {expected}")]
    OrderMismatch {
        name: String,
        expected: Order,
        found: Order,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

const DEFAULT_COLUMN_NAME: &str = "series";

/// A table column: one ordered series of a supported element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "series", rename_all = "snake_case")]
pub enum AnySeries {
    Bool(OrderedSeries<bool>),
    Int64(OrderedSeries<i64>),
    Float64(OrderedSeries<f64>),
    Utf8(OrderedSeries<String>),
}

macro_rules! with_series {
    ($column:expr, $series:ident => $body:expr) => {
        match $column {
            AnySeries::Bool($series) => $body,
            AnySeries::Int64($series) => $body,
            AnySeries::Float64($series) => $body,
            AnySeries::Utf8($series) => $body,
        }
    };
}

impl AnySeries {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        with_series!(self, s => s.name())
    }

    fn set_name(&mut self, name: String) {
        with_series!(self, s => s.set_name(Some(name)));
    }

    #[must_use]
    pub fn order(&self) -> Order {
        with_series!(self, s => s.order())
    }

    #[must_use]
    pub fn index(&self) -> &[f64] {
        with_series!(self, s => s.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    #[must_use]
    pub fn max_column_width(&self) -> Option<usize> {
        with_series!(self, s => s.max_column_width())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        with_series!(self, s => s.is_complete())
    }

    #[must_use]
    pub fn missing_count(&self) -> usize {
        with_series!(self, s => s.missing_count())
    }

    #[must_use]
    pub fn contains_index(&self, index: f64) -> bool {
        with_series!(self, s => s.contains_index(index))
    }

    fn merge_index(&mut self, incoming: &[f64]) -> usize {
        with_series!(self, s => s.merge_index(incoming))
    }

    /// Whether the declared order is sorted and no index value repeats.
    fn has_sorted_unique_index(&self) -> bool {
        self.order().is_sorted() && self.index().windows(2).all(|pair| pair[0] != pair[1])
    }

    pub fn fill(&mut self, method: EstimationMethod) -> Result<(), SeriesError> {
        with_series!(self, s => s.fill(method))
    }

    /// Cell at `index`: `None` when the column lacks the index, `Some(None)`
    /// for a gap.
    #[must_use]
    pub fn cell_at(&self, index: f64) -> Option<Option<Scalar>> {
        with_series!(self, s => {
            let position = s.position_of(index)?;
            Some(s.data()[position].as_ref().map(Element::to_scalar))
        })
    }
}

/// Element types a [`SeriesTable`] column can hold.
pub trait ColumnElement: Element + Sized {
    const DTYPE: DType;

    fn wrap(series: OrderedSeries<Self>) -> AnySeries;

    fn project(column: &AnySeries) -> Option<&OrderedSeries<Self>>;

    fn project_mut(column: &mut AnySeries) -> Option<&mut OrderedSeries<Self>>;
}

macro_rules! column_element {
    ($ty:ty, $variant:ident) => {
        impl ColumnElement for $ty {
            const DTYPE: DType = DType::$variant;

            fn wrap(series: OrderedSeries<Self>) -> AnySeries {
                AnySeries::$variant(series)
            }

            fn project(column: &AnySeries) -> Option<&OrderedSeries<Self>> {
                match column {
                    AnySeries::$variant(series) => Some(series),
                    _ => None,
                }
            }

            fn project_mut(column: &mut AnySeries) -> Option<&mut OrderedSeries<Self>> {
                match column {
                    AnySeries::$variant(series) => Some(series),
                    _ => None,
                }
            }
        }

        impl From<OrderedSeries<$ty>> for AnySeries {
            fn from(series: OrderedSeries<$ty>) -> Self {
                Self::$variant(series)
            }
        }
    };
}

column_element!(bool, Bool);
column_element!(i64, Int64);
column_element!(f64, Float64);
column_element!(String, Utf8);

/// Named series sharing one order. Columns are aligned lazily: every
/// assignment unions the incoming index into the existing columns and back.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesTable {
    columns: Vec<AnySeries>,
    config: SeriesConfig,
}

impl<'de> Deserialize<'de> for SeriesTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            columns: Vec<AnySeries>,
            #[serde(default)]
            config: SeriesConfig,
        }
        let raw = Raw::deserialize(deserializer)?;
        let mut table = Self::with_config(raw.config);
        for column in raw.columns {
            table
                .assign_any(column)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(table)
    }
}

impl SeriesTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SeriesConfig) -> Self {
        Self {
            columns: Vec::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Order shared by every column; `None` for an empty table.
    #[must_use]
    pub fn order(&self) -> Option<Order> {
        self.columns.first().map(AnySeries::order)
    }

    #[must_use]
    pub fn columns(&self) -> &[AnySeries] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().filter_map(AnySeries::name).collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&AnySeries> {
        self.columns.iter().find(|c| c.name() == Some(name))
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut AnySeries> {
        self.columns.iter_mut().find(|c| c.name() == Some(name))
    }

    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.column(name).map(AnySeries::dtype)
    }

    fn unique_name(&self, base: &str) -> String {
        if self.column(base).is_none() {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.column(candidate).is_none())
            .unwrap_or_else(|| base.to_owned())
    }

    pub fn assign<T: ColumnElement>(
        &mut self,
        series: OrderedSeries<T>,
    ) -> Result<String, FrameError> {
        self.assign_any(T::wrap(series))
    }

    /// Add a column, returning the name it was stored under.
    ///
    /// Unnamed columns are called `series`; a taken name `x` becomes `x_1`,
    /// `x_2`, ... The column must share the table's order. Afterwards every
    /// column holds the union of its own and the incoming index, with gaps
    /// where it had no row.
    pub fn assign_any(&mut self, mut column: AnySeries) -> Result<String, FrameError> {
        let name = self.unique_name(column.name().unwrap_or(DEFAULT_COLUMN_NAME));

        if let Some(expected) = self.order() {
            if column.order() != expected {
                return Err(FrameError::OrderMismatch {
                    name,
                    expected,
                    found: column.order(),
                });
            }
        }

        let incoming = column.index().to_vec();
        for existing in &mut self.columns {
            existing.merge_index(&incoming);
            column.merge_index(existing.index());
        }

        debug!(
            "assigned {} column '{name}' with {} rows",
            column.dtype(),
            column.len()
        );
        column.set_name(name.clone());
        self.columns.push(column);
        Ok(name)
    }

    /// Typed view of a column; `None` when the name is unknown or the column
    /// holds another element type.
    #[must_use]
    pub fn get<T: ColumnElement>(&self, name: &str) -> Option<&OrderedSeries<T>> {
        let Some(column) = self.column(name) else {
            warn!("no column named '{name}'");
            return None;
        };
        let projected = T::project(column);
        if projected.is_none() {
            warn!(
                "column '{name}' holds {} values, requested {}",
                column.dtype(),
                T::DTYPE
            );
        }
        projected
    }

    /// Mutable typed view. Rows added through it are not propagated to the
    /// other columns until [`fill_index`](Self::fill_index).
    pub fn get_mut<T: ColumnElement>(&mut self, name: &str) -> Option<&mut OrderedSeries<T>> {
        let Some(column) = self.column_mut(name) else {
            warn!("no column named '{name}'");
            return None;
        };
        let dtype = column.dtype();
        let projected = T::project_mut(column);
        if projected.is_none() {
            warn!("column '{name}' holds {dtype} values, requested {}", T::DTYPE);
        }
        projected
    }

    pub fn remove(&mut self, name: &str) -> Option<AnySeries> {
        let position = self.columns.iter().position(|c| c.name() == Some(name))?;
        Some(self.columns.remove(position))
    }

    pub fn fill(&mut self, method: EstimationMethod) -> Result<(), FrameError> {
        if !method.is_supported() {
            return Err(SeriesError::UnsupportedMethod(method).into());
        }
        for column in &mut self.columns {
            column.fill(method)?;
        }
        Ok(())
    }

    /// [`fill`](Self::fill) with the configured method.
    pub fn fill_default(&mut self) -> Result<(), FrameError> {
        self.fill(self.config.method)
    }

    /// Distinct index values across all columns, in the table's order.
    /// Unsorted tables keep first-seen order.
    #[must_use]
    pub fn union_index(&self) -> Vec<f64> {
        let mut union: Vec<f64> = Vec::new();
        match self.order() {
            Some(order) if order.is_sorted() => {
                union.extend(self.columns.iter().flat_map(|c| c.index().iter().copied()));
                union.sort_by(|a, b| order.compare(*a, *b));
                union.dedup();
            }
            _ => {
                for &x in self.columns.iter().flat_map(|c| c.index()) {
                    if !union.contains(&x) {
                        union.push(x);
                    }
                }
            }
        }
        union
    }

    /// Add every union index missing from a column as a gap in it.
    ///
    /// Only defined when every column is sorted without repeated indices;
    /// otherwise nothing changes and `false` is returned.
    pub fn fill_index(&mut self) -> bool {
        if let Some(column) = self.columns.iter().find(|c| !c.has_sorted_unique_index()) {
            warn!(
                "fill_index skipped: column '{}' is not sorted with unique indices",
                column.name().unwrap_or(DEFAULT_COLUMN_NAME)
            );
            return false;
        }
        let union = self.union_index();
        for column in &mut self.columns {
            column.merge_index(&union);
        }
        true
    }

    #[must_use]
    pub fn copy_with_filled_index(&self) -> Option<Self> {
        let mut copy = self.clone();
        copy.fill_index().then_some(copy)
    }

    /// True when no column has a gap.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.columns.iter().all(AnySeries::is_complete)
    }

    /// Cells of every column at `index`, or `None` when no column has it.
    #[must_use]
    pub fn row(&self, index: f64) -> Option<Vec<Option<Scalar>>> {
        let cells: Vec<Option<Option<Scalar>>> =
            self.columns.iter().map(|c| c.cell_at(index)).collect();
        if cells.iter().all(Option::is_none) {
            return None;
        }
        Some(cells.into_iter().map(Option::flatten).collect())
    }

    #[must_use]
    pub fn render_plain(&self) -> String {
        let default_width = self.config.max_column_width.max(1);
        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| c.max_column_width().unwrap_or(default_width).max(1))
            .collect();

        let mut out = format!("{:>default_width$}", clip_cell("index", default_width));
        for (column, &width) in self.columns.iter().zip(&widths) {
            let name = column.name().unwrap_or(DEFAULT_COLUMN_NAME);
            out.push_str(&format!("  {:>width$}", clip_cell(name, width)));
        }
        out.push('\n');

        for x in self.union_index() {
            out.push_str(&format!(
                "{:>default_width$}",
                clip_cell(&x.to_string(), default_width)
            ));
            for (column, &width) in self.columns.iter().zip(&widths) {
                let cell = match column.cell_at(x) {
                    Some(Some(value)) => value.to_string(),
                    Some(None) => "NA".to_owned(),
                    None => String::new(),
                };
                out.push_str(&format!("  {:>width$}", clip_cell(&cell, width)));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for SeriesTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}
