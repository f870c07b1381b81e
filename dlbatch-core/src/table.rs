//! Dense per-security time-series table.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date-indexed table of optional values: one row per calendar date in an
/// inclusive range, one column per requested field.
///
/// Absence is the `None` cell, never a sentinel value — a reported zero is a
/// present observation and is stored as `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityTable {
    begin: NaiveDate,
    end: NaiveDate,
    fields: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl SecurityTable {
    /// All-absent table spanning `[begin, end]`. Callers must ensure
    /// `begin <= end`; the parser validates the range once up front.
    pub fn new(begin: NaiveDate, end: NaiveDate, fields: &[&str]) -> Self {
        let num_rows = (end - begin).num_days().max(0) as usize + 1;
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let rows = vec![vec![None; fields.len()]; num_rows];
        Self {
            begin,
            end,
            fields,
            rows,
        }
    }

    pub fn begin(&self) -> NaiveDate {
        self.begin
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Column names, in request order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn row_index(&self, date: NaiveDate) -> Option<usize> {
        if date < self.begin || date > self.end {
            return None;
        }
        Some((date - self.begin).num_days() as usize)
    }

    fn col_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Cell value, or `None` for absent cells, unknown columns, and dates
    /// outside the range.
    pub fn get(&self, date: NaiveDate, field: &str) -> Option<f64> {
        let row = self.row_index(date)?;
        let col = self.col_index(field)?;
        self.rows[row][col]
    }

    /// Merge one value into the table. Returns false (and leaves the table
    /// untouched) when the date falls outside the range or the column was
    /// never requested.
    pub fn set(&mut self, date: NaiveDate, field: &str, value: f64) -> bool {
        let (Some(row), Some(col)) = (self.row_index(date), self.col_index(field)) else {
            return false;
        };
        self.rows[row][col] = Some(value);
        true
    }

    /// Dates covered by the table, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let begin = self.begin;
        (0..self.rows.len() as i64).map(move |offset| begin + Duration::days(offset))
    }

    /// Rows in date order, each paired with its cells in field order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (NaiveDate, &[Option<f64>])> {
        self.dates()
            .zip(self.rows.iter().map(|row| row.as_slice()))
    }
}
