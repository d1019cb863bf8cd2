use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::Utf8Path;
use serde_json::{Map, Value};

use crate::error::HarvestError;

const VALUE_SUFFIX: &str = ".value";

/// One flattened result row, column name to cell value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRecord {
    cells: BTreeMap<String, String>,
}

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<String> {
        self.cells.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Column-ordered collection of records.
///
/// `columns` is the union of every record's columns in first-appearance
/// order. A record without a value for a column renders as an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    columns: Vec<String>,
    records: Vec<ResultRecord>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(columns: Vec<String>) -> Self {
        let mut table = Self::new();
        for column in columns {
            table.add_column(&column);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the table carries neither columns nor rows.
    pub fn is_blank(&self) -> bool {
        self.columns.is_empty() && self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn add_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn push(&mut self, record: ResultRecord) {
        for column in record.columns() {
            if !self.has_column(column) {
                self.columns.push(column.to_string());
            }
        }
        self.records.push(record);
    }

    /// Row-wise concatenation. Columns of `other` that are new here are
    /// appended after the existing ones.
    pub fn extend(&mut self, other: ResultTable) {
        for column in &other.columns {
            self.add_column(column);
        }
        self.records.extend(other.records);
    }

    pub fn concat(tables: impl IntoIterator<Item = ResultTable>) -> Self {
        let mut merged = Self::new();
        for table in tables {
            merged.extend(table);
        }
        merged
    }

    /// Distinct non-empty values of one column, in first-appearance order.
    pub fn distinct_values(&self, column: &str) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter_map(|record| record.get(column))
            .filter(|value| !value.is_empty())
            .filter(|value| seen.insert(*value))
            .collect()
    }

    /// Sets `column` to `value` on every row whose cell is absent or empty,
    /// adding the column if the table lacks it.
    pub fn fill_column(&mut self, column: &str, value: &str) {
        self.add_column(column);
        for record in &mut self.records {
            if record.get(column).is_none_or(str::is_empty) {
                record.insert(column, value);
            }
        }
    }

    pub fn retain_records<F>(&mut self, keep: F)
    where
        F: FnMut(&ResultRecord) -> bool,
    {
        self.records.retain(keep);
    }

    pub fn records_mut(&mut self) -> &mut [ResultRecord] {
        &mut self.records
    }

    /// Renames `var.value` columns to `var` and drops every other
    /// `var.field` column.
    pub fn retain_value_columns(&mut self) {
        let mut renamed = Vec::new();
        let mut dropped = Vec::new();
        for column in &self.columns {
            if let Some(stem) = column.strip_suffix(VALUE_SUFFIX) {
                renamed.push((column.clone(), stem.to_string()));
            } else if column.contains('.') {
                dropped.push(column.clone());
            }
        }
        if renamed.is_empty() && dropped.is_empty() {
            return;
        }

        for record in &mut self.records {
            for column in &dropped {
                record.remove(column);
            }
            for (from, to) in &renamed {
                if let Some(value) = record.remove(from) {
                    record.insert(to.clone(), value);
                }
            }
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for column in self.columns.drain(..) {
            if dropped.contains(&column) {
                continue;
            }
            let name = renamed
                .iter()
                .find(|(from, _)| *from == column)
                .map(|(_, to)| to.clone())
                .unwrap_or(column);
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
        self.columns = columns;
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        if !self.columns.is_empty() {
            out.write_record(&self.columns)?;
        }
        for record in &self.records {
            out.write_record(
                self.columns
                    .iter()
                    .map(|column| record.get(column).unwrap_or("")),
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn read_csv<R: io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut input = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let headers = input
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut table = Self::with_columns(headers.clone());
        for row in input.records() {
            let row = row?;
            let record = headers
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.clone(), value.to_string()))
                .collect::<ResultRecord>();
            table.records.push(record);
        }
        Ok(table)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, HarvestError> {
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("open {path}: {err}")))?;
        Self::read_csv(file).map_err(|err| HarvestError::Csv {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

/// Flattens SPARQL JSON bindings into a table.
///
/// Only the `value` field of each bound variable is kept, and only variables
/// bound in at least one row become columns. Those listed in `vars` (from
/// `head.vars`) come first in that order; the rest follow in first-appearance
/// order.
pub fn normalize_bindings(vars: &[String], bindings: &[Map<String, Value>]) -> ResultTable {
    let records = bindings
        .iter()
        .map(|binding| {
            binding
                .iter()
                .filter_map(|(variable, cell)| {
                    let value = cell.get("value").and_then(value_as_text)?;
                    Some((variable.clone(), value))
                })
                .collect::<ResultRecord>()
        })
        .collect::<Vec<_>>();

    let mut bound = Vec::<String>::new();
    for binding in bindings {
        for (variable, cell) in binding {
            if cell.get("value").and_then(value_as_text).is_some() && !bound.contains(variable) {
                bound.push(variable.clone());
            }
        }
    }
    let mut columns = vars
        .iter()
        .filter(|var| bound.contains(var))
        .cloned()
        .collect::<Vec<_>>();
    for variable in bound {
        if !columns.contains(&variable) {
            columns.push(variable);
        }
    }

    let mut table = ResultTable::with_columns(columns);
    table.records = records;
    table
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
