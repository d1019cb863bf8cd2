use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::table::ResultTable;

/// Columns forming the deduplication key of a cleaned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanColumns {
    pub genus: String,
    pub structure: String,
    pub reference: String,
}

impl Default for CleanColumns {
    fn default() -> Self {
        Self {
            genus: "genus_name".to_string(),
            structure: "smiles".to_string(),
            reference: "reference".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    pub group: String,
    pub rows: usize,
    pub unique_structures: usize,
    pub unique_genera: usize,
    pub unique_references: usize,
}

impl CleanSummary {
    pub fn describe(&self) -> String {
        format!(
            "The {} query returned {} unique structures in {} genera, based on {} literature references.",
            self.group, self.unique_structures, self.unique_genera, self.unique_references
        )
    }
}

#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub table: ResultTable,
    pub summary: CleanSummary,
}

pub fn clean(
    mut raw: ResultTable,
    group_label: &str,
    columns: &CleanColumns,
) -> Result<CleanedTable, HarvestError> {
    raw.retain_value_columns();
    for column in [&columns.genus, &columns.structure, &columns.reference] {
        if !raw.has_column(column) {
            return Err(HarvestError::MissingColumn(column.clone()));
        }
    }

    // A species binomial in the genus column keeps only its genus.
    for record in raw.records_mut() {
        let first = record
            .get(&columns.genus)
            .and_then(|value| value.split_whitespace().next())
            .map(str::to_string);
        if let Some(first) = first {
            record.insert(columns.genus.clone(), first);
        }
    }

    let mut seen = HashSet::new();
    raw.retain_records(|record| {
        let key = (
            record.get(&columns.genus).unwrap_or("").to_string(),
            record.get(&columns.structure).unwrap_or("").to_string(),
            record.get(&columns.reference).unwrap_or("").to_string(),
        );
        seen.insert(key)
    });

    let summary = CleanSummary {
        group: group_label.to_string(),
        rows: raw.len(),
        unique_structures: raw.distinct_values(&columns.structure).len(),
        unique_genera: raw.distinct_values(&columns.genus).len(),
        unique_references: raw.distinct_values(&columns.reference).len(),
    };
    Ok(CleanedTable {
        table: raw,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::table::ResultRecord;

    fn row(genus: &str, smiles: &str, reference: &str) -> ResultRecord {
        ResultRecord::from_iter([
            ("genus_name", genus),
            ("smiles", smiles),
            ("reference", reference),
        ])
    }

    #[test]
    fn binomials_collapse_to_genus_before_dedup() {
        let mut raw = ResultTable::new();
        raw.push(row("Vinca minor", "C1", "Q1"));
        raw.push(row("Vinca", "C1", "Q1"));
        raw.push(row("Vinca major", "C1", "Q2"));

        let cleaned = clean(raw, "indole", &CleanColumns::default()).unwrap();
        assert_eq!(cleaned.table.len(), 2);
        assert!(
            cleaned
                .table
                .records()
                .iter()
                .all(|r| r.get("genus_name") == Some("Vinca"))
        );
        assert_eq!(cleaned.summary.unique_references, 2);
        assert_eq!(cleaned.summary.unique_genera, 1);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let mut raw = ResultTable::new();
        raw.push(ResultRecord::from_iter([("genus_name", "Rosa"), ("smiles", "C")]));
        let err = clean(raw, "g", &CleanColumns::default()).unwrap_err();
        assert_matches!(err, HarvestError::MissingColumn(column) if column == "reference");
    }
}
