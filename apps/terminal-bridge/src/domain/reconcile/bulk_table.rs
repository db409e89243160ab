//! Input-aligned bulk tables.

use serde::{Deserialize, Serialize};

use super::reference::BulkReferenceRow;
use crate::domain::value::FieldValue;

/// One bulk element aligned to an input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTableRow {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Input position.
    pub location: usize,
    /// Field name.
    pub field: String,
    /// Position within the bulk array; `None` when the input had no data.
    pub position: Option<usize>,
    /// Values aligned with [`BulkTable::columns`].
    pub values: Vec<FieldValue>,
}

/// Bulk data pivoted to one row per (input, field, position) and one
/// column per element name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkTable {
    /// Element names in first-appearance order.
    pub columns: Vec<String>,
    /// Rows in input order, then field, then position.
    pub rows: Vec<BulkTableRow>,
}

impl BulkTable {
    /// Build a table from per-input bulk rows.
    ///
    /// `aligned[i]` holds the parsed rows for input `i`, or `None` when the
    /// vendor returned nothing for it. Inputs without data produce a single
    /// row whose values are all `Null`, or all the unresolved-security
    /// sentinel when the vendor flagged the security.
    #[must_use]
    pub fn assemble<S: AsRef<str>, F: AsRef<str>>(
        inputs: &[S],
        fields: &[F],
        aligned: &[Option<Vec<BulkReferenceRow>>],
    ) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in aligned.iter().flatten().flatten() {
            if let Some(name) = &row.name {
                if row.position.is_some() && !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for (location, (input, parsed)) in inputs.iter().zip(aligned).enumerate() {
            let ticker = input.as_ref().to_string();
            let parsed = parsed.as_deref().unwrap_or_default();

            for field in fields {
                let field = field.as_ref();
                let elements: Vec<&BulkReferenceRow> =
                    parsed.iter().filter(|r| r.field == field).collect();

                let mut positions: Vec<usize> = elements.iter().filter_map(|r| r.position).collect();
                positions.dedup();

                if positions.is_empty() {
                    let marker = elements
                        .iter()
                        .map(|r| r.value.clone())
                        .find(FieldValue::is_security_not_found)
                        .unwrap_or_default();
                    rows.push(BulkTableRow {
                        ticker: ticker.clone(),
                        location,
                        field: field.to_string(),
                        position: None,
                        values: vec![marker; columns.len().max(1)],
                    });
                    continue;
                }

                for position in positions {
                    let mut values = vec![FieldValue::Null; columns.len()];
                    for element in elements.iter().filter(|r| r.position == Some(position)) {
                        let slot = element
                            .name
                            .as_ref()
                            .and_then(|name| columns.iter().position(|c| c == name));
                        if let Some(slot) = slot {
                            values[slot] = element.value.clone();
                        }
                    }
                    rows.push(BulkTableRow {
                        ticker: ticker.clone(),
                        location,
                        field: field.to_string(),
                        position: Some(position),
                        values,
                    });
                }
            }
        }

        Self { columns, rows }
    }

    /// Index of a column by element name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, row by row.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&FieldValue>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.values.get(index)).collect())
    }
}
