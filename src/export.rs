// 📤 Export Merger - Append new summary rows without duplicating documents
// Existing rows are never touched; the composite key decides what is new

use crate::aggregation::AggregationRecord;
use crate::counter::CATEGORIES;
use crate::error::{BralnikError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// ============================================================================
// COLUMN LAYOUT
// ============================================================================

pub const KEY_COLUMN: &str = "ProcessedIdentifier";
pub const DATE_COLUMN: &str = "ProcessedDate";

const FILE_NAME: &str = "File Name";
const DATA_TYPES: &str = "Data Types";
const AGENT_ID: &str = "Pooblaščenec ID";
const PROCEDURE_COUNT: &str = "Število katastrskih postopkov";
const PROCEDURE_TYPES: &str = "VrstaKatPos";
const PARCEL_COMPONENTS: &str = "Število sestavin parcel";
const BUILDING_COMPONENTS: &str = "Število sestavin stavb";
const BUILDING_PART_COMPONENTS: &str = "Število sestavin delov stavb";
const SOIL_QUALITY_COMPONENTS: &str = "Število sestavin bonitet";
const PARCEL_LIST: &str = "Seznam vseh parcel";
const BUILDING_LIST: &str = "Seznam vseh stavb";
const SOIL_QUALITY_LIST: &str = "Seznam vseh bonitet";

const LIST_SEPARATOR: &str = ", ";

fn category_column(label: &str, marker: &str) -> String {
    format!("{} - {}", label, marker)
}

/// Header row for a freshly created table.
pub fn canonical_headers() -> Vec<String> {
    let mut headers: Vec<String> = [
        FILE_NAME,
        DATA_TYPES,
        AGENT_ID,
        PROCEDURE_COUNT,
        PROCEDURE_TYPES,
        PARCEL_COMPONENTS,
        BUILDING_COMPONENTS,
        BUILDING_PART_COMPONENTS,
        SOIL_QUALITY_COMPONENTS,
        PARCEL_LIST,
        BUILDING_LIST,
        SOIL_QUALITY_LIST,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for spec in CATEGORIES {
        for marker in spec.exported {
            headers.push(category_column(spec.label, marker.code()));
        }
    }

    headers.push(KEY_COLUMN.to_string());
    headers.push(DATE_COLUMN.to_string());
    headers
}

/// Cell values of a record keyed by column name.
fn record_cells(record: &AggregationRecord, processed_at: &str) -> HashMap<String, String> {
    let mut cells: HashMap<String, String> = HashMap::new();
    let mut put = |name: &str, value: String| {
        cells.insert(name.to_string(), value);
    };

    put(FILE_NAME, record.file_name.clone());
    put(DATA_TYPES, record.payload_kinds.join(LIST_SEPARATOR));
    put(AGENT_ID, record.agent_id.clone());
    put(PROCEDURE_COUNT, record.procedure_count.to_string());
    put(PROCEDURE_TYPES, record.procedure_types.join(LIST_SEPARATOR));
    put(PARCEL_COMPONENTS, record.components.parcels.to_string());
    put(BUILDING_COMPONENTS, record.components.buildings.to_string());
    put(BUILDING_PART_COMPONENTS, record.components.building_parts.to_string());
    put(SOIL_QUALITY_COMPONENTS, record.components.soil_quality.to_string());
    put(PARCEL_LIST, record.parcels.join(LIST_SEPARATOR));
    put(BUILDING_LIST, record.buildings.join(LIST_SEPARATOR));
    put(SOIL_QUALITY_LIST, record.soil_quality_zones.join(LIST_SEPARATOR));

    for spec in CATEGORIES {
        let counts = record.category(spec.key).map(|c| &c.counts);
        for marker in spec.exported {
            let value = counts.map(|c| c.get(*marker)).unwrap_or(0);
            put(&category_column(spec.label, marker.code()), value.to_string());
        }
    }

    put(KEY_COLUMN, record.composite_key());
    put(DATE_COLUMN, processed_at.to_string());
    cells
}

// ============================================================================
// EXPORT TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Aligned with the table headers
    pub cells: Vec<String>,
}

/// Previously exported rows plus everything appended since. Always has
/// the key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    headers: Vec<String>,
    rows: Vec<ExportRow>,
}

impl ExportTable {
    /// Empty table with the canonical header.
    pub fn new() -> Self {
        ExportTable {
            headers: canonical_headers(),
            rows: Vec::new(),
        }
    }

    /// Table from loaded parts. The header must carry the key column so
    /// that later merges can see which documents are already in it.
    ///
    /// Short rows are padded to the header width. Trailing empty cells past
    /// the header are dropped; any other extra cell is rejected.
    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if !headers.iter().any(|h| h == KEY_COLUMN) {
            return Err(BralnikError::Table(format!(
                "header has no {} column",
                KEY_COLUMN
            )));
        }

        let width = headers.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, mut cells)| {
                if cells.len() > width {
                    if cells[width..].iter().any(|c| !c.trim().is_empty()) {
                        return Err(BralnikError::Table(format!(
                            "row {} has {} cells, header has {}",
                            index + 1,
                            cells.len(),
                            width
                        )));
                    }
                    cells.truncate(width);
                }
                cells.resize(width, String::new());
                Ok(ExportRow { cells })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ExportTable { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[ExportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_key_column(&self) -> bool {
        self.column_index(KEY_COLUMN).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Composite key of a row; None for rows without one.
    pub fn row_key<'r>(&self, row: &'r ExportRow) -> Option<&'r str> {
        let index = self.column_index(KEY_COLUMN)?;
        row.cells
            .get(index)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn keys(&self) -> HashSet<String> {
        self.rows
            .iter()
            .filter_map(|row| self.row_key(row))
            .map(|k| k.to_string())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rows.iter().any(|row| self.row_key(row) == Some(key))
    }

    /// Lay a record out against this table's header. Columns the header
    /// does not have are dropped; header columns the record lacks stay empty.
    fn append_record(&mut self, record: &AggregationRecord, processed_at: &str) {
        let mut cells = record_cells(record, processed_at);
        let row = self
            .headers
            .iter()
            .map(|h| cells.remove(h).unwrap_or_default())
            .collect();
        self.rows.push(ExportRow { cells: row });
    }
}

impl Default for ExportTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MERGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub table: ExportTable,
    /// Rows appended by this merge
    pub appended: usize,
    /// Batch records dropped as already processed
    pub skipped: usize,
}

pub struct ExportMerger;

impl ExportMerger {
    /// Append every batch record whose composite key is neither in the
    /// existing table nor earlier in the batch.
    ///
    /// The timestamp is supplied by the caller so that the same table and
    /// batch always give the same result.
    pub fn merge(
        existing: ExportTable,
        batch: &[AggregationRecord],
        processed_at: DateTime<Utc>,
    ) -> MergeOutcome {
        let stamp = processed_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut known = existing.keys();
        let mut table = existing;
        let mut appended = 0;
        let mut skipped = 0;

        for record in batch {
            let key = record.composite_key();
            if known.contains(&key) {
                debug!(key = %key, "Skipping already processed document");
                skipped += 1;
                continue;
            }

            table.append_record(record, &stamp);
            known.insert(key);
            appended += 1;
        }

        info!(appended, skipped, total = table.len(), "Merged export batch");

        MergeOutcome {
            table,
            appended,
            skipped,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
