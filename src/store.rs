// 💾 Table Store - Delimited-text persistence for the export table
// Thin glue: read the previous export, write the merged one

use crate::error::Result;
use crate::export::ExportTable;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

pub const DEFAULT_DELIMITER: u8 = b';';

/// Read a table. An empty input gives a fresh table with the canonical
/// header; a header without the key column is rejected.
pub fn read_table<R: Read>(reader: R, delimiter: u8) -> Result<ExportTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Ok(ExportTable::new());
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    ExportTable::from_parts(headers, rows)
}

pub fn write_table<W: Write>(writer: W, table: &ExportTable, delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);

    wtr.write_record(table.headers())?;
    for row in table.rows() {
        wtr.write_record(&row.cells)?;
    }
    wtr.flush()?;

    Ok(())
}

/// Load the previous export; a missing file is an empty table.
pub fn load_table(path: &Path, delimiter: u8) -> Result<ExportTable> {
    if !path.exists() {
        info!(path = %path.display(), "No existing export, starting a new table");
        return Ok(ExportTable::new());
    }

    let table = read_table(File::open(path)?, delimiter)?;
    info!(path = %path.display(), rows = table.len(), "Loaded existing export");
    Ok(table)
}

/// Write the table next to `path` and rename it into place, so a failed
/// write leaves the previous export intact.
pub fn save_table(path: &Path, table: &ExportTable, delimiter: u8) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = NamedTempFile::new_in(dir)?;
    write_table(&mut staged, table, delimiter)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;

    info!(path = %path.display(), rows = table.len(), "Wrote export");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BralnikError;
    use crate::aggregation::{AggregationRecord, ComponentCounts};
    use crate::export::{canonical_headers, ExportMerger};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(file: &str) -> AggregationRecord {
        AggregationRecord {
            file_name: file.to_string(),
            payload_kinds: vec!["parcele".to_string(), "stavbe".to_string()],
            agent_id: "4711".to_string(),
            procedure_count: 1,
            procedure_types: vec!["Parcelacija".to_string()],
            components: ComponentCounts::default(),
            categories: Vec::new(),
            parcels: vec!["1722-12/1".to_string()],
            buildings: Vec::new(),
            soil_quality_zones: Vec::new(),
            unresolved_buildings: 0,
        }
    }

    #[test]
    fn test_missing_file_is_new_table() {
        let dir = TempDir::new().unwrap();
        let table = load_table(&dir.path().join("none.csv"), DEFAULT_DELIMITER).unwrap();

        assert!(table.is_empty());
        assert_eq!(table.headers(), canonical_headers().as_slice());
    }

    #[test]
    fn test_empty_input_is_new_table() {
        let table = read_table("".as_bytes(), DEFAULT_DELIMITER).unwrap();
        assert!(table.is_empty());
        assert!(table.has_key_column());
    }

    #[test]
    fn test_save_then_load_keeps_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.csv");
        let stamp = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

        let merged = ExportMerger::merge(ExportTable::new(), &[record("a.xml"), record("b.xml")], stamp);
        save_table(&path, &merged.table, DEFAULT_DELIMITER).unwrap();

        let loaded = load_table(&path, DEFAULT_DELIMITER).unwrap();
        assert_eq!(loaded, merged.table);
        assert!(loaded.contains_key("a.xml-4711-1"));

        let again = ExportMerger::merge(loaded, &[record("a.xml"), record("c.xml")], stamp);
        assert_eq!(again.appended, 1);
        assert_eq!(again.table.len(), 3);
    }

    #[test]
    fn test_written_with_semicolons() {
        let mut buffer = Vec::new();
        write_table(&mut buffer, &ExportTable::new(), DEFAULT_DELIMITER).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("File Name;Data Types;"));
        assert!(text.trim_end().ends_with("ProcessedIdentifier;ProcessedDate"));
    }

    #[test]
    fn test_header_without_key_rejected() {
        let input = "File Name;Other\na.xml;1\n";
        let result = read_table(input.as_bytes(), DEFAULT_DELIMITER);
        assert!(matches!(result, Err(BralnikError::Table(_))));
    }

    #[test]
    fn test_short_rows_and_blank_lines() {
        let input = "\u{feff}File Name;ProcessedIdentifier;ProcessedDate\na.xml;a.xml-1-1\n;;\nb.xml;b.xml-1-1;2026\n";
        let table = read_table(input.as_bytes(), DEFAULT_DELIMITER).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.headers()[0], "File Name");
        assert_eq!(table.rows()[0].cells.len(), 3);
        assert!(table.contains_key("b.xml-1-1"));
    }

    #[test]
    fn test_long_row_with_data_rejected() {
        let input = "File Name;ProcessedIdentifier\na.xml;k;extra\n";
        let result = read_table(input.as_bytes(), DEFAULT_DELIMITER);
        assert!(matches!(result, Err(BralnikError::Table(_))));
    }

    #[test]
    fn test_save_replaces_previous_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.csv");
        let stamp = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

        let first = ExportMerger::merge(ExportTable::new(), &[record("a.xml")], stamp);
        save_table(&path, &first.table, DEFAULT_DELIMITER).unwrap();
        let second = ExportMerger::merge(first.table, &[record("b.xml")], stamp);
        save_table(&path, &second.table, DEFAULT_DELIMITER).unwrap();

        let loaded = load_table(&path, DEFAULT_DELIMITER).unwrap();
        assert_eq!(loaded.len(), 2);

        // No staging files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
