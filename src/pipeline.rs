// 🔄 Batch Pipeline - Documents in, aggregation records out
// Each document is processed independently; results land in a caller-owned store

use crate::aggregation::{AggregationBuilder, AggregationRecord};
use crate::config::ExtractorConfig;
use crate::document::XmlDocument;
use crate::error::Result;
use crate::export::MergeOutcome;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Raw document text plus the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub file_name: String,
    pub raw: String,
}

impl SourceDocument {
    pub fn new(file_name: &str, raw: &str) -> Self {
        SourceDocument {
            file_name: file_name.to_string(),
            raw: raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentOutcome {
    Extracted(AggregationRecord),
    Failed { file_name: String, reason: String },
}

impl DocumentOutcome {
    pub fn record(&self) -> Option<&AggregationRecord> {
        match self {
            DocumentOutcome::Extracted(record) => Some(record),
            DocumentOutcome::Failed { .. } => None,
        }
    }
}

/// Per-batch result slots, one per input document, in input order.
#[derive(Debug, Clone, Default)]
pub struct AggregationStore {
    slots: Vec<Option<DocumentOutcome>>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(documents: usize) -> Self {
        AggregationStore {
            slots: vec![None; documents],
        }
    }

    /// Store the outcome for the document at `index`, growing as needed.
    pub fn record_result(&mut self, index: usize, outcome: DocumentOutcome) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(outcome);
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.slots.iter().flatten()
    }

    /// Successful records, in input order.
    pub fn records(&self) -> Vec<AggregationRecord> {
        self.outcomes().filter_map(|o| o.record()).cloned().collect()
    }

    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes()
            .filter_map(|o| match o {
                DocumentOutcome::Failed { file_name, reason } => {
                    Some((file_name.as_str(), reason.as_str()))
                }
                DocumentOutcome::Extracted(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse and aggregate a single document.
pub fn extract_document(file_name: &str, raw: String, config: &ExtractorConfig) -> Result<AggregationRecord> {
    let doc = XmlDocument::parse(file_name, raw)?;
    let builder = AggregationBuilder::new(config)?;
    Ok(builder.build(&doc))
}

/// Process a batch in parallel. A document that fails to parse is recorded
/// as failed and never aborts the rest of the batch.
pub fn process_batch(documents: &[SourceDocument], config: &ExtractorConfig) -> Result<AggregationStore> {
    let builder = AggregationBuilder::new(config)?;

    let outcomes: Vec<(usize, DocumentOutcome)> = documents
        .par_iter()
        .enumerate()
        .map(|(index, source)| {
            let outcome = match XmlDocument::parse(&source.file_name, source.raw.clone()) {
                Ok(doc) => DocumentOutcome::Extracted(builder.build(&doc)),
                Err(e) => {
                    warn!(file = %source.file_name, error = %e, "Skipping document");
                    DocumentOutcome::Failed {
                        file_name: source.file_name.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            (index, outcome)
        })
        .collect();

    let mut store = AggregationStore::with_capacity(documents.len());
    for (index, outcome) in outcomes {
        store.record_result(index, outcome);
    }

    info!(documents = documents.len(), failed = store.failures().len(), "Processed batch");
    Ok(store)
}

// ============================================================================
// DISCOVERY
// ============================================================================

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

/// `*.xml` files directly inside `dir`, sorted by path.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.file_type().is_file() && is_xml(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Read documents as text. Unreadable files are logged and skipped.
pub fn read_documents(paths: &[PathBuf]) -> Vec<SourceDocument> {
    paths
        .iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_string_lossy().to_string();
            match fs::read(path) {
                Ok(bytes) => Some(SourceDocument {
                    file_name,
                    raw: String::from_utf8_lossy(&bytes).into_owned(),
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read document");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub merged: usize,
    pub skipped: usize,
    pub unresolved: usize,
}

impl BatchSummary {
    pub fn from_store(store: &AggregationStore, merge: Option<&MergeOutcome>) -> Self {
        let records = store.records();

        BatchSummary {
            documents: store.len(),
            succeeded: records.len(),
            failed: store.failures().len(),
            merged: merge.map(|m| m.appended).unwrap_or(0),
            skipped: merge.map(|m| m.skipped).unwrap_or(0),
            unresolved: records.iter().map(|r| r.unresolved_buildings).sum(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ChangeMarker;
    use crate::export::{ExportMerger, ExportTable};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const PARCEL_DOC: &str = r#"<elaborat>
  <pooblascenecId>4711</pooblascenecId>
  <katastrskiPostopek>
    <sestavina><sestavinaEid>100100001</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>100200055</sestavinaEid></sestavina>
  </katastrskiPostopek>
  <datoteka><![CDATA[{"tip":"parcele","podatki":{"parcele":[
    {"parcelaEid":100100001,"sifKo":2001,"stevilkaParcele":"5","sprememba":"S"},
    {"parcelaEid":100100002,"sifKo":2001,"stevilkaParcele":"6","sprememba":"D"}
  ]}}]]></datoteka>
</elaborat>"#;

    fn batch() -> Vec<SourceDocument> {
        vec![
            SourceDocument::new("a.xml", PARCEL_DOC),
            SourceDocument::new("broken.xml", "<elaborat><katastrskiPostopek>"),
            SourceDocument::new("c.xml", "<elaborat><pooblascenecId>9</pooblascenecId></elaborat>"),
        ]
    }

    #[test]
    fn test_bad_document_does_not_abort_batch() {
        let config = ExtractorConfig::default();
        let store = process_batch(&batch(), &config).unwrap();

        assert_eq!(store.len(), 3);
        let names: Vec<String> = store.records().iter().map(|r| r.file_name.clone()).collect();
        assert_eq!(names, vec!["a.xml".to_string(), "c.xml".to_string()]);

        let failures = store.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken.xml");
    }

    #[test]
    fn test_parcel_marker_counts() {
        let config = ExtractorConfig::default();
        let record = extract_document("a.xml", PARCEL_DOC.to_string(), &config).unwrap();
        let counts = &record.category("parcele").unwrap().counts;

        assert_eq!(counts.get(ChangeMarker::S), 1);
        assert_eq!(counts.get(ChangeMarker::D), 1);
        assert_eq!(counts.get(ChangeMarker::N), 0);
        assert_eq!(counts.get(ChangeMarker::B), 0);
    }

    #[test]
    fn test_unresolved_building_still_succeeds() {
        let config = ExtractorConfig::default();
        let record = extract_document("a.xml", PARCEL_DOC.to_string(), &config).unwrap();

        assert_eq!(record.components.buildings, 1);
        assert!(record.buildings.is_empty());
        assert_eq!(record.unresolved_buildings, 1);
        assert_eq!(record.parcels, vec!["2001-5".to_string()]);
    }

    #[test]
    fn test_rerun_merges_nothing_new() {
        let config = ExtractorConfig::default();
        let stamp = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();

        let store = process_batch(&batch(), &config).unwrap();
        let first = ExportMerger::merge(ExportTable::new(), &store.records(), stamp);
        assert_eq!(first.appended, 2);

        let again = process_batch(&batch(), &config).unwrap();
        let second = ExportMerger::merge(first.table.clone(), &again.records(), stamp);
        assert_eq!(second.appended, 0);
        assert_eq!(second.table, first.table);

        let summary = BatchSummary::from_store(&again, Some(&second));
        assert_eq!(
            summary,
            BatchSummary {
                documents: 3,
                succeeded: 2,
                failed: 1,
                merged: 0,
                skipped: 2,
                unresolved: 1,
            }
        );
    }

    #[test]
    fn test_store_keeps_input_order() {
        let mut store = AggregationStore::new();
        store.record_result(
            2,
            DocumentOutcome::Failed {
                file_name: "z.xml".to_string(),
                reason: "x".to_string(),
            },
        );
        store.record_result(
            0,
            DocumentOutcome::Failed {
                file_name: "a.xml".to_string(),
                reason: "y".to_string(),
            },
        );

        assert_eq!(store.len(), 2);
        let names: Vec<&str> = store.failures().iter().map(|f| f.0).collect();
        assert_eq!(names, vec!["a.xml", "z.xml"]);
    }

    #[test]
    fn test_discover_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.xml"), "<a/>").unwrap();
        fs::write(dir.path().join("A.XML"), "<a/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.xml"), "<a/>").unwrap();

        let paths = discover_documents(dir.path()).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["A.XML".to_string(), "b.xml".to_string()]);

        let docs = read_documents(&paths);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].raw, "<a/>");
    }
}
