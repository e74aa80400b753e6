// XML Bralnik - Library
// Cadastral elaborate extraction: XML + embedded JSON payloads → flat export rows

pub mod error;          // Error type + Result alias
pub mod config;         // Tag names, prefix rules, descriptor sources
pub mod document;       // XML document model (quick-xml)
pub mod payload;        // Embedded JSON payload extraction + grouping
pub mod counter;        // Change-marker counts per category
pub mod components;     // Component identifier indexing by prefix
pub mod resolver;       // Building descriptor fallback chain
pub mod aggregation;    // One summary record per document
pub mod export;         // Export table + deduplicating merge
pub mod store;          // Delimited-text persistence
pub mod ledger;         // SQLite register of processed documents
pub mod pipeline;       // Parallel batch processing

// Re-export commonly used types
pub use error::{BralnikError, Result};
pub use config::{DescriptorSource, ExtractorConfig, PrefixRule, ResolverConfig};
pub use document::{ElementRef, XmlDocument};
pub use payload::{group_blocks, PayloadExtractor, PayloadGroup, PayloadKind};
pub use counter::{
    count_markers, CategorySpec, ChangeMarker, MarkerCounts, PayloadSlice, CATEGORIES,
};
pub use components::{ComponentCategory, ComponentIndexer, IdentifierSet, OrderedIdSet};
pub use resolver::{
    Descriptor, IdentifierResolver, Resolution, ResolutionContext, ResolutionReport,
    ResolutionStrategy, STRATEGY_CHAIN,
};
pub use aggregation::{AggregationBuilder, AggregationRecord, CategoryCounts, ComponentCounts};
pub use export::{ExportMerger, ExportRow, ExportTable, MergeOutcome, DATE_COLUMN, KEY_COLUMN};
pub use store::{load_table, save_table, DEFAULT_DELIMITER};
pub use ledger::{Ledger, MergeRun};
pub use pipeline::{
    discover_documents, extract_document, process_batch, read_documents, AggregationStore,
    BatchSummary, DocumentOutcome, SourceDocument,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
