// 📦 Payload Extractor - Embedded JSON blocks grouped by kind
// Every payload carrier holds `{ "tip": <kind>, "podatki": { <field>: [records] } }`

use crate::config::ExtractorConfig;
use crate::document::XmlDocument;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const KIND_KEY: &str = "tip";
const DATA_KEY: &str = "podatki";

// ============================================================================
// PAYLOAD GROUP
// ============================================================================

/// All records of one payload kind, merged over every block of that kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadKind {
    pub name: String,
    pub fields: BTreeMap<String, Vec<Value>>,
}

/// Payload data of a document keyed by kind, kinds in discovery order.
///
/// Arrays under the same field of the same kind are concatenated in the
/// order their blocks appear in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadGroup {
    kinds: Vec<PayloadKind>,
}

impl PayloadGroup {
    pub fn new() -> Self {
        PayloadGroup { kinds: Vec::new() }
    }

    /// Kind names in the order they were first seen.
    pub fn kind_names(&self) -> Vec<String> {
        self.kinds.iter().map(|k| k.name.clone()).collect()
    }

    pub fn kind(&self, name: &str) -> Option<&PayloadKind> {
        self.kinds.iter().find(|k| k.name == name)
    }

    /// Records of `kind.field`; empty when either is absent.
    pub fn records(&self, kind: &str, field: &str) -> &[Value] {
        self.kind(kind)
            .and_then(|k| k.fields.get(field))
            .map(|records| records.as_slice())
            .unwrap_or(&[])
    }

    /// Records of `field` from every kind, kinds in discovery order.
    pub fn records_across_kinds(&self, field: &str) -> Vec<&Value> {
        self.kinds
            .iter()
            .filter_map(|k| k.fields.get(field))
            .flat_map(|records| records.iter())
            .collect()
    }

    /// Merge one accepted block. Non-array fields are ignored.
    pub fn merge(&mut self, kind: &str, data: &Map<String, Value>) {
        let index = match self.kinds.iter().position(|k| k.name == kind) {
            Some(index) => index,
            None => {
                self.kinds.push(PayloadKind {
                    name: kind.to_string(),
                    fields: BTreeMap::new(),
                });
                self.kinds.len() - 1
            }
        };

        let entry = &mut self.kinds[index];
        for (field, value) in data {
            if let Value::Array(records) = value {
                entry
                    .fields
                    .entry(field.clone())
                    .or_default()
                    .extend(records.iter().cloned());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

pub struct PayloadExtractor<'a> {
    config: &'a ExtractorConfig,
}

impl<'a> PayloadExtractor<'a> {
    pub fn new(config: &'a ExtractorConfig) -> Self {
        PayloadExtractor { config }
    }

    /// Every payload carrier that parses as JSON, whatever its shape.
    ///
    /// Blocks that fail to parse contribute nothing.
    pub fn blocks(&self, doc: &XmlDocument) -> Vec<Value> {
        let mut blocks = Vec::new();

        for (index, element) in doc.elements_by_tag(&self.config.payload_tag).enumerate() {
            let text = element.text_content();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => blocks.push(value),
                Err(e) => {
                    debug!(
                        file = doc.file_name(),
                        block = index,
                        "Skipping malformed payload block: {}",
                        e
                    );
                }
            }
        }

        blocks
    }

    /// Group the accepted payloads of a document by kind.
    pub fn extract(&self, doc: &XmlDocument) -> PayloadGroup {
        group_blocks(&self.blocks(doc))
    }
}

/// Build a group from already parsed blocks. A block is accepted when it
/// carries a string kind and an object of data.
pub fn group_blocks(blocks: &[Value]) -> PayloadGroup {
    let mut group = PayloadGroup::new();

    for block in blocks {
        let kind = block.get(KIND_KEY).and_then(Value::as_str);
        let data = block.get(DATA_KEY).and_then(Value::as_object);

        match (kind, data) {
            (Some(kind), Some(data)) if !kind.is_empty() => group.merge(kind, data),
            _ => debug!("Ignoring payload block without kind/data"),
        }
    }

    group
}

// ============================================================================
// TESTS
// ============================================================================
