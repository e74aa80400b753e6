// 🔎 Identifier Resolver - Descriptors for referenced buildings
// Ordered fallback chain of text-matching strategies, first success wins
//
// A "success" only means both descriptor fields were found near the
// identifier. When two strategies would disagree, the earlier one wins.

use crate::config::{DescriptorSource, ExtractorConfig};
use crate::document::XmlDocument;
use crate::error::{BralnikError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// Human-readable entity reference: `<location>-<number>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub location: String,
    pub number: String,
}

impl Descriptor {
    pub fn new(location: &str, number: &str) -> Self {
        Descriptor {
            location: location.to_string(),
            number: number.to_string(),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.location, self.number)
    }
}

/// Scalar JSON value as text (strings as-is, numbers printed).
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier of a payload record, if it has one.
pub fn record_identifier(record: &Value, source: &DescriptorSource) -> Option<String> {
    record.get(&source.identifier).and_then(scalar_text)
}

/// Descriptor of a payload record; both fields must be present.
pub fn record_descriptor(record: &Value, source: &DescriptorSource) -> Option<Descriptor> {
    let location = record.get(&source.location).and_then(scalar_text)?;
    let number = record.get(&source.number).and_then(scalar_text)?;
    if location.is_empty() || number.is_empty() {
        return None;
    }
    Some(Descriptor { location, number })
}

// ============================================================================
// STRATEGIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Window around the identifier inside structural elements
    TaggedWindow,
    /// Window around the identifier in the whole document text
    DocumentWindow,
    /// `"idField": id ... "fieldA": x ... "fieldB": y` in one record
    AnchoredRecord,
    /// Field permutations near the raw identifier substring
    Proximity,
    /// Exact identifier match in any embedded JSON record array
    EmbeddedRecords,
}

/// Attempt order. Changing it changes which descriptors resolve.
pub const STRATEGY_CHAIN: [ResolutionStrategy; 5] = [
    ResolutionStrategy::TaggedWindow,
    ResolutionStrategy::DocumentWindow,
    ResolutionStrategy::AnchoredRecord,
    ResolutionStrategy::Proximity,
    ResolutionStrategy::EmbeddedRecords,
];

/// Everything a strategy may look at for one document.
pub struct ResolutionContext<'a> {
    pub doc: &'a XmlDocument,
    /// Parsed payload blocks, any shape
    pub blocks: &'a [Value],
}

impl ResolutionStrategy {
    pub fn attempt(
        &self,
        resolver: &IdentifierResolver,
        ctx: &ResolutionContext,
        id: &str,
    ) -> Option<Descriptor> {
        match self {
            ResolutionStrategy::TaggedWindow => ctx
                .doc
                .elements_by_tag(&resolver.structural_tag)
                .find_map(|el| resolver.window_match(&el.text_content(), id)),
            ResolutionStrategy::DocumentWindow => resolver.window_match(ctx.doc.raw_text(), id),
            ResolutionStrategy::AnchoredRecord => resolver.anchored_match(ctx.doc.raw_text(), id),
            ResolutionStrategy::Proximity => resolver.proximity_match(ctx.doc.raw_text(), id),
            ResolutionStrategy::EmbeddedRecords => ctx
                .blocks
                .iter()
                .find_map(|block| find_embedded(block, &resolver.fields, id)),
        }
    }
}

// ============================================================================
// RESOLUTION RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub identifier: String,
    pub descriptor: Descriptor,
    pub strategy: ResolutionStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// In the order identifiers were supplied
    pub resolved: Vec<Resolution>,
    pub unresolved: Vec<String>,
}

impl ResolutionReport {
    pub fn descriptors(&self) -> Vec<String> {
        self.resolved.iter().map(|r| r.descriptor.to_string()).collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct IdentifierResolver {
    fields: DescriptorSource,
    structural_tag: String,
    window_radius: usize,
    loose_location: Regex,
    loose_number: Regex,
    keyed_location: Regex,
    keyed_number: Regex,
}

fn loose_pattern(field: &str) -> String {
    format!(
        r#"["']?\b{}\b["']?\s*[:=>]\s*["']?([\w./]+)"#,
        regex::escape(field)
    )
}

fn keyed_pattern(field: &str) -> String {
    format!(r#""{}"\s*:\s*"?([\w./]+)"#, regex::escape(field))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| BralnikError::Config(format!("Invalid field pattern: {}", e)))
}

impl IdentifierResolver {
    /// Build a resolver for building identifiers.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Self::for_source(config, &config.building)
    }

    pub fn for_source(config: &ExtractorConfig, fields: &DescriptorSource) -> Result<Self> {
        Ok(IdentifierResolver {
            fields: fields.clone(),
            structural_tag: config.resolver.structural_tag.clone(),
            window_radius: config.resolver.window_radius,
            loose_location: compile(&loose_pattern(&fields.location))?,
            loose_number: compile(&loose_pattern(&fields.number))?,
            keyed_location: compile(&keyed_pattern(&fields.location))?,
            keyed_number: compile(&keyed_pattern(&fields.number))?,
        })
    }

    /// Resolve every identifier; unresolved ones are reported, not errors.
    pub fn resolve<'i, I>(&self, ctx: &ResolutionContext, ids: I) -> ResolutionReport
    where
        I: IntoIterator<Item = &'i str>,
    {
        let mut report = ResolutionReport::default();

        for id in ids {
            match self.resolve_one(ctx, id) {
                Some(resolution) => report.resolved.push(resolution),
                None => {
                    debug!(
                        file = ctx.doc.file_name(),
                        identifier = id,
                        "No strategy resolved identifier"
                    );
                    report.unresolved.push(id.to_string());
                }
            }
        }

        report
    }

    pub fn resolve_one(&self, ctx: &ResolutionContext, id: &str) -> Option<Resolution> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }

        STRATEGY_CHAIN.iter().find_map(|strategy| {
            strategy.attempt(self, ctx, id).map(|descriptor| {
                debug!(identifier = id, strategy = ?strategy, %descriptor, "Resolved identifier");
                Resolution {
                    identifier: id.to_string(),
                    descriptor,
                    strategy: *strategy,
                }
            })
        })
    }

    /// Strategies 1 and 2: both loose key:value fields inside a fixed window
    /// around an occurrence of the identifier.
    ///
    /// Within the window, text after the identifier is searched before text
    /// before it, and the record holding the identifier (up to the nearest
    /// brace) before the rest, so a neighbouring record never wins over
    /// the identifier's own fields.
    fn window_match(&self, text: &str, id: &str) -> Option<Descriptor> {
        occurrences(text, id).find_map(|pos| {
            let (start, end) = window_bounds(text, pos, id.len(), self.window_radius);
            let id_end = pos + id.len();
            let record_start = text[start..pos]
                .rfind(|c: char| c == '{' || c == '}')
                .map(|i| start + i + 1)
                .unwrap_or(start);
            let record_end = text[id_end..end]
                .find(|c: char| c == '{' || c == '}')
                .map(|i| id_end + i)
                .unwrap_or(end);

            [
                (pos, record_end),
                (record_start, record_end),
                (pos, end),
                (start, end),
            ]
            .iter()
            .find_map(|&(from, to)| self.loose_fields(&text[from..to]))
        })
    }

    fn loose_fields(&self, text: &str) -> Option<Descriptor> {
        let location = first_capture(&self.loose_location, text)?;
        let number = first_capture(&self.loose_number, text)?;
        Some(Descriptor { location, number })
    }

    /// Strategy 3: identifier field and both descriptor fields in one record.
    fn anchored_match(&self, text: &str, id: &str) -> Option<Descriptor> {
        let pattern = format!(
            r#""{idf}"\s*:\s*"?{id}"?[^{{}}]*?"{a}"\s*:\s*"?([\w./]+)"?[^{{}}]*?"{b}"\s*:\s*"?([\w./]+)"#,
            idf = regex::escape(&self.fields.identifier),
            id = bounded(id),
            a = regex::escape(&self.fields.location),
            b = regex::escape(&self.fields.number),
        );
        let caps = Regex::new(&pattern).ok()?.captures(text)?;
        Some(Descriptor::new(&caps[1], &caps[2]))
    }

    /// Strategy 4: field-A then field-B, field-B then field-A, then both in
    /// any order within the record enclosing the identifier.
    fn proximity_match(&self, text: &str, id: &str) -> Option<Descriptor> {
        let id_re = bounded(id);
        let a = regex::escape(&self.fields.location);
        let b = regex::escape(&self.fields.number);

        let a_then_b = format!(
            r#"{id_re}"?[^{{}}]*?"?{a}"?\s*:\s*"?([\w./]+)"?[^{{}}]*?"?{b}"?\s*:\s*"?([\w./]+)"#
        );
        if let Some(caps) = Regex::new(&a_then_b).ok()?.captures(text) {
            return Some(Descriptor::new(&caps[1], &caps[2]));
        }

        let b_then_a = format!(
            r#"{id_re}"?[^{{}}]*?"?{b}"?\s*:\s*"?([\w./]+)"?[^{{}}]*?"?{a}"?\s*:\s*"?([\w./]+)"#
        );
        if let Some(caps) = Regex::new(&b_then_a).ok()?.captures(text) {
            return Some(Descriptor::new(&caps[2], &caps[1]));
        }

        occurrences(text, id).find_map(|pos| {
            let record = enclosing_record(text, pos, id.len())?;
            let location = first_capture(&self.keyed_location, record)?;
            let number = first_capture(&self.keyed_number, record)?;
            Some(Descriptor { location, number })
        })
    }
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

/// Start positions of `id` that are not part of a longer token.
fn occurrences<'t>(text: &'t str, id: &'t str) -> impl Iterator<Item = usize> + 't {
    text.match_indices(id)
        .map(|(pos, _)| pos)
        .filter(move |&pos| {
            let before = text[..pos].chars().next_back();
            let after = text[pos + id.len()..].chars().next();
            !before.map_or(false, is_token_char) && !after.map_or(false, is_token_char)
        })
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Escaped identifier that only matches as a whole token.
fn bounded(id: &str) -> String {
    let mut pattern = regex::escape(id);
    if id.chars().next().map_or(false, is_token_char) {
        pattern.insert_str(0, r"\b");
    }
    if id.chars().next_back().map_or(false, is_token_char) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// Byte range of the window around a match, widened to char boundaries.
fn window_bounds(text: &str, pos: usize, len: usize, radius: usize) -> (usize, usize) {
    let mut start = pos.saturating_sub(radius);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = pos.saturating_add(len).saturating_add(radius).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    (start, end)
}

/// Slice between the nearest `{` before and `}` after a match.
fn enclosing_record(text: &str, pos: usize, len: usize) -> Option<&str> {
    let start = text[..pos].rfind('{')?;
    let end = pos + len + text[pos + len..].find('}')?;
    Some(&text[start..=end])
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Walk a JSON value for arrays of objects carrying the identifier field
/// and return the first record whose identifier equals `id`.
fn find_embedded(value: &Value, fields: &DescriptorSource, id: &str) -> Option<Descriptor> {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(found_id) = record_identifier(item, fields) {
                    if found_id == id {
                        if let Some(descriptor) = record_descriptor(item, fields) {
                            return Some(descriptor);
                        }
                    }
                }
            }
            items.iter().find_map(|item| find_embedded(item, fields, id))
        }
        Value::Object(map) => map.values().find_map(|v| find_embedded(v, fields, id)),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
