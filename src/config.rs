// ⚙️ Extractor Configuration - Document conventions as data
// Every tag name, prefix and field name the engine relies on lives here

use crate::components::ComponentCategory;
use crate::error::{BralnikError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// PREFIX RULES
// ============================================================================

/// Maps a component identifier prefix onto a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub category: ComponentCategory,
}

impl PrefixRule {
    pub fn new(prefix: &str, category: ComponentCategory) -> Self {
        PrefixRule {
            prefix: prefix.to_string(),
            category,
        }
    }
}

// ============================================================================
// DESCRIPTOR SOURCES
// ============================================================================

/// Where the descriptor of an entity lives inside the payload data.
///
/// The descriptor is rendered as `<location>-<number>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSource {
    /// Payload kind (`tip`) holding the records
    pub kind: String,

    /// Field under `podatki` holding the record array
    pub field: String,

    /// Identifier field inside each record
    pub identifier: String,

    /// Location code field (cadastral municipality)
    pub location: String,

    /// Local number field
    pub number: String,
}

impl DescriptorSource {
    fn new(kind: &str, field: &str, identifier: &str, location: &str, number: &str) -> Self {
        DescriptorSource {
            kind: kind.to_string(),
            field: field.to_string(),
            identifier: identifier.to_string(),
            location: location.to_string(),
            number: number.to_string(),
        }
    }
}

// ============================================================================
// RESOLVER SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Tag whose text is searched first for building identifiers
    pub structural_tag: String,

    /// Bytes of context taken on each side of an identifier hit
    pub window_radius: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            structural_tag: "datoteka".to_string(),
            window_radius: 300,
        }
    }
}

// ============================================================================
// EXTRACTOR CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub procedure_tag: String,
    pub component_tag: String,
    pub component_id_tag: String,
    pub payload_tag: String,
    pub agent_tag: String,
    pub procedure_type_tag: String,

    /// Change marker field on every entity record
    pub marker_field: String,

    pub prefix_rules: Vec<PrefixRule>,

    pub parcel: DescriptorSource,
    pub building: DescriptorSource,
    pub soil_quality: DescriptorSource,

    pub resolver: ResolverConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            procedure_tag: "katastrskiPostopek".to_string(),
            component_tag: "sestavina".to_string(),
            component_id_tag: "sestavinaEid".to_string(),
            payload_tag: "datoteka".to_string(),
            agent_tag: "pooblascenecId".to_string(),
            procedure_type_tag: "vrstaKatastrskegaPostopka".to_string(),
            marker_field: "sprememba".to_string(),
            prefix_rules: vec![
                PrefixRule::new("1001", ComponentCategory::Parcel),
                PrefixRule::new("1002", ComponentCategory::Building),
                PrefixRule::new("1003", ComponentCategory::BuildingPart),
                PrefixRule::new("1201", ComponentCategory::SoilQuality),
            ],
            parcel: DescriptorSource::new(
                "parcele",
                "parcele",
                "parcelaEid",
                "sifKo",
                "stevilkaParcele",
            ),
            building: DescriptorSource::new(
                "stavbe",
                "stavbe",
                "stavbaEid",
                "sifKo",
                "stevilkaStavbe",
            ),
            soil_quality: DescriptorSource::new(
                "bonitete",
                "obmocjaBonitet",
                "obmocjeBonitetEid",
                "sifKo",
                "stevilkaObmocja",
            ),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ExtractorConfig = serde_json::from_str(&content).map_err(|e| {
            BralnikError::Config(format!(
                "Failed to parse config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let tags = [
            ("procedure_tag", &self.procedure_tag),
            ("component_tag", &self.component_tag),
            ("component_id_tag", &self.component_id_tag),
            ("payload_tag", &self.payload_tag),
            ("agent_tag", &self.agent_tag),
            ("procedure_type_tag", &self.procedure_type_tag),
            ("marker_field", &self.marker_field),
            ("resolver.structural_tag", &self.resolver.structural_tag),
        ];
        for (name, value) in tags {
            if value.trim().is_empty() {
                return Err(BralnikError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.prefix_rules.iter().any(|r| r.prefix.is_empty()) {
            return Err(BralnikError::Config(
                "prefix rules must not contain an empty prefix".to_string(),
            ));
        }

        if self.resolver.window_radius == 0 {
            return Err(BralnikError::Config(
                "resolver.window_radius must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Category for a component identifier; the first matching prefix wins.
    pub fn classify(&self, identifier: &str) -> Option<ComponentCategory> {
        self.prefix_rules
            .iter()
            .find(|rule| identifier.starts_with(&rule.prefix))
            .map(|rule| rule.category)
    }
}

// ============================================================================
// TESTS
// ============================================================================
