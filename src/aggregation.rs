// 📊 Aggregation Builder - One flat summary record per document
// Composes payload counts, component identifiers and resolved descriptors

use crate::components::{ComponentCategory, ComponentIndexer, IdentifierSet, OrderedIdSet};
use crate::config::{DescriptorSource, ExtractorConfig};
use crate::counter::{MarkerCounts, CATEGORIES};
use crate::document::XmlDocument;
use crate::error::Result;
use crate::payload::{group_blocks, PayloadExtractor, PayloadGroup};
use crate::resolver::{
    record_descriptor, record_identifier, IdentifierResolver, ResolutionContext, ResolutionReport,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RECORD TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub key: String,
    pub label: String,
    pub counts: MarkerCounts,
}

/// Unique component identifiers per prefix category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCounts {
    pub parcels: usize,
    pub buildings: usize,
    pub building_parts: usize,
    pub soil_quality: usize,
}

impl ComponentCounts {
    pub fn get(&self, category: ComponentCategory) -> usize {
        match category {
            ComponentCategory::Parcel => self.parcels,
            ComponentCategory::Building => self.buildings,
            ComponentCategory::BuildingPart => self.building_parts,
            ComponentCategory::SoilQuality => self.soil_quality,
        }
    }
}

impl From<&IdentifierSet> for ComponentCounts {
    fn from(set: &IdentifierSet) -> Self {
        ComponentCounts {
            parcels: set.parcels.len(),
            buildings: set.buildings.len(),
            building_parts: set.building_parts.len(),
            soil_quality: set.soil_quality.len(),
        }
    }
}

/// Summary of one document. Built once, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub file_name: String,
    pub payload_kinds: Vec<String>,
    pub agent_id: String,
    pub procedure_count: usize,
    pub procedure_types: Vec<String>,
    pub components: ComponentCounts,
    /// One entry per known category, in category table order
    pub categories: Vec<CategoryCounts>,
    pub parcels: Vec<String>,
    pub buildings: Vec<String>,
    pub soil_quality_zones: Vec<String>,
    pub unresolved_buildings: usize,
}

impl AggregationRecord {
    /// Deduplication key: file name, agent id and procedure count.
    pub fn composite_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.file_name, self.agent_id, self.procedure_count
        )
    }

    pub fn category(&self, key: &str) -> Option<&CategoryCounts> {
        self.categories.iter().find(|c| c.key == key)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct AggregationBuilder<'a> {
    config: &'a ExtractorConfig,
    resolver: IdentifierResolver,
}

impl<'a> AggregationBuilder<'a> {
    pub fn new(config: &'a ExtractorConfig) -> Result<Self> {
        Ok(AggregationBuilder {
            config,
            resolver: IdentifierResolver::new(config)?,
        })
    }

    /// Run the whole extraction chain over one document.
    pub fn build(&self, doc: &XmlDocument) -> AggregationRecord {
        let blocks = PayloadExtractor::new(self.config).blocks(doc);
        let group = group_blocks(&blocks);
        let ids = ComponentIndexer::new(self.config).index(doc);

        let ctx = ResolutionContext {
            doc,
            blocks: &blocks,
        };
        let report = self.resolver.resolve(&ctx, ids.buildings.iter());

        self.compose(doc, &group, &ids, &report)
    }

    /// Pure composition of already extracted parts.
    pub fn compose(
        &self,
        doc: &XmlDocument,
        group: &PayloadGroup,
        ids: &IdentifierSet,
        report: &ResolutionReport,
    ) -> AggregationRecord {
        let categories = CATEGORIES
            .iter()
            .map(|spec| CategoryCounts {
                key: spec.key.to_string(),
                label: spec.label.to_string(),
                counts: spec.count(group, &self.config.marker_field),
            })
            .collect();

        AggregationRecord {
            file_name: doc.file_name().to_string(),
            payload_kinds: group.kind_names(),
            agent_id: doc.first_text(&self.config.agent_tag).unwrap_or_default(),
            procedure_count: doc.count_by_tag(&self.config.procedure_tag),
            procedure_types: doc.unique_texts(&self.config.procedure_type_tag),
            components: ComponentCounts::from(ids),
            categories,
            parcels: join_descriptors(&ids.parcels, group, &self.config.parcel),
            buildings: report.descriptors(),
            soil_quality_zones: join_descriptors(
                &ids.soil_quality,
                group,
                &self.config.soil_quality,
            ),
            unresolved_buildings: report.unresolved_count(),
        }
    }
}

/// Structured join: for each identifier (in first-seen order) the first
/// payload record with the same identifier that has both descriptor fields.
fn join_descriptors(ids: &OrderedIdSet, group: &PayloadGroup, source: &DescriptorSource) -> Vec<String> {
    let records: &[Value] = group.records(&source.kind, &source.field);

    ids.iter()
        .filter_map(|id| {
            records
                .iter()
                .filter(|record| record_identifier(record, source).as_deref() == Some(id))
                .find_map(|record| record_descriptor(record, source))
                .map(|d| d.to_string())
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ChangeMarker;

    const DOC: &str = r#"<elaborat>
  <pooblascenecId>agentA</pooblascenecId>
  <katastrskiPostopek>
    <vrstaKatastrskegaPostopka>Parcelacija</vrstaKatastrskegaPostopka>
    <sestavina><sestavinaEid>100100001</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>100100002</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>100200001</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>100200009</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>120100001</sestavinaEid></sestavina>
  </katastrskiPostopek>
  <katastrskiPostopek>
    <vrstaKatastrskegaPostopka>Evidentiranje stavbe</vrstaKatastrskegaPostopka>
    <vrstaKatastrskegaPostopka>Parcelacija</vrstaKatastrskegaPostopka>
  </katastrskiPostopek>
  <datoteka><![CDATA[{"tip":"parcele","podatki":{"parcele":[
    {"parcelaEid":100100002,"sifKo":1722,"stevilkaParcele":"12/3","sprememba":"S"},
    {"parcelaEid":100100001,"sifKo":1722,"stevilkaParcele":"12/1","sprememba":"D"},
    {"parcelaEid":100100077,"sifKo":1722,"stevilkaParcele":"99","sprememba":"N"}
  ]}}]]></datoteka>
  <datoteka><![CDATA[{"tip":"stavbe","podatki":{"stavbe":[
    {"stavbaEid":100200001,"sifKo":1722,"stevilkaStavbe":455,"sprememba":"S"}
  ],"tocke":[{"sprememba":"D"}]}}]]></datoteka>
  <datoteka><![CDATA[{"tip":"bonitete","podatki":{"obmocjaBonitet":[
    {"obmocjeBonitetEid":120100001,"sifKo":1722,"stevilkaObmocja":4,"sprememba":"O"}
  ]}}]]></datoteka>
  <datoteka>{ not json</datoteka>
</elaborat>"#;

    fn build() -> AggregationRecord {
        let config = ExtractorConfig::default();
        let doc = XmlDocument::parse("doc1.xml", DOC.to_string()).unwrap();
        AggregationBuilder::new(&config).unwrap().build(&doc)
    }

    #[test]
    fn test_scalar_fields() {
        let record = build();

        assert_eq!(record.file_name, "doc1.xml");
        assert_eq!(record.agent_id, "agentA");
        assert_eq!(record.procedure_count, 2);
        assert_eq!(
            record.procedure_types,
            vec!["Parcelacija".to_string(), "Evidentiranje stavbe".to_string()]
        );
        assert_eq!(
            record.payload_kinds,
            vec!["parcele".to_string(), "stavbe".to_string(), "bonitete".to_string()]
        );
        assert_eq!(record.composite_key(), "doc1.xml-agentA-2");
    }

    #[test]
    fn test_component_counts() {
        let record = build();

        assert_eq!(
            record.components,
            ComponentCounts {
                parcels: 2,
                buildings: 2,
                building_parts: 0,
                soil_quality: 1,
            }
        );
    }

    #[test]
    fn test_category_counts() {
        let record = build();

        let parcele = &record.category("parcele").unwrap().counts;
        assert_eq!(parcele.get(ChangeMarker::S), 1);
        assert_eq!(parcele.get(ChangeMarker::D), 1);
        assert_eq!(parcele.get(ChangeMarker::N), 1);
        assert_eq!(parcele.get(ChangeMarker::B), 0);

        assert_eq!(record.category("tocke").unwrap().counts.get(ChangeMarker::D), 1);
        assert_eq!(record.category("bonitete").unwrap().counts.get(ChangeMarker::O), 1);
        assert_eq!(record.category("prostori").unwrap().counts.total(), 0);
        assert_eq!(record.categories.len(), CATEGORIES.len());
    }

    #[test]
    fn test_descriptor_lists() {
        let record = build();

        // Parcels follow component order, not payload order
        assert_eq!(
            record.parcels,
            vec!["1722-12/1".to_string(), "1722-12/3".to_string()]
        );
        assert_eq!(record.buildings, vec!["1722-455".to_string()]);
        assert_eq!(record.soil_quality_zones, vec!["1722-4".to_string()]);
        assert_eq!(record.unresolved_buildings, 1);
    }

    #[test]
    fn test_component_counts_by_category() {
        let record = build();
        let listed: Vec<String> = ComponentCategory::ALL
            .iter()
            .map(|c| format!("{} {}", c.name(), record.components.get(*c)))
            .collect();

        assert_eq!(
            listed,
            vec!["parcel 2", "building 2", "building part 0", "soil quality 1"]
        );
    }

    #[test]
    fn test_buildings_sharing_one_payload() {
        let raw = r#"<elaborat>
  <katastrskiPostopek>
    <sestavina><sestavinaEid>100200001</sestavinaEid></sestavina>
    <sestavina><sestavinaEid>100200002</sestavinaEid></sestavina>
  </katastrskiPostopek>
  <datoteka><![CDATA[{"tip":"stavbe","podatki":{"stavbe":[
    {"stavbaEid":100200001,"sifKo":1722,"stevilkaStavbe":455,"sprememba":"S"},
    {"stavbaEid":100200002,"sifKo":1722,"stevilkaStavbe":456,"sprememba":"N"}
  ]}}]]></datoteka>
</elaborat>"#;
        let config = ExtractorConfig::default();
        let doc = XmlDocument::parse("two.xml", raw.to_string()).unwrap();
        let record = AggregationBuilder::new(&config).unwrap().build(&doc);

        assert_eq!(
            record.buildings,
            vec!["1722-455".to_string(), "1722-456".to_string()]
        );
        assert_eq!(record.unresolved_buildings, 0);
    }

    #[test]
    fn test_empty_document_defaults() {
        let config = ExtractorConfig::default();
        let doc = XmlDocument::parse("empty.xml", "<elaborat/>".to_string()).unwrap();
        let record = AggregationBuilder::new(&config).unwrap().build(&doc);

        assert_eq!(record.agent_id, "");
        assert_eq!(record.procedure_count, 0);
        assert!(record.payload_kinds.is_empty());
        assert!(record.procedure_types.is_empty());
        assert!(record.parcels.is_empty());
        assert!(record.buildings.is_empty());
        assert_eq!(record.components, ComponentCounts::default());
        assert!(record.categories.iter().all(|c| c.counts.total() == 0));
        assert_eq!(record.composite_key(), "empty.xml--0");
    }
}
