// 🧩 Component Indexer - Identifiers referenced by procedures
// Walks procedure → component → identifier and buckets by prefix

use crate::config::ExtractorConfig;
use crate::document::XmlDocument;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// COMPONENT CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Parcel,
    Building,
    BuildingPart,
    SoilQuality,
}

impl ComponentCategory {
    pub const ALL: [ComponentCategory; 4] = [
        ComponentCategory::Parcel,
        ComponentCategory::Building,
        ComponentCategory::BuildingPart,
        ComponentCategory::SoilQuality,
    ];

    pub fn name(&self) -> &str {
        match self {
            ComponentCategory::Parcel => "parcel",
            ComponentCategory::Building => "building",
            ComponentCategory::BuildingPart => "building part",
            ComponentCategory::SoilQuality => "soil quality",
        }
    }
}

// ============================================================================
// IDENTIFIER SET
// ============================================================================

/// Unique identifiers in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderedIdSet {
    ids: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl OrderedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identifier was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }
}

/// Referenced identifiers per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentifierSet {
    pub parcels: OrderedIdSet,
    pub buildings: OrderedIdSet,
    pub building_parts: OrderedIdSet,
    pub soil_quality: OrderedIdSet,
}

impl IdentifierSet {
    pub fn get(&self, category: ComponentCategory) -> &OrderedIdSet {
        match category {
            ComponentCategory::Parcel => &self.parcels,
            ComponentCategory::Building => &self.buildings,
            ComponentCategory::BuildingPart => &self.building_parts,
            ComponentCategory::SoilQuality => &self.soil_quality,
        }
    }

    fn get_mut(&mut self, category: ComponentCategory) -> &mut OrderedIdSet {
        match category {
            ComponentCategory::Parcel => &mut self.parcels,
            ComponentCategory::Building => &mut self.buildings,
            ComponentCategory::BuildingPart => &mut self.building_parts,
            ComponentCategory::SoilQuality => &mut self.soil_quality,
        }
    }
}

// ============================================================================
// INDEXER
// ============================================================================

pub struct ComponentIndexer<'a> {
    config: &'a ExtractorConfig,
}

impl<'a> ComponentIndexer<'a> {
    pub fn new(config: &'a ExtractorConfig) -> Self {
        ComponentIndexer { config }
    }

    /// Collect component identifiers of every procedure.
    ///
    /// Components without an identifier, or whose identifier matches no
    /// prefix rule, are skipped.
    pub fn index(&self, doc: &XmlDocument) -> IdentifierSet {
        let mut set = IdentifierSet::default();

        for procedure in doc.elements_by_tag(&self.config.procedure_tag) {
            for component in procedure.descendants_by_tag(&self.config.component_tag) {
                let id = match component.descendants_by_tag(&self.config.component_id_tag).next() {
                    Some(el) => el.text_content().trim().to_string(),
                    None => continue,
                };

                if id.is_empty() {
                    continue;
                }

                if let Some(category) = self.config.classify(&id) {
                    set.get_mut(category).insert(&id);
                }
            }
        }

        set
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str) -> String {
        format!("<sestavina><sestavinaEid>{}</sestavinaEid></sestavina>", id)
    }

    fn doc(procedures: &[&[&str]]) -> XmlDocument {
        let body: String = procedures
            .iter()
            .map(|ids| {
                let inner: String = ids.iter().map(|id| component(id)).collect();
                format!("<katastrskiPostopek>{}</katastrskiPostopek>", inner)
            })
            .collect();
        XmlDocument::parse("c.xml", format!("<root>{}</root>", body)).unwrap()
    }

    #[test]
    fn test_index_dedups_per_category() {
        let doc = doc(&[&["1001000001", "1001000001", "1002000007"]]);
        let config = ExtractorConfig::default();
        let set = ComponentIndexer::new(&config).index(&doc);

        assert_eq!(set.parcels.len(), 1);
        assert_eq!(set.buildings.len(), 1);
        assert!(set.building_parts.is_empty());
        assert!(set.soil_quality.is_empty());
    }

    #[test]
    fn test_index_two_distinct_parcels() {
        let doc = doc(&[&["1001000001", "1001000002", "1002000007"]]);
        let config = ExtractorConfig::default();
        let set = ComponentIndexer::new(&config).index(&doc);

        assert_eq!(set.parcels.len(), 2);
        assert_eq!(set.buildings.len(), 1);
    }

    #[test]
    fn test_index_across_procedures_keeps_first_order() {
        let doc = doc(&[
            &["1002000009", "1201000001"],
            &["1002000003", "1002000009", "1003000004"],
        ]);
        let config = ExtractorConfig::default();
        let set = ComponentIndexer::new(&config).index(&doc);

        let buildings: Vec<&str> = set.buildings.iter().collect();
        assert_eq!(buildings, vec!["1002000009", "1002000003"]);
        assert_eq!(set.get(ComponentCategory::BuildingPart).len(), 1);
        assert_eq!(set.get(ComponentCategory::SoilQuality).len(), 1);
    }

    #[test]
    fn test_unknown_prefix_and_blank_ids_ignored() {
        let doc = doc(&[&["5555000001", "  ", "1001000001"]]);
        let config = ExtractorConfig::default();
        let set = ComponentIndexer::new(&config).index(&doc);

        assert_eq!(set.parcels.len(), 1);
        assert!(set.buildings.is_empty());
    }

    #[test]
    fn test_components_outside_procedures_ignored() {
        let raw = format!("<root>{}<katastrskiPostopek/></root>", component("1001000001"));
        let doc = XmlDocument::parse("c.xml", raw).unwrap();
        let config = ExtractorConfig::default();
        let set = ComponentIndexer::new(&config).index(&doc);

        assert!(set.parcels.is_empty());
    }

    #[test]
    fn test_ordered_id_set_insert() {
        let mut set = OrderedIdSet::new();
        assert!(set.insert("a"));
        assert!(set.insert("b"));
        assert!(!set.insert("a"));
        assert!(set.contains("b"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
