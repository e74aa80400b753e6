// 🔢 Category Counter - Change-marker tallies per entity category
// Pure and total: unknown or missing markers are ignored, never an error

use crate::payload::PayloadGroup;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// CHANGE MARKERS
// ============================================================================

/// Status of an entity within a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeMarker {
    /// Unchanged
    N,
    /// Modified
    S,
    /// Added
    D,
    /// Removed
    B,
    /// Other (soil-quality zones only)
    O,
}

impl ChangeMarker {
    pub fn code(&self) -> &'static str {
        match self {
            ChangeMarker::N => "N",
            ChangeMarker::S => "S",
            ChangeMarker::D => "D",
            ChangeMarker::B => "B",
            ChangeMarker::O => "O",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "N" => Some(ChangeMarker::N),
            "S" => Some(ChangeMarker::S),
            "D" => Some(ChangeMarker::D),
            "B" => Some(ChangeMarker::B),
            "O" => Some(ChangeMarker::O),
            _ => None,
        }
    }
}

pub const STANDARD_MARKERS: &[ChangeMarker] = &[
    ChangeMarker::N,
    ChangeMarker::S,
    ChangeMarker::D,
    ChangeMarker::B,
];

pub const SOIL_QUALITY_MARKERS: &[ChangeMarker] = &[
    ChangeMarker::N,
    ChangeMarker::S,
    ChangeMarker::D,
    ChangeMarker::B,
    ChangeMarker::O,
];

/// Export columns of categories whose new entries are not reported.
pub const CHANGED_MARKERS: &[ChangeMarker] = &[ChangeMarker::S, ChangeMarker::D, ChangeMarker::B];

pub const SOIL_QUALITY_CHANGED_MARKERS: &[ChangeMarker] = &[
    ChangeMarker::S,
    ChangeMarker::D,
    ChangeMarker::B,
    ChangeMarker::O,
];

// ============================================================================
// MARKER COUNTS
// ============================================================================

/// Count per recognized marker; every recognized marker is present,
/// defaulting to 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerCounts {
    counts: BTreeMap<ChangeMarker, usize>,
}

impl MarkerCounts {
    pub fn zeroed(markers: &[ChangeMarker]) -> Self {
        MarkerCounts {
            counts: markers.iter().map(|m| (*m, 0)).collect(),
        }
    }

    /// Count for a marker; 0 for markers outside the enumeration.
    pub fn get(&self, marker: ChangeMarker) -> usize {
        self.counts.get(&marker).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Recognized markers with their counts, in N, S, D, B, O order.
    pub fn iter(&self) -> impl Iterator<Item = (ChangeMarker, usize)> + '_ {
        self.counts.iter().map(|(m, c)| (*m, *c))
    }
}

/// Tally entities by change marker.
///
/// Entities that are not objects, lack the marker field, or carry a marker
/// outside `markers` are not counted.
pub fn count_markers<'v, I>(entities: I, markers: &[ChangeMarker], marker_field: &str) -> MarkerCounts
where
    I: IntoIterator<Item = &'v Value>,
{
    let mut result = MarkerCounts::zeroed(markers);

    for entity in entities {
        let marker = entity
            .get(marker_field)
            .and_then(Value::as_str)
            .and_then(ChangeMarker::from_code);

        if let Some(marker) = marker {
            if let Some(count) = result.counts.get_mut(&marker) {
                *count += 1;
            }
        }
    }

    result
}

// ============================================================================
// CATEGORY TABLE
// ============================================================================

/// Which payload records a category draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSlice {
    /// One field of one kind
    Field {
        kind: &'static str,
        field: &'static str,
    },
    /// The same field from every kind
    AnyKind { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySpec {
    pub key: &'static str,
    pub label: &'static str,
    pub slice: PayloadSlice,
    /// Markers counted
    pub markers: &'static [ChangeMarker],
    /// Markers given an export column, a subset of `markers`
    pub exported: &'static [ChangeMarker],
}

pub const CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        key: "obmocje",
        label: "OBMOCJE",
        slice: PayloadSlice::Field { kind: "parcele", field: "obmocjaSpp" },
        markers: STANDARD_MARKERS,
        exported: CHANGED_MARKERS,
    },
    CategorySpec {
        key: "bonitete",
        label: "BONITETE",
        slice: PayloadSlice::Field { kind: "bonitete", field: "obmocjaBonitet" },
        markers: SOIL_QUALITY_MARKERS,
        exported: SOIL_QUALITY_CHANGED_MARKERS,
    },
    CategorySpec {
        key: "tocke",
        label: "TOČKE",
        slice: PayloadSlice::AnyKind { field: "tocke" },
        markers: STANDARD_MARKERS,
        exported: CHANGED_MARKERS,
    },
    CategorySpec {
        key: "daljice",
        label: "DALJICE",
        slice: PayloadSlice::AnyKind { field: "daljice" },
        markers: STANDARD_MARKERS,
        exported: CHANGED_MARKERS,
    },
    CategorySpec {
        key: "parcele",
        label: "PARCELE",
        slice: PayloadSlice::Field { kind: "parcele", field: "parcele" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "stavbe",
        label: "STAVBE",
        slice: PayloadSlice::Field { kind: "stavbe", field: "stavbe" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "deliStavb",
        label: "DELI STAVBE",
        slice: PayloadSlice::Field { kind: "stavbe", field: "deliStavb" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "etaze",
        label: "ETAZA",
        slice: PayloadSlice::Field { kind: "stavbe", field: "etaze" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "prostori",
        label: "PROSTORI",
        slice: PayloadSlice::Field { kind: "stavbe", field: "prostori" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "sestavineDelovStavb",
        label: "SESTAVINE DELOV STAVB",
        slice: PayloadSlice::AnyKind { field: "sestavineDelovStavb" },
        markers: STANDARD_MARKERS,
        exported: STANDARD_MARKERS,
    },
    CategorySpec {
        key: "tockeMeritev",
        label: "TOCKE MERITEV",
        slice: PayloadSlice::Field { kind: "bonitete", field: "tockeMeritev" },
        markers: STANDARD_MARKERS,
        exported: CHANGED_MARKERS,
    },
];

impl CategorySpec {
    /// Count this category's slice of the payload; an absent slice counts
    /// as an empty sequence.
    pub fn count(&self, group: &PayloadGroup, marker_field: &str) -> MarkerCounts {
        match self.slice {
            PayloadSlice::Field { kind, field } => {
                count_markers(group.records(kind, field), self.markers, marker_field)
            }
            PayloadSlice::AnyKind { field } => {
                count_markers(group.records_across_kinds(field), self.markers, marker_field)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
