//! Candidate record shape and selection predicate

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

/// Field holding the derived width
pub const COVER_WIDTH_FIELD: &str = "coverWidth";
/// Field holding the derived height
pub const COVER_HEIGHT_FIELD: &str = "coverHeight";

/// A record selected for repair
///
/// Only the fields the pipeline reads are deserialized; persistence is
/// field-level and never touches the rest of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Opaque unique key of the record
    #[serde(rename = "_id")]
    pub id: Bson,
    /// URL of the referenced external resource; may be empty or absent
    #[serde(default)]
    pub cover: Option<String>,
}

impl CandidateRecord {
    /// Cover URL, if one is present
    #[must_use]
    pub fn cover(&self) -> Option<&str> {
        self.cover.as_deref()
    }
}

/// Selection predicate: derived width absent, zero, or null
///
/// Repaired records stop matching, which is what makes re-runs converge.
#[must_use]
pub fn candidate_filter() -> Document {
    doc! {
        "$or": [
            { COVER_WIDTH_FIELD: { "$exists": false } },
            { COVER_WIDTH_FIELD: 0 },
            { COVER_WIDTH_FIELD: Bson::Null },
        ]
    }
}

/// Field-level `$set` of exactly the derived attributes
#[must_use]
pub fn dimension_update(width: u32, height: u32) -> Document {
    doc! {
        "$set": {
            COVER_WIDTH_FIELD: i64::from(width),
            COVER_HEIGHT_FIELD: i64::from(height),
        }
    }
}
