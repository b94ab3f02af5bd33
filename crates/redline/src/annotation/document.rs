//! The annotated-document schema.
//!
//! This is the validated shape of the worker's output and the cached wire
//! format served to callers. The section `type` set is closed; anything
//! the model produces outside it is rejected before it can poison the
//! cache. Parsing into these types enforces the structural rules (tag
//! present and recognized, items carry priority and text); [`AnnotatedDocument::validate`]
//! adds the non-empty-after-trim rules serde cannot express.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub sections: Vec<Section>,
}

/// A run of original text, or a block of annotations between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Text { content: String },
    Annotations { items: Vec<AnnotationItem> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationItem {
    pub priority: Priority,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Weakness,
    Recommendation,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("text section {0} has empty content")]
    EmptyTextContent(usize),

    #[error("annotation item in section {0} has empty text")]
    EmptyAnnotationText(usize),
}

impl AnnotatedDocument {
    /// Structural rules beyond what deserialization enforces: text content
    /// and annotation text must be non-empty after trimming.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for (index, section) in self.sections.iter().enumerate() {
            match section {
                Section::Text { content } => {
                    if content.trim().is_empty() {
                        return Err(SchemaViolation::EmptyTextContent(index));
                    }
                }
                Section::Annotations { items } => {
                    for item in items {
                        if item.text.trim().is_empty() {
                            return Err(SchemaViolation::EmptyAnnotationText(index));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
