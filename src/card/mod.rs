pub mod alias;
pub mod normalize;

pub use alias::{AliasTable, SectionLayout, GENERIC_TYPE};
pub use normalize::{NormalizationWarning, Normalized, Normalizer};

use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical card snapshot handed to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardModel {
    pub title: String,
    /// Arrival order; positions already seen keep their ids.
    pub sections: Vec<SectionModel>,
    /// Filled once, when the whole `actions` array has arrived.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionModel {
    pub id: String,
    pub title: String,
    /// Canonical, alias-resolved type name.
    #[serde(rename = "type")]
    pub section_type: String,
    #[serde(flatten)]
    pub content: SectionContent,
    pub is_placeholder: bool,
    pub is_complete: bool,
}

/// Fields or items, depending on the section type's layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionContent {
    Fields(Vec<FieldModel>),
    Items(Vec<ItemModel>),
}

impl SectionModel {
    #[must_use]
    pub fn fields(&self) -> &[FieldModel] {
        match &self.content {
            SectionContent::Fields(fields) => fields,
            SectionContent::Items(_) => &[],
        }
    }

    #[must_use]
    pub fn items(&self) -> &[ItemModel] {
        match &self.content {
            SectionContent::Items(items) => items,
            SectionContent::Fields(_) => &[],
        }
    }

    /// Number of fields or items, placeholders included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match &self.content {
            SectionContent::Fields(fields) => fields.len(),
            SectionContent::Items(items) => items.len(),
        }
    }

    /// Number of fields or items backed by arrived data.
    #[must_use]
    pub fn real_entry_count(&self) -> usize {
        match &self.content {
            SectionContent::Fields(fields) => fields.iter().filter(|f| !f.is_placeholder).count(),
            SectionContent::Items(items) => items.iter().filter(|i| !i.is_placeholder).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModel {
    pub id: String,
    pub label: String,
    /// `Value::Null` while the entry is a placeholder.
    pub value: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemModel {
    pub id: String,
    pub title: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionModel {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}
