//! Maps partial JSON onto the canonical card shape.
//!
//! A [`Normalizer`] lives for one stream session. It remembers which ids it
//! has handed out per position so that identity survives re-parsing the
//! growing buffer, and it latches the `actions` list once it is whole.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};

use super::alias::{layout_of, AliasTable, SectionLayout, GENERIC_TYPE};
use super::{ActionModel, CardModel, FieldModel, ItemModel, SectionContent, SectionModel};
use crate::config::NormalizerConfig;
use crate::partial::{PartialDocument, PathSegment};

const SECTIONS_KEY: &str = "sections";
const ACTIONS_KEY: &str = "actions";
const FIELD_LABEL_KEYS: &[&str] = &["label", "name", "title", "key"];
const ITEM_TITLE_KEYS: &[&str] = &["title", "label", "name"];
const VALUE_KEYS: &[&str] = &["value", "description", "text", "content"];
const ACTION_LABEL_KEYS: &[&str] = &["label", "title", "text", "name"];
const ACTION_URL_KEYS: &[&str] = &["url", "href"];
const EXPECTED_COUNT_KEYS: &[&str] = &["expectedCount", "count"];

/// Recoverable problems found while normalizing. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationWarning {
    #[error("section {index}: unknown type '{declared}', rendering as '{GENERIC_TYPE}'")]
    UnknownSectionType { index: usize, declared: String },
    #[error("section {index}: {reason}")]
    MalformedSection { index: usize, reason: String },
    #[error("section {section}, entry {entry}: expected an object, passing value through")]
    MalformedEntry { section: usize, entry: usize },
    #[error("'sections' is not an array")]
    SectionsNotArray,
    #[error("'actions' is not an array")]
    ActionsNotArray,
}

/// Output of one normalization pass.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub card: CardModel,
    /// Warnings not reported by an earlier pass of the same session.
    pub warnings: Vec<NormalizationWarning>,
}

#[derive(Debug, Default)]
struct EntryIds {
    ids: Vec<String>,
    next_seq: usize,
}

#[derive(Debug)]
struct SectionSlot {
    id: String,
    entries: EntryIds,
}

/// Session-scoped normalizer.
#[derive(Debug)]
pub struct Normalizer {
    aliases: AliasTable,
    expected_counts: FxHashMap<&'static str, usize>,
    slots: Vec<SectionSlot>,
    next_section_seq: usize,
    used_ids: FxHashSet<String>,
    actions: Option<Vec<ActionModel>>,
    reported: FxHashSet<String>,
}

impl Normalizer {
    #[must_use]
    pub fn new(config: &NormalizerConfig) -> Self {
        let expected_counts = config
            .expected_counts
            .iter()
            .filter_map(|(name, count)| {
                super::alias::canonical_type(name.trim()).map(|canonical| (canonical, *count))
            })
            .collect();
        Self {
            aliases: AliasTable::with_overrides(&config.aliases),
            expected_counts,
            slots: Vec::new(),
            next_section_seq: 0,
            used_ids: FxHashSet::default(),
            actions: None,
            reported: FxHashSet::default(),
        }
    }

    /// Forget all session state (ids, latched actions, reported warnings).
    pub fn reset(&mut self) {
        self.slots.clear();
        self.next_section_seq = 0;
        self.used_ids.clear();
        self.actions = None;
        self.reported.clear();
    }

    pub fn normalize(&mut self, doc: &PartialDocument) -> Normalized {
        let mut warnings = Vec::new();
        let root = doc.value.as_object();

        let title = root
            .and_then(|obj| obj.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let raw_sections: &[Value] = match root.and_then(|obj| obj.get(SECTIONS_KEY)) {
            None => &[],
            Some(Value::Array(sections)) => sections,
            Some(_) => {
                warnings.push(NormalizationWarning::SectionsNotArray);
                &[]
            }
        };

        // Positions that vanished retire their ids; the counters keep going.
        if raw_sections.len() < self.slots.len() {
            self.slots.truncate(raw_sections.len());
        }

        let mut sections = Vec::with_capacity(raw_sections.len());
        for (index, raw) in raw_sections.iter().enumerate() {
            sections.push(self.normalize_section(doc, index, raw, &mut warnings));
        }

        if self.actions.is_none() {
            self.actions = self.take_actions(doc, &mut warnings);
        }

        warnings.retain(|warning| self.reported.insert(warning.to_string()));

        Normalized {
            card: CardModel {
                title,
                sections,
                actions: self.actions.clone().unwrap_or_default(),
            },
            warnings,
        }
    }

    fn normalize_section(
        &mut self,
        doc: &PartialDocument,
        index: usize,
        raw: &Value,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> SectionModel {
        let section_path = [PathSegment::key(SECTIONS_KEY), PathSegment::Index(index)];
        let open = doc.is_open(&section_path);

        let Some(obj) = raw.as_object() else {
            warnings.push(NormalizationWarning::MalformedSection {
                index,
                reason: "expected an object".to_string(),
            });
            let id = self.section_id(index, None);
            return SectionModel {
                id,
                title: raw.as_str().unwrap_or_default().to_string(),
                section_type: GENERIC_TYPE.to_string(),
                content: SectionContent::Fields(Vec::new()),
                is_placeholder: open,
                is_complete: !open,
            };
        };

        let id = self.section_id(index, obj.get("id").and_then(Value::as_str));
        let section_type = self.resolve_type(index, obj, warnings);
        let layout = layout_of(section_type);

        // Prefer the key matching the layout, but accept the other one.
        let (entries_key, raw_entries) = match obj.get(layout.key()) {
            Some(entries) => (Some(layout.key()), Some(entries)),
            None => match obj.get(layout.other().key()) {
                Some(entries) => (Some(layout.other().key()), Some(entries)),
                None => (None, None),
            },
        };
        let (raw_entries, entries_declared): (&[Value], bool) = match raw_entries {
            None => (&[], false),
            Some(Value::Array(entries)) => (entries, true),
            Some(_) => {
                warnings.push(NormalizationWarning::MalformedSection {
                    index,
                    reason: format!("'{}' is not an array", entries_key.unwrap_or_default()),
                });
                (&[], false)
            }
        };

        let entries_path = entries_key.map(|key| {
            let mut path = section_path.to_vec();
            path.push(PathSegment::key(key));
            path
        });
        let entries_open = entries_declared
            && entries_path.as_ref().is_some_and(|path| doc.is_open(path));

        let mut drafts: Vec<EntryDraft> = raw_entries
            .iter()
            .enumerate()
            .map(|(entry_index, raw_entry)| {
                let entry_open = entries_path.as_ref().is_some_and(|path| {
                    let mut path = path.clone();
                    path.push(PathSegment::Index(entry_index));
                    doc.is_open(&path)
                });
                EntryDraft::from_raw(raw_entry, layout, entry_open).unwrap_or_else(|| {
                    warnings.push(NormalizationWarning::MalformedEntry {
                        section: index,
                        entry: entry_index,
                    });
                    EntryDraft::pass_through(raw_entry)
                })
            })
            .collect();

        // Sketch the rest of a declared, still-growing list.
        if entries_open {
            let expected = declared_expected_count(obj)
                .or_else(|| self.expected_counts.get(section_type).copied());
            let target = match expected {
                Some(count) => count.max(drafts.len()),
                None if drafts.is_empty() => 1,
                None => drafts.len(),
            };
            drafts.resize_with(target, EntryDraft::placeholder);
        }

        let has_real_entry = drafts.iter().any(|draft| !draft.is_placeholder);
        let content = self.build_content(index, layout, drafts);

        SectionModel {
            id,
            title: obj
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            section_type: section_type.to_string(),
            content,
            is_placeholder: open && !has_real_entry,
            is_complete: !open,
        }
    }

    fn resolve_type(
        &self,
        index: usize,
        obj: &Map<String, Value>,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> &'static str {
        match obj.get("type").and_then(Value::as_str) {
            Some(declared) => self.aliases.resolve(declared).unwrap_or_else(|| {
                warnings.push(NormalizationWarning::UnknownSectionType {
                    index,
                    declared: declared.to_string(),
                });
                GENERIC_TYPE
            }),
            None if obj.contains_key("items") => "list",
            None => "info",
        }
    }

    fn build_content(
        &mut self,
        slot_index: usize,
        layout: SectionLayout,
        drafts: Vec<EntryDraft>,
    ) -> SectionContent {
        let used_ids = &mut self.used_ids;
        let slot = &mut self.slots[slot_index];
        if drafts.len() < slot.entries.ids.len() {
            slot.entries.ids.truncate(drafts.len());
        }
        let section_id = slot.id.clone();

        let mut ids = Vec::with_capacity(drafts.len());
        for (position, draft) in drafts.iter().enumerate() {
            if let Some(id) = slot.entries.ids.get(position) {
                ids.push(id.clone());
                continue;
            }
            let id = match draft.declared_id.as_deref() {
                Some(declared) if !declared.is_empty() && used_ids.insert(declared.to_string()) => {
                    declared.to_string()
                }
                _ => loop {
                    let candidate = format!("{section_id}-entry-{}", slot.entries.next_seq);
                    slot.entries.next_seq += 1;
                    if used_ids.insert(candidate.clone()) {
                        break candidate;
                    }
                },
            };
            slot.entries.ids.push(id.clone());
            ids.push(id);
        }

        match layout {
            SectionLayout::Fields => SectionContent::Fields(
                drafts
                    .into_iter()
                    .zip(ids)
                    .map(|(draft, id)| draft.into_field(id))
                    .collect(),
            ),
            SectionLayout::Items => SectionContent::Items(
                drafts
                    .into_iter()
                    .zip(ids)
                    .map(|(draft, id)| draft.into_item(id))
                    .collect(),
            ),
        }
    }

    /// Id for the section at `index`, assigned on first sight and then fixed.
    fn section_id(&mut self, index: usize, declared: Option<&str>) -> String {
        if let Some(slot) = self.slots.get(index) {
            return slot.id.clone();
        }
        let id = match declared.map(str::trim) {
            Some(declared) if !declared.is_empty() && self.used_ids.insert(declared.to_string()) => {
                declared.to_string()
            }
            _ => loop {
                let candidate = format!("section-{}", self.next_section_seq);
                self.next_section_seq += 1;
                if self.used_ids.insert(candidate.clone()) {
                    break candidate;
                }
            },
        };
        self.slots.push(SectionSlot {
            id: id.clone(),
            entries: EntryIds::default(),
        });
        id
    }

    /// Actions are taken whole, once the array has closed.
    fn take_actions(
        &mut self,
        doc: &PartialDocument,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> Option<Vec<ActionModel>> {
        let raw = doc.value.as_object()?.get(ACTIONS_KEY)?;
        if doc.is_open(&[PathSegment::key(ACTIONS_KEY)]) {
            return None;
        }
        let Value::Array(raw_actions) = raw else {
            warnings.push(NormalizationWarning::ActionsNotArray);
            return Some(Vec::new());
        };
        let mut actions = Vec::with_capacity(raw_actions.len());
        for (index, raw_action) in raw_actions.iter().enumerate() {
            let mut action = match raw_action {
                Value::Object(obj) => {
                    let mut metadata = obj.clone();
                    let label = take_string(&mut metadata, ACTION_LABEL_KEYS).unwrap_or_default();
                    let kind = take_string(&mut metadata, &["type"]);
                    let url = take_string(&mut metadata, ACTION_URL_KEYS);
                    let declared_id = take_string(&mut metadata, &["id"]);
                    ActionModel {
                        id: declared_id.unwrap_or_default(),
                        label,
                        kind,
                        url,
                        metadata,
                    }
                }
                other => ActionModel {
                    id: String::new(),
                    label: scalar_text(other),
                    kind: None,
                    url: None,
                    metadata: Map::new(),
                },
            };
            if action.id.is_empty() || !self.used_ids.insert(action.id.clone()) {
                action.id = format!("action-{index}");
                self.used_ids.insert(action.id.clone());
            }
            actions.push(action);
        }
        Some(actions)
    }
}

/// Layout-neutral entry before ids are attached.
#[derive(Debug)]
struct EntryDraft {
    declared_id: Option<String>,
    label: String,
    value: Value,
    metadata: Map<String, Value>,
    is_placeholder: bool,
}

impl EntryDraft {
    fn placeholder() -> Self {
        Self {
            declared_id: None,
            label: String::new(),
            value: Value::Null,
            metadata: Map::new(),
            is_placeholder: true,
        }
    }

    /// Build from a raw entry. `None` for shapes no layout accepts.
    fn from_raw(raw: &Value, layout: SectionLayout, open: bool) -> Option<Self> {
        match raw {
            Value::Object(obj) => {
                let mut metadata = obj.clone();
                let declared_id = take_string(&mut metadata, &["id"]);
                let label_keys = match layout {
                    SectionLayout::Fields => FIELD_LABEL_KEYS,
                    SectionLayout::Items => ITEM_TITLE_KEYS,
                };
                let label = take_string(&mut metadata, label_keys).unwrap_or_default();
                let value = take_first(&mut metadata, VALUE_KEYS);
                // An entry still streaming in stays a placeholder until its value lands.
                let is_placeholder = open && value.is_none();
                Some(Self {
                    declared_id,
                    label,
                    value: value.unwrap_or(Value::Null),
                    metadata,
                    is_placeholder,
                })
            }
            Value::String(text) if layout == SectionLayout::Items => Some(Self {
                declared_id: None,
                label: text.clone(),
                value: Value::Null,
                metadata: Map::new(),
                is_placeholder: false,
            }),
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(Self {
                declared_id: None,
                label: String::new(),
                value: raw.clone(),
                metadata: Map::new(),
                is_placeholder: false,
            }),
            Value::Null | Value::Array(_) => None,
        }
    }

    fn pass_through(raw: &Value) -> Self {
        Self {
            declared_id: None,
            label: String::new(),
            value: raw.clone(),
            metadata: Map::new(),
            is_placeholder: false,
        }
    }

    fn into_field(self, id: String) -> FieldModel {
        FieldModel {
            id,
            label: self.label,
            value: self.value,
            metadata: self.metadata,
            is_placeholder: self.is_placeholder,
        }
    }

    fn into_item(self, id: String) -> ItemModel {
        ItemModel {
            id,
            title: self.label,
            value: self.value,
            metadata: self.metadata,
            is_placeholder: self.is_placeholder,
        }
    }
}

fn declared_expected_count(obj: &Map<String, Value>) -> Option<usize> {
    EXPECTED_COUNT_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_u64))
        .and_then(|count| usize::try_from(count).ok())
}

/// Remove and return the first present key among `keys`.
fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| map.remove(*key))
}

fn take_string(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let key = keys.iter().find(|key| map.contains_key(**key))?;
    map.remove(*key).map(|value| scalar_text(&value))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partial::parse_partial;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(&NormalizerConfig::default())
    }

    fn card(normalizer: &mut Normalizer, buffer: &str) -> CardModel {
        normalizer
            .normalize(&parse_partial(buffer).unwrap())
            .card
    }

    const DOC: &str = r#"{"title":"Acme","sections":[{"title":"Info","type":"metrics","fields":[{"label":"A","value":"1"}]}]}"#;

    #[test]
    fn resolves_alias_and_marks_real_fields() {
        let card = card(&mut normalizer(), DOC);
        assert_eq!(card.title, "Acme");
        let section = &card.sections[0];
        assert_eq!(section.section_type, "analytics");
        assert_eq!(section.id, "section-0");
        assert!(section.is_complete);
        assert!(!section.is_placeholder);
        assert_eq!(section.fields()[0].label, "A");
        assert_eq!(section.fields()[0].value, json!("1"));
        assert!(!section.fields()[0].is_placeholder);
    }

    #[test]
    fn empty_document_has_no_sections() {
        let card = card(&mut normalizer(), "");
        assert_eq!(card, CardModel::default());
    }

    #[test]
    fn declared_empty_fields_get_a_placeholder() {
        let card = card(&mut normalizer(), r#"{"sections":[{"title":"Info","fields":["#);
        let section = &card.sections[0];
        assert!(section.is_placeholder);
        assert!(!section.is_complete);
        assert_eq!(section.fields().len(), 1);
        assert!(section.fields()[0].is_placeholder);
        assert_eq!(section.fields()[0].value, Value::Null);
    }

    #[test]
    fn undeclared_fields_get_no_placeholder() {
        let card = card(&mut normalizer(), r#"{"sections":[{"title":"Info""#);
        assert!(card.sections[0].fields().is_empty());
        assert!(card.sections[0].is_placeholder);
    }

    #[test]
    fn expected_count_from_document_sizes_placeholders() {
        let card = card(
            &mut normalizer(),
            r#"{"sections":[{"expectedCount":3,"fields":[{"label":"A","value":1},"#,
        );
        let fields = card.sections[0].fields();
        assert_eq!(fields.len(), 3);
        assert!(!fields[0].is_placeholder);
        assert!(fields[1].is_placeholder);
        assert!(fields[2].is_placeholder);
        assert!(!card.sections[0].is_placeholder);
    }

    #[test]
    fn expected_count_from_config_sizes_placeholders() {
        let mut config = NormalizerConfig::default();
        config.expected_counts.insert("event".to_string(), 2);
        let mut normalizer = Normalizer::new(&config);
        let card = card(&mut normalizer, r#"{"sections":[{"type":"timeline","items":["#);
        assert_eq!(card.sections[0].section_type, "event");
        assert_eq!(card.sections[0].items().len(), 2);
    }

    #[test]
    fn streaming_entry_is_placeholder_until_value_arrives() {
        let mut normalizer = normalizer();
        let partial = card(
            &mut normalizer,
            r#"{"sections":[{"fields":[{"label":"A","#,
        );
        let field = &partial.sections[0].fields()[0];
        assert_eq!(field.label, "A");
        assert!(field.is_placeholder);

        let arrived = card(
            &mut normalizer,
            r#"{"sections":[{"fields":[{"label":"A","value":"1","#,
        );
        let field = &arrived.sections[0].fields()[0];
        assert!(!field.is_placeholder);
        assert_eq!(field.id, partial.sections[0].fields()[0].id);
    }

    #[test]
    fn placeholder_id_is_inherited_by_real_entry() {
        let mut normalizer = normalizer();
        let before = card(&mut normalizer, r#"{"sections":[{"items":["#);
        let after = card(&mut normalizer, r#"{"sections":[{"items":[{"title":"x"}]}]}"#);
        assert_eq!(before.sections[0].items()[0].id, after.sections[0].items()[0].id);
        assert!(after.sections[0].is_complete);
    }

    #[test]
    fn section_ids_are_positional_and_stable() {
        let mut normalizer = normalizer();
        let one = card(&mut normalizer, r#"{"sections":[{"title":"Same"},{"title":"Sa"#);
        let two = card(
            &mut normalizer,
            r#"{"sections":[{"title":"Same"},{"title":"Same"},{"id":"third"}]}"#,
        );
        assert_eq!(one.sections[0].id, two.sections[0].id);
        assert_eq!(one.sections[1].id, two.sections[1].id);
        assert_ne!(two.sections[0].id, two.sections[1].id);
        assert_eq!(two.sections[2].id, "third");
    }

    #[test]
    fn declared_id_wins_only_at_first_sight() {
        let mut normalizer = normalizer();
        let first = card(&mut normalizer, r#"{"sections":[{"title":"A","#);
        let later = card(&mut normalizer, r#"{"sections":[{"title":"A","id":"late"}]}"#);
        assert_eq!(first.sections[0].id, "section-0");
        assert_eq!(later.sections[0].id, "section-0");
    }

    #[test]
    fn duplicate_declared_ids_are_made_unique() {
        let card = card(
            &mut normalizer(),
            r#"{"sections":[{"id":"dup"},{"id":"dup"}]}"#,
        );
        assert_eq!(card.sections[0].id, "dup");
        assert_ne!(card.sections[1].id, "dup");
    }

    #[test]
    fn vanished_section_ids_are_not_reused() {
        let mut normalizer = normalizer();
        let two = card(&mut normalizer, r#"{"sections":[{},{}]}"#);
        let one = card(&mut normalizer, r#"{"sections":[{}]}"#);
        let again = card(&mut normalizer, r#"{"sections":[{},{}]}"#);
        assert_eq!(one.sections.len(), 1);
        assert_ne!(two.sections[1].id, again.sections[1].id);
    }

    #[test]
    fn unknown_type_falls_back_to_generic_with_one_warning() {
        let mut normalizer = normalizer();
        let doc = parse_partial(r#"{"sections":[{"type":"hologram","fields":[]}]}"#).unwrap();
        let first = normalizer.normalize(&doc);
        assert_eq!(first.card.sections[0].section_type, GENERIC_TYPE);
        assert_eq!(
            first.warnings,
            vec![NormalizationWarning::UnknownSectionType {
                index: 0,
                declared: "hologram".to_string()
            }]
        );
        let second = normalizer.normalize(&doc);
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn malformed_section_is_kept() {
        let out = normalizer().normalize(&parse_partial(r#"{"sections":["oops",{}]}"#).unwrap());
        assert_eq!(out.card.sections.len(), 2);
        assert_eq!(out.card.sections[0].section_type, GENERIC_TYPE);
        assert_eq!(out.card.sections[0].title, "oops");
        assert!(matches!(
            out.warnings[0],
            NormalizationWarning::MalformedSection { index: 0, .. }
        ));
    }

    #[test]
    fn malformed_entry_passes_through() {
        let out = normalizer().normalize(
            &parse_partial(r#"{"sections":[{"fields":[[1,2],"plain"]}]}"#).unwrap(),
        );
        let fields = out.card.sections[0].fields();
        assert_eq!(fields[0].value, json!([1, 2]));
        assert_eq!(fields[1].value, json!("plain"));
        assert_eq!(
            out.warnings,
            vec![NormalizationWarning::MalformedEntry {
                section: 0,
                entry: 0
            }]
        );
    }

    #[test]
    fn type_inferred_from_items() {
        let card = card(&mut normalizer(), r#"{"sections":[{"items":["a","b"]}]}"#);
        assert_eq!(card.sections[0].section_type, "list");
        assert_eq!(card.sections[0].items()[1].title, "b");
    }

    #[test]
    fn entries_under_the_other_key_are_accepted() {
        let card = card(
            &mut normalizer(),
            r#"{"sections":[{"type":"quote","fields":[{"label":"who","value":"what"}]}]}"#,
        );
        let item = &card.sections[0].items()[0];
        assert_eq!(item.title, "who");
        assert_eq!(item.value, json!("what"));
    }

    #[test]
    fn metadata_keeps_unconsumed_keys() {
        let card = card(
            &mut normalizer(),
            r#"{"sections":[{"fields":[{"label":"A","value":1,"unit":"kg"}]}]}"#,
        );
        assert_eq!(card.sections[0].fields()[0].metadata.get("unit"), Some(&json!("kg")));
    }

    #[test]
    fn actions_appear_only_when_whole() {
        let mut normalizer = normalizer();
        let partial = card(
            &mut normalizer,
            r#"{"sections":[],"actions":[{"label":"Open","url":"https://x"},"#,
        );
        assert!(partial.actions.is_empty());
        let whole = card(
            &mut normalizer,
            r#"{"sections":[],"actions":[{"label":"Open","url":"https://x"},"Dismiss"]}"#,
        );
        assert_eq!(whole.actions.len(), 2);
        assert_eq!(whole.actions[0].url.as_deref(), Some("https://x"));
        assert_eq!(whole.actions[1].label, "Dismiss");
        assert_eq!(whole.actions[1].id, "action-1");
    }

    #[test]
    fn reset_forgets_ids() {
        let mut normalizer = normalizer();
        let _ = card(&mut normalizer, r#"{"sections":[{"id":"a"}]}"#);
        normalizer.reset();
        let card = card(&mut normalizer, r#"{"sections":[{"id":"a"}]}"#);
        assert_eq!(card.sections[0].id, "a");
    }
}
