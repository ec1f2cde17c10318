use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

/// Fallback type for sections whose declared type resolves to nothing known.
pub const GENERIC_TYPE: &str = "generic";

/// Which collection a section type renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    Fields,
    Items,
}

impl SectionLayout {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            SectionLayout::Fields => "fields",
            SectionLayout::Items => "items",
        }
    }

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            SectionLayout::Fields => SectionLayout::Items,
            SectionLayout::Items => SectionLayout::Fields,
        }
    }
}

const CANONICAL_TYPES: &[(&str, SectionLayout)] = &[
    ("info", SectionLayout::Fields),
    ("analytics", SectionLayout::Fields),
    ("contact", SectionLayout::Fields),
    ("status", SectionLayout::Fields),
    ("progress", SectionLayout::Fields),
    ("list", SectionLayout::Items),
    ("event", SectionLayout::Items),
    ("map", SectionLayout::Items),
    ("quotation", SectionLayout::Items),
    ("gallery", SectionLayout::Items),
    (GENERIC_TYPE, SectionLayout::Fields),
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("metrics", "analytics"),
    ("stats", "analytics"),
    ("statistics", "analytics"),
    ("kpi", "analytics"),
    ("timeline", "event"),
    ("events", "event"),
    ("schedule", "event"),
    ("table", "list"),
    ("items", "list"),
    ("locations", "map"),
    ("location", "map"),
    ("places", "map"),
    ("quote", "quotation"),
    ("quotes", "quotation"),
    ("testimonial", "quotation"),
    ("details", "info"),
    ("properties", "info"),
    ("fields", "info"),
    ("people", "contact"),
    ("contacts", "contact"),
    ("images", "gallery"),
    ("photos", "gallery"),
];

/// Look up the canonical spelling of `name`, if it is a canonical type.
#[must_use]
pub fn canonical_type(name: &str) -> Option<&'static str> {
    CANONICAL_TYPES
        .iter()
        .find(|(canonical, _)| canonical.eq_ignore_ascii_case(name))
        .map(|(canonical, _)| *canonical)
}

/// Layout of a canonical type. Unknown names render as fields.
#[must_use]
pub fn layout_of(canonical: &str) -> SectionLayout {
    CANONICAL_TYPES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map_or(SectionLayout::Fields, |(_, layout)| *layout)
}

/// Static alias → canonical type lookup.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: FxHashMap<String, &'static str>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTable {
    #[must_use]
    pub fn builtin() -> Self {
        let mut aliases = FxHashMap::default();
        for (alias, target) in BUILTIN_ALIASES {
            if let Some(canonical) = canonical_type(target) {
                aliases.insert((*alias).to_string(), canonical);
            }
        }
        Self { aliases }
    }

    /// Builtin table with `extra` entries layered on top. Entries whose target
    /// is not canonical are skipped; configuration validation rejects them
    /// before they get here.
    #[must_use]
    pub fn with_overrides(extra: &BTreeMap<String, String>) -> Self {
        let mut table = Self::builtin();
        for (alias, target) in extra {
            match canonical_type(target.trim()) {
                Some(canonical) => {
                    table
                        .aliases
                        .insert(alias.trim().to_ascii_lowercase(), canonical);
                }
                None => {
                    tracing::warn!("ignoring alias '{alias}': '{target}' is not a canonical type");
                }
            }
        }
        table
    }

    /// Resolve a declared type to its canonical name.
    #[must_use]
    pub fn resolve(&self, declared: &str) -> Option<&'static str> {
        let declared = declared.trim();
        if let Some(canonical) = canonical_type(declared) {
            return Some(canonical);
        }
        self.aliases
            .get(declared.to_ascii_lowercase().as_str())
            .copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_aliases_resolve() {
        let table = AliasTable::builtin();
        assert_eq!(table.resolve("metrics"), Some("analytics"));
        assert_eq!(table.resolve("timeline"), Some("event"));
        assert_eq!(table.resolve("table"), Some("list"));
        assert_eq!(table.resolve("locations"), Some("map"));
        assert_eq!(table.resolve("quote"), Some("quotation"));
        assert_eq!(table.len(), BUILTIN_ALIASES.len());
    }

    #[test]
    fn canonical_names_resolve_to_themselves() {
        let table = AliasTable::builtin();
        assert_eq!(table.resolve("Analytics"), Some("analytics"));
        assert_eq!(table.resolve(" list "), Some("list"));
    }

    #[test]
    fn unknown_type_is_unresolved() {
        assert_eq!(AliasTable::builtin().resolve("hologram"), None);
    }

    #[test]
    fn overrides_extend_and_replace() {
        let mut extra = BTreeMap::new();
        extra.insert("Hologram".to_string(), "gallery".to_string());
        extra.insert("table".to_string(), "info".to_string());
        extra.insert("bogus".to_string(), "nowhere".to_string());
        let table = AliasTable::with_overrides(&extra);
        assert_eq!(table.resolve("hologram"), Some("gallery"));
        assert_eq!(table.resolve("table"), Some("info"));
        assert_eq!(table.resolve("bogus"), None);
    }

    #[test]
    fn layouts() {
        assert_eq!(layout_of("analytics"), SectionLayout::Fields);
        assert_eq!(layout_of("event"), SectionLayout::Items);
        assert_eq!(layout_of(GENERIC_TYPE), SectionLayout::Fields);
        assert_eq!(SectionLayout::Items.key(), "items");
        assert_eq!(SectionLayout::Fields.other(), SectionLayout::Items);
    }
}
