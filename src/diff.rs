use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::card::{CardModel, SectionModel};

/// How a snapshot differs from the previously emitted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Sections were added, removed or re-identified.
    Structural,
    /// Only values inside existing sections moved.
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDiff {
    pub change_type: ChangeType,
    /// Sections whose `is_complete` flipped to true since the last commit.
    pub completed_sections: SmallVec<[usize; 4]>,
    /// Sections whose content differs from the last commit.
    pub changed_sections: SmallVec<[usize; 8]>,
    /// True when the snapshot equals the last committed one.
    pub unchanged: bool,
}

/// Compares successive card snapshots of one session.
///
/// `compare` inspects a candidate snapshot; `commit` records it once it has
/// actually been emitted, so skipped snapshots fold into the next diff.
#[derive(Debug, Default)]
pub struct DiffDetector {
    previous: Option<Arc<CardModel>>,
    completed_ids: FxHashSet<String>,
}

impl DiffDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.completed_ids.clear();
    }

    #[must_use]
    pub fn previous(&self) -> Option<&Arc<CardModel>> {
        self.previous.as_ref()
    }

    /// Diff `next` against the last committed snapshot.
    ///
    /// Also enforces the completion rules on `next`: a section that was
    /// committed complete stays complete, and a section still holding
    /// placeholder entries is never complete.
    pub fn compare(&self, next: &mut CardModel) -> CardDiff {
        for section in &mut next.sections {
            if self.completed_ids.contains(&section.id) {
                section.is_complete = true;
            } else if section.is_complete && !is_settled(section) {
                section.is_complete = false;
            }
        }

        let prev_sections: &[SectionModel] = match self.previous.as_deref() {
            Some(card) => &card.sections,
            None => &[],
        };

        let reidentified = prev_sections
            .iter()
            .zip(next.sections.iter())
            .any(|(before, after)| before.id != after.id);
        let change_type = if self.previous.is_none() {
            if next.sections.is_empty() {
                ChangeType::Content
            } else {
                ChangeType::Structural
            }
        } else if prev_sections.len() != next.sections.len() || reidentified {
            ChangeType::Structural
        } else {
            ChangeType::Content
        };

        let mut completed_sections = SmallVec::new();
        let mut changed_sections = SmallVec::new();
        for (index, section) in next.sections.iter().enumerate() {
            let before = prev_sections.get(index).filter(|prev| prev.id == section.id);
            if section.is_complete && !before.is_some_and(|prev| prev.is_complete) {
                completed_sections.push(index);
            }
            if before != Some(section) {
                changed_sections.push(index);
            }
        }

        let unchanged = self
            .previous
            .as_deref()
            .is_some_and(|prev| prev == &*next);

        CardDiff {
            change_type,
            completed_sections,
            changed_sections,
            unchanged,
        }
    }

    /// Record `snapshot` as emitted.
    pub fn commit(&mut self, snapshot: Arc<CardModel>) {
        for section in &snapshot.sections {
            if section.is_complete {
                self.completed_ids.insert(section.id.clone());
            }
        }
        self.previous = Some(snapshot);
    }
}

/// Every entry present is real data.
fn is_settled(section: &SectionModel) -> bool {
    section.real_entry_count() == section.entry_count()
}
