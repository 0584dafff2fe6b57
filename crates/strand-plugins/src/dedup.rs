//! Collapse same-named candidates by runtime-type priority.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::candidate::{PluginCandidate, Provenance, RuntimeType};

/// One candidate replaced by a higher-priority one with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOverride {
    /// Shared plugin name.
    pub name: String,
    /// Provenance and runtime type of the survivor.
    pub winner: (Provenance, RuntimeType),
    /// Provenance and runtime type of the dropped candidate.
    pub loser: (Provenance, RuntimeType),
}

impl fmt::Display for DuplicateOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Duplicate plugin '{}' detected. Preferring {}/{} over {}/{}.",
            self.name, self.winner.0, self.winner.1, self.loser.0, self.loser.1
        )
    }
}

/// Result of [`dedupe_candidates`].
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// One candidate per name, in order of each name's first appearance.
    pub candidates: Vec<PluginCandidate>,
    /// Every replacement that happened, in the order it happened.
    pub overrides: Vec<DuplicateOverride>,
}

/// Keep one candidate per name.
///
/// A later candidate replaces the current holder only when its runtime type
/// has strictly higher [`priority`](RuntimeType::priority), so ties keep the
/// first seen. Each replacement is logged as a warning.
#[must_use]
pub fn dedupe_candidates(candidates: Vec<PluginCandidate>) -> Deduplicated {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out = Deduplicated::default();

    for candidate in candidates {
        let Some(&idx) = slots.get(candidate.name()) else {
            slots.insert(candidate.name().to_owned(), out.candidates.len());
            out.candidates.push(candidate);
            continue;
        };

        let Some(existing) = out.candidates.get_mut(idx) else {
            continue;
        };
        if candidate.runtime_type().priority() <= existing.runtime_type().priority() {
            continue;
        }

        let record = DuplicateOverride {
            name: candidate.name().to_owned(),
            winner: (candidate.provenance(), candidate.runtime_type()),
            loser: (existing.provenance(), existing.runtime_type()),
        };
        warn!("{record}");
        *existing = candidate;
        out.overrides.push(record);
    }

    out
}
