//! Deck hierarchy integrity: blank path components, duplicate names and
//! missing parents.

use crate::{Deck, DeckId, DECK_SEPARATOR, DEFAULT_DECK_CONFIG_ID, DEFAULT_DECK_ID};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HierarchyRepair {
    /// Existing decks whose name changed.
    pub renamed: Vec<Deck>,
    /// Decks that had to be created (default deck, missing parents).
    pub created: Vec<Deck>,
}

impl HierarchyRepair {
    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty() && self.created.is_empty()
    }
}

fn fix_components(name: &str, now: i64) -> String {
    name.split(DECK_SEPARATOR)
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                format!("recovered{now}")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(DECK_SEPARATOR)
}

fn unique_name(base: String, taken: &HashSet<String>, now: i64) -> String {
    if !taken.contains(&base.to_lowercase()) {
        return base;
    }
    let mut candidate = format!("{base}{now}");
    let mut n = 1;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = format!("{base}{now}-{n}");
        n += 1;
    }
    candidate
}

/// Works out the changes that make the deck set a consistent hierarchy.
/// Decks are visited by name so that parents settle before their children.
pub fn plan_hierarchy_repair(decks: &HashMap<DeckId, Deck>, now: i64, usn: i32) -> HierarchyRepair {
    let mut repair = HierarchyRepair::default();
    let mut next_id = decks.keys().copied().max().unwrap_or(0).max(DEFAULT_DECK_ID) + 1;

    let mut ordered: Vec<&Deck> = decks.values().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut taken: HashSet<String> = HashSet::new();
    let mut settled: Vec<Deck> = Vec::with_capacity(ordered.len());

    if !decks.contains_key(&DEFAULT_DECK_ID) {
        let mut default = Deck::new(DEFAULT_DECK_ID, "Default", DEFAULT_DECK_CONFIG_ID);
        default.name = unique_name(default.name, &decks.values().map(|d| d.name.to_lowercase()).collect::<HashSet<_>>(), now);
        default.mtime = now;
        default.usn = usn;
        warn!(name = %default.name, "default deck missing; recreated");
        taken.insert(default.name.to_lowercase());
        repair.created.push(default);
    }

    for deck in ordered {
        let name = unique_name(fix_components(&deck.name, now), &taken, now);
        taken.insert(name.to_lowercase());
        if name != deck.name {
            warn!(deck_id = deck.id, from = %deck.name, to = %name, "renamed deck");
            let mut fixed = deck.clone();
            fixed.name = name;
            fixed.mtime = now;
            fixed.usn = usn;
            repair.renamed.push(fixed.clone());
            settled.push(fixed);
        } else {
            settled.push(deck.clone());
        }
    }

    for deck in &settled {
        for ancestor in deck.ancestor_names() {
            if taken.insert(ancestor.to_lowercase()) {
                warn!(name = %ancestor, "created missing parent deck");
                let mut parent = Deck::new(next_id, ancestor, DEFAULT_DECK_CONFIG_ID);
                parent.mtime = now;
                parent.usn = usn;
                repair.created.push(parent);
                next_id += 1;
            }
        }
    }

    repair
}
