//! Daily new/review quotas, bounded by every ancestor deck.

use crate::{CoreError, Deck, DeckConfig, DeckConfigId, DeckId};
use std::collections::HashMap;

/// Quota reported for filtered decks, which bypass daily limits.
pub const DYN_REPORT_LIMIT: u32 = 99_999;
/// Upper bound on counts shown to the user.
pub const REPORT_LIMIT: u32 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitKind {
    New,
    Review,
}

pub struct LimitResolver<'a> {
    decks: &'a HashMap<DeckId, Deck>,
    by_name: HashMap<&'a str, &'a Deck>,
    configs: &'a HashMap<DeckConfigId, DeckConfig>,
    today: u32,
}

impl<'a> LimitResolver<'a> {
    pub fn new(
        decks: &'a HashMap<DeckId, Deck>,
        configs: &'a HashMap<DeckConfigId, DeckConfig>,
        today: u32,
    ) -> Self {
        let by_name = decks.values().map(|d| (d.name.as_str(), d)).collect();
        Self {
            decks,
            by_name,
            configs,
            today,
        }
    }

    pub fn deck(&self, id: DeckId) -> Result<&'a Deck, CoreError> {
        self.decks.get(&id).ok_or(CoreError::DeckNotFound(id))
    }

    /// Existing ancestors of `deck`, root first.
    pub fn ancestors(&self, deck: &Deck) -> Vec<&'a Deck> {
        deck.ancestor_names()
            .iter()
            .filter_map(|name| self.by_name.get(name.as_str()).copied())
            .collect()
    }

    /// Remaining quota of the deck alone, ignoring its ancestors.
    pub fn own_limit(&self, deck: &Deck, kind: LimitKind) -> Result<u32, CoreError> {
        if deck.is_filtered() {
            return Ok(DYN_REPORT_LIMIT);
        }
        let conf = self
            .configs
            .get(&deck.config_id)
            .ok_or(CoreError::ConfigNotFound(deck.config_id))?;
        let (per_day, used) = match kind {
            LimitKind::New => (conf.new.per_day, deck.new_today.used_on(self.today)),
            LimitKind::Review => (conf.rev.per_day, deck.review_today.used_on(self.today)),
        };
        Ok(per_day.saturating_sub(used))
    }

    /// Remaining quota of the deck, never above any ancestor's remaining quota.
    pub fn limit(&self, deck_id: DeckId, kind: LimitKind) -> Result<u32, CoreError> {
        let deck = self.deck(deck_id)?;
        let mut limit = self.own_limit(deck, kind)?;
        for ancestor in self.ancestors(deck) {
            limit = limit.min(self.own_limit(ancestor, kind)?);
        }
        Ok(limit)
    }

    pub fn new_limit(&self, deck_id: DeckId) -> Result<u32, CoreError> {
        self.limit(deck_id, LimitKind::New)
    }

    pub fn review_limit(&self, deck_id: DeckId) -> Result<u32, CoreError> {
        self.limit(deck_id, LimitKind::Review)
    }
}

/// Running per-deck budget used while filling queues across several decks, so
/// children together never take more than a parent allows.
pub struct AncestorBudget<'r, 'a> {
    resolver: &'r LimitResolver<'a>,
    kind: LimitKind,
    remaining: HashMap<DeckId, u32>,
}

impl<'r, 'a> AncestorBudget<'r, 'a> {
    pub fn new(resolver: &'r LimitResolver<'a>, kind: LimitKind) -> Self {
        Self {
            resolver,
            kind,
            remaining: HashMap::new(),
        }
    }

    fn remaining_for(&mut self, deck: &Deck) -> Result<u32, CoreError> {
        if let Some(left) = self.remaining.get(&deck.id) {
            return Ok(*left);
        }
        let own = self.resolver.own_limit(deck, self.kind)?;
        self.remaining.insert(deck.id, own);
        Ok(own)
    }

    /// How many cards `deck` may still take.
    pub fn available(&mut self, deck: &Deck) -> Result<u32, CoreError> {
        let mut limit = self.remaining_for(deck)?;
        for ancestor in self.resolver.ancestors(deck) {
            limit = limit.min(self.remaining_for(ancestor)?);
        }
        Ok(limit)
    }

    /// Charges `taken` cards to the deck and all its ancestors.
    pub fn consume(&mut self, deck: &Deck, taken: u32) {
        let ancestors = self.resolver.ancestors(deck);
        for id in ancestors.iter().map(|d| d.id).chain(std::iter::once(deck.id)) {
            if let Some(left) = self.remaining.get_mut(&id) {
                *left = left.saturating_sub(taken);
            }
        }
    }
}
