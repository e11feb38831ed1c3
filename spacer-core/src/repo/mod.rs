//! Storage collaborators the scheduler reads from and writes through.

use crate::hierarchy::{plan_hierarchy_repair, HierarchyRepair};
use crate::timing::legacy_day_cutoff;
use crate::{
    Card, CardId, CardQueue, CollectionConfig, CoreError, Deck, DeckConfig, DeckConfigId, DeckId,
    Note, NoteId, ReviewLogEntry,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

pub mod memory;
pub mod state;

#[async_trait]
pub trait CollectionConfigStore: Send + Sync {
    async fn config(&self) -> Result<CollectionConfig, CoreError>;
    async fn save_config(&self, conf: &CollectionConfig) -> Result<(), CoreError>;

    /// Collection creation time, Unix seconds.
    async fn created_time(&self) -> Result<i64, CoreError>;

    /// Update sequence number to stamp on modified objects. Clients stamp
    /// `-1` so the next sync picks the change up; the server uses its own.
    async fn usn(&self, server: bool) -> Result<i32, CoreError>;

    /// Marks the collection as modified at `now`.
    async fn touch(&self, now: i64) -> Result<(), CoreError>;

    async fn day_cutoff(&self, now: i64) -> Result<i64, CoreError> {
        let conf = self.config().await?;
        Ok(legacy_day_cutoff(now, conf.rollover))
    }
}

#[async_trait]
pub trait DeckStore: Send + Sync {
    async fn all_decks(&self) -> Result<HashMap<DeckId, Deck>, CoreError>;
    async fn all_configs(&self) -> Result<HashMap<DeckConfigId, DeckConfig>, CoreError>;
    async fn deck_config(&self, id: DeckConfigId) -> Result<DeckConfig, CoreError>;
    async fn save_deck(&self, deck: &Deck) -> Result<(), CoreError>;

    async fn deck(&self, id: DeckId) -> Result<Deck, CoreError> {
        self.all_decks()
            .await?
            .remove(&id)
            .ok_or(CoreError::DeckNotFound(id))
    }

    /// Configuration of a normal deck; filtered decks have none.
    async fn config_for_deck(&self, id: DeckId) -> Result<DeckConfig, CoreError> {
        let deck = self.deck(id).await?;
        if deck.is_filtered() {
            return Err(CoreError::ConfigNotFound(deck.config_id));
        }
        self.deck_config(deck.config_id).await
    }

    /// Ids of every deck below `id` in the hierarchy.
    async fn child_ids(&self, id: DeckId) -> Result<Vec<DeckId>, CoreError> {
        let decks = self.all_decks().await?;
        let parent = decks.get(&id).ok_or(CoreError::DeckNotFound(id))?;
        let mut children: Vec<&Deck> = decks.values().filter(|d| d.is_descendant_of(parent)).collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children.into_iter().map(|d| d.id).collect())
    }

    /// Existing ancestors of `id`, root first.
    async fn ancestors(&self, id: DeckId) -> Result<Vec<Deck>, CoreError> {
        let mut decks = self.all_decks().await?;
        let deck = decks.get(&id).ok_or(CoreError::DeckNotFound(id))?;
        let names = deck.ancestor_names();
        let mut by_name: HashMap<String, Deck> =
            decks.drain().map(|(_, d)| (d.name.clone(), d)).collect();
        Ok(names.iter().filter_map(|n| by_name.remove(n)).collect())
    }

    async fn repair_hierarchy(&self, now: i64, usn: i32) -> Result<HierarchyRepair, CoreError> {
        let decks = self.all_decks().await?;
        let repair = plan_hierarchy_repair(&decks, now, usn);
        for deck in repair.renamed.iter().chain(repair.created.iter()) {
            self.save_deck(deck).await?;
        }
        Ok(repair)
    }
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn card(&self, id: CardId) -> Result<Card, CoreError>;
    async fn update_card(&self, card: &Card) -> Result<(), CoreError>;

    /// New cards in the deck, at most `limit`.
    async fn count_new(&self, deck_id: DeckId, limit: u32) -> Result<u32, CoreError>;

    /// Reviews due by `today` across `deck_ids`, capped at the smaller limit.
    async fn count_review(
        &self,
        deck_ids: &[DeckId],
        report_limit: u32,
        review_limit: u32,
        today: u32,
    ) -> Result<u32, CoreError>;

    /// Learning cards due before `due` plus day-learning cards due by `today`.
    async fn count_learned(&self, deck_id: DeckId, due: i64, today: u32, limit: u32) -> Result<u32, CoreError>;

    /// Intraday learning cards due before `lrn_cutoff`.
    async fn count_learning(&self, deck_ids: &[DeckId], lrn_cutoff: i64) -> Result<u32, CoreError>;

    async fn count_due_reviews(&self, deck_ids: &[DeckId], today: u32, limit: u32) -> Result<u32, CoreError>;

    /// New cards in the deck, lowest position first.
    async fn new_cards(&self, deck_id: DeckId, limit: u32) -> Result<Vec<Card>, CoreError>;

    /// Review cards due by `today`, earliest first.
    async fn review_cards(&self, deck_id: DeckId, today: u32, limit: u32) -> Result<Vec<Card>, CoreError>;

    /// Intraday learning and preview cards due before `cutoff`.
    async fn learning_cards(&self, deck_ids: &[DeckId], cutoff: i64) -> Result<Vec<Card>, CoreError>;

    async fn day_learning_cards(&self, deck_ids: &[DeckId], today: u32) -> Result<Vec<Card>, CoreError>;

    /// Other cards of the same note.
    async fn siblings(&self, note_id: NoteId, excluding: CardId) -> Result<Vec<Card>, CoreError>;

    /// Moves cards to a buried queue.
    async fn bury(&self, ids: &[CardId], queue: CardQueue, now: i64, usn: i32) -> Result<(), CoreError>;

    /// Releases every buried card. Returns how many were released.
    async fn unbury_all(&self, now: i64, usn: i32) -> Result<u32, CoreError>;

    /// Moves cards whose deck is not in `valid` to the default deck.
    async fn reassign_orphans(&self, valid: &HashSet<DeckId>, now: i64, usn: i32) -> Result<u32, CoreError>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn note(&self, id: NoteId) -> Result<Note, CoreError>;
    async fn update_note(&self, note: &Note) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ReviewLogStore: Send + Sync {
    /// Stores the entry, bumping its id past any existing one. Returns the id used.
    async fn append_review(&self, entry: &ReviewLogEntry) -> Result<i64, CoreError>;
    async fn reviews_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLogEntry>, CoreError>;
    async fn all_reviews(&self) -> Result<Vec<ReviewLogEntry>, CoreError>;
}

/// Everything a scheduler session needs from storage.
pub trait Storage: CollectionConfigStore + DeckStore + CardStore + NoteStore + ReviewLogStore {}

impl<T> Storage for T where T: CollectionConfigStore + DeckStore + CardStore + NoteStore + ReviewLogStore {}
