use super::state::CollectionState;
use super::{CardStore, CollectionConfigStore, DeckStore, NoteStore, ReviewLogStore};
use crate::{
    Card, CardId, CardQueue, CollectionConfig, CoreError, Deck, DeckConfig, DeckConfigId, DeckId, Note,
    NoteId, ReviewLogEntry,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Collection kept entirely in memory; nothing survives the process.
pub struct MemoryRepo {
    state: RwLock<CollectionState>,
    server: bool,
}

impl MemoryRepo {
    pub fn new(state: CollectionState) -> Self {
        Self {
            state: RwLock::new(state),
            server: false,
        }
    }

    /// A repo acting as the sync server: usn queries return the collection usn.
    pub fn server(state: CollectionState) -> Self {
        Self {
            state: RwLock::new(state),
            server: true,
        }
    }

    pub fn snapshot(&self) -> CollectionState {
        self.state.read().clone()
    }

    /// Direct access for seeding and inspecting the collection.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut CollectionState) -> R) -> R {
        f(&mut self.state.write())
    }
}

#[async_trait]
impl CollectionConfigStore for MemoryRepo {
    async fn config(&self) -> Result<CollectionConfig, CoreError> {
        Ok(self.state.read().config.clone())
    }

    async fn save_config(&self, conf: &CollectionConfig) -> Result<(), CoreError> {
        self.state.write().config = conf.clone();
        Ok(())
    }

    async fn created_time(&self) -> Result<i64, CoreError> {
        Ok(self.state.read().created)
    }

    async fn usn(&self, server: bool) -> Result<i32, CoreError> {
        Ok(self.state.read().usn_for(server || self.server))
    }

    async fn touch(&self, now: i64) -> Result<(), CoreError> {
        self.state.write().modified = now;
        Ok(())
    }
}

#[async_trait]
impl DeckStore for MemoryRepo {
    async fn all_decks(&self) -> Result<HashMap<DeckId, Deck>, CoreError> {
        Ok(self.state.read().decks.clone())
    }

    async fn all_configs(&self) -> Result<HashMap<DeckConfigId, DeckConfig>, CoreError> {
        Ok(self.state.read().deck_configs.clone())
    }

    async fn deck_config(&self, id: DeckConfigId) -> Result<DeckConfig, CoreError> {
        self.state.read().deck_config(id)
    }

    async fn save_deck(&self, deck: &Deck) -> Result<(), CoreError> {
        self.state.write().save_deck(deck);
        Ok(())
    }
}

#[async_trait]
impl CardStore for MemoryRepo {
    async fn card(&self, id: CardId) -> Result<Card, CoreError> {
        self.state.read().card(id)
    }

    async fn update_card(&self, card: &Card) -> Result<(), CoreError> {
        self.state.write().update_card(card)
    }

    async fn count_new(&self, deck_id: DeckId, limit: u32) -> Result<u32, CoreError> {
        Ok(self.state.read().count_new(deck_id, limit))
    }

    async fn count_review(
        &self,
        deck_ids: &[DeckId],
        report_limit: u32,
        review_limit: u32,
        today: u32,
    ) -> Result<u32, CoreError> {
        Ok(self
            .state
            .read()
            .count_review(deck_ids, report_limit, review_limit, today))
    }

    async fn count_learned(&self, deck_id: DeckId, due: i64, today: u32, limit: u32) -> Result<u32, CoreError> {
        Ok(self.state.read().count_learned(deck_id, due, today, limit))
    }

    async fn count_learning(&self, deck_ids: &[DeckId], lrn_cutoff: i64) -> Result<u32, CoreError> {
        Ok(self.state.read().count_learning(deck_ids, lrn_cutoff))
    }

    async fn count_due_reviews(&self, deck_ids: &[DeckId], today: u32, limit: u32) -> Result<u32, CoreError> {
        Ok(self.state.read().count_due_reviews(deck_ids, today, limit))
    }

    async fn new_cards(&self, deck_id: DeckId, limit: u32) -> Result<Vec<Card>, CoreError> {
        Ok(self.state.read().new_cards(deck_id, limit))
    }

    async fn review_cards(&self, deck_id: DeckId, today: u32, limit: u32) -> Result<Vec<Card>, CoreError> {
        Ok(self.state.read().review_cards(deck_id, today, limit))
    }

    async fn learning_cards(&self, deck_ids: &[DeckId], cutoff: i64) -> Result<Vec<Card>, CoreError> {
        Ok(self.state.read().learning_cards(deck_ids, cutoff))
    }

    async fn day_learning_cards(&self, deck_ids: &[DeckId], today: u32) -> Result<Vec<Card>, CoreError> {
        Ok(self.state.read().day_learning_cards(deck_ids, today))
    }

    async fn siblings(&self, note_id: NoteId, excluding: CardId) -> Result<Vec<Card>, CoreError> {
        Ok(self.state.read().siblings(note_id, excluding))
    }

    async fn bury(&self, ids: &[CardId], queue: CardQueue, now: i64, usn: i32) -> Result<(), CoreError> {
        self.state.write().bury(ids, queue, now, usn)
    }

    async fn unbury_all(&self, now: i64, usn: i32) -> Result<u32, CoreError> {
        Ok(self.state.write().unbury_all(now, usn))
    }

    async fn reassign_orphans(&self, valid: &HashSet<DeckId>, now: i64, usn: i32) -> Result<u32, CoreError> {
        Ok(self.state.write().reassign_orphans(valid, now, usn))
    }
}

#[async_trait]
impl NoteStore for MemoryRepo {
    async fn note(&self, id: NoteId) -> Result<Note, CoreError> {
        self.state.read().note(id)
    }

    async fn update_note(&self, note: &Note) -> Result<(), CoreError> {
        self.state.write().update_note(note)
    }
}

#[async_trait]
impl ReviewLogStore for MemoryRepo {
    async fn append_review(&self, entry: &ReviewLogEntry) -> Result<i64, CoreError> {
        Ok(self.state.write().append_review(entry))
    }

    async fn reviews_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLogEntry>, CoreError> {
        Ok(self.state.read().reviews_for_card(card_id))
    }

    async fn all_reviews(&self) -> Result<Vec<ReviewLogEntry>, CoreError> {
        Ok(self.state.read().revlog.clone())
    }
}
