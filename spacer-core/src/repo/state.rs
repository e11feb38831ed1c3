//! Whole-collection image shared by the in-memory and file-backed stores.

use crate::filters::{
    count_capped, day_learning_due, in_decks, is_buried, is_new, learning_due, review_due, take_by_due,
};
use crate::{
    Card, CardId, CardQueue, CollectionConfig, CoreError, Deck, DeckConfig, DeckConfigId, DeckId, Note,
    NoteId, ReviewLogEntry, DEFAULT_DECK_CONFIG_ID, DEFAULT_DECK_ID,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CollectionState {
    /// Creation time, Unix seconds.
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub usn: i32,
    #[serde(default)]
    pub config: CollectionConfig,
    #[serde(default)]
    pub decks: HashMap<DeckId, Deck>,
    #[serde(default)]
    pub deck_configs: HashMap<DeckConfigId, DeckConfig>,
    #[serde(default)]
    pub cards: BTreeMap<CardId, Card>,
    #[serde(default)]
    pub notes: BTreeMap<NoteId, Note>,
    #[serde(default)]
    pub revlog: Vec<ReviewLogEntry>,
}

impl CollectionState {
    /// Empty collection holding the default deck and its configuration.
    pub fn new(created: i64) -> Self {
        let mut decks = HashMap::new();
        decks.insert(DEFAULT_DECK_ID, Deck::new(DEFAULT_DECK_ID, "Default", DEFAULT_DECK_CONFIG_ID));
        let mut deck_configs = HashMap::new();
        deck_configs.insert(DEFAULT_DECK_CONFIG_ID, DeckConfig::default());
        Self {
            created,
            modified: created,
            usn: 0,
            config: CollectionConfig::default(),
            decks,
            deck_configs,
            cards: BTreeMap::new(),
            notes: BTreeMap::new(),
            revlog: Vec::new(),
        }
    }

    pub fn add_deck(&mut self, deck: Deck) {
        self.decks.insert(deck.id, deck);
    }

    pub fn add_config(&mut self, conf: DeckConfig) {
        self.deck_configs.insert(conf.id, conf);
    }

    pub fn add_note(&mut self, note: Note) {
        self.notes.insert(note.id, note);
    }

    pub fn add_card(&mut self, card: Card) {
        self.cards.insert(card.id, card);
    }

    pub fn usn_for(&self, server: bool) -> i32 {
        if server {
            self.usn
        } else {
            -1
        }
    }

    pub fn deck_config(&self, id: DeckConfigId) -> Result<DeckConfig, CoreError> {
        self.deck_configs.get(&id).cloned().ok_or(CoreError::ConfigNotFound(id))
    }

    pub fn save_deck(&mut self, deck: &Deck) {
        self.decks.insert(deck.id, deck.clone());
    }

    pub fn card(&self, id: CardId) -> Result<Card, CoreError> {
        self.cards.get(&id).cloned().ok_or(CoreError::CardNotFound(id))
    }

    pub fn update_card(&mut self, card: &Card) -> Result<(), CoreError> {
        let slot = self.cards.get_mut(&card.id).ok_or(CoreError::CardNotFound(card.id))?;
        *slot = card.clone();
        Ok(())
    }

    pub fn count_new(&self, deck_id: DeckId, limit: u32) -> u32 {
        count_capped(self.cards.values(), |c| c.deck_id == deck_id && is_new(c), limit)
    }

    pub fn count_review(&self, deck_ids: &[DeckId], report_limit: u32, review_limit: u32, today: u32) -> u32 {
        self.count_due_reviews(deck_ids, today, report_limit.min(review_limit))
    }

    pub fn count_due_reviews(&self, deck_ids: &[DeckId], today: u32, limit: u32) -> u32 {
        count_capped(
            self.cards.values(),
            |c| in_decks(c, deck_ids) && review_due(c, today),
            limit,
        )
    }

    pub fn count_learned(&self, deck_id: DeckId, due: i64, today: u32, limit: u32) -> u32 {
        let intraday = count_capped(
            self.cards.values(),
            |c| c.deck_id == deck_id && c.queue == CardQueue::Learning && c.due < due,
            limit,
        );
        let interday = count_capped(
            self.cards.values(),
            |c| c.deck_id == deck_id && day_learning_due(c, today),
            limit,
        );
        intraday + interday
    }

    pub fn count_learning(&self, deck_ids: &[DeckId], lrn_cutoff: i64) -> u32 {
        count_capped(
            self.cards.values(),
            |c| in_decks(c, deck_ids) && learning_due(c, lrn_cutoff),
            u32::MAX,
        )
    }

    pub fn new_cards(&self, deck_id: DeckId, limit: u32) -> Vec<Card> {
        take_by_due(self.cards.values(), |c| c.deck_id == deck_id && is_new(c), limit)
    }

    pub fn review_cards(&self, deck_id: DeckId, today: u32, limit: u32) -> Vec<Card> {
        take_by_due(
            self.cards.values(),
            |c| c.deck_id == deck_id && review_due(c, today),
            limit,
        )
    }

    pub fn learning_cards(&self, deck_ids: &[DeckId], cutoff: i64) -> Vec<Card> {
        take_by_due(
            self.cards.values(),
            |c| in_decks(c, deck_ids) && learning_due(c, cutoff),
            u32::MAX,
        )
    }

    pub fn day_learning_cards(&self, deck_ids: &[DeckId], today: u32) -> Vec<Card> {
        take_by_due(
            self.cards.values(),
            |c| in_decks(c, deck_ids) && day_learning_due(c, today),
            u32::MAX,
        )
    }

    pub fn siblings(&self, note_id: NoteId, excluding: CardId) -> Vec<Card> {
        self.cards
            .values()
            .filter(|c| c.note_id == note_id && c.id != excluding)
            .cloned()
            .collect()
    }

    pub fn bury(&mut self, ids: &[CardId], queue: CardQueue, now: i64, usn: i32) -> Result<(), CoreError> {
        if !queue.is_buried() {
            return Err(CoreError::Invalid("bury target must be a buried queue"));
        }
        for id in ids {
            let card = self.cards.get_mut(id).ok_or(CoreError::CardNotFound(*id))?;
            card.queue = queue;
            card.mtime = now;
            card.usn = usn;
        }
        Ok(())
    }

    pub fn unbury_all(&mut self, now: i64, usn: i32) -> u32 {
        let mut released = 0;
        for card in self.cards.values_mut().filter(|c| is_buried(c)) {
            card.restore_queue();
            card.mtime = now;
            card.usn = usn;
            released += 1;
        }
        released
    }

    pub fn reassign_orphans(&mut self, valid: &HashSet<DeckId>, now: i64, usn: i32) -> u32 {
        let mut moved = 0;
        for card in self.cards.values_mut().filter(|c| !valid.contains(&c.deck_id)) {
            card.deck_id = DEFAULT_DECK_ID;
            card.mtime = now;
            card.usn = usn;
            moved += 1;
        }
        moved
    }

    pub fn note(&self, id: NoteId) -> Result<Note, CoreError> {
        self.notes.get(&id).cloned().ok_or(CoreError::NoteNotFound(id))
    }

    pub fn update_note(&mut self, note: &Note) -> Result<(), CoreError> {
        let slot = self.notes.get_mut(&note.id).ok_or(CoreError::NoteNotFound(note.id))?;
        *slot = note.clone();
        Ok(())
    }

    pub fn append_review(&mut self, entry: &ReviewLogEntry) -> i64 {
        let mut entry = entry.clone();
        let last = self.revlog.iter().map(|e| e.id).max().unwrap_or(i64::MIN);
        if entry.id <= last {
            entry.id = last + 1;
        }
        let id = entry.id;
        self.revlog.push(entry);
        id
    }

    pub fn reviews_for_card(&self, card_id: CardId) -> Vec<ReviewLogEntry> {
        self.revlog.iter().filter(|e| e.card_id == card_id).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardType, Ease, Interval, RevlogKind};

    fn entry(id: i64) -> ReviewLogEntry {
        ReviewLogEntry {
            id,
            card_id: 7,
            usn: -1,
            ease: Ease::Good,
            interval: Interval::Days(1),
            last_interval: Interval::Seconds(600),
            factor: 2500,
            taken_ms: 1000,
            kind: RevlogKind::Learning,
        }
    }

    #[test]
    fn revlog_ids_stay_unique() {
        let mut state = CollectionState::new(0);
        assert_eq!(state.append_review(&entry(500)), 500);
        assert_eq!(state.append_review(&entry(500)), 501);
        assert_eq!(state.append_review(&entry(400)), 502);
        assert_eq!(state.reviews_for_card(7).len(), 3);
    }

    #[test]
    fn orphans_move_to_default_deck() {
        let mut state = CollectionState::new(0);
        state.add_card(Card::new(1, 1, 1, 0));
        state.add_card(Card::new(2, 1, 99, 1));
        let valid: HashSet<DeckId> = state.decks.keys().copied().collect();
        assert_eq!(state.reassign_orphans(&valid, 10, -1), 1);
        assert_eq!(state.cards[&2].deck_id, DEFAULT_DECK_ID);
        assert_eq!(state.cards[&2].usn, -1);
    }

    #[test]
    fn unbury_restores_queue_from_type() {
        let mut state = CollectionState::new(0);
        let mut review = Card::new(1, 1, 1, 0);
        review.ctype = CardType::Review;
        review.queue = CardQueue::Review;
        state.add_card(review);
        state.add_card(Card::new(2, 1, 1, 1));
        state.bury(&[1, 2], CardQueue::SiblingBuried, 5, -1).unwrap();
        assert!(state.bury(&[1], CardQueue::Suspended, 5, -1).is_err());
        assert_eq!(state.unbury_all(6, -1), 2);
        assert_eq!(state.cards[&1].queue, CardQueue::Review);
        assert_eq!(state.cards[&2].queue, CardQueue::New);
    }

    #[test]
    fn image_round_trips_through_json() {
        let mut state = CollectionState::new(1_700_000_000);
        state.add_card(Card::new(1, 1, 1, 0));
        let json = serde_json::to_string(&state).unwrap();
        let back: CollectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
