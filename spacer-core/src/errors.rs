use crate::{CardId, CardQueue, CardType, DeckConfigId, DeckId, NoteId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("deck config {0} not found")]
    ConfigNotFound(DeckConfigId),
    #[error("deck {0} not found")]
    DeckNotFound(DeckId),
    #[error("card {0} not found")]
    CardNotFound(CardId),
    #[error("note {0} not found")]
    NoteNotFound(NoteId),
    /// The deck a card schedules against has no learn/lapse configuration
    /// (e.g. its home deck is itself filtered).
    #[error("deck {deck_id} has no learning configuration for card {card_id}")]
    InvalidDeckConfigVariant { deck_id: DeckId, card_id: CardId },
    #[error("card {card_id} is in an invalid state: type {ctype:?}, queue {queue:?}")]
    InvalidCardState {
        card_id: CardId,
        ctype: CardType,
        queue: CardQueue,
    },
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }
}
