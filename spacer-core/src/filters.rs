//! Card predicates shared by the storage implementations.

use crate::{Card, CardQueue, DeckId};

pub fn in_decks(card: &Card, deck_ids: &[DeckId]) -> bool {
    deck_ids.contains(&card.deck_id)
}

pub fn is_new(card: &Card) -> bool {
    card.queue == CardQueue::New
}

pub fn review_due(card: &Card, today: u32) -> bool {
    card.queue == CardQueue::Review && card.due <= i64::from(today)
}

/// Intraday learning or preview card due before `cutoff` (Unix seconds).
pub fn learning_due(card: &Card, cutoff: i64) -> bool {
    matches!(card.queue, CardQueue::Learning | CardQueue::Preview) && card.due < cutoff
}

pub fn day_learning_due(card: &Card, today: u32) -> bool {
    card.queue == CardQueue::DayLearning && card.due <= i64::from(today)
}

pub fn is_buried(card: &Card) -> bool {
    card.queue.is_buried()
}

/// Cards matching `pred`, ordered by due then id, at most `limit`.
pub fn take_by_due<'a>(
    cards: impl Iterator<Item = &'a Card>,
    pred: impl Fn(&Card) -> bool,
    limit: u32,
) -> Vec<Card> {
    let mut matched: Vec<&Card> = cards.filter(|c| pred(*c)).collect();
    matched.sort_by_key(|c| (c.due, c.id));
    matched.into_iter().take(limit as usize).cloned().collect()
}

pub fn count_capped<'a>(cards: impl Iterator<Item = &'a Card>, pred: impl Fn(&Card) -> bool, limit: u32) -> u32 {
    cards.filter(|c| pred(*c)).take(limit as usize).count() as u32
}
