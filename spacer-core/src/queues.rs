//! Transient study queues and the builder that fills them from storage.
//!
//! Every queue is keyed so a card can be dropped by id (when it is buried,
//! suspended or answered) without disturbing the order of the others.

use crate::limits::{AncestorBudget, LimitKind, LimitResolver};
use crate::repo::Storage;
use crate::{CardId, CollectionConfig, CoreError, DeckId, NewCardOrder, NewSpread};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// FIFO of card ids with O(log n) removal by id.
#[derive(Clone, Debug, Default)]
pub struct OrderedQueue {
    next_seq: u64,
    order: BTreeMap<u64, CardId>,
    index: HashMap<CardId, u64>,
}

impl OrderedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id`; an id already queued keeps its place.
    pub fn push_back(&mut self, id: CardId) {
        if self.index.contains_key(&id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.index.insert(id, seq);
    }

    pub fn front(&self) -> Option<CardId> {
        self.order.values().next().copied()
    }

    pub fn pop_front(&mut self) -> Option<CardId> {
        let (_, id) = self.order.pop_first()?;
        self.index.remove(&id);
        Some(id)
    }

    pub fn remove(&mut self, id: CardId) -> bool {
        match self.index.remove(&id) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CardId> + '_ {
        self.order.values().copied()
    }
}

/// Intraday learning cards ordered by due timestamp.
#[derive(Clone, Debug, Default)]
pub struct LearningQueue {
    entries: BTreeSet<(i64, CardId)>,
    index: HashMap<CardId, i64>,
}

impl LearningQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or moves `id` to `due`.
    pub fn push(&mut self, due: i64, id: CardId) {
        if let Some(old) = self.index.insert(id, due) {
            self.entries.remove(&(old, id));
        }
        self.entries.insert((due, id));
    }

    pub fn front(&self) -> Option<(i64, CardId)> {
        self.entries.first().copied()
    }

    pub fn pop_front(&mut self) -> Option<(i64, CardId)> {
        let entry = self.entries.pop_first()?;
        self.index.remove(&entry.1);
        Some(entry)
    }

    pub fn remove(&mut self, id: CardId) -> bool {
        match self.index.remove(&id) {
            Some(due) => self.entries.remove(&(due, id)),
            None => false,
        }
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct StudyQueues {
    pub new: OrderedQueue,
    pub learning: LearningQueue,
    pub day_learning: OrderedQueue,
    pub review: OrderedQueue,
    /// A new card is shown every `new_card_modulus` answers; 0 disables interleaving.
    pub new_card_modulus: u32,
}

impl StudyQueues {
    /// Drops `id` from whichever queue holds it.
    pub fn remove(&mut self, id: CardId) -> bool {
        let a = self.new.remove(id);
        let b = self.learning.remove(id);
        let c = self.day_learning.remove(id);
        let d = self.review.remove(id);
        a || b || c || d
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.new.contains(id)
            || self.learning.contains(id)
            || self.day_learning.contains(id)
            || self.review.contains(id)
    }
}

pub fn new_card_modulus(spread: NewSpread, new_count: usize, review_count: usize) -> u32 {
    if spread != NewSpread::Distribute || new_count == 0 {
        return 0;
    }
    let modulus = ((new_count + review_count) / new_count) as u32;
    if review_count > 0 {
        modulus.max(2)
    } else {
        modulus
    }
}

fn day_rng(today: u32) -> StdRng {
    StdRng::seed_from_u64(u64::from(today))
}

/// Active decks that still exist, in configured order.
async fn active_decks(store: &dyn Storage, conf: &CollectionConfig) -> Result<Vec<DeckId>, CoreError> {
    let decks = store.all_decks().await?;
    Ok(conf
        .active_decks
        .iter()
        .copied()
        .filter(|id| decks.contains_key(id))
        .collect())
}

/// Rebuilds every queue for `today`. Learning cards due before `lrn_cutoff`
/// go to the intraday queue.
pub async fn build_queues(
    store: &dyn Storage,
    conf: &CollectionConfig,
    today: u32,
    lrn_cutoff: i64,
) -> Result<StudyQueues, CoreError> {
    let decks = store.all_decks().await?;
    let configs = store.all_configs().await?;
    let resolver = LimitResolver::new(&decks, &configs, today);
    let active = active_decks(store, conf).await?;
    let mut rng = day_rng(today);
    let mut queues = StudyQueues::default();

    let mut budget = AncestorBudget::new(&resolver, LimitKind::New);
    for &did in &active {
        let deck = resolver.deck(did)?;
        let limit = budget.available(deck)?;
        if limit == 0 {
            continue;
        }
        let mut cards = store.new_cards(did, limit).await?;
        let random = configs
            .get(&deck.config_id)
            .map(|c| c.new.order == NewCardOrder::Random)
            .unwrap_or(false);
        if random {
            cards.shuffle(&mut rng);
        }
        budget.consume(deck, cards.len() as u32);
        for card in cards {
            queues.new.push_back(card.id);
        }
    }

    let mut budget = AncestorBudget::new(&resolver, LimitKind::Review);
    let mut reviews = Vec::new();
    for &did in &active {
        let deck = resolver.deck(did)?;
        let limit = budget.available(deck)?;
        if limit == 0 {
            continue;
        }
        let cards = store.review_cards(did, today, limit).await?;
        budget.consume(deck, cards.len() as u32);
        reviews.extend(cards.into_iter().map(|c| c.id));
    }
    if decks.contains_key(&conf.current_deck) {
        let limit = resolver.review_limit(conf.current_deck)?;
        let due = store.count_due_reviews(&active, today, limit).await?;
        reviews.truncate(due as usize);
    }
    reviews.shuffle(&mut rng);
    for id in reviews {
        queues.review.push_back(id);
    }

    for card in store.learning_cards(&active, lrn_cutoff).await? {
        queues.learning.push(card.due, card.id);
    }

    let mut day_learning: Vec<CardId> = store
        .day_learning_cards(&active, today)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    day_learning.shuffle(&mut rng);
    for id in day_learning {
        queues.day_learning.push_back(id);
    }

    queues.new_card_modulus = new_card_modulus(conf.new_spread, queues.new.len(), queues.review.len());
    debug!(
        today,
        new = queues.new.len(),
        learning = queues.learning.len(),
        day_learning = queues.day_learning.len(),
        review = queues.review.len(),
        modulus = queues.new_card_modulus,
        "built study queues"
    );
    Ok(queues)
}

/// Reloads the intraday learning queue after the learning cutoff moved.
/// `exclude` is the card currently on screen.
pub async fn refill_learning(
    store: &dyn Storage,
    conf: &CollectionConfig,
    queues: &mut StudyQueues,
    lrn_cutoff: i64,
    exclude: Option<CardId>,
) -> Result<(), CoreError> {
    let active = active_decks(store, conf).await?;
    let cards = store.learning_cards(&active, lrn_cutoff).await?;
    queues.learning = LearningQueue::new();
    for card in cards.into_iter().filter(|c| Some(c.id) != exclude) {
        queues.learning.push(card.due, card.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_queue_removal_keeps_order() {
        let mut q = OrderedQueue::new();
        for id in [5, 3, 9, 1] {
            q.push_back(id);
        }
        q.push_back(3);
        assert_eq!(q.len(), 4);
        assert!(q.remove(9));
        assert!(!q.remove(9));
        assert_eq!(q.ids().collect::<Vec<_>>(), vec![5, 3, 1]);
        assert_eq!(q.pop_front(), Some(5));
        assert_eq!(q.front(), Some(3));
        assert!(!q.contains(5));
    }

    #[test]
    fn learning_queue_reorders_on_push() {
        let mut q = LearningQueue::new();
        q.push(300, 1);
        q.push(100, 2);
        q.push(200, 3);
        assert_eq!(q.front(), Some((100, 2)));
        q.push(400, 2);
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_front(), Some((200, 3)));
        assert!(q.remove(1));
        assert_eq!(q.pop_front(), Some((400, 2)));
        assert!(q.is_empty());
    }

    #[test]
    fn modulus_interleaves_new_cards() {
        assert_eq!(new_card_modulus(NewSpread::Distribute, 10, 90), 10);
        assert_eq!(new_card_modulus(NewSpread::Distribute, 20, 10), 2);
        assert_eq!(new_card_modulus(NewSpread::Distribute, 5, 0), 1);
        assert_eq!(new_card_modulus(NewSpread::Distribute, 0, 50), 0);
        assert_eq!(new_card_modulus(NewSpread::Last, 10, 90), 0);
    }

    #[test]
    fn queues_remove_across_kinds() {
        let mut queues = StudyQueues::default();
        queues.new.push_back(1);
        queues.learning.push(10, 2);
        queues.review.push_back(3);
        assert!(queues.remove(2));
        assert!(!queues.contains(2));
        assert!(queues.contains(3));
    }
}
