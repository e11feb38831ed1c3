use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use spacer_core::{
    Card, CardQueue, CardType, Clock, CollectionState, CoreError, DayCounter, Deck, DeckConfig, Ease,
    FilteredDeckOptions, FixedClock, LeechAction, MemoryRepo, Note, RevlogKind, SchedulerSession, Storage,
    FACTOR_DEFAULT, LEECH_TAG,
};
use std::sync::Arc;

fn created() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn study_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

fn collection() -> CollectionState {
    CollectionState::new(created().timestamp())
}

fn new_card(state: &mut CollectionState, id: i64, note_id: i64, deck_id: i64) {
    if !state.notes.contains_key(&note_id) {
        state.add_note(Note {
            id: note_id,
            ..Note::default()
        });
    }
    state.add_card(Card::new(id, note_id, deck_id, id));
}

fn review_card(state: &mut CollectionState, id: i64, deck_id: i64, interval: u32, due: i64) {
    new_card(state, id, id, deck_id);
    let card = state.cards.get_mut(&id).unwrap();
    card.ctype = CardType::Review;
    card.queue = CardQueue::Review;
    card.interval = interval;
    card.factor = FACTOR_DEFAULT;
    card.due = due;
}

fn session(state: CollectionState) -> (Arc<MemoryRepo>, Arc<FixedClock>, SchedulerSession) {
    let repo = Arc::new(MemoryRepo::new(state));
    let clock = Arc::new(FixedClock::new(study_time()));
    let store: Arc<dyn Storage> = repo.clone();
    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let session = SchedulerSession::with_rng(store, clock_dyn, Box::new(StdRng::seed_from_u64(7)));
    (repo, clock, session)
}

#[tokio::test]
async fn easy_new_card_skips_learning() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().expect("a new card");
    let outcome = session.answer_card(&mut card, Ease::Easy).await.unwrap();

    assert_eq!(card.ctype, CardType::Review);
    assert_eq!(card.queue, CardQueue::Review);
    assert!((3..=5).contains(&card.interval));
    assert_eq!(outcome.review.kind, RevlogKind::Learning);
    let snapshot = repo.snapshot();
    assert_eq!(snapshot.cards[&1], card);
    assert_eq!(snapshot.revlog.len(), 1);
    assert_eq!(snapshot.decks[&1].new_today, DayCounter(0, 1));
}

#[tokio::test]
async fn two_good_answers_graduate_with_one_day() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    let (_, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    session.answer_card(&mut card, Ease::Good).await.unwrap();
    assert_eq!(card.ctype, CardType::Learning);
    assert_eq!(card.left, 1001);

    session.answer_card(&mut card, Ease::Good).await.unwrap();
    assert_eq!(card.ctype, CardType::Review);
    assert_eq!(card.interval, 1);
    assert_eq!(card.due, 1);
    assert_eq!(card.factor, FACTOR_DEFAULT);
}

#[tokio::test]
async fn failed_review_enters_relearning() {
    let mut state = collection();
    review_card(&mut state, 1, 1, 10, 0);
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    let outcome = session.answer_card(&mut card, Ease::Wrong).await.unwrap();

    assert_eq!(card.ctype, CardType::Relearning);
    assert_eq!(card.queue, CardQueue::Learning);
    assert_eq!(card.lapses, 1);
    assert_eq!(card.factor, 2300);
    assert_eq!(outcome.review.kind, RevlogKind::Review);
    assert!(!outcome.leech);
    assert_eq!(repo.snapshot().decks[&1].review_today, DayCounter(0, 1));
}

#[tokio::test]
async fn leech_flagged_at_threshold_and_every_half_after() {
    let mut state = collection();
    state.deck_configs.get_mut(&1).unwrap().lapse.leech_action = LeechAction::TagOnly;
    review_card(&mut state, 1, 1, 10, 0);
    let (repo, _, mut session) = session(state);

    let mut flagged = Vec::new();
    for prior in 7..12 {
        repo.with_state(|s| {
            let card = s.cards.get_mut(&1).unwrap();
            card.ctype = CardType::Review;
            card.queue = CardQueue::Review;
            card.lapses = prior;
        });
        let mut card = repo.snapshot().cards[&1].clone();
        let outcome = session.answer_card(&mut card, Ease::Wrong).await.unwrap();
        if outcome.leech {
            flagged.push(card.lapses);
        }
    }

    assert_eq!(flagged, vec![8, 12]);
    let note = repo.snapshot().notes[&1].clone();
    assert_eq!(note.tags, vec![LEECH_TAG.to_string()]);
}

#[tokio::test]
async fn leech_suspends_by_default() {
    let mut state = collection();
    review_card(&mut state, 1, 1, 10, 0);
    state.cards.get_mut(&1).unwrap().lapses = 7;
    let (_, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    let outcome = session.answer_card(&mut card, Ease::Wrong).await.unwrap();
    assert!(outcome.leech);
    assert_eq!(card.queue, CardQueue::Suspended);
}

#[tokio::test]
async fn day_rolls_over_and_unburies() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    state.cards.get_mut(&1).unwrap().queue = CardQueue::SiblingBuried;
    let (repo, clock, mut session) = session(state);

    session.check_day().await.unwrap();
    assert_eq!(session.today(), 0);
    assert_eq!(repo.snapshot().cards[&1].queue, CardQueue::SiblingBuried);
    let first_cutoff = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap().timestamp();
    assert_eq!(session.day_cutoff(), first_cutoff);

    clock.advance(Duration::hours(25));
    session.check_day().await.unwrap();
    assert_eq!(session.today(), 1);
    assert_eq!(session.day_cutoff(), first_cutoff + 86_400);
    let snapshot = repo.snapshot();
    assert_eq!(snapshot.cards[&1].queue, CardQueue::New);
    assert_eq!(snapshot.config.last_unburied, 1);
}

#[tokio::test]
async fn new_limit_subtracts_cards_already_studied() {
    let mut state = collection();
    state.decks.get_mut(&1).unwrap().new_today = DayCounter(0, 5);
    for id in 1..=30 {
        new_card(&mut state, id, id, 1);
    }
    let (_, _, mut session) = session(state);

    let counts = session.counts().await.unwrap();
    assert_eq!(counts.new, 15);
}

#[tokio::test]
async fn parent_limit_caps_child_deck() {
    let mut state = collection();
    let mut tight = DeckConfig::new(2, "Tight");
    tight.new.per_day = 10;
    state.add_config(tight);
    state.add_deck(Deck::new(10, "Lang", 2));
    state.add_deck(Deck::new(11, "Lang::French", 1));
    for id in 1..=30 {
        new_card(&mut state, id, id, 11);
    }
    state.config.active_decks = vec![11];
    state.config.current_deck = 11;
    let (_, _, mut session) = session(state);

    assert_eq!(session.counts().await.unwrap().new, 10);
}

#[tokio::test]
async fn answering_charges_deck_and_ancestors() {
    let mut state = collection();
    state.add_deck(Deck::new(10, "Lang", 1));
    state.add_deck(Deck::new(11, "Lang::French", 1));
    new_card(&mut state, 1, 1, 11);
    state.config.active_decks = vec![10, 11];
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    session.answer_card(&mut card, Ease::Good).await.unwrap();

    let snapshot = repo.snapshot();
    assert_eq!(snapshot.decks[&10].new_today, DayCounter(0, 1));
    assert_eq!(snapshot.decks[&11].new_today, DayCounter(0, 1));
    assert_eq!(snapshot.decks[&1].new_today, DayCounter::default());
}

#[tokio::test]
async fn siblings_buried_when_enabled() {
    let mut state = collection();
    state.deck_configs.get_mut(&1).unwrap().new.bury = true;
    new_card(&mut state, 1, 1, 1);
    new_card(&mut state, 2, 1, 1);
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    assert_eq!(card.id, 1);
    let outcome = session.answer_card(&mut card, Ease::Easy).await.unwrap();

    assert_eq!(outcome.buried_siblings, vec![2]);
    assert_eq!(repo.snapshot().cards[&2].queue, CardQueue::SiblingBuried);
    assert!(session.get_card().await.unwrap().is_none());
}

#[tokio::test]
async fn siblings_left_alone_by_default() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    new_card(&mut state, 2, 1, 1);
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    let outcome = session.answer_card(&mut card, Ease::Easy).await.unwrap();
    assert!(outcome.buried_siblings.is_empty());
    assert_eq!(repo.snapshot().cards[&2].queue, CardQueue::New);
}

#[tokio::test]
async fn preview_deck_returns_card_home() {
    let mut state = collection();
    state.add_deck(Deck::new_filtered(
        5,
        "Preview",
        FilteredDeckOptions {
            resched: false,
            preview_delay: 10,
        },
    ));
    review_card(&mut state, 1, 5, 20, 0);
    {
        let card = state.cards.get_mut(&1).unwrap();
        card.original_deck_id = Some(1);
        card.original_due = Some(50);
        card.reps = 4;
    }
    state.config.active_decks = vec![5];
    let (repo, _, mut session) = session(state);

    let mut card = session.get_card().await.unwrap().unwrap();
    assert_eq!(session.answer_buttons(&card).await.unwrap(), 2);
    let outcome = session.answer_card(&mut card, Ease::Good).await.unwrap();

    assert_eq!(outcome.review.kind, RevlogKind::Cram);
    assert_eq!(card.deck_id, 1);
    assert_eq!(card.original_deck_id, None);
    assert_eq!(card.due, 50);
    assert_eq!(card.reps, 4);
    assert_eq!(card.queue, CardQueue::Review);
    assert_eq!(repo.snapshot().cards[&1], card);
}

#[tokio::test]
async fn filtered_card_without_home_is_rejected() {
    let mut state = collection();
    state.add_deck(Deck::new_filtered(5, "Cram", FilteredDeckOptions::default()));
    review_card(&mut state, 1, 5, 20, 0);
    let (repo, _, mut session) = session(state);

    let mut card = repo.snapshot().cards[&1].clone();
    let err = session.answer_card(&mut card, Ease::Good).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidDeckConfigVariant { card_id: 1, .. }));
    assert!(repo.snapshot().revlog.is_empty());
}

#[tokio::test]
async fn suspended_card_cannot_be_answered() {
    let mut state = collection();
    review_card(&mut state, 1, 1, 20, 0);
    state.cards.get_mut(&1).unwrap().queue = CardQueue::Suspended;
    let (repo, _, mut session) = session(state);

    let mut card = repo.snapshot().cards[&1].clone();
    let err = session.answer_card(&mut card, Ease::Good).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidCardState { card_id: 1, .. }));
    assert_eq!(card.queue, CardQueue::Suspended);
}

#[tokio::test]
async fn learning_comes_before_reviews_and_new() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    review_card(&mut state, 2, 1, 5, 0);
    new_card(&mut state, 3, 3, 1);
    {
        let card = state.cards.get_mut(&3).unwrap();
        card.ctype = CardType::Learning;
        card.queue = CardQueue::Learning;
        card.left = 1001;
        card.due = study_time().timestamp() - 10;
    }
    let (_, _, mut session) = session(state);

    let counts = session.counts().await.unwrap();
    assert_eq!((counts.new, counts.learning, counts.review), (1, 1, 1));

    let mut order = Vec::new();
    while let Some(card) = session.get_card().await.unwrap() {
        order.push(card.id);
    }
    assert_eq!(order, vec![3, 2, 1]);
}

#[tokio::test]
async fn suspend_and_unsuspend_restore_queue() {
    let mut state = collection();
    review_card(&mut state, 1, 1, 5, 0);
    let (repo, _, mut session) = session(state);

    assert_eq!(session.counts().await.unwrap().review, 1);
    session.suspend_cards(&[1]).await.unwrap();
    assert_eq!(session.counts().await.unwrap().review, 0);
    assert_eq!(repo.snapshot().cards[&1].queue, CardQueue::Suspended);

    session.unsuspend_cards(&[1]).await.unwrap();
    assert_eq!(repo.snapshot().cards[&1].queue, CardQueue::Review);
    assert_eq!(session.counts().await.unwrap().review, 1);
}

#[tokio::test]
async fn study_stats_repairs_collection_first() {
    let mut state = collection();
    new_card(&mut state, 1, 1, 1);
    new_card(&mut state, 2, 2, 99);
    state.add_deck(Deck::new(10, "Lang::French", 1));
    review_card(&mut state, 3, 10, 4, 0);
    let (repo, _, mut session) = session(state);

    let stats = session.deck_study_stats().await.unwrap();

    let snapshot = repo.snapshot();
    assert_eq!(snapshot.cards[&2].deck_id, 1);
    let lang = snapshot
        .decks
        .values()
        .find(|d| d.name == "Lang")
        .expect("missing parent created");
    assert_eq!(stats[&1].new, 2);
    assert_eq!(stats[&10].review, 1);
    assert_eq!(stats[&lang.id].review, 1);
    assert_eq!(stats[&lang.id].new, 0);
}
