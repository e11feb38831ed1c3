use spacer_core::{Card, CardType, Clock, Ease, Note, SchedulerSession, Storage, SystemClock};
use spacer_json::JsonStore;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn answers_survive_reopen() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("collection.json");
    let backups = dir.path().join("backups");

    let store = JsonStore::open_with(file.clone(), backups.clone(), 2).await.unwrap();
    store
        .edit(|s| {
            s.add_note(Note {
                id: 1,
                ..Note::default()
            });
            s.add_card(Card::new(1, 1, 1, 0));
        })
        .await
        .unwrap();

    let store: Arc<dyn Storage> = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut session = SchedulerSession::new(store, clock);
    let mut card = session.get_card().await.unwrap().expect("new card queued");
    session.answer_card(&mut card, Ease::Easy).await.unwrap();
    drop(session);

    let reopened = JsonStore::open_with(file, backups.clone(), 2).await.unwrap();
    let state = reopened.snapshot();
    assert_eq!(state.cards[&1].ctype, CardType::Review);
    assert_eq!(state.revlog.len(), 1);
    assert_eq!(state.decks[&1].new_today.1, 1);
    let kept = std::fs::read_dir(&backups).unwrap().count();
    assert!(kept <= 2);
}
