//! Collection persisted as a single JSON file. Every write replaces the file
//! atomically and drops a timestamped copy into the backup directory.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use spacer_core::repo::{CardStore, CollectionConfigStore, DeckStore, NoteStore, ReviewLogStore};
use spacer_core::{
    Card, CardId, CardQueue, CollectionConfig, CollectionState, CoreError, Deck, DeckConfig, DeckConfigId,
    DeckId, Note, NoteId, ReviewLogEntry,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

pub mod paths;

const FILE_VERSION: u32 = 1;
pub const DEFAULT_MAX_BACKUPS: usize = 10;

#[derive(Serialize, Deserialize)]
struct FileImage {
    version: u32,
    collection: CollectionState,
}

pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    server: bool,
    state: RwLock<CollectionState>,
    writer: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, DEFAULT_MAX_BACKUPS).await
    }

    /// Opens `path`, creating an empty collection there if it does not exist.
    pub async fn open_with(path: PathBuf, backups_dir: PathBuf, max_backups: usize) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let max_backups = max_backups.max(1);
        let state = load_or_init(&path, &backups_dir, max_backups).await?;
        info!(path = %path.display(), cards = state.cards.len(), decks = state.decks.len(), "opened collection");
        Ok(Self {
            path,
            backups_dir,
            max_backups,
            server: false,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Stamps changes with the collection usn instead of `-1`.
    pub fn server_mode(mut self, server: bool) -> Self {
        self.server = server;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> CollectionState {
        self.state.read().clone()
    }

    /// Applies `f` to the collection and writes it out. Readers keep seeing the
    /// previous collection until the file has been replaced.
    pub async fn edit<R, F>(&self, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut CollectionState) -> R + Send,
        R: Send,
    {
        self.try_edit(|s| Ok(f(s))).await
    }

    /// Like [`edit`](Self::edit), but nothing is written when `f` fails.
    async fn try_edit<R, F>(&self, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut CollectionState) -> Result<R, CoreError> + Send,
        R: Send,
    {
        self.commit(|s| f(s).map(|out| (out, true))).await
    }

    /// Runs `f` on a copy of the collection. When `f` reports a change the copy
    /// is written and then installed; a failed write leaves memory untouched.
    async fn commit<R, F>(&self, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut CollectionState) -> Result<(R, bool), CoreError> + Send,
        R: Send,
    {
        let _writing = self.writer.lock().await;
        let mut next = self.state.read().clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            let saved = self.save(next).await?;
            *self.state.write() = saved;
        }
        Ok(out)
    }

    async fn save(&self, collection: CollectionState) -> Result<CollectionState, CoreError> {
        let image = FileImage {
            version: FILE_VERSION,
            collection,
        };
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;

        let image = task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &image).map(|()| image))
            .await
            .map_err(CoreError::storage)?
            .map_err(CoreError::storage)?;
        debug!(path = %self.path.display(), "collection saved");
        Ok(image.collection)
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(CoreError::storage)
}

async fn load_or_init(path: &Path, backups_dir: &Path, keep: usize) -> Result<CollectionState, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let image = task::spawn_blocking(move || {
            let bytes = fs::read(&p)?;
            let image: FileImage = serde_json::from_slice(&bytes)?;
            Ok::<FileImage, io::Error>(image)
        })
        .await
        .map_err(CoreError::storage)?
        .map_err(CoreError::storage)?;
        if image.version != FILE_VERSION {
            return Err(CoreError::Storage(format!(
                "unsupported collection file version {}",
                image.version
            )));
        }
        Ok(image.collection)
    } else {
        let image = FileImage {
            version: FILE_VERSION,
            collection: CollectionState::new(Utc::now().timestamp()),
        };
        write_with_backup(path, backups_dir, keep, &image).map_err(CoreError::storage)?;
        info!(path = %path.display(), "created empty collection");
        Ok(image.collection)
    }
}

fn write_with_backup(path: &Path, backups_dir: &Path, max_backups: usize, image: &FileImage) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(backups_dir)?;

    let json = serde_json::to_vec_pretty(image)?;
    persist_atomically(path, &json)?;

    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let backup_path = backups_dir.join(format!("spacer-{ts}.json"));
    persist_atomically(&backup_path, &json)?;

    rotate_backups(backups_dir, max_backups)
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    // rename over an existing file fails on some platforms
    let _ = fs::remove_file(path);
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn rotate_backups(dir: &Path, keep: usize) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort_by_key(|e| (e.metadata().and_then(|m| m.modified()).ok(), e.file_name()));
    if entries.len() > keep {
        for e in &entries[..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

#[async_trait]
impl CollectionConfigStore for JsonStore {
    async fn config(&self) -> Result<CollectionConfig, CoreError> {
        Ok(self.state.read().config.clone())
    }

    async fn save_config(&self, conf: &CollectionConfig) -> Result<(), CoreError> {
        self.edit(|s| s.config = conf.clone()).await
    }

    async fn created_time(&self) -> Result<i64, CoreError> {
        Ok(self.state.read().created)
    }

    async fn usn(&self, server: bool) -> Result<i32, CoreError> {
        Ok(self.state.read().usn_for(server || self.server))
    }

    async fn touch(&self, now: i64) -> Result<(), CoreError> {
        self.edit(|s| s.modified = now).await
    }
}

#[async_trait]
impl DeckStore for JsonStore {
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
        self.edit(|s| s.save_deck(deck)).await
    }
}

#[async_trait]
impl CardStore for JsonStore {
    async fn card(&self, id: CardId) -> Result<Card, CoreError> {
        self.state.read().card(id)
    }

    async fn update_card(&self, card: &Card) -> Result<(), CoreError> {
        self.try_edit(|s| s.update_card(card)).await
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
        self.try_edit(|s| s.bury(ids, queue, now, usn)).await
    }

    async fn unbury_all(&self, now: i64, usn: i32) -> Result<u32, CoreError> {
        self.edit(|s| s.unbury_all(now, usn)).await
    }

    async fn reassign_orphans(&self, valid: &HashSet<DeckId>, now: i64, usn: i32) -> Result<u32, CoreError> {
        self.commit(|s| {
            let moved = s.reassign_orphans(valid, now, usn);
            Ok((moved, moved > 0))
        })
        .await
    }
}

#[async_trait]
impl NoteStore for JsonStore {
    async fn note(&self, id: NoteId) -> Result<Note, CoreError> {
        self.state.read().note(id)
    }

    async fn update_note(&self, note: &Note) -> Result<(), CoreError> {
        self.try_edit(|s| s.update_note(note)).await
    }
}

#[async_trait]
impl ReviewLogStore for JsonStore {
    async fn append_review(&self, entry: &ReviewLogEntry) -> Result<i64, CoreError> {
        self.edit(|s| s.append_review(entry)).await
    }

    async fn reviews_for_card(&self, card_id: CardId) -> Result<Vec<ReviewLogEntry>, CoreError> {
        Ok(self.state.read().reviews_for_card(card_id))
    }

    async fn all_reviews(&self) -> Result<Vec<ReviewLogEntry>, CoreError> {
        Ok(self.state.read().revlog.clone())
    }
}
