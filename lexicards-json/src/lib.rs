use anyhow::Context;
use chrono::{DateTime, Utc};
use lexicards_core::{
    repo::{sort_cards, Repository},
    Card, CardContent, CardId, CoreError, Folder, FolderId, Review, SchedulingState,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, error};

pub mod paths;

const FILE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    folders: Vec<Folder>,
    cards: Vec<Card>,
    reviews: Vec<Review>,
}

#[derive(Default, Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    folders: HashMap<FolderId, Folder>,
    cards: HashMap<CardId, Card>,
    reviews: HashMap<CardId, Vec<Review>>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    fn to_image(&self) -> FileImage {
        let mut folders: Vec<Folder> = self.folders.values().cloned().collect();
        folders.sort_by_key(|f| f.created_at);
        let mut cards: Vec<Card> = self.cards.values().cloned().collect();
        sort_cards(&mut cards);
        let mut reviews: Vec<Review> = self.reviews.values().flatten().cloned().collect();
        reviews.sort_by_key(|r| r.reviewed_at);
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            folders,
            cards,
            reviews,
        }
    }

    fn from_image(img: FileImage) -> Self {
        let folders = img.folders.into_iter().map(|f| (f.id, f)).collect();
        let cards = img.cards.into_iter().map(|c| (c.id, c)).collect();
        let mut reviews: HashMap<CardId, Vec<Review>> = HashMap::new();
        for r in img.reviews {
            reviews.entry(r.card_id).or_default().push(r);
        }
        Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            folders,
            cards,
            reviews,
        }
    }
}

/// Whole-dataset JSON file. Every mutation rewrites the file atomically and
/// drops a timestamped copy into the backups directory.
pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    // held across clone, change, write and swap so writers never interleave
    save_lock: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_with(
        path: PathBuf,
        backups_dir: PathBuf,
        max_backups: usize,
    ) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let state = load_or_init(&path, &backups_dir).await?;
        debug!(path = %path.display(), cards = state.cards.len(), "json store opened");
        Ok(Self {
            path,
            backups_dir,
            max_backups: max_backups.max(1),
            state: RwLock::new(state),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the state, writes that copy, and only
    /// then makes it visible. A failed write leaves memory untouched.
    async fn commit<T, F>(&self, change: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut State) -> Result<T, CoreError> + Send,
        T: Send,
    {
        let _guard = self.save_lock.lock().await;
        let mut next = self.state.read().clone();
        let out = change(&mut next)?;
        next.updated_at = Utc::now();

        let snapshot = next.to_image();
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;
        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot))
            .await
            .map_err(|_| CoreError::Storage("io"))?
            .map_err(|e| {
                error!(error = ?e, "failed to write json store");
                CoreError::Storage("io")
            })?;

        *self.state.write() = next;
        Ok(out)
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(|_| CoreError::Storage("io"))
}

async fn load_or_init(path: &Path, backups_dir: &Path) -> Result<State, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img = task::spawn_blocking(move || -> anyhow::Result<FileImage> {
            let buf = fs::read_to_string(&p)
                .with_context(|| format!("reading {}", p.display()))?;
            let img = serde_json::from_str::<FileImage>(&buf)
                .with_context(|| format!("parsing {}", p.display()))?;
            Ok(img)
        })
        .await
        .map_err(|_| CoreError::Storage("io"))?
        .map_err(|e| {
            error!(error = ?e, "failed to load json store");
            CoreError::Storage("io")
        })?;
        if img.version > FILE_VERSION {
            return Err(CoreError::Storage("store file is from a newer version"));
        }
        let mut st = State::from_image(img);
        st.updated_at = Utc::now();
        Ok(st)
    } else {
        let st = State::new_empty();
        let img = st.to_image();
        write_with_backup(path, backups_dir, 1, &img).map_err(|e| {
            error!(error = ?e, "failed to initialize json store");
            CoreError::Storage("io")
        })?;
        Ok(st)
    }
}

fn write_with_backup(
    path: &Path,
    backups_dir: &Path,
    max_backups: usize,
    img: &FileImage,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(backups_dir)?;

    let json = serde_json::to_vec_pretty(img).context("serializing store")?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;

    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("lexicards-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(&json)?;
    btmp.flush()?;
    btmp.persist(&backup_path)
        .with_context(|| format!("writing backup {}", backup_path.display()))?;

    rotate_backups(backups_dir, max_backups)?;
    Ok(())
}

fn rotate_backups(dir: &Path, keep: usize) -> anyhow::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    if entries.len() > keep {
        for e in &entries[0..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

use async_trait::async_trait;

#[async_trait]
impl Repository for JsonStore {
    async fn create_folder(&self, name: &str) -> Result<Folder, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Invalid("folder name must not be empty"));
        }
        self.commit(|s| {
            if s.folders.values().any(|f| f.name.eq_ignore_ascii_case(name)) {
                return Err(CoreError::Conflict("folder name already exists"));
            }
            let folder = Folder::new(name);
            s.folders.insert(folder.id, folder.clone());
            Ok(folder)
        })
        .await
    }

    async fn get_folder(&self, id: FolderId) -> Result<Folder, CoreError> {
        let s = self.state.read();
        s.folders.get(&id).cloned().ok_or(CoreError::NotFound("folder"))
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<Folder> = s.folders.values().cloned().collect();
        v.sort_by_key(|f| f.created_at);
        Ok(v)
    }

    async fn delete_folder(&self, id: FolderId) -> Result<(), CoreError> {
        self.commit(|s| {
            if s.folders.remove(&id).is_none() {
                return Err(CoreError::NotFound("folder"));
            }
            let to_remove: Vec<CardId> = s
                .cards
                .values()
                .filter(|c| c.folder_id == id)
                .map(|c| c.id)
                .collect();
            for cid in to_remove {
                s.cards.remove(&cid);
                s.reviews.remove(&cid);
            }
            Ok(())
        })
        .await
    }

    async fn add_card(&self, folder_id: FolderId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        self.commit(|s| {
            if !s.folders.contains_key(&folder_id) {
                return Err(CoreError::NotFound("folder"));
            }
            let c = Card::new(folder_id, content.clone());
            s.cards.insert(c.id, c.clone());
            Ok(c)
        })
        .await
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let s = self.state.read();
        s.cards.get(&id).cloned().ok_or(CoreError::NotFound("card"))
    }

    async fn list_cards(&self, folder_id: Option<FolderId>) -> Result<Vec<Card>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<Card> = s.cards.values().cloned().collect();
        if let Some(fid) = folder_id {
            v.retain(|c| c.folder_id == fid);
        }
        sort_cards(&mut v);
        Ok(v)
    }

    async fn update_content(&self, id: CardId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        self.commit(|s| {
            let c = s.cards.get_mut(&id).ok_or(CoreError::NotFound("card"))?;
            c.content = content.clone();
            c.version += 1;
            Ok(c.clone())
        })
        .await
    }

    async fn update_schedule(
        &self,
        id: CardId,
        expected_version: u64,
        state: &SchedulingState,
    ) -> Result<Card, CoreError> {
        self.commit(|s| {
            let c = s.cards.get_mut(&id).ok_or(CoreError::NotFound("card"))?;
            if c.version != expected_version {
                return Err(CoreError::Conflict("card was modified concurrently"));
            }
            c.schedule = state.clone();
            c.version += 1;
            Ok(c.clone())
        })
        .await
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.commit(|s| {
            if s.cards.remove(&id).is_none() {
                return Err(CoreError::NotFound("card"));
            }
            s.reviews.remove(&id);
            Ok(())
        })
        .await
    }

    async fn insert_review(&self, review: &Review) -> Result<(), CoreError> {
        self.commit(|s| {
            if !s.cards.contains_key(&review.card_id) {
                return Err(CoreError::NotFound("card"));
            }
            s.reviews.entry(review.card_id).or_default().push(review.clone());
            Ok(())
        })
        .await
    }

    async fn list_reviews_for_card(&self, card_id: CardId) -> Result<Vec<Review>, CoreError> {
        let s = self.state.read();
        Ok(s.reviews.get(&card_id).cloned().unwrap_or_default())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<Review> = s.reviews.values().flatten().cloned().collect();
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicards_core::{transition, Rating};

    async fn open(dir: &Path) -> JsonStore {
        JsonStore::open_with(dir.join("store.json"), dir.join("backups"), 3)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (folder, card, next) = {
            let store = open(dir.path()).await;
            let folder = store.create_folder("Vocab").await.unwrap();
            let card = store
                .add_card(folder.id, &CardContent::new("limerence", "infatuation"))
                .await
                .unwrap();
            let next = transition(&card.schedule, Rating::Good, Utc::now()).unwrap();
            store.update_schedule(card.id, card.version, &next).await.unwrap();
            store
                .insert_review(&Review::new(card.id, Rating::Good, Utc::now(), 1, 2.5))
                .await
                .unwrap();
            (folder, card, next)
        };

        let store = open(dir.path()).await;
        assert_eq!(store.get_folder(folder.id).await.unwrap(), folder);
        let loaded = store.get_card(card.id).await.unwrap();
        assert_eq!(loaded.schedule, next);
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.content.word, "limerence");
        assert_eq!(store.list_reviews().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_detects_stale_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        let folder = store.create_folder("F").await.unwrap();
        let card = store
            .add_card(folder.id, &CardContent::new("petrichor", "smell of rain"))
            .await
            .unwrap();
        store
            .update_content(card.id, &CardContent::new("petrichor", "earthy smell"))
            .await
            .unwrap();
        let next = transition(&card.schedule, Rating::Easy, Utc::now()).unwrap();
        let err = store.update_schedule(card.id, card.version, &next).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        let folder = store.create_folder("F").await.unwrap();
        let card = store
            .add_card(folder.id, &CardContent::new("aplomb", "composure"))
            .await
            .unwrap();

        // a non-empty directory in place of the store file makes the rename fail
        let file = dir.path().join("store.json");
        fs::remove_file(&file).unwrap();
        fs::create_dir(&file).unwrap();
        fs::write(file.join("blocker"), b"x").unwrap();

        let next = transition(&card.schedule, Rating::Good, Utc::now()).unwrap();
        let err = store.update_schedule(card.id, card.version, &next).await.unwrap_err();
        assert_eq!(err, CoreError::Storage("io"));
        assert_eq!(store.get_card(card.id).await.unwrap(), card);
        assert!(store.create_folder("G").await.is_err());
        assert_eq!(store.list_folders().await.unwrap(), vec![folder]);

        fs::remove_dir_all(&file).unwrap();
        let stored = store.update_schedule(card.id, card.version, &next).await.unwrap();
        assert_eq!(stored.version, card.version + 1);
        assert_eq!(stored.schedule.repetitions, 1);
    }

    #[tokio::test]
    async fn backups_are_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        for name in ["a", "b", "c", "d", "e"] {
            store.create_folder(name).await.unwrap();
        }
        let n = fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert!(n <= 3, "kept {n} backups");
    }

    #[tokio::test]
    async fn delete_folder_removes_cards() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        let folder = store.create_folder("F").await.unwrap();
        store
            .add_card(folder.id, &CardContent::new("sonder", "realization"))
            .await
            .unwrap();
        store.delete_folder(folder.id).await.unwrap();
        assert!(store.list_cards(None).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_folder(folder.id).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
