use async_trait::async_trait;
use chrono::{Duration, Utc};
use lexicards_core::{
    memory::MemoryRepo, Card, CardContent, CardId, CoreError, Folder, FolderId, Rating,
    Repository, Review, ReviewService, resolve_folder, SchedulingState, Scheduler, Selection,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn content(word: &str) -> CardContent {
    CardContent {
        word: word.into(),
        pronunciation: "/x/".into(),
        meaning: format!("meaning of {word}"),
        synonyms: String::new(),
        examples: vec![format!("{word} in a sentence")],
    }
}

#[tokio::test]
async fn folder_names_are_unique() {
    let repo = MemoryRepo::new();
    repo.create_folder("Latin").await.unwrap();
    let err = repo.create_folder("latin").await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert!(matches!(
        repo.create_folder("   ").await,
        Err(CoreError::Invalid(_))
    ));
}

#[tokio::test]
async fn delete_folder_cascades() {
    let repo = MemoryRepo::new();
    let f = repo.create_folder("Words").await.unwrap();
    let other = repo.create_folder("Other").await.unwrap();
    let c = repo.add_card(f.id, &content("aplomb")).await.unwrap();
    let keep = repo.add_card(other.id, &content("brio")).await.unwrap();
    repo.insert_review(&Review::new(c.id, Rating::Good, Utc::now(), 1, 2.5))
        .await
        .unwrap();

    repo.delete_folder(f.id).await.unwrap();
    assert!(matches!(repo.get_card(c.id).await, Err(CoreError::NotFound(_))));
    assert!(repo.list_reviews_for_card(c.id).await.unwrap().is_empty());
    assert_eq!(repo.list_cards(None).await.unwrap(), vec![keep]);
}

#[tokio::test]
async fn add_card_requires_folder_and_word() {
    let repo = MemoryRepo::new();
    let err = repo.add_card(uuid::Uuid::new_v4(), &content("x")).await.unwrap_err();
    assert_eq!(err, CoreError::NotFound("folder"));
    let f = repo.create_folder("F").await.unwrap();
    assert!(matches!(
        repo.add_card(f.id, &content("  ")).await,
        Err(CoreError::Invalid(_))
    ));
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let repo = MemoryRepo::new();
    let f = repo.create_folder("F").await.unwrap();
    let card = repo.add_card(f.id, &content("gauche")).await.unwrap();
    let next = lexicards_core::transition(&card.schedule, Rating::Good, Utc::now()).unwrap();

    let stored = repo.update_schedule(card.id, card.version, &next).await.unwrap();
    assert_eq!(stored.version, card.version + 1);
    assert_eq!(stored.schedule, next);

    let again = repo.update_schedule(card.id, card.version, &next).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));

    let edited = repo.update_content(card.id, &content("gauche!")).await.unwrap();
    assert_eq!(edited.version, stored.version + 1);
    assert_eq!(edited.schedule, next);
}

#[tokio::test]
async fn service_review_persists_state_and_log() {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
    let f = repo.create_folder("F").await.unwrap();
    let card = repo.add_card(f.id, &content("quixotic")).await.unwrap();
    let svc = ReviewService::new(repo.clone(), Scheduler::default());

    let now = Utc::now();
    let out = svc.review(card.id, Rating::Good, now).await.unwrap();
    assert_eq!(out.updated_card.schedule.repetitions, 1);
    assert_eq!(out.updated_card.schedule.next_review, now + Duration::days(1));

    let stored = repo.get_card(card.id).await.unwrap();
    assert_eq!(stored, out.updated_card);
    let log = repo.list_reviews_for_card(card.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].rating, Rating::Good);

    assert_eq!(svc.next(Some(f.id), now).await.unwrap(), Selection::EmptyDueQueue);
    let later = now + Duration::days(1);
    assert_eq!(svc.due(Some(f.id), later).await.unwrap().len(), 1);
}

#[tokio::test]
async fn service_rejects_corrupt_state_without_writing() {
    let repo = Arc::new(MemoryRepo::new());
    let f = repo.create_folder("F").await.unwrap();
    let card = repo.add_card(f.id, &content("moot")).await.unwrap();
    let mut broken = card.schedule.clone();
    broken.ease = 0.5;
    repo.update_schedule(card.id, card.version, &broken).await.unwrap();

    let svc = ReviewService::new(repo.clone(), Scheduler::default());
    let err = svc.review(card.id, Rating::Good, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    assert!(repo.list_reviews_for_card(card.id).await.unwrap().is_empty());
}

/// Simulates another reviewer writing the card between our read and write,
/// exactly once.
/// Wraps `MemoryRepo` to inject one rival schedule write and/or failing
/// review-log inserts.
struct FlakyRepo {
    inner: MemoryRepo,
    raced: AtomicBool,
    fail_review_log: bool,
}

#[async_trait]
impl Repository for FlakyRepo {
    async fn create_folder(&self, name: &str) -> Result<Folder, CoreError> {
        self.inner.create_folder(name).await
    }
    async fn get_folder(&self, id: FolderId) -> Result<Folder, CoreError> {
        self.inner.get_folder(id).await
    }
    async fn list_folders(&self) -> Result<Vec<Folder>, CoreError> {
        self.inner.list_folders().await
    }
    async fn delete_folder(&self, id: FolderId) -> Result<(), CoreError> {
        self.inner.delete_folder(id).await
    }
    async fn add_card(&self, folder_id: FolderId, content: &CardContent) -> Result<Card, CoreError> {
        self.inner.add_card(folder_id, content).await
    }
    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.inner.get_card(id).await
    }
    async fn list_cards(&self, folder_id: Option<FolderId>) -> Result<Vec<Card>, CoreError> {
        self.inner.list_cards(folder_id).await
    }
    async fn update_content(&self, id: CardId, content: &CardContent) -> Result<Card, CoreError> {
        self.inner.update_content(id, content).await
    }
    async fn update_schedule(
        &self,
        id: CardId,
        expected_version: u64,
        state: &SchedulingState,
    ) -> Result<Card, CoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = self.inner.get_card(id).await?;
            let rival = lexicards_core::transition(&current.schedule, Rating::Good, Utc::now())?;
            self.inner.update_schedule(id, current.version, &rival).await?;
        }
        self.inner.update_schedule(id, expected_version, state).await
    }
    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.inner.delete_card(id).await
    }
    async fn insert_review(&self, review: &Review) -> Result<(), CoreError> {
        if self.fail_review_log {
            return Err(CoreError::Storage("review log unavailable"));
        }
        self.inner.insert_review(review).await
    }
    async fn list_reviews_for_card(&self, card_id: CardId) -> Result<Vec<Review>, CoreError> {
        self.inner.list_reviews_for_card(card_id).await
    }
    async fn list_reviews(&self) -> Result<Vec<Review>, CoreError> {
        self.inner.list_reviews().await
    }
}

async fn racing_setup() -> (Arc<FlakyRepo>, Card) {
    let repo = Arc::new(FlakyRepo {
        inner: MemoryRepo::new(),
        raced: AtomicBool::new(false),
        fail_review_log: false,
    });
    let f = repo.create_folder("F").await.unwrap();
    let card = repo.add_card(f.id, &content("zeitgeist")).await.unwrap();
    (repo, card)
}

#[tokio::test]
async fn concurrent_write_is_retried_on_fresh_state() {
    let (repo, card) = racing_setup().await;
    let svc = ReviewService::new(repo.clone(), Scheduler::default());

    let out = svc.review(card.id, Rating::Good, Utc::now()).await.unwrap();
    // the rival review landed first, ours built on top of it
    assert_eq!(out.updated_card.schedule.repetitions, 2);
    assert_eq!(out.updated_card.schedule.interval_days, 6);
    assert_eq!(out.updated_card.version, 2);
}

#[tokio::test]
async fn conflict_surfaces_when_retries_run_out() {
    let (repo, card) = racing_setup().await;
    let svc = ReviewService::new(repo.clone(), Scheduler::default()).with_max_attempts(1);

    let err = svc.review(card.id, Rating::Easy, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert!(repo.list_reviews_for_card(card.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn session_outcome_commits_or_reapplies() {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
    let f = repo.create_folder("F").await.unwrap();
    repo.add_card(f.id, &content("halcyon")).await.unwrap();
    let svc = ReviewService::new(repo.clone(), Scheduler::default());
    let now = Utc::now();

    let cards = repo.list_cards(Some(f.id)).await.unwrap();
    let mut session = lexicards_core::ReviewSession::new(svc.scheduler().clone());
    let presented = session.present_next(&cards, now).unwrap();
    let presented = presented.card().unwrap().clone();
    let outcome = session.submit(Rating::Good, now).unwrap();
    let stored = svc.commit(presented.version, outcome).await.unwrap();
    assert_eq!(stored.updated_card.version, 1);
    assert_eq!(stored.updated_card.schedule.repetitions, 1);

    // a second outcome built from the same stale snapshot is rebased
    let stale = svc.scheduler().apply_rating(&presented, Rating::Good, now).unwrap();
    let rebased = svc.commit(presented.version, stale).await.unwrap();
    assert_eq!(rebased.updated_card.schedule.repetitions, 2);
    assert_eq!(rebased.updated_card.version, 2);
    assert_eq!(repo.list_reviews_for_card(presented.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn lost_review_log_entry_does_not_fail_committed_review() {
    let repo = Arc::new(FlakyRepo {
        inner: MemoryRepo::new(),
        raced: AtomicBool::new(true),
        fail_review_log: true,
    });
    let f = repo.create_folder("F").await.unwrap();
    let card = repo.add_card(f.id, &content("sanguine")).await.unwrap();
    let svc = ReviewService::new(repo.clone(), Scheduler::default());

    let out = svc.review(card.id, Rating::Good, Utc::now()).await.unwrap();
    assert_eq!(out.updated_card.version, card.version + 1);

    let stored = repo.get_card(card.id).await.unwrap();
    assert_eq!(stored.schedule.repetitions, 1);
    assert_eq!(stored.version, card.version + 1);
    assert!(repo.list_reviews_for_card(card.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn folders_resolve_by_id_or_name() {
    let repo = MemoryRepo::new();
    let f = repo.create_folder("Greek Roots").await.unwrap();
    assert_eq!(resolve_folder(&repo, &f.id.to_string()).await.unwrap(), f);
    assert_eq!(resolve_folder(&repo, " greek roots").await.unwrap(), f);
    assert_eq!(
        resolve_folder(&repo, "latin").await.unwrap_err(),
        CoreError::NotFound("folder")
    );
}
