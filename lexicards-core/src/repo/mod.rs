use crate::{Card, CardContent, CardId, CoreError, Folder, FolderId, Review, SchedulingState};
use async_trait::async_trait;

pub mod memory;

#[async_trait]
pub trait Repository: Send + Sync {
    // Folders
    async fn create_folder(&self, name: &str) -> Result<Folder, CoreError>;
    async fn get_folder(&self, id: FolderId) -> Result<Folder, CoreError>;
    async fn list_folders(&self) -> Result<Vec<Folder>, CoreError>;
    /// Removes the folder together with its cards and their reviews.
    async fn delete_folder(&self, id: FolderId) -> Result<(), CoreError>;

    // Cards
    async fn add_card(&self, folder_id: FolderId, content: &CardContent) -> Result<Card, CoreError>;
    async fn get_card(&self, id: CardId) -> Result<Card, CoreError>;
    /// Cards ordered by creation time, optionally limited to one folder.
    async fn list_cards(&self, folder_id: Option<FolderId>) -> Result<Vec<Card>, CoreError>;
    async fn update_content(&self, id: CardId, content: &CardContent) -> Result<Card, CoreError>;
    /// Writes a new scheduling state only if the stored card is still at
    /// `expected_version`; otherwise fails with `CoreError::Conflict`.
    async fn update_schedule(
        &self,
        id: CardId,
        expected_version: u64,
        state: &SchedulingState,
    ) -> Result<Card, CoreError>;
    async fn delete_card(&self, id: CardId) -> Result<(), CoreError>;

    // Reviews
    async fn insert_review(&self, review: &Review) -> Result<(), CoreError>;
    async fn list_reviews_for_card(&self, card_id: CardId) -> Result<Vec<Review>, CoreError>;
    async fn list_reviews(&self) -> Result<Vec<Review>, CoreError>;
}

/// Looks a folder up by id, falling back to a case-insensitive name match.
pub async fn resolve_folder<R: Repository + ?Sized>(repo: &R, sel: &str) -> Result<Folder, CoreError> {
    if let Ok(id) = uuid::Uuid::parse_str(sel) {
        if let Ok(f) = repo.get_folder(id).await {
            return Ok(f);
        }
    }
    repo.list_folders()
        .await?
        .into_iter()
        .find(|f| f.name.eq_ignore_ascii_case(sel.trim()))
        .ok_or(CoreError::NotFound("folder"))
}

/// Creation order, id as tie-breaker, so listings are stable across backends.
pub fn sort_cards(v: &mut [Card]) {
    v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
