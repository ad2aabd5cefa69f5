use crate::{
    Card, CardContent, CardId, CoreError, Folder, FolderId, Review, SchedulingState,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryRepo {
    folders: RwLock<HashMap<FolderId, Folder>>,
    cards: RwLock<HashMap<CardId, Card>>,
    reviews: RwLock<HashMap<CardId, Vec<Review>>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn create_folder(&self, name: &str) -> Result<Folder, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Invalid("folder name must not be empty"));
        }
        let folder = Folder::new(name);
        let mut m = self.folders.write();
        if m.values().any(|f| f.name.eq_ignore_ascii_case(name)) {
            return Err(CoreError::Conflict("folder name already exists"));
        }
        m.insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Folder, CoreError> {
        self.folders
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("folder"))
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, CoreError> {
        let mut v: Vec<Folder> = self.folders.read().values().cloned().collect();
        v.sort_by_key(|f| f.created_at);
        Ok(v)
    }

    async fn delete_folder(&self, id: FolderId) -> Result<(), CoreError> {
        self.folders
            .write()
            .remove(&id)
            .ok_or(CoreError::NotFound("folder"))?;
        let mut cards = self.cards.write();
        let ids: Vec<CardId> = cards
            .values()
            .filter(|c| c.folder_id == id)
            .map(|c| c.id)
            .collect();
        let mut reviews = self.reviews.write();
        for cid in ids {
            cards.remove(&cid);
            reviews.remove(&cid);
        }
        Ok(())
    }

    async fn add_card(&self, folder_id: FolderId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        if !self.folders.read().contains_key(&folder_id) {
            return Err(CoreError::NotFound("folder"));
        }
        let card = Card::new(folder_id, content.clone());
        self.cards.write().insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.cards
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn list_cards(&self, folder_id: Option<FolderId>) -> Result<Vec<Card>, CoreError> {
        let cards = self.cards.read();
        let mut v: Vec<Card> = cards.values().cloned().collect();
        if let Some(fid) = folder_id {
            v.retain(|c| c.folder_id == fid);
        }
        crate::repo::sort_cards(&mut v);
        Ok(v)
    }

    async fn update_content(&self, id: CardId, content: &CardContent) -> Result<Card, CoreError> {
        content.validate()?;
        let mut m = self.cards.write();
        let Some(card) = m.get_mut(&id) else {
            return Err(CoreError::NotFound("card"));
        };
        card.content = content.clone();
        card.version += 1;
        Ok(card.clone())
    }

    async fn update_schedule(
        &self,
        id: CardId,
        expected_version: u64,
        state: &SchedulingState,
    ) -> Result<Card, CoreError> {
        let mut m = self.cards.write();
        let Some(card) = m.get_mut(&id) else {
            return Err(CoreError::NotFound("card"));
        };
        if card.version != expected_version {
            return Err(CoreError::Conflict("card was modified concurrently"));
        }
        card.schedule = state.clone();
        card.version += 1;
        Ok(card.clone())
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.cards
            .write()
            .remove(&id)
            .ok_or(CoreError::NotFound("card"))?;
        self.reviews.write().remove(&id);
        Ok(())
    }

    async fn insert_review(&self, review: &Review) -> Result<(), CoreError> {
        if !self.cards.read().contains_key(&review.card_id) {
            return Err(CoreError::NotFound("card"));
        }
        let mut m = self.reviews.write();
        m.entry(review.card_id).or_default().push(review.clone());
        Ok(())
    }

    async fn list_reviews_for_card(&self, card_id: CardId) -> Result<Vec<Review>, CoreError> {
        Ok(self
            .reviews
            .read()
            .get(&card_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, CoreError> {
        let mut v: Vec<Review> = self.reviews.read().values().flatten().cloned().collect();
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }
}
