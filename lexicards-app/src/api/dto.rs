use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use lexicards_core::{Card, CardContent, CoreError, Folder, Stage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderOut {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Folder> for FolderOut {
    fn from(f: Folder) -> Self {
        Self { id: f.id, name: f.name, created_at: f.created_at }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardOut {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub word: String,
    pub pronunciation: String,
    pub meaning: String,
    pub synonyms: String,
    pub examples: Vec<String>,
    pub repetitions: u32,
    pub ease: f64,
    pub interval_days: u32,
    pub next_review: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub stage: Stage,
    pub version: u64,
}

impl From<Card> for CardOut {
    fn from(c: Card) -> Self {
        let stage = c.stage();
        Self {
            id: c.id,
            folder_id: c.folder_id,
            word: c.content.word,
            pronunciation: c.content.pronunciation,
            meaning: c.content.meaning,
            synonyms: c.content.synonyms,
            examples: c.content.examples,
            repetitions: c.schedule.repetitions,
            ease: c.schedule.ease,
            interval_days: c.schedule.interval_days,
            next_review: c.schedule.next_review,
            last_reviewed: c.schedule.last_reviewed,
            stage,
            version: c.version,
        }
    }
}

#[derive(Deserialize)]
pub struct FolderIn {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardIn {
    pub folder_id: Uuid,
    #[serde(flatten)]
    pub content: CardContent,
}

#[derive(Deserialize)]
pub struct ReviewIn {
    pub id: Uuid,
    pub rating: String,
}

#[derive(Serialize)]
pub struct DueOut {
    pub count: usize,
    pub cards: Vec<CardOut>,
}

/// `CoreError` rendered as a status code plus `{"error": "..."}`.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            CoreError::InvalidRating(_) | CoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
