use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use lexicards_core::{resolve_folder, CardContent, Rating, ReviewService};

use crate::api::dto::{ApiError, CardIn, CardOut, DueOut, FolderIn, FolderOut, ReviewIn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReviewService>,
}

#[derive(Deserialize)]
pub struct DueQuery {
    folder: Option<String>,
    limit: Option<usize>,
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn list_folders(State(st): State<Arc<AppState>>) -> ApiResult<Json<Vec<FolderOut>>> {
    let folders = st.service.repo().list_folders().await?;
    Ok(Json(folders.into_iter().map(FolderOut::from).collect()))
}

pub async fn create_folder(
    State(st): State<Arc<AppState>>,
    Json(body): Json<FolderIn>,
) -> ApiResult<(StatusCode, Json<FolderOut>)> {
    let f = st.service.repo().create_folder(&body.name).await?;
    Ok((StatusCode::CREATED, Json(f.into())))
}

pub async fn delete_folder(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    st.service.repo().delete_folder(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_cards(
    State(st): State<Arc<AppState>>,
    Path(folder_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CardOut>>> {
    let repo = st.service.repo();
    repo.get_folder(folder_id).await?;
    let cards = repo.list_cards(Some(folder_id)).await?;
    Ok(Json(cards.into_iter().map(CardOut::from).collect()))
}

pub async fn create_card(
    State(st): State<Arc<AppState>>,
    Json(body): Json<CardIn>,
) -> ApiResult<(StatusCode, Json<CardOut>)> {
    let c = st.service.repo().add_card(body.folder_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(c.into())))
}

pub async fn update_card(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(content): Json<CardContent>,
) -> ApiResult<Json<CardOut>> {
    let c = st.service.repo().update_content(id, &content).await?;
    Ok(Json(c.into()))
}

pub async fn delete_card(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    st.service.repo().delete_card(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn due_cards(
    State(st): State<Arc<AppState>>,
    Query(q): Query<DueQuery>,
) -> ApiResult<Json<DueOut>> {
    let folder_id = match q.folder.as_deref() {
        Some(sel) => Some(resolve_folder(st.service.repo().as_ref(), sel).await?.id),
        None => None,
    };
    let mut due = st.service.due(folder_id, Utc::now()).await?;
    let count = due.len();
    if let Some(limit) = q.limit {
        due.truncate(limit);
    }
    Ok(Json(DueOut {
        count,
        cards: due.into_iter().map(CardOut::from).collect(),
    }))
}

pub async fn post_review(
    State(st): State<Arc<AppState>>,
    Json(body): Json<ReviewIn>,
) -> ApiResult<Json<CardOut>> {
    let rating: Rating = body.rating.parse()?;
    let out = st.service.review(body.id, rating, Utc::now()).await?;
    Ok(Json(out.updated_card.into()))
}
