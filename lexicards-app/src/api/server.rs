use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes::*;
use lexicards_core::ReviewService;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/folders", get(list_folders).post(create_folder))
        .route("/folders/:id", delete(delete_folder))
        .route("/cards", post(create_card))
        .route("/cards/:id", get(list_cards).put(update_card).delete(delete_card))
        .route("/due", get(due_cards))
        .route("/review", post(post_review))
        // paths used by the web client for card writes
        .route("/api/save", post(create_card))
        .route("/api/cards/:id", put(update_card).delete(delete_card))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(service: Arc<ReviewService>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState { service }));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
