use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::CardStore;
use crate::core::card::Card;
use crate::ingest::loader::{CardLoader, LoadReport};
use crate::query::engine::{QueryEngine, SearchMode, SearchTerm};

#[derive(Serialize)]
pub struct StatusResponse {
    pub card_count: usize,
    pub index_set_count: usize,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
    store: Arc<CardStore>,
    loader: Arc<CardLoader>,
}

pub struct ApiServer {
    state: AppState,
    cors: Option<CorsLayer>,
}

impl ApiServer {
    /// `front_end_origin`：前端独立部署时配置其源，未配置则不加 CORS 头。
    pub fn new(
        engine: Arc<QueryEngine>,
        store: Arc<CardStore>,
        loader: Arc<CardLoader>,
        front_end_origin: Option<&str>,
    ) -> anyhow::Result<Self> {
        let cors = match front_end_origin {
            Some(origin) => Some(
                CorsLayer::new()
                    .allow_origin(origin.parse::<HeaderValue>()?)
                    .allow_headers(Any),
            ),
            None => None,
        };
        Ok(ApiServer {
            state: AppState {
                engine,
                store,
                loader,
            },
            cors,
        })
    }

    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let mut app = Router::new()
            .route("/", get(search_handler))
            .route("/load-data", get(load_handler))
            .route("/status", get(status_handler))
            .with_state(self.state);
        if let Some(cors) = self.cors {
            app = app.layer(cors);
        }

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        tracing::info!("HTTP query server listening on port {}", port);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// query string → 检索条件。`connective` 是保留 key，控制 AND/OR，不算条件；
/// 同名 key 可重复出现，每个值都是一个条件。
fn parse_query(params: &[(String, String)]) -> (Vec<SearchTerm>, SearchMode) {
    let mode = SearchMode::from_connective(
        params
            .iter()
            .find(|(k, _)| k == "connective")
            .map(|(_, v)| v.as_str()),
    );
    let terms = params
        .iter()
        .filter(|(k, _)| k != "connective")
        .map(|(k, v)| SearchTerm::new(k.clone(), v.clone()))
        .collect();
    (terms, mode)
}

async fn search_handler(
    Query(params): Query<Vec<(String, String)>>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Card>>, (StatusCode, String)> {
    let (terms, mode) = parse_query(&params);
    if terms.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let mut cards = state.engine.search(&terms, mode).await.map_err(|e| {
        tracing::error!("search failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error getting card data!".to_string(),
        )
    })?;
    // 引擎不保证顺序，最终排序在这里做
    cards.sort_by(|a, b| a.id().unwrap_or("").cmp(b.id().unwrap_or("")));
    Ok(Json(cards))
}

async fn load_handler(
    State(state): State<AppState>,
) -> Result<Json<LoadReport>, (StatusCode, String)> {
    let report = state.loader.load_all().await.map_err(|e| {
        tracing::error!("load-data failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error loading card data!".to_string(),
        )
    })?;
    Ok(Json(report))
}

async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let backend = state.store.backend();
    let keys = state.store.keys();
    let err =
        |e: crate::core::error::StoreError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    let card_count = backend.hash_count(&keys.data_prefix()).await.map_err(err)?;
    let index_set_count = backend.set_count(&keys.sets_prefix()).await.map_err(err)?;
    Ok(Json(StatusResponse {
        card_count,
        index_set_count,
    }))
}
