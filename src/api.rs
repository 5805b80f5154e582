use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    flatten::BookmarkNodes,
    models::BookmarkRecord,
    search::{SearchOutcome, SearchType},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct SearchPayload {
    search_type: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Error,
}

/// Aviso visible para el usuario junto a la respuesta.
#[derive(Debug, Serialize)]
pub struct FlashMessage {
    level: MessageLevel,
    text: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    records: Option<Vec<Value>>,
    message: Option<FlashMessage>,
}

impl SearchResponse {
    fn records(records: Vec<Value>) -> Self {
        Self { records: Some(records), message: None }
    }

    fn message(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            records: None,
            message: Some(FlashMessage { level, text: text.into() }),
        }
    }
}

#[derive(Deserialize)]
pub struct FlattenParams {
    separator: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlattenResponse {
    count: usize,
    separator: String,
    records: Vec<Map<String, Value>>,
}

impl From<&BookmarkNodes> for FlattenResponse {
    fn from(nodes: &BookmarkNodes) -> Self {
        Self {
            count: nodes.node_count(),
            separator: nodes.path_separator().to_string(),
            records: nodes.iter().map(BookmarkRecord::copy_as_map).collect(),
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(search_handler))
        .route("/api/flatten", post(flatten_handler))
        .route("/api/bookmarks", get(bookmarks_handler))
        .route("/api/es-info", get(es_info_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> (StatusCode, Json<SearchResponse>) {
    let search_type: SearchType = match payload.search_type.parse() {
        Ok(search_type) => search_type,
        Err(e) => {
            warn!("Tipo de búsqueda rechazado: {}", payload.search_type);
            return (
                StatusCode::BAD_REQUEST,
                Json(SearchResponse::message(MessageLevel::Error, e.to_string())),
            );
        }
    };

    info!("Búsqueda {} sobre '{}': {}", search_type, state.search.index(), payload.value);

    match state.search.search(search_type, &payload.value).await {
        Ok(SearchOutcome::Records(records)) => (StatusCode::OK, Json(SearchResponse::records(records))),
        Ok(SearchOutcome::NoRecords) => (
            StatusCode::OK,
            Json(SearchResponse::message(MessageLevel::Info, "No records found")),
        ),
        Ok(SearchOutcome::EngineError(reason)) => (
            StatusCode::OK,
            Json(SearchResponse::message(MessageLevel::Error, reason)),
        ),
        Err(e) => {
            error!("Error consultando Elasticsearch: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(SearchResponse::message(
                    MessageLevel::Error,
                    format!("Error al consultar Elasticsearch: {e}"),
                )),
            )
        }
    }
}

/// Aplana el árbol recibido y devuelve los registros tal y como se
/// indexarían.
#[axum::debug_handler]
async fn flatten_handler(
    State(state): State<AppState>,
    Query(params): Query<FlattenParams>,
    Json(tree): Json<Value>,
) -> Result<Json<FlattenResponse>, (StatusCode, Json<Value>)> {
    let separator = params
        .separator
        .unwrap_or_else(|| state.config.path_separator.clone());

    match BookmarkNodes::new(&tree, &separator) {
        Ok(nodes) => {
            info!("Árbol aplanado: {} registros.", nodes.node_count());
            Ok(Json(FlattenResponse::from(&nodes)))
        }
        Err(e) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("Exportación de marcadores inválida: {}", e)})),
        )),
    }
}

#[axum::debug_handler]
async fn bookmarks_handler(
    State(state): State<AppState>,
) -> Result<Json<FlattenResponse>, (StatusCode, Json<Value>)> {
    match state.bookmarks.as_ref() {
        Some(nodes) => Ok(Json(FlattenResponse::from(nodes))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "No se cargó ninguna exportación al arrancar (BOOKMARKS_FILE)."})),
        )),
    }
}

#[axum::debug_handler]
async fn es_info_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    match state.search.ping().await {
        Ok(true) => Ok(Json(json!({
            "status": "ok",
            "base_url": state.config.elasticsearch_base_url,
            "index": state.search.index(),
        }))),
        Ok(false) => {
            error!("Elasticsearch respondió con un estado de error en el health check.");
            Err(StatusCode::BAD_GATEWAY)
        }
        Err(e) => {
            error!("Error en el health check de Elasticsearch: {}", e);
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}
