use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    app_state::{AppState, Status},
    error::NavigationError,
    events::{drain, EngineEvent},
    models::SelectionKey,
    prescription::Prescription,
    search::SearchOutcome,
    session::{CatalogSession, ClickOutcome, SessionView},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas ---

#[derive(Deserialize)]
pub struct NodePayload {
    id: String,
}

#[derive(Deserialize)]
pub struct LevelPayload {
    index: usize,
}

#[derive(Deserialize)]
pub struct RemoveFilterPayload {
    key: SelectionKey,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoveProductPayload {
    brand: String,
}

/// Vista resultante de una operación y los eventos emitidos durante ella.
#[derive(Serialize)]
pub struct OperationResponse {
    view: SessionView,
    events: Vec<EngineEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<ClickOutcome>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/click", post(click_handler))
        .route("/api/navigate", post(navigate_handler))
        .route("/api/back", post(back_handler))
        .route("/api/level", post(level_handler))
        .route("/api/home", post(home_handler))
        .route("/api/jump/config", post(jump_config_handler))
        .route("/api/jump/category", post(jump_category_handler))
        .route("/api/filters/remove", post(remove_filter_handler))
        .route("/api/products/remove", post(remove_product_handler))
        .route("/api/clear", post(clear_handler))
        .route(
            "/api/prescription",
            put(save_prescription_handler).delete(clear_prescription_handler),
        )
        .route("/api/search", get(search_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

fn navigation_error(e: NavigationError) -> ApiError {
    let status = match e {
        NavigationError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        NavigationError::InvalidLevel { .. } | NavigationError::AtRoot => StatusCode::BAD_REQUEST,
    };
    warn!("Operación de navegación rechazada: {e}");
    (status, Json(json!({"error": e.to_string()})))
}

fn respond(
    session: &CatalogSession,
    rx: &mut broadcast::Receiver<EngineEvent>,
    outcome: Option<ClickOutcome>,
) -> Json<OperationResponse> {
    Json(OperationResponse {
        view: session.view(),
        events: drain(rx),
        outcome,
    })
}

// --- Handlers ---

#[axum::debug_handler]
async fn view_handler(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.lock().await.view())
}

#[axum::debug_handler]
async fn click_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    let outcome = session.click(&payload.id).await.map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, Some(outcome)))
}

#[axum::debug_handler]
async fn navigate_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session.descend(&payload.id).await.map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn back_handler(State(state): State<AppState>) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session.go_back().await.map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn level_handler(
    State(state): State<AppState>,
    Json(payload): Json<LevelPayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session
        .go_to_level(payload.index)
        .await
        .map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn home_handler(State(state): State<AppState>) -> Json<OperationResponse> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session.go_home().await;
    respond(&session, &mut rx, None)
}

#[axum::debug_handler]
async fn jump_config_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session
        .jump_to_configuration(&payload.id)
        .await
        .map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn jump_category_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session
        .jump_to_category(&payload.id)
        .await
        .map_err(navigation_error)?;
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn remove_filter_handler(
    State(state): State<AppState>,
    Json(payload): Json<RemoveFilterPayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    if !session.remove_filter(payload.key, payload.id.as_deref()).await {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "El filtro indicado no está seleccionado."})),
        ));
    }
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn remove_product_handler(
    State(state): State<AppState>,
    Json(payload): Json<RemoveProductPayload>,
) -> Result<Json<OperationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    if !session.remove_product(&payload.brand).await {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Producto '{}' no seleccionado.", payload.brand)})),
        ));
    }
    Ok(respond(&session, &mut rx, None))
}

#[axum::debug_handler]
async fn clear_handler(State(state): State<AppState>) -> Json<OperationResponse> {
    let mut session = state.session.lock().await;
    let mut rx = state.events.subscribe();
    session.clear_all().await;
    respond(&session, &mut rx, None)
}

#[axum::debug_handler]
async fn save_prescription_handler(
    State(state): State<AppState>,
    Json(prescription): Json<Prescription>,
) -> impl IntoResponse {
    state.prescriptions.save(prescription);
    state.session.lock().await.prescription_saved();
    (StatusCode::ACCEPTED, Json(json!({"message": "Receta guardada."})))
}

#[axum::debug_handler]
async fn clear_prescription_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.prescriptions.clear();
    state.session.lock().await.prescription_cleared();
    (StatusCode::OK, Json(json!({"message": "Receta eliminada."})))
}

#[axum::debug_handler]
async fn search_handler(State(state): State<AppState>) -> Json<SearchOutcome> {
    Json(state.search.last_result())
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Result<Json<Status>, ApiError> {
    state
        .status
        .lock()
        .map(|status| Json(status.clone()))
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Estado del servidor no disponible."})),
            )
        })
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .ok()
        .and_then(|mut guard| guard.take());
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}
