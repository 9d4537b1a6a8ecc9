// Módulos de la aplicación
mod api;
mod app_state;
mod catalog;
mod compatibility;
mod config;
mod error;
mod events;
mod models;
mod navigation;
mod navigation_controller;
mod prescription;
mod remote;
mod search;
mod selection;
mod selection_controller;
mod session;
#[cfg(test)]
mod test_support;

use crate::app_state::{AppState, Status};
use anyhow::Context;
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Cargar el árbol del catálogo embebido
    let tree = Arc::new(catalog::NavigationTree::load_embedded().context("Catálogo de navegación inválido")?);
    info!("Catálogo cargado: {} categorías raíz", tree.root().children.len());

    // 4. Servicios remotos (compatibilidades y búsqueda) sobre un cliente común
    let client = remote::CatalogClient::from_config(&cfg)?;
    let compat = compatibility::HttpCompatibilityService::from_config(&cfg, client.clone())?;
    let searcher = search::HttpSearchService::from_config(&cfg, client)?;

    let events = events::EventBus::new(EVENT_CAPACITY);
    let prescriptions = Arc::new(prescription::PrescriptionStore::default());
    let search = search::SearchController::new(
        Arc::new(searcher),
        prescriptions.clone(),
        events.clone(),
        cfg.search_debounce,
    );
    let session = session::CatalogSession::new(
        tree,
        compatibility::CompatibilityResolver::new(Arc::new(compat)),
        search.clone(),
        events.clone(),
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        session: Arc::new(tokio::sync::Mutex::new(session)),
        prescriptions,
        search,
        events: events.clone(),
        status: Arc::new(Mutex::new(Status::ready())),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };
    app_state::spawn_status_mirror(&events, app_state.status.clone());
    app_state.session.lock().await.start();

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new(&cfg.frontend_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);
    info!("Backend del catálogo: {}", cfg.catalog_base_url);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
