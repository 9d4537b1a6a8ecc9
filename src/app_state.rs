use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::{
    config::AppConfig, events::EngineEvent, events::EventBus, prescription::PrescriptionStore,
    search::SearchController, session::CatalogSession,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Una única sesión de selección; las operaciones se serializan.
    pub session: Arc<tokio::sync::Mutex<CatalogSession>>,
    pub prescriptions: Arc<PrescriptionStore>,
    pub search: SearchController,
    pub events: EventBus,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub last_count: usize,
    pub updated_at: Option<String>,
}

impl Status {
    pub fn ready() -> Self {
        Self {
            message: "Servidor listo.".to_string(),
            ..Default::default()
        }
    }

    /// Refleja un evento de búsqueda en el estado visible.
    pub fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::SearchStarted { generation } => {
                self.is_busy = true;
                self.message = format!("Buscando lentes (búsqueda {generation})...");
            }
            EngineEvent::SearchCompleted { count, .. } => {
                self.is_busy = false;
                self.last_count = *count;
                self.message = format!("{count} variantes encontradas.");
            }
            EngineEvent::SearchFailed { error } => {
                self.is_busy = false;
                self.message = format!("Error en la búsqueda: {error}");
            }
            EngineEvent::NoPrescription => {
                self.is_busy = false;
                self.last_count = 0;
                self.message = "Introduzca una receta para ver resultados.".to_string();
            }
            _ => return,
        }
        self.updated_at = Some(Utc::now().to_rfc3339());
    }
}

/// Tarea de fondo que copia los eventos de búsqueda en `Status`.
pub fn spawn_status_mirror(events: &EventBus, status: Arc<Mutex<Status>>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.is_search_event() => {
                    if let Ok(mut status) = status.lock() {
                        status.apply(&event);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Estado retrasado respecto a los eventos: {n} perdidos");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Canal de eventos cerrado, fin del espejo de estado");
                    break;
                }
            }
        }
    });
}
