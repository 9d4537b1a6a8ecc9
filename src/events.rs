//! Eventos del motor publicados hacia la superficie de presentación.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{AttributeKey, Breadcrumb, ContextKey, NodeCard, OptionRecord, SelectedProduct};
use crate::search::Variant;
use crate::selection::ActiveSelection;

/// Datos comunes de todos los eventos de navegación.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationPayload {
    pub node: NodeCard,
    pub is_root: bool,
    pub breadcrumbs: Vec<Breadcrumb>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    // --- Navegación ---
    Navigated(NavigationPayload),
    WentBack(NavigationPayload),
    WentHome(NavigationPayload),
    Jumped(NavigationPayload),
    /// El nivel actual no ofrece resultados (p. ej. coloración no permitida).
    CounterUpdated { count: usize },

    // --- Selección ---
    #[serde(rename_all = "camelCase")]
    FilterAdded { key: AttributeKey, option: OptionRecord },
    #[serde(rename_all = "camelCase")]
    FilterRemoved { key: AttributeKey, option_id: String },
    ContextRemoved { key: ContextKey },
    ProductAdded { product: SelectedProduct },
    ProductRemoved { brand: String },
    SelectionsCleared,
    #[serde(rename_all = "camelCase")]
    SelectionChanged {
        active: Vec<ActiveSelection>,
        products: Vec<SelectedProduct>,
    },

    // --- Búsqueda ---
    SearchStarted { generation: u64 },
    SearchCompleted { results: Vec<Variant>, count: usize },
    SearchFailed { error: String },
    NoPrescription,
}

impl EngineEvent {
    pub fn is_search_event(&self) -> bool {
        matches!(
            self,
            Self::SearchStarted { .. }
                | Self::SearchCompleted { .. }
                | Self::SearchFailed { .. }
                | Self::NoPrescription
        )
    }
}

/// Canal de difusión de eventos. Clonarlo comparte el mismo canal.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        // Sin suscriptores el evento simplemente se descarta.
        if self.tx.send(event).is_err() {
            debug!("Evento emitido sin suscriptores");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

/// Vacía lo pendiente en un receptor sin esperar.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => events.push(ev),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                debug!("Receptor de eventos retrasado, {n} eventos perdidos");
            }
            Err(_) => break,
        }
    }
    events
}
