//! Búsqueda en el catálogo remoto.
//!
//! Flujo:
//!   1. Cada cambio de selección dispara `execute()` con una copia de la selección.
//!   2. El disparo espera el retardo de debounce; si llega otro disparo antes, éste se abandona.
//!   3. Se lee la receta actual; sin receta se emite `NoPrescription` y no hay petición.
//!   4. Se construye el formulario y se envía.
//!   5. La respuesta anidada marca → código → {OD, OE} se aplana en variantes.
//!   6. Una respuesta sólo se aplica si no se ha enviado otra búsqueda más reciente.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::{PayloadError, ServiceError};
use crate::events::{EngineEvent, EventBus};
use crate::models::{AttributeKey, ContextKey};
use crate::prescription::{Prescription, PrescriptionProvider};
use crate::remote::CatalogClient;
use crate::selection::SelectionState;

const COLORING_KIND_FIELD: &str = "coloracaoTipo";

// --- Construcción del formulario ---

/// Lista plana campo → valor; un campo puede repetirse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    fields: Vec<(String, String)>,
}

impl SearchRequest {
    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[cfg(test)]
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }
}

/// Serializa selección + receta en un único formulario.
pub fn build_payload(
    selection: &SelectionState,
    prescription: &Prescription,
) -> Result<SearchRequest, PayloadError> {
    if !prescription.has_values() {
        return Err(PayloadError::NoPrescription);
    }

    let mut request = SearchRequest::default();
    for (name, value) in prescription.fields() {
        request.push(name, format_number(value));
    }

    // El tipo de visión viaja por id; familia y marca por etiqueta.
    if let Some(vision) = selection.single(ContextKey::VisionType) {
        request.push(ContextKey::VisionType.field_name(), vision.id.as_str());
    }
    for key in [ContextKey::Family, ContextKey::Brand] {
        if let Some(option) = selection.single(key) {
            request.push(key.field_name(), option.label.as_str());
        }
    }
    for product in selection.products() {
        request.push(ContextKey::Brand.field_name(), product.brand.as_str());
    }

    for key in AttributeKey::ALL {
        for option in selection.attribute(key) {
            request.push(key.field_name(), option.label.as_str());
            if key == AttributeKey::Coloring {
                if let Some(kind) = option.coloring_kind {
                    request.push(COLORING_KIND_FIELD, kind.as_str());
                }
            }
        }
    }

    Ok(request)
}

fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

// --- Respuesta ---

/// Listas de opciones por ojo tal como llegan del catálogo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSides {
    #[serde(default, rename = "OD", alias = "rightEyeOptions")]
    pub right: Vec<Value>,
    #[serde(default, rename = "OE", alias = "leftEyeOptions")]
    pub left: Vec<Value>,
}

/// Variante comercializable aplanada.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub brand_label: String,
    pub variant_code: String,
    pub right_eye_option: Option<Value>,
    pub left_eye_option: Option<Value>,
    pub has_right: bool,
    pub has_left: bool,
    pub raw_by_side: RawSides,
}

/// Aplana `{marca: {código: {OD, OE}}}` manteniendo el orden de la respuesta.
pub fn flatten_response(response: &Map<String, Value>) -> Vec<Variant> {
    let mut variants = Vec::new();
    for (brand, codes) in response {
        let Some(codes) = codes.as_object() else {
            warn!("Marca '{brand}' con formato inesperado en la respuesta del catálogo");
            continue;
        };
        for (code, sides) in codes {
            let raw: RawSides = match serde_json::from_value(sides.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Variante '{brand}/{code}' ignorada: {e}");
                    continue;
                }
            };
            if raw.right.is_empty() && raw.left.is_empty() {
                continue;
            }
            variants.push(Variant {
                brand_label: brand.clone(),
                variant_code: code.clone(),
                right_eye_option: raw.right.first().or(raw.left.first()).cloned(),
                left_eye_option: raw.left.first().or(raw.right.first()).cloned(),
                has_right: !raw.right.is_empty(),
                has_left: !raw.left.is_empty(),
                raw_by_side: raw,
            });
        }
    }
    variants
}

// --- Servicio remoto ---

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Map<String, Value>, ServiceError>;
}

pub struct HttpSearchService {
    client: CatalogClient,
    url: Url,
}

impl HttpSearchService {
    pub fn from_config(cfg: &AppConfig, client: CatalogClient) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            url: cfg.endpoint(&cfg.search_endpoint)?,
        })
    }
}

#[async_trait]
impl SearchService for HttpSearchService {
    async fn search(&self, request: &SearchRequest) -> Result<Map<String, Value>, ServiceError> {
        self.client.post_form_json(&self.url, request.fields()).await
    }
}

// --- Controlador ---

/// Último resultado aplicado.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub generation: u64,
    pub results: Vec<Variant>,
    pub count: usize,
    pub no_prescription: bool,
    pub completed_at: Option<String>,
}

struct SearchInner {
    service: Arc<dyn SearchService>,
    prescriptions: Arc<dyn PrescriptionProvider>,
    events: EventBus,
    debounce: Duration,
    /// Último disparo recibido.
    triggered: AtomicU64,
    /// Última búsqueda enviada (o invalidación).
    dispatched: AtomicU64,
    last: Mutex<SearchOutcome>,
}

impl SearchInner {
    fn last(&self) -> MutexGuard<'_, SearchOutcome> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct SearchController {
    inner: Arc<SearchInner>,
}

impl SearchController {
    pub fn new(
        service: Arc<dyn SearchService>,
        prescriptions: Arc<dyn PrescriptionProvider>,
        events: EventBus,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SearchInner {
                service,
                prescriptions,
                events,
                debounce,
                triggered: AtomicU64::new(0),
                dispatched: AtomicU64::new(0),
                last: Mutex::new(SearchOutcome::default()),
            }),
        }
    }

    /// Programa una búsqueda con debounce. Un disparo posterior anula éste
    /// si aún no ha vencido el retardo.
    pub fn execute(&self, selection: SelectionState) -> JoinHandle<()> {
        let generation = self.inner.triggered.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if inner.triggered.load(Ordering::SeqCst) != generation {
                debug!("Búsqueda {generation} reemplazada antes de enviarse");
                return;
            }
            run(&inner, generation, &selection).await;
        })
    }

    /// Descarta resultados (receta borrada): anula lo pendiente y lo que esté en vuelo.
    pub fn reset_results(&self) {
        let generation = self.inner.triggered.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.dispatched.fetch_max(generation, Ordering::SeqCst);
        *self.inner.last() = SearchOutcome {
            generation,
            completed_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        };
        self.inner.events.emit(EngineEvent::SearchCompleted {
            results: Vec::new(),
            count: 0,
        });
    }

    pub fn last_result(&self) -> SearchOutcome {
        self.inner.last().clone()
    }
}

async fn run(inner: &SearchInner, generation: u64, selection: &SelectionState) {
    let prescription = inner.prescriptions.current_prescription();
    let request = match build_payload(selection, &prescription) {
        Ok(request) => request,
        Err(PayloadError::NoPrescription) => {
            info!("Búsqueda omitida: no hay receta");
            // Cuenta como enviada: invalida cualquier búsqueda anterior aún en vuelo.
            inner.dispatched.fetch_max(generation, Ordering::SeqCst);
            *inner.last() = SearchOutcome {
                generation,
                no_prescription: true,
                completed_at: Some(Utc::now().to_rfc3339()),
                ..Default::default()
            };
            inner.events.emit(EngineEvent::NoPrescription);
            return;
        }
    };

    inner.dispatched.fetch_max(generation, Ordering::SeqCst);
    inner.events.emit(EngineEvent::SearchStarted { generation });
    info!("Buscando en el catálogo (búsqueda {generation}, {} campos)", request.fields().len());

    let result = inner.service.search(&request).await;

    if inner.dispatched.load(Ordering::SeqCst) > generation {
        debug!("Resultado de la búsqueda {generation} descartado: hay otra más reciente");
        return;
    }

    match result {
        Ok(raw) => {
            let results = flatten_response(&raw);
            let count = results.len();
            info!("Búsqueda {generation} completada: {count} variantes");
            *inner.last() = SearchOutcome {
                generation,
                results: results.clone(),
                count,
                no_prescription: false,
                completed_at: Some(Utc::now().to_rfc3339()),
            };
            inner.events.emit(EngineEvent::SearchCompleted { results, count });
        }
        Err(e) => {
            error!("Error en la búsqueda {generation}: {e}");
            inner.events.emit(EngineEvent::SearchFailed {
                error: e.to_string(),
            });
        }
    }
}
