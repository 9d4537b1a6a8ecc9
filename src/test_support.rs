//! Dobles de prueba de los servicios remotos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::compatibility::{CompatibilityResponse, CompatibilityService, NamedEntry, RelationKind};
use crate::error::ServiceError;
use crate::search::{SearchRequest, SearchService};

fn entries(names: &[&str]) -> Option<Vec<NamedEntry>> {
    Some(names.iter().map(|n| NamedEntry { name: n.to_string() }).collect())
}

/// Servicio de compatibilidad con respuestas fijas por clave.
#[derive(Default)]
pub struct FakeCompatibility {
    responses: HashMap<String, CompatibilityResponse>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl FakeCompatibility {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, relation: RelationKind, value: &str, response: CompatibilityResponse) -> Self {
        self.responses.insert(relation.cache_key(value), response);
        self
    }

    pub fn with_treatments(self, family: &str, names: &[&str]) -> Self {
        let response = CompatibilityResponse {
            treatments: entries(names),
            ..Default::default()
        };
        self.with(RelationKind::TreatmentsForFamily, family, response)
    }

    pub fn with_families_for_treatment(self, treatment: &str, names: &[&str]) -> Self {
        let response = CompatibilityResponse {
            families: entries(names),
            ..Default::default()
        };
        self.with(RelationKind::FamiliesForTreatment, treatment, response)
    }

    pub fn with_coloring_family(self, family: &str, permits: bool) -> Self {
        let response = CompatibilityResponse {
            permits_coloring: Some(permits),
            ..Default::default()
        };
        self.with(RelationKind::ColoringForFamily, family, response)
    }

    pub fn with_coloring_brand(self, brand: &str, permits: bool) -> Self {
        let response = CompatibilityResponse {
            permits_coloring: Some(permits),
            ..Default::default()
        };
        self.with(RelationKind::ColoringForBrand, brand, response)
    }

    pub fn with_colorable_families(self, names: &[&str]) -> Self {
        let response = CompatibilityResponse {
            families: entries(names),
            ..Default::default()
        };
        self.with(RelationKind::ColorableFamilies, "", response)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompatibilityService for FakeCompatibility {
    async fn lookup(
        &self,
        relation: RelationKind,
        value: &str,
    ) -> Result<CompatibilityResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ServiceError::Status(500));
        }
        Ok(self
            .responses
            .get(&relation.cache_key(value))
            .cloned()
            .unwrap_or_default())
    }
}

/// Servicio de búsqueda con respuestas encoladas (retardo, resultado) y una por defecto.
pub struct FakeSearch {
    default: Value,
    script: Mutex<VecDeque<(Duration, Result<Value, u16>)>>,
    requests: Mutex<Vec<SearchRequest>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new(default: Value) -> Self {
        Self {
            default,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, delay: Duration, result: Result<Value, u16>) {
        self.script.lock().unwrap().push_back((delay, result));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Map<String, Value>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(self.default.clone())));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match result {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ServiceError::Decode(format!("no es un objeto: {other}"))),
            Err(status) => Err(ServiceError::Status(status)),
        }
    }
}
