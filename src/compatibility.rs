//! Resolución de compatibilidades contra el servicio remoto, con caché por contexto.
//!
//! - Cada consulta se identifica por `(relación, valor de contexto)`; la clave de caché
//!   es `"{relación}:{valor}"`.
//! - Como mucho hay una petición en vuelo por clave: las llamadas concurrentes esperan
//!   el mismo futuro compartido.
//! - `clear()` vacía la caché de golpe y avanza la generación; lo que llegue después
//!   de una generación anterior se descarta.
//! - Cualquier fallo remoto equivale a "sin restricción".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::remote::CatalogClient;

/// Tipo de relación consultada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Tratamientos anti-reflejo permitidos para una familia.
    TreatmentsForFamily,
    /// Familias permitidas para un tratamiento anti-reflejo.
    FamiliesForTreatment,
    /// ¿La familia admite coloración?
    ColoringForFamily,
    /// ¿La marca admite coloración?
    ColoringForBrand,
    /// Marcas de una familia que admiten coloración.
    ColorableBrandsForFamily,
    /// Familias que admiten coloración (sin valor de contexto).
    ColorableFamilies,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TreatmentsForFamily => "antiReflective-for-family",
            Self::FamiliesForTreatment => "family-for-antiReflective",
            Self::ColoringForFamily => "coloring-for-family",
            Self::ColoringForBrand => "coloring-for-brand",
            Self::ColorableBrandsForFamily => "colorable-brands-for-family",
            Self::ColorableFamilies => "colorable-families",
        }
    }

    pub fn cache_key(self, value: &str) -> String {
        format!("{}:{}", self.as_str(), value)
    }
}

/// Resultado resuelto: lista de nombres permitidos o permiso booleano.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Names(Vec<String>),
    Permits(bool),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NamedEntry {
    #[serde(rename = "nome", alias = "name")]
    pub name: String,
}

/// Respuesta del servicio. Los campos presentes dependen de la consulta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompatibilityResponse {
    #[serde(default, rename = "tratamentos", alias = "treatments")]
    pub treatments: Option<Vec<NamedEntry>>,
    #[serde(default, rename = "familias", alias = "families")]
    pub families: Option<Vec<NamedEntry>>,
    #[serde(default, rename = "marcas", alias = "brands")]
    pub brands: Option<Vec<NamedEntry>>,
    #[serde(default, rename = "permiteColorir", alias = "permitsColoring")]
    pub permits_coloring: Option<bool>,
}

impl CompatibilityResponse {
    /// Extrae el campo relevante para la relación. `None` si no viene.
    pub fn extract(self, relation: RelationKind) -> Option<Compatibility> {
        let names = |list: Option<Vec<NamedEntry>>| {
            list.map(|l| Compatibility::Names(l.into_iter().map(|e| e.name).collect()))
        };
        match relation {
            RelationKind::TreatmentsForFamily => names(self.treatments),
            RelationKind::FamiliesForTreatment | RelationKind::ColorableFamilies => {
                names(self.families)
            }
            RelationKind::ColorableBrandsForFamily => names(self.brands),
            RelationKind::ColoringForFamily | RelationKind::ColoringForBrand => {
                self.permits_coloring.map(Compatibility::Permits)
            }
        }
    }
}

#[async_trait]
pub trait CompatibilityService: Send + Sync {
    async fn lookup(
        &self,
        relation: RelationKind,
        value: &str,
    ) -> Result<CompatibilityResponse, ServiceError>;
}

/// Implementación HTTP sobre los endpoints de tratamientos y de coloración.
pub struct HttpCompatibilityService {
    client: CatalogClient,
    treatments_url: Url,
    coloring_url: Url,
}

impl HttpCompatibilityService {
    pub fn from_config(cfg: &AppConfig, client: CatalogClient) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            treatments_url: cfg.endpoint(&cfg.treatments_endpoint)?,
            coloring_url: cfg.endpoint(&cfg.coloring_endpoint)?,
        })
    }
}

#[async_trait]
impl CompatibilityService for HttpCompatibilityService {
    async fn lookup(
        &self,
        relation: RelationKind,
        value: &str,
    ) -> Result<CompatibilityResponse, ServiceError> {
        let (url, params): (&Url, Vec<(&str, &str)>) = match relation {
            RelationKind::TreatmentsForFamily => (&self.treatments_url, vec![("familia", value)]),
            RelationKind::FamiliesForTreatment => {
                (&self.treatments_url, vec![("tratamento", value)])
            }
            RelationKind::ColoringForFamily => (&self.coloring_url, vec![("familia", value)]),
            RelationKind::ColoringForBrand => (&self.coloring_url, vec![("marca", value)]),
            RelationKind::ColorableBrandsForFamily => {
                (&self.coloring_url, vec![("marcasDaFamilia", value)])
            }
            RelationKind::ColorableFamilies => (&self.coloring_url, vec![]),
        };
        self.client.get_json(url, &params).await
    }
}

type PendingLookup = Shared<BoxFuture<'static, Option<Compatibility>>>;

#[derive(Default)]
struct FilterCache {
    entries: HashMap<String, Compatibility>,
    in_flight: HashMap<String, PendingLookup>,
    generation: u64,
}

/// Resolutor con caché propia. Clonarlo comparte caché y servicio.
#[derive(Clone)]
pub struct CompatibilityResolver {
    service: Arc<dyn CompatibilityService>,
    cache: Arc<Mutex<FilterCache>>,
}

impl CompatibilityResolver {
    pub fn new(service: Arc<dyn CompatibilityService>) -> Self {
        Self {
            service,
            cache: Arc::new(Mutex::new(FilterCache::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FilterCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resuelve una relación. `None` significa "no filtrar".
    pub async fn resolve(&self, relation: RelationKind, value: &str) -> Option<Compatibility> {
        let key = relation.cache_key(value);

        let (pending, generation) = {
            let mut cache = self.lock();
            if let Some(hit) = cache.entries.get(&key) {
                debug!("Compatibilidad en caché: {key}");
                return Some(hit.clone());
            }
            let generation = cache.generation;
            let pending = match cache.in_flight.get(&key) {
                Some(p) => p.clone(),
                None => {
                    let p = self.start_lookup(relation, value.to_string());
                    cache.in_flight.insert(key.clone(), p.clone());
                    p
                }
            };
            (pending, generation)
        };

        let result = pending.clone().await;

        let mut cache = self.lock();
        if cache.generation != generation {
            debug!("Resolución obsoleta descartada: {key}");
            return None;
        }
        // Sólo se retira la petición que se esperó, no una posterior para la misma clave.
        if cache
            .in_flight
            .get(&key)
            .is_some_and(|p| p.ptr_eq(&pending))
        {
            cache.in_flight.remove(&key);
        }
        if let Some(r) = &result {
            cache.entries.insert(key, r.clone());
        }
        result
    }

    fn start_lookup(&self, relation: RelationKind, value: String) -> PendingLookup {
        let service = Arc::clone(&self.service);
        async move {
            match service.lookup(relation, &value).await {
                Ok(response) => {
                    let resolved = response.extract(relation);
                    if resolved.is_none() {
                        warn!(
                            "Respuesta de compatibilidad sin el campo esperado para {}",
                            relation.cache_key(&value)
                        );
                    }
                    resolved
                }
                Err(e) => {
                    warn!(
                        "Fallo consultando compatibilidad {}: {e}. Se muestran todas las opciones.",
                        relation.cache_key(&value)
                    );
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Vacía la caché completa y deja obsoletas las peticiones en vuelo.
    pub fn clear(&self) {
        let mut cache = self.lock();
        cache.entries.clear();
        cache.in_flight.clear();
        cache.generation += 1;
        debug!("Caché de compatibilidades vaciada (generación {})", cache.generation);
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.lock().entries.len()
    }
}
