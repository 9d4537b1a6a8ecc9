//! Carga y gestión de configuración de la aplicación (backend del catálogo + servidor).

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog_base_url: Url,
    pub server_addr: String,
    pub frontend_dir: String,

    pub search_debounce: Duration,
    pub request_timeout: Duration,

    pub search_endpoint: String,
    pub treatments_endpoint: String,
    pub coloring_endpoint: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let base = env::var("CATALOG_BASE_URL")
            .map_err(|_| anyhow!("Falta CATALOG_BASE_URL en el entorno"))?;
        let catalog_base_url = parse_base_url(&base)?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());
        let frontend_dir = env::var("FRONTEND_DIR").unwrap_or_else(|_| "frontend".to_string());

        let search_debounce = Duration::from_millis(parse_number("SEARCH_DEBOUNCE_MS", 300)?);
        let request_timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", 30)?);

        let search_endpoint =
            env::var("SEARCH_ENDPOINT").unwrap_or_else(|_| "SelecaoLentes".to_string());
        let treatments_endpoint = env::var("TREATMENTS_ENDPOINT")
            .unwrap_or_else(|_| "TratamentosCompativeis".to_string());
        let coloring_endpoint =
            env::var("COLORING_ENDPOINT").unwrap_or_else(|_| "VerificaColoracao".to_string());

        Ok(Self {
            catalog_base_url,
            server_addr,
            frontend_dir,
            search_debounce,
            request_timeout,
            search_endpoint,
            treatments_endpoint,
            coloring_endpoint,
        })
    }

    /// URL absoluta de un endpoint relativo a la base del catálogo.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.catalog_base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| anyhow!("Endpoint inválido '{path}': {e}"))
    }
}

/// La base siempre termina en '/' para que `join` conserve el contexto de la aplicación.
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| anyhow!("CATALOG_BASE_URL inválida ({raw}): {e}"))
}

fn parse_number(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{var} debe ser un entero positivo, recibido: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests(base: &str) -> Self {
        Self {
            catalog_base_url: parse_base_url(base).expect("url de prueba"),
            server_addr: "127.0.0.1:0".to_string(),
            frontend_dir: "frontend".to_string(),
            search_debounce: Duration::from_millis(300),
            request_timeout: Duration::from_secs(30),
            search_endpoint: "SelecaoLentes".to_string(),
            treatments_endpoint: "TratamentosCompativeis".to_string(),
            coloring_endpoint: "VerificaColoracao".to_string(),
        }
    }
}
