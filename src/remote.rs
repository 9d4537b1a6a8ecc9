//! Cliente HTTP compartido para el backend del catálogo.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;
use crate::error::ServiceError;

/// Cliente común de los servicios remotos, con el timeout de la configuración.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
}

impl CatalogClient {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("No se pudo crear el cliente HTTP: {e}"))?;
        Ok(Self { http })
    }

    /// GET con parámetros de consulta; la respuesta se decodifica como JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        params: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        debug!("GET {url} {params:?}");
        let response = self.http.get(url.clone()).query(params).send().await?;
        decode(response).await
    }

    /// POST `application/x-www-form-urlencoded`. Los campos pueden repetirse.
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        fields: &[(String, String)],
    ) -> Result<T, ServiceError> {
        debug!("POST {url} ({} campos)", fields.len());
        let response = self.http.post(url.clone()).form(fields).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        ServiceError::Decode(format!("{e} (respuesta: '{preview}')"))
    })
}
