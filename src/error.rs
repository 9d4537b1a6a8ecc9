//! Errores tipados del motor. La capa de aplicación usa `anyhow` por encima de estos.

use thiserror::Error;

/// Errores estructurales de navegación (ids o niveles mal formados).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Nodo no encontrado entre los hijos del nivel actual: {0}")]
    NodeNotFound(String),
    #[error("Nivel {index} fuera de rango (profundidad actual {depth})")]
    InvalidLevel { index: usize, depth: usize },
    #[error("No se puede retroceder: ya se está en la raíz")]
    AtRoot,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catálogo con formato inválido: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Id duplicado en el catálogo: {0}")]
    DuplicateId(String),
    #[error("El nodo raíz del catálogo debe ser de tipo 'root'")]
    MissingRoot,
}

/// Fallos de los servicios remotos (compatibilidad y búsqueda).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Error de transporte: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("El servicio respondió con estado HTTP {0}")]
    Status(u16),
    #[error("Respuesta con formato inválido: {0}")]
    Decode(String),
}

/// Precondición de la búsqueda: sin receta no hay nada que buscar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("No hay receta con valores distintos de cero")]
    NoPrescription,
}
