//! Receta óptica: la provee un colaborador externo (el formulario de receta).

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Prescription {
    pub right_sphere: f64,
    pub right_cylinder: f64,
    pub right_axis: f64,
    pub right_addition: f64,
    pub left_sphere: f64,
    pub left_cylinder: f64,
    pub left_axis: f64,
    pub left_addition: f64,
}

impl Prescription {
    /// Campos en el orden y con los nombres del formulario de búsqueda.
    pub fn fields(&self) -> [(&'static str, f64); 8] {
        [
            ("rod_esf", self.right_sphere),
            ("rod_cil", self.right_cylinder),
            ("rod_eixo", self.right_axis),
            ("rod_adicao", self.right_addition),
            ("roe_esf", self.left_sphere),
            ("roe_cil", self.left_cylinder),
            ("roe_eixo", self.left_axis),
            ("roe_adicao", self.left_addition),
        ]
    }

    /// Una receta con todos los campos a cero equivale a "sin receta".
    pub fn has_values(&self) -> bool {
        self.fields().iter().any(|(_, v)| *v != 0.0)
    }
}

pub trait PrescriptionProvider: Send + Sync {
    fn current_prescription(&self) -> Prescription;
}

/// Receta guardada en memoria por la superficie de presentación.
#[derive(Debug, Default)]
pub struct PrescriptionStore {
    current: RwLock<Prescription>,
}

impl PrescriptionStore {
    pub fn save(&self, prescription: Prescription) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = prescription;
    }

    pub fn clear(&self) {
        self.save(Prescription::default());
    }
}

impl PrescriptionProvider for PrescriptionStore {
    fn current_prescription(&self) -> Prescription {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_is_no_prescription() {
        assert!(!Prescription::default().has_values());
        let axis_only = Prescription {
            left_axis: 90.0,
            ..Default::default()
        };
        assert!(axis_only.has_values());
    }

    #[test]
    fn partial_json_defaults_to_zero() {
        let p: Prescription = serde_json::from_str(r#"{"rightSphere": -2.25}"#).unwrap();
        assert_eq!(p.right_sphere, -2.25);
        assert_eq!(p.left_addition, 0.0);
    }

    #[test]
    fn store_save_and_clear() {
        let store = PrescriptionStore::default();
        store.save(Prescription {
            right_sphere: -1.0,
            ..Default::default()
        });
        assert!(store.current_prescription().has_values());
        store.clear();
        assert!(!store.current_prescription().has_values());
    }
}
