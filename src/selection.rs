//! Estado de selección en tres capas:
//! contexto (univaluado), atributos (multivaluados) y productos concretos.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{AttributeKey, ContextKey, OptionRecord, SelectedProduct};

/// Copia independiente de las tres claves de contexto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    values: BTreeMap<ContextKey, OptionRecord>,
}

impl ContextSnapshot {
    #[cfg(test)]
    pub fn get(&self, key: ContextKey) -> Option<&OptionRecord> {
        self.values.get(&key)
    }
}

/// Selección activa en forma plana (para la barra de filtros de la interfaz).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSelection {
    pub key: String,
    pub option: OptionRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    single: BTreeMap<ContextKey, OptionRecord>,
    multiple: BTreeMap<AttributeKey, Vec<OptionRecord>>,
    products: Vec<SelectedProduct>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Contexto ---

    /// Fija una clave de contexto, sobrescribiendo el valor anterior.
    pub fn set_single(&mut self, key: ContextKey, option: OptionRecord) {
        self.single.insert(key, option);
    }

    pub fn clear_single(&mut self, key: ContextKey) -> Option<OptionRecord> {
        self.single.remove(&key)
    }

    pub fn single(&self, key: ContextKey) -> Option<&OptionRecord> {
        self.single.get(&key)
    }

    pub fn clear_context(&mut self) {
        self.single.clear();
    }

    /// Elimina una clave de contexto y las que dependen de ella
    /// (tipo de visión → marca → familia).
    pub fn remove_context_cascade(&mut self, key: ContextKey) {
        for k in ContextKey::ALL.into_iter().filter(|k| k.level() >= key.level()) {
            self.clear_single(k);
        }
    }

    pub fn context_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            values: self.single.clone(),
        }
    }

    pub fn restore_context(&mut self, snapshot: &ContextSnapshot) {
        self.single = snapshot.values.clone();
    }

    // --- Atributos ---

    /// Alterna una opción por id. Devuelve `true` si queda seleccionada.
    pub fn toggle_multiple(&mut self, key: AttributeKey, option: OptionRecord) -> bool {
        let set = self.multiple.entry(key).or_default();
        if let Some(pos) = set.iter().position(|o| o.id == option.id) {
            set.remove(pos);
            if set.is_empty() {
                self.multiple.remove(&key);
            }
            false
        } else {
            set.push(option);
            true
        }
    }

    pub fn remove_multiple(&mut self, key: AttributeKey, id: &str) -> bool {
        let Some(set) = self.multiple.get_mut(&key) else {
            return false;
        };
        let before = set.len();
        set.retain(|o| o.id != id);
        let removed = set.len() != before;
        if set.is_empty() {
            self.multiple.remove(&key);
        }
        removed
    }

    pub fn attribute(&self, key: AttributeKey) -> &[OptionRecord] {
        self.multiple.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Primera opción elegida de un atributo (la que usan los filtros de compatibilidad).
    pub fn first_attribute(&self, key: AttributeKey) -> Option<&OptionRecord> {
        self.attribute(key).first()
    }

    // --- Productos ---

    /// Alterna un producto por su identidad de marca. Devuelve `true` si queda añadido.
    pub fn toggle_product(&mut self, product: SelectedProduct) -> bool {
        if self.remove_product(&product.brand) {
            false
        } else {
            self.products.push(product);
            true
        }
    }

    pub fn remove_product(&mut self, brand: &str) -> bool {
        let before = self.products.len();
        self.products.retain(|p| p.brand != brand);
        self.products.len() != before
    }

    pub fn products(&self) -> &[SelectedProduct] {
        &self.products
    }

    pub fn clear_products(&mut self) {
        self.products.clear();
    }

    // --- Global ---

    /// Vacía contexto y atributos. Los productos se mantienen.
    pub fn clear_all_selections(&mut self) {
        self.single.clear();
        self.multiple.clear();
    }

    /// Copia profunda del estado completo.
    pub fn snapshot(&self) -> SelectionState {
        self.clone()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.single.is_empty() && self.multiple.is_empty() && self.products.is_empty()
    }

    /// Contexto y atributos en orden estable.
    pub fn active_selections(&self) -> Vec<ActiveSelection> {
        let context = self.single.iter().map(|(k, o)| ActiveSelection {
            key: k.field_name().to_string(),
            option: o.clone(),
        });
        let attributes = self.multiple.iter().flat_map(|(k, set)| {
            set.iter().map(move |o| ActiveSelection {
                key: k.field_name().to_string(),
                option: o.clone(),
            })
        });
        context.chain(attributes).collect()
    }
}
