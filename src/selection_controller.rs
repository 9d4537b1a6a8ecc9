//! Controlador de selección: clasifica el clic (atributo o producto), alterna la
//! selección y deriva el contexto (tipo de visión, familia, marca) de cada producto.

use tracing::{debug, info};

use crate::events::{EngineEvent, EventBus};
use crate::models::{ContextKey, NavigationNode, NodeKind, SelectedProduct, SelectionKey};
use crate::navigation::NavigationPath;
use crate::selection::SelectionState;

#[derive(Debug, Clone)]
pub struct SelectionController {
    events: EventBus,
}

impl SelectionController {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Alterna una opción de atributo. `None` si el nodo no pertenece a ninguna categoría.
    pub fn toggle_attribute(
        &self,
        node: &NavigationNode,
        selection: &mut SelectionState,
    ) -> Option<bool> {
        let Some(key) = node.attribute_category else {
            debug!("Opción '{}' sin categoría de atributo: se ignora", node.id);
            return None;
        };

        let option = node.option_record();
        let added = selection.toggle_multiple(key, option.clone());
        self.events.emit(if added {
            EngineEvent::FilterAdded { key, option }
        } else {
            EngineEvent::FilterRemoved {
                key,
                option_id: option.id,
            }
        });
        self.changed(selection);
        Some(added)
    }

    /// Alterna un producto concreto elegido en el nivel actual.
    pub fn toggle_product(
        &self,
        item: &NavigationNode,
        path: &NavigationPath,
        selection: &mut SelectionState,
    ) -> bool {
        let current = path.current();
        let product = SelectedProduct {
            vision_type: vision_type(path, selection),
            family: item
                .family_override
                .clone()
                .or_else(|| derived_family(current, selection)),
            brand: brand_identity(item, current),
            label: item.label.clone(),
            icon: item.icon.clone(),
            path: display_path(path),
        };

        let brand = product.brand.clone();
        let added = selection.toggle_product(product.clone());
        if added {
            info!("Producto añadido: {brand}");
            self.events.emit(EngineEvent::ProductAdded { product });
        } else {
            info!("Producto eliminado: {brand}");
            self.events.emit(EngineEvent::ProductRemoved { brand });
        }
        self.changed(selection);
        added
    }

    pub fn remove_product(&self, brand: &str, selection: &mut SelectionState) -> bool {
        let removed = selection.remove_product(brand);
        if removed {
            self.events.emit(EngineEvent::ProductRemoved {
                brand: brand.to_string(),
            });
            self.changed(selection);
        }
        removed
    }

    /// Quita un filtro. Las claves de contexto se eliminan en cascada.
    pub fn remove_filter(
        &self,
        key: SelectionKey,
        id: Option<&str>,
        selection: &mut SelectionState,
    ) -> bool {
        match key {
            SelectionKey::Attribute(key) => {
                let Some(id) = id else {
                    return false;
                };
                if !selection.remove_multiple(key, id) {
                    return false;
                }
                self.events.emit(EngineEvent::FilterRemoved {
                    key,
                    option_id: id.to_string(),
                });
            }
            SelectionKey::Context(key) => {
                if selection.single(key).is_none() {
                    return false;
                }
                selection.remove_context_cascade(key);
                self.events.emit(EngineEvent::ContextRemoved { key });
            }
        }
        self.changed(selection);
        true
    }

    pub fn clear_all(&self, selection: &mut SelectionState) {
        selection.clear_all_selections();
        selection.clear_products();
        self.events.emit(EngineEvent::SelectionsCleared);
        self.changed(selection);
    }

    /// Registra el contexto implícito al entrar en un nodo.
    pub fn register_navigation(&self, node: &NavigationNode, selection: &mut SelectionState) {
        if register_context(node, selection) {
            self.changed(selection);
        }
    }

    /// Reconstruye el contexto a partir de la cadena de nodos (raíz..=actual).
    pub fn rebuild_context(&self, chain: &[&NavigationNode], selection: &mut SelectionState) {
        let before = selection.context_snapshot();
        selection.clear_context();
        for node in chain {
            register_context(node, selection);
        }
        if selection.context_snapshot() != before {
            self.changed(selection);
        }
    }

    fn changed(&self, selection: &SelectionState) {
        self.events.emit(EngineEvent::SelectionChanged {
            active: selection.active_selections(),
            products: selection.products().to_vec(),
        });
    }
}

fn context_key_for(node: &NavigationNode) -> Option<ContextKey> {
    match node.kind {
        NodeKind::Category => Some(ContextKey::VisionType),
        NodeKind::Brand => Some(ContextKey::Brand),
        // Sólo las subcategorías que agrupan productos representan una familia.
        NodeKind::Subcategory
            if node.has_children()
                && node.children.iter().all(|c| c.kind == NodeKind::Product) =>
        {
            Some(ContextKey::Family)
        }
        _ => None,
    }
}

fn register_context(node: &NavigationNode, selection: &mut SelectionState) -> bool {
    match context_key_for(node) {
        Some(key) => {
            selection.set_single(key, node.option_record());
            true
        }
        None => false,
    }
}

/// Identidad de marca: campo explícito, o "marca del nivel + producto", o la etiqueta.
pub fn brand_identity(item: &NavigationNode, current: &NavigationNode) -> String {
    if let Some(brand) = &item.brand_override {
        return brand.clone();
    }
    if current.kind == NodeKind::Brand {
        return format!("{} {}", current.label, item.label).trim().to_string();
    }
    item.label.clone()
}

/// Tipo de visión: el nivel actual si es una categoría, la selección de contexto,
/// o la primera categoría en la cadena de navegación.
pub fn vision_type(path: &NavigationPath, selection: &SelectionState) -> Option<String> {
    let current = path.current();
    if current.kind == NodeKind::Category {
        return Some(current.id.clone());
    }
    if let Some(vision) = selection.single(ContextKey::VisionType) {
        return Some(vision.id.clone());
    }
    path.chain()
        .into_iter()
        .find(|n| n.kind == NodeKind::Category)
        .map(|n| n.id.clone())
}

fn derived_family(current: &NavigationNode, selection: &SelectionState) -> Option<String> {
    if let Some(family) = selection.single(ContextKey::Family) {
        return Some(family.label.clone());
    }
    if current.kind == NodeKind::Brand {
        return Some(current.label.clone());
    }
    selection.single(ContextKey::Brand).map(|b| b.label.clone())
}

fn display_path(path: &NavigationPath) -> String {
    path.chain()
        .into_iter()
        .filter(|n| n.kind != NodeKind::Root)
        .map(|n| n.label.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NavigationTree;
    use crate::events::drain;
    use crate::models::AttributeKey;
    use std::sync::Arc;

    fn setup() -> (SelectionController, NavigationPath, EventBus) {
        let bus = EventBus::new(64);
        let tree = Arc::new(NavigationTree::load_embedded().unwrap());
        (SelectionController::new(bus.clone()), NavigationPath::new(tree), bus)
    }

    fn node<'a>(path: &'a NavigationPath, id: &str) -> &'a NavigationNode {
        path.tree().find(id).unwrap()
    }

    #[test]
    fn attribute_toggle_on_then_off_emits_two_changes() {
        let (ctl, path, bus) = setup();
        let mut events = bus.subscribe();
        let mut s = SelectionState::new();
        let poli = node(&path, "material-policarbonato");

        assert_eq!(ctl.toggle_attribute(poli, &mut s), Some(true));
        assert_eq!(ctl.toggle_attribute(poli, &mut s), Some(false));
        assert!(s.attribute(AttributeKey::Material).is_empty());

        let changes = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::SelectionChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn option_without_category_is_ignored() {
        let (ctl, path, _) = setup();
        let mut s = SelectionState::new();
        assert_eq!(ctl.toggle_attribute(node(&path, "varilux"), &mut s), None);
        assert!(s.is_empty());
    }

    #[test]
    fn product_under_brand_combines_labels() {
        let (ctl, mut path, _) = setup();
        let mut s = SelectionState::new();
        path.descend_to("multifocal").unwrap();
        path.descend_to("varilux").unwrap();
        let item = node(&path, "varilux-physio").clone();

        assert!(ctl.toggle_product(&item, &path, &mut s));
        let p = &s.products()[0];
        assert_eq!(p.brand, "Varilux Physio");
        assert_eq!(p.family.as_deref(), Some("Varilux"));
        assert_eq!(p.vision_type.as_deref(), Some("multifocal"));
        assert_eq!(p.path, "Multifocal > Varilux");

        // El mismo producto otra vez lo desmarca.
        assert!(!ctl.toggle_product(&item, &path, &mut s));
        assert!(s.products().is_empty());
    }

    #[test]
    fn explicit_brand_and_family_win() {
        let (ctl, mut path, _) = setup();
        let mut s = SelectionState::new();
        path.descend_to("multifocal").unwrap();
        path.descend_to("multi-ultra").unwrap();
        let item = node(&path, "ultra-max-hd").clone();

        ctl.toggle_product(&item, &path, &mut s);
        let p = &s.products()[0];
        assert_eq!(p.brand, "Ultra Max HD");
        assert_eq!(p.family.as_deref(), Some("Ultra"));
    }

    #[test]
    fn navigation_registers_context() {
        let (ctl, path, _) = setup();
        let mut s = SelectionState::new();
        ctl.register_navigation(node(&path, "multifocal"), &mut s);
        ctl.register_navigation(node(&path, "varilux"), &mut s);
        ctl.register_navigation(node(&path, "longe-filtros"), &mut s);
        ctl.register_navigation(node(&path, "antiReflexo"), &mut s);

        assert_eq!(s.single(ContextKey::VisionType).unwrap().id, "multifocal");
        assert_eq!(s.single(ContextKey::Brand).unwrap().label, "Varilux");
        assert!(s.single(ContextKey::Family).is_none());
    }

    #[test]
    fn rebuild_context_follows_the_chain() {
        let (ctl, mut path, _) = setup();
        let mut s = SelectionState::new();
        s.set_single(ContextKey::Brand, node(&path, "hoya-multi").option_record());
        for id in ["longe", "longe-marcas", "longe-zeiss"] {
            path.descend_to(id).unwrap();
        }
        ctl.rebuild_context(&path.chain(), &mut s);
        assert_eq!(s.single(ContextKey::VisionType).unwrap().id, "longe");
        assert_eq!(s.single(ContextKey::Brand).unwrap().id, "longe-zeiss");

        path.ascend_to_level(1).unwrap();
        ctl.rebuild_context(&path.chain(), &mut s);
        assert!(s.single(ContextKey::Brand).is_none());
    }

    #[test]
    fn removing_vision_type_cascades() {
        let (ctl, path, bus) = setup();
        let mut events = bus.subscribe();
        let mut s = SelectionState::new();
        ctl.register_navigation(node(&path, "multifocal"), &mut s);
        ctl.register_navigation(node(&path, "varilux"), &mut s);

        assert!(ctl.remove_filter(SelectionKey::Context(ContextKey::VisionType), None, &mut s));
        assert!(s.single(ContextKey::Brand).is_none());
        assert!(drain(&mut events)
            .iter()
            .any(|e| *e == EngineEvent::ContextRemoved { key: ContextKey::VisionType }));
        assert!(!ctl.remove_filter(SelectionKey::Context(ContextKey::Brand), None, &mut s));
    }

    #[test]
    fn clear_all_drops_products_too() {
        let (ctl, mut path, _) = setup();
        let mut s = SelectionState::new();
        path.descend_to("perto").unwrap();
        let item = node(&path, "perto-leitura").clone();
        ctl.toggle_product(&item, &path, &mut s);
        ctl.toggle_attribute(node(&path, "indice-174"), &mut s);

        ctl.clear_all(&mut s);
        assert!(s.is_empty());
    }
}
