//! Sesión de selección: coordina navegación, selección y búsqueda igual que lo hace
//! el cliente interactivo (clic en tarjeta, retroceder, volver al inicio, receta...).

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::NavigationTree;
use crate::compatibility::CompatibilityResolver;
use crate::error::NavigationError;
use crate::events::EventBus;
use crate::models::{NodeKind, SelectedProduct, SelectionKey};
use crate::navigation_controller::{LevelView, NavigationController, SelectionMode};
use crate::search::SearchController;
use crate::selection::{ActiveSelection, SelectionState};
use crate::selection_controller::SelectionController;

/// Qué provocó un clic sobre una tarjeta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClickOutcome {
    Navigated,
    FilterToggled,
    FilterIgnored,
    ProductToggled,
}

/// Vista completa para la superficie de presentación.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub level: LevelView,
    pub active: Vec<ActiveSelection>,
    pub products: Vec<SelectedProduct>,
}

pub struct CatalogSession {
    selection: SelectionState,
    navigation: NavigationController,
    selector: SelectionController,
    search: SearchController,
}

impl CatalogSession {
    pub fn new(
        tree: Arc<NavigationTree>,
        resolver: CompatibilityResolver,
        search: SearchController,
        events: EventBus,
    ) -> Self {
        Self {
            selection: SelectionState::new(),
            navigation: NavigationController::new(tree, resolver, events.clone()),
            selector: SelectionController::new(events),
            search,
        }
    }

    #[cfg(test)]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            level: self.navigation.view().clone(),
            active: self.selection.active_selections(),
            products: self.selection.products().to_vec(),
        }
    }

    /// Arranque: búsqueda inicial amplia.
    pub fn start(&self) {
        info!("Sesión iniciada, lanzando búsqueda inicial");
        self.trigger_search();
    }

    /// Clic en una de las tarjetas visibles del nivel actual.
    pub async fn click(&mut self, id: &str) -> Result<ClickOutcome, NavigationError> {
        let current = self.navigation.current();
        let item = current
            .child(id)
            .ok_or_else(|| NavigationError::NodeNotFound(id.to_string()))?
            .clone();
        let mode = self.navigation.view().selection_mode;

        if item.kind == NodeKind::ConfigGroup
            || (mode == SelectionMode::Single && item.has_children())
        {
            self.descend(id).await?;
            return Ok(ClickOutcome::Navigated);
        }

        if mode == SelectionMode::Multiple || item.kind.is_configuration() {
            let outcome = match self.selector.toggle_attribute(&item, &mut self.selection) {
                Some(_) => ClickOutcome::FilterToggled,
                None => return Ok(ClickOutcome::FilterIgnored),
            };
            self.after_selection_change().await;
            return Ok(outcome);
        }

        self.selector
            .toggle_product(&item, self.navigation.path(), &mut self.selection);
        self.after_selection_change().await;
        Ok(ClickOutcome::ProductToggled)
    }

    pub async fn descend(&mut self, id: &str) -> Result<(), NavigationError> {
        self.navigation.descend_to(id, &self.selection).await?;
        let node = self.navigation.current().clone();
        self.selector.register_navigation(&node, &mut self.selection);
        self.trigger_search();
        Ok(())
    }

    pub async fn go_back(&mut self) -> Result<(), NavigationError> {
        self.navigation.go_back(&self.selection).await?;
        self.rebuild_context_and_search();
        Ok(())
    }

    pub async fn go_to_level(&mut self, index: usize) -> Result<(), NavigationError> {
        self.navigation.go_to_level(index, &self.selection).await?;
        self.rebuild_context_and_search();
        Ok(())
    }

    /// Inicio: se limpia todo y se repite la búsqueda inicial.
    pub async fn go_home(&mut self) {
        self.selector.clear_all(&mut self.selection);
        self.navigation.go_home(&self.selection).await;
        self.trigger_search();
    }

    pub async fn jump_to_configuration(&mut self, config_id: &str) -> Result<(), NavigationError> {
        self.navigation
            .jump_to_configuration(config_id, &mut self.selection)
            .await?;
        self.trigger_search();
        Ok(())
    }

    pub async fn jump_to_category(&mut self, category_id: &str) -> Result<(), NavigationError> {
        self.navigation
            .jump_to_category(category_id, &mut self.selection)
            .await?;
        let node = self.navigation.current().clone();
        self.selector.register_navigation(&node, &mut self.selection);
        self.trigger_search();
        Ok(())
    }

    /// Quita un filtro; si es de contexto se vuelve al nivel correspondiente.
    pub async fn remove_filter(&mut self, key: SelectionKey, id: Option<&str>) -> bool {
        if !self.selector.remove_filter(key, id, &mut self.selection) {
            return false;
        }

        match key {
            SelectionKey::Context(ctx) if ctx.level() == 0 => self.go_home().await,
            SelectionKey::Context(ctx) => {
                let moved = self
                    .navigation
                    .go_to_level(ctx.level(), &self.selection)
                    .await
                    .map(|_| ());
                match moved {
                    Ok(()) => self.rebuild_context_and_search(),
                    Err(e) => {
                        warn!("No se pudo volver al nivel de '{ctx:?}': {e}");
                        self.after_selection_change().await;
                    }
                }
            }
            SelectionKey::Attribute(_) => self.after_selection_change().await,
        }
        true
    }

    pub async fn remove_product(&mut self, brand: &str) -> bool {
        let removed = self.selector.remove_product(brand, &mut self.selection);
        if removed {
            self.after_selection_change().await;
        }
        removed
    }

    pub async fn clear_all(&mut self) {
        self.selector.clear_all(&mut self.selection);
        self.after_selection_change().await;
    }

    pub fn prescription_saved(&self) {
        info!("Receta guardada, actualizando resultados");
        self.trigger_search();
    }

    pub fn prescription_cleared(&self) {
        info!("Receta eliminada, resultados vaciados");
        self.search.reset_results();
    }

    async fn after_selection_change(&mut self) {
        self.navigation.refresh(&self.selection).await;
        self.trigger_search();
    }

    fn rebuild_context_and_search(&mut self) {
        let chain = self.navigation.path().chain();
        self.selector.rebuild_context(&chain, &mut self.selection);
        self.trigger_search();
    }

    fn trigger_search(&self) {
        self.search.execute(self.selection.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{drain, EngineEvent};
    use crate::models::{AttributeKey, ContextKey};
    use crate::prescription::{Prescription, PrescriptionStore};
    use crate::test_support::{FakeCompatibility, FakeSearch};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        session: CatalogSession,
        search: Arc<FakeSearch>,
        compat: Arc<FakeCompatibility>,
        store: Arc<PrescriptionStore>,
        bus: EventBus,
    }

    fn harness(compat: FakeCompatibility) -> Harness {
        let bus = EventBus::new(256);
        let compat = Arc::new(compat);
        let search = Arc::new(FakeSearch::new(json!({"Varilux": {"VX": {"OD": [1], "OE": [1]}}})));
        let store = Arc::new(PrescriptionStore::default());
        let controller =
            SearchController::new(search.clone(), store.clone(), bus.clone(), Duration::from_millis(300));
        let tree = Arc::new(NavigationTree::load_embedded().unwrap());
        let session =
            CatalogSession::new(tree, CompatibilityResolver::new(compat.clone()), controller, bus.clone());
        Harness {
            session,
            search,
            compat,
            store,
            bus,
        }
    }

    fn child_labels(view: &SessionView) -> Vec<String> {
        view.level.children.iter().map(|c| c.label.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn multifocal_varilux_then_anti_reflective() {
        let mut h = harness(FakeCompatibility::new().with_treatments("Varilux", &["Crizal Rock"]));

        assert_eq!(h.session.click("multifocal").await, Ok(ClickOutcome::Navigated));
        assert_eq!(h.session.click("varilux").await, Ok(ClickOutcome::Navigated));
        assert_eq!(
            h.session.selection().single(ContextKey::Brand).map(|b| b.label.as_str()),
            Some("Varilux")
        );

        h.session.jump_to_configuration("antiReflexo").await.unwrap();
        let view = h.session.view();
        assert_eq!(child_labels(&view), ["Sem Anti-Reflexo", "Crizal Rock"]);
        assert_eq!(view.level.selection_mode, SelectionMode::Multiple);
        assert_eq!(
            h.session.selection().single(ContextKey::VisionType).map(|v| v.id.as_str()),
            Some("multifocal")
        );
        assert_eq!(h.compat.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggling_material_twice_leaves_no_material_field() {
        let mut h = harness(FakeCompatibility::new());
        h.store.save(Prescription {
            right_sphere: -1.5,
            ..Default::default()
        });
        let mut events = h.bus.subscribe();

        h.session.click("material").await.unwrap();
        assert_eq!(
            h.session.click("material-policarbonato").await,
            Ok(ClickOutcome::FilterToggled)
        );
        h.session.click("material-policarbonato").await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let changes = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::SelectionChanged { .. }))
            .count();
        assert_eq!(changes, 2);
        assert!(h.session.selection().attribute(AttributeKey::Material).is_empty());

        // Los tres disparos (navegación + dos clics) se agrupan en una sola petición.
        let requests = h.search.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].contains("material"));
    }

    #[tokio::test(start_paused = true)]
    async fn product_click_records_identity_and_searches() {
        let mut h = harness(FakeCompatibility::new());
        h.store.save(Prescription {
            left_sphere: 1.25,
            ..Default::default()
        });

        h.session.click("multifocal").await.unwrap();
        h.session.click("multi-ultra").await.unwrap();
        assert_eq!(h.session.click("ultra-hd").await, Ok(ClickOutcome::ProductToggled));
        tokio::time::sleep(Duration::from_millis(400)).await;

        let requests = h.search.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.values("visao"), ["multifocal"]);
        assert_eq!(last.values("marca"), ["Ultra", "Ultra HD"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_card_is_a_structural_error() {
        let mut h = harness(FakeCompatibility::new());
        assert_eq!(
            h.session.click("varilux").await,
            Err(NavigationError::NodeNotFound("varilux".into()))
        );
        assert!(h.session.view().level.is_root);
    }

    #[tokio::test(start_paused = true)]
    async fn back_rebuilds_context_from_the_path() {
        let mut h = harness(FakeCompatibility::new());
        h.session.click("longe").await.unwrap();
        h.session.click("longe-marcas").await.unwrap();
        h.session.click("longe-kodak").await.unwrap();
        assert!(h.session.selection().single(ContextKey::Brand).is_some());

        h.session.go_back().await.unwrap();
        assert!(h.session.selection().single(ContextKey::Brand).is_none());
        assert_eq!(
            h.session.selection().single(ContextKey::VisionType).map(|v| v.id.as_str()),
            Some("longe")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removing_brand_returns_to_its_level() {
        let mut h = harness(FakeCompatibility::new());
        h.session.click("multifocal").await.unwrap();
        h.session.click("hoya-multi").await.unwrap();

        assert!(h.session.remove_filter(SelectionKey::Context(ContextKey::Brand), None).await);
        let view = h.session.view();
        assert_eq!(view.level.node.id, "multifocal");
        assert!(h.session.selection().single(ContextKey::Brand).is_none());
        assert!(h.session.selection().single(ContextKey::VisionType).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn removing_vision_type_goes_home_and_clears_everything() {
        let mut h = harness(FakeCompatibility::new());
        h.session.click("perto").await.unwrap();
        h.session.click("perto-leitura").await.unwrap();
        assert_eq!(h.session.selection().products().len(), 1);

        h.session
            .remove_filter(SelectionKey::Context(ContextKey::VisionType), None)
            .await;
        assert!(h.session.view().level.is_root);
        assert!(h.session.selection().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn coloring_groups_are_entered_not_selected() {
        let mut h = harness(FakeCompatibility::new());
        h.session.click("coloracao").await.unwrap();
        assert_eq!(h.session.click("cor-degrade").await, Ok(ClickOutcome::Navigated));
        assert_eq!(h.session.click("degrade-g15").await, Ok(ClickOutcome::FilterToggled));

        let coloring = h.session.selection().attribute(AttributeKey::Coloring);
        assert_eq!(coloring[0].label, "G15 Degradê");
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_the_prescription_empties_results() {
        let mut h = harness(FakeCompatibility::new());
        h.store.save(Prescription {
            right_cylinder: -0.75,
            ..Default::default()
        });
        h.session.prescription_saved();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.search.calls(), 1);

        h.store.clear();
        h.session.prescription_cleared();
        h.session.click("bifocal").await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.search.calls(), 1);
    }
}
