//! Controlador de navegación.
//!
//! En cada transición correcta (descender, retroceder, saltar) recalcula los hijos
//! visibles del nivel actual aplicando los filtros de compatibilidad que correspondan,
//! y emite el evento de navegación con el nodo, si es la raíz y los breadcrumbs.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::NavigationTree;
use crate::compatibility::{Compatibility, CompatibilityResolver, RelationKind};
use crate::error::NavigationError;
use crate::events::{EngineEvent, EventBus, NavigationPayload};
use crate::models::{AttributeKey, Breadcrumb, ContextKey, NavigationNode, NodeCard, NodeKind};
use crate::navigation::NavigationPath;
use crate::selection::SelectionState;

use std::sync::Arc;

const MULTIFOCAL_NODE: &str = "multifocal";
const NO_TREATMENT_ID: &str = "ar-sem";
const NO_TREATMENT_LABEL: &str = "Sem Anti-Reflexo";
const NO_COLORING_ID: &str = "cor-sem";
const NO_COLORING_LABEL: &str = "Sem Coloração";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Single,
    Multiple,
}

/// Lo que la superficie de presentación necesita para pintar el nivel actual.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelView {
    pub node: NodeCard,
    pub header: String,
    pub is_root: bool,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub can_go_back: bool,
    pub children: Vec<NodeCard>,
    pub selection_mode: SelectionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Navigated,
    WentBack,
    WentHome,
    Jumped,
}

pub struct NavigationController {
    path: NavigationPath,
    resolver: CompatibilityResolver,
    events: EventBus,
    view: LevelView,
}

impl NavigationController {
    pub fn new(tree: Arc<NavigationTree>, resolver: CompatibilityResolver, events: EventBus) -> Self {
        let path = NavigationPath::new(tree);
        let view = base_view(&path, path.current().children.iter().collect());
        Self {
            path,
            resolver,
            events,
            view,
        }
    }

    pub fn path(&self) -> &NavigationPath {
        &self.path
    }

    pub fn view(&self) -> &LevelView {
        &self.view
    }

    pub fn current(&self) -> &NavigationNode {
        self.path.current()
    }

    pub async fn descend_to(
        &mut self,
        id: &str,
        selection: &SelectionState,
    ) -> Result<&LevelView, NavigationError> {
        self.path.descend_to(id)?;
        Ok(self.finish(Transition::Navigated, selection).await)
    }

    pub async fn go_back(&mut self, selection: &SelectionState) -> Result<&LevelView, NavigationError> {
        self.path.ascend()?;
        Ok(self.finish(Transition::WentBack, selection).await)
    }

    pub async fn go_to_level(
        &mut self,
        index: usize,
        selection: &SelectionState,
    ) -> Result<&LevelView, NavigationError> {
        self.path.ascend_to_level(index)?;
        Ok(self.finish(Transition::Jumped, selection).await)
    }

    /// Vuelve a la raíz e invalida la caché de compatibilidades.
    pub async fn go_home(&mut self, selection: &SelectionState) -> &LevelView {
        self.resolver.clear();
        self.reset_navigation_only();
        self.finish(Transition::WentHome, selection).await
    }

    /// Recalcula el nivel actual tras un cambio de selección, sin evento de navegación.
    pub async fn refresh(&mut self, selection: &SelectionState) -> &LevelView {
        self.view = render_level(&self.path, &self.resolver, &self.events, selection).await;
        &self.view
    }

    /// Salta a una configuración conservando el contexto (tipo de visión, marca, familia).
    pub async fn jump_to_configuration(
        &mut self,
        config_id: &str,
        selection: &mut SelectionState,
    ) -> Result<&LevelView, NavigationError> {
        let previous = self.path.clone();
        let context = selection.context_snapshot();

        self.reset_navigation_only();
        selection.restore_context(&context);
        if let Err(e) = self.locate_configuration(config_id) {
            self.path = previous;
            return Err(e);
        }
        if selection.context_snapshot() != context {
            warn!("Contexto perdido al saltar a '{config_id}': se restaura");
            selection.restore_context(&context);
        }

        info!("Salto a configuración '{config_id}' conservando el contexto");
        Ok(self.finish(Transition::Jumped, selection).await)
    }

    /// Salta a una categoría de visión descartando el contexto y la caché.
    pub async fn jump_to_category(
        &mut self,
        category_id: &str,
        selection: &mut SelectionState,
    ) -> Result<&LevelView, NavigationError> {
        if self.path.tree().root().child(category_id).is_none() {
            return Err(NavigationError::NodeNotFound(category_id.to_string()));
        }

        self.reset_navigation_and_context(selection);
        self.path.descend_to(category_id)?;

        info!("Salto a categoría '{category_id}' descartando el contexto");
        Ok(self.finish(Transition::Jumped, selection).await)
    }

    /// Las configuraciones pueden estar anidadas (p. ej. un grupo de coloración).
    fn locate_configuration(&mut self, id: &str) -> Result<(), NavigationError> {
        let is_configuration = self
            .path
            .tree()
            .find(id)
            .is_some_and(|n| n.kind.is_configuration() || n.kind == NodeKind::ConfigGroup);
        if !is_configuration {
            return Err(NavigationError::NodeNotFound(id.to_string()));
        }
        self.path.locate(id)
    }

    /// Sólo navegación: la selección no se toca.
    fn reset_navigation_only(&mut self) {
        self.path.ascend_to_root();
    }

    fn reset_navigation_and_context(&mut self, selection: &mut SelectionState) {
        self.resolver.clear();
        self.path.ascend_to_root();
        selection.clear_context();
    }

    async fn finish(&mut self, transition: Transition, selection: &SelectionState) -> &LevelView {
        self.view = render_level(&self.path, &self.resolver, &self.events, selection).await;

        let payload = NavigationPayload {
            node: self.view.node.clone(),
            is_root: self.view.is_root,
            breadcrumbs: self.view.breadcrumbs.clone(),
        };
        debug!("Transición {transition:?} hacia '{}'", payload.node.id);
        self.events.emit(match transition {
            Transition::Navigated => EngineEvent::Navigated(payload),
            Transition::WentBack => EngineEvent::WentBack(payload),
            Transition::WentHome => EngineEvent::WentHome(payload),
            Transition::Jumped => EngineEvent::Jumped(payload),
        });
        &self.view
    }
}

fn selection_mode(node: &NavigationNode) -> SelectionMode {
    let multiple = matches!(node.kind, NodeKind::Config | NodeKind::ConfigGroup)
        || node.attribute_category.is_some();
    if multiple {
        SelectionMode::Multiple
    } else {
        SelectionMode::Single
    }
}

fn base_view(path: &NavigationPath, children: Vec<&NavigationNode>) -> LevelView {
    let current = path.current();
    LevelView {
        node: current.card(),
        header: current.header_text().to_string(),
        is_root: path.is_at_root(),
        breadcrumbs: path.visible_breadcrumbs(),
        can_go_back: path.can_ascend(),
        children: children.into_iter().map(NavigationNode::card).collect(),
        selection_mode: selection_mode(current),
    }
}

// --- Filtros de compatibilidad ---

async fn render_level(
    path: &NavigationPath,
    resolver: &CompatibilityResolver,
    events: &EventBus,
    selection: &SelectionState,
) -> LevelView {
    let current = path.current();
    let mut children: Vec<&NavigationNode> = current.children.iter().collect();

    if current.kind == NodeKind::Config
        && current.attribute_category == Some(AttributeKey::AntiReflective)
    {
        children = filter_treatments(resolver, selection, children).await;
    }

    if current.id == MULTIFOCAL_NODE {
        children = filter_families_by_treatment(resolver, selection, children).await;
    }

    if current.kind == NodeKind::Category {
        children = filter_by_selected_coloring(resolver, selection, children).await;
    }

    if current.kind == NodeKind::Config && current.attribute_category == Some(AttributeKey::Coloring)
    {
        children = filter_coloring_options(resolver, selection, children).await;
        if children.len() == 1 && is_no_coloring(children[0]) {
            events.emit(EngineEvent::CounterUpdated { count: 0 });
        }
    }

    base_view(path, children)
}

/// Familia inferida: la del primer producto, la familia elegida o la marca elegida.
fn inferred_family(selection: &SelectionState) -> Option<String> {
    real_family(selection).or_else(|| {
        selection
            .single(ContextKey::Brand)
            .map(|b| b.label.clone())
    })
}

/// Familia sin recurrir a la marca.
fn real_family(selection: &SelectionState) -> Option<String> {
    selection
        .products()
        .first()
        .and_then(|p| p.family.clone())
        .or_else(|| selection.single(ContextKey::Family).map(|f| f.label.clone()))
}

fn is_no_treatment(node: &NavigationNode) -> bool {
    node.id == NO_TREATMENT_ID || node.title == NO_TREATMENT_LABEL
}

fn is_no_coloring(node: &NavigationNode) -> bool {
    node.id == NO_COLORING_ID || node.label == NO_COLORING_LABEL
}

async fn filter_treatments<'a>(
    resolver: &CompatibilityResolver,
    selection: &SelectionState,
    children: Vec<&'a NavigationNode>,
) -> Vec<&'a NavigationNode> {
    let Some(family) = inferred_family(selection) else {
        return children;
    };
    match resolver.resolve(RelationKind::TreatmentsForFamily, &family).await {
        Some(Compatibility::Names(allowed)) => children
            .into_iter()
            .filter(|c| is_no_treatment(c) || c.matches_any(&allowed))
            .collect(),
        _ => children,
    }
}

async fn filter_families_by_treatment<'a>(
    resolver: &CompatibilityResolver,
    selection: &SelectionState,
    children: Vec<&'a NavigationNode>,
) -> Vec<&'a NavigationNode> {
    let Some(treatment) = selection
        .first_attribute(AttributeKey::AntiReflective)
        .filter(|t| t.id != NO_TREATMENT_ID && t.label != NO_TREATMENT_LABEL)
    else {
        return children;
    };
    match resolver
        .resolve(RelationKind::FamiliesForTreatment, &treatment.label)
        .await
    {
        Some(Compatibility::Names(allowed)) => children
            .into_iter()
            .filter(|c| c.matches_any(&allowed))
            .collect(),
        _ => children,
    }
}

/// En una categoría de visión, con una coloración elegida, sólo quedan las
/// marcas/productos que admiten coloración. Las agrupaciones no se filtran.
async fn filter_by_selected_coloring<'a>(
    resolver: &CompatibilityResolver,
    selection: &SelectionState,
    children: Vec<&'a NavigationNode>,
) -> Vec<&'a NavigationNode> {
    let colored = selection
        .first_attribute(AttributeKey::Coloring)
        .is_some_and(|c| c.id != NO_COLORING_ID && c.label != NO_COLORING_LABEL);
    if !colored {
        return children;
    }

    let resolved = match real_family(selection) {
        Some(family) => {
            resolver
                .resolve(RelationKind::ColorableBrandsForFamily, &family)
                .await
        }
        None => resolver.resolve(RelationKind::ColorableFamilies, "").await,
    };
    match resolved {
        Some(Compatibility::Names(allowed)) => children
            .into_iter()
            .filter(|c| {
                !matches!(c.kind, NodeKind::Brand | NodeKind::Product) || c.matches_any(&allowed)
            })
            .collect(),
        _ => children,
    }
}

async fn filter_coloring_options<'a>(
    resolver: &CompatibilityResolver,
    selection: &SelectionState,
    children: Vec<&'a NavigationNode>,
) -> Vec<&'a NavigationNode> {
    let resolved = match (real_family(selection), selection.single(ContextKey::Brand)) {
        (Some(family), _) => resolver.resolve(RelationKind::ColoringForFamily, &family).await,
        (None, Some(brand)) => resolver.resolve(RelationKind::ColoringForBrand, &brand.label).await,
        (None, None) => return children,
    };
    match resolved {
        Some(Compatibility::Permits(false)) => {
            debug!("Coloración no permitida para la selección actual");
            children.into_iter().filter(|c| is_no_coloring(c)).collect()
        }
        _ => children,
    }
}
