//! Estado de recorrido sobre el árbol: nodo actual y pila de breadcrumbs.
//!
//! El nodo actual se guarda como la lista de índices de hijo desde la raíz, de modo que
//! los breadcrumbs (ancestros) siempre coinciden con la profundidad del nodo actual.

use std::sync::Arc;

use crate::catalog::NavigationTree;
use crate::error::NavigationError;
use crate::models::{Breadcrumb, NavigationNode, NodeKind};

#[derive(Debug, Clone)]
pub struct NavigationPath {
    tree: Arc<NavigationTree>,
    trail: Vec<usize>,
}

impl NavigationPath {
    pub fn new(tree: Arc<NavigationTree>) -> Self {
        Self {
            tree,
            trail: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Arc<NavigationTree> {
        &self.tree
    }

    /// Cadena raíz..=actual.
    pub fn chain(&self) -> Vec<&NavigationNode> {
        self.tree.chain(&self.trail).unwrap_or_default()
    }

    pub fn current(&self) -> &NavigationNode {
        self.trail
            .iter()
            .fold(self.tree.root(), |node, &i| &node.children[i])
    }

    pub fn depth(&self) -> usize {
        self.trail.len()
    }

    pub fn is_at_root(&self) -> bool {
        self.trail.is_empty()
    }

    pub fn can_ascend(&self) -> bool {
        !self.trail.is_empty()
    }

    /// Ancestros del nodo actual, raíz incluida. Su longitud es la profundidad.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let chain = self.chain();
        chain[..chain.len() - 1]
            .iter()
            .enumerate()
            .map(|(level, node)| Breadcrumb {
                id: node.id.clone(),
                label: node.label.clone(),
                icon: node.icon.clone(),
                kind: node.kind,
                level,
            })
            .collect()
    }

    /// Breadcrumbs para mostrar (sin la raíz).
    pub fn visible_breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs()
            .into_iter()
            .filter(|b| b.kind != NodeKind::Root)
            .collect()
    }

    pub fn descend_to(&mut self, id: &str) -> Result<(), NavigationError> {
        let index = self
            .current()
            .children
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| NavigationError::NodeNotFound(id.to_string()))?;
        self.trail.push(index);
        Ok(())
    }

    /// Retrocede un nivel.
    pub fn ascend(&mut self) -> Result<(), NavigationError> {
        self.trail.pop().map(|_| ()).ok_or(NavigationError::AtRoot)
    }

    /// Vuelve al breadcrumb `index` (0 = raíz), que pasa a ser el nodo actual.
    pub fn ascend_to_level(&mut self, index: usize) -> Result<(), NavigationError> {
        if index >= self.depth() {
            return Err(NavigationError::InvalidLevel {
                index,
                depth: self.depth(),
            });
        }
        self.trail.truncate(index);
        Ok(())
    }

    /// Coloca el recorrido directamente sobre un nodo de cualquier nivel.
    pub fn locate(&mut self, id: &str) -> Result<(), NavigationError> {
        self.trail = self
            .tree
            .path_to(id)
            .ok_or_else(|| NavigationError::NodeNotFound(id.to_string()))?;
        Ok(())
    }

    pub fn ascend_to_root(&mut self) {
        self.trail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> NavigationPath {
        NavigationPath::new(Arc::new(NavigationTree::load_embedded().unwrap()))
    }

    fn assert_depth_invariant(p: &NavigationPath) {
        assert_eq!(p.breadcrumbs().len(), p.depth());
    }

    #[test]
    fn descend_pushes_current_onto_breadcrumbs() {
        let mut p = path();
        p.descend_to("multifocal").unwrap();
        p.descend_to("varilux").unwrap();
        assert_eq!(p.current().id, "varilux");
        let ids: Vec<_> = p.breadcrumbs().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, ["root", "multifocal"]);
        let visible: Vec<_> = p.visible_breadcrumbs().into_iter().map(|b| b.id).collect();
        assert_eq!(visible, ["multifocal"]);
    }

    #[test]
    fn descend_to_unknown_child_fails_without_moving() {
        let mut p = path();
        p.descend_to("longe").unwrap();
        let err = p.descend_to("varilux").unwrap_err();
        assert_eq!(err, NavigationError::NodeNotFound("varilux".into()));
        assert_eq!(p.current().id, "longe");
    }

    #[test]
    fn ascend_to_level_truncates_and_moves() {
        let mut p = path();
        for id in ["longe", "longe-marcas", "longe-zeiss"] {
            p.descend_to(id).unwrap();
        }
        p.ascend_to_level(1).unwrap();
        assert_eq!(p.current().id, "longe");
        assert_eq!(p.depth(), 1);

        assert_eq!(
            p.ascend_to_level(1),
            Err(NavigationError::InvalidLevel { index: 1, depth: 1 })
        );
        p.ascend_to_level(0).unwrap();
        assert!(p.is_at_root());
    }

    #[test]
    fn ascend_at_root_is_an_error() {
        let mut p = path();
        assert!(!p.can_ascend());
        assert_eq!(p.ascend(), Err(NavigationError::AtRoot));
    }

    #[test]
    fn locate_places_path_on_nested_node() {
        let mut p = path();
        p.descend_to("longe").unwrap();
        p.locate("cor-degrade").unwrap();
        assert_eq!(p.current().id, "cor-degrade");
        assert_depth_invariant(&p);
        assert_eq!(p.chain().last().map(|n| n.id.as_str()), Some("cor-degrade"));

        assert_eq!(p.locate("nada"), Err(NavigationError::NodeNotFound("nada".into())));
        assert_eq!(p.current().id, "cor-degrade");
    }

    #[test]
    fn breadcrumbs_track_depth_through_any_sequence() {
        let mut p = path();
        assert_depth_invariant(&p);
        p.descend_to("longe").unwrap();
        assert_depth_invariant(&p);
        p.descend_to("longe-filtros").unwrap();
        assert_depth_invariant(&p);
        p.descend_to("longe-digital").unwrap();
        assert_depth_invariant(&p);
        p.ascend().unwrap();
        assert_depth_invariant(&p);
        p.descend_to("longe-premium").unwrap();
        assert_depth_invariant(&p);
        p.ascend_to_level(1).unwrap();
        assert_depth_invariant(&p);
        let _ = p.descend_to("nada");
        assert_depth_invariant(&p);
        p.ascend_to_root();
        assert_depth_invariant(&p);
        assert!(p.breadcrumbs().is_empty());
    }
}
