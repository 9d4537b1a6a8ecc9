//! Árbol del catálogo de lentes.
//!
//! Se carga una sola vez al arrancar desde `data/catalog.json` (embebido en el binario)
//! y no se modifica después. Durante la carga:
//!   1. Se valida que la raíz sea de tipo `root`.
//!   2. La categoría de atributo y el subtipo de coloración se propagan desde los nodos
//!      de configuración a sus descendientes.
//!   3. Se rechazan ids duplicados.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::models::{AttributeKey, ColoringKind, NavigationNode, NodeKind};

const EMBEDDED_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug)]
pub struct NavigationTree {
    root: NavigationNode,
}

impl NavigationTree {
    /// Carga el catálogo incluido en el binario.
    pub fn load_embedded() -> Result<Self, CatalogError> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let mut root: NavigationNode = serde_json::from_str(raw)?;
        if root.kind != NodeKind::Root {
            return Err(CatalogError::MissingRoot);
        }

        propagate_tags(&mut root, None, None);

        let mut seen = HashSet::new();
        check_unique_ids(&root, &mut seen)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &NavigationNode {
        &self.root
    }

    /// Busca un nodo en cualquier punto del árbol.
    pub fn find(&self, id: &str) -> Option<&NavigationNode> {
        fn walk<'a>(node: &'a NavigationNode, id: &str) -> Option<&'a NavigationNode> {
            if node.id == id {
                return Some(node);
            }
            node.children.iter().find_map(|c| walk(c, id))
        }
        walk(&self.root, id)
    }

    /// Índices de hijo desde la raíz hasta el nodo indicado (vacío para la raíz).
    pub fn path_to(&self, id: &str) -> Option<Vec<usize>> {
        fn walk(node: &NavigationNode, id: &str, trail: &mut Vec<usize>) -> bool {
            if node.id == id {
                return true;
            }
            for (i, child) in node.children.iter().enumerate() {
                trail.push(i);
                if walk(child, id, trail) {
                    return true;
                }
                trail.pop();
            }
            false
        }

        let mut trail = Vec::new();
        walk(&self.root, id, &mut trail).then_some(trail)
    }

    /// Cadena de nodos desde la raíz siguiendo los índices dados.
    /// Devuelve `None` si algún índice no existe.
    pub fn chain(&self, trail: &[usize]) -> Option<Vec<&NavigationNode>> {
        let mut nodes = Vec::with_capacity(trail.len() + 1);
        let mut node = &self.root;
        nodes.push(node);
        for &i in trail {
            node = node.children.get(i)?;
            nodes.push(node);
        }
        Some(nodes)
    }
}

fn propagate_tags(
    node: &mut NavigationNode,
    attribute: Option<AttributeKey>,
    coloring: Option<ColoringKind>,
) {
    let inherits = matches!(node.kind, NodeKind::ConfigOption | NodeKind::ConfigValue);
    if inherits && node.attribute_category.is_none() {
        node.attribute_category = attribute;
    }
    if inherits && node.coloring_kind.is_none() {
        node.coloring_kind = coloring;
    }

    // Los grupos no son seleccionables: transmiten la categoría del padre.
    let next_attribute = node.attribute_category.or(attribute);
    let next_coloring = node.coloring_kind.or(coloring);
    for child in &mut node.children {
        propagate_tags(child, next_attribute, next_coloring);
    }
}

fn check_unique_ids<'a>(
    node: &'a NavigationNode,
    seen: &mut HashSet<&'a str>,
) -> Result<(), CatalogError> {
    if !seen.insert(node.id.as_str()) {
        return Err(CatalogError::DuplicateId(node.id.clone()));
    }
    for child in &node.children {
        check_unique_ids(child, seen)?;
    }
    Ok(())
}
