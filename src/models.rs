//! Modelos de dominio (nodos del catálogo, claves de selección y productos elegidos).

use serde::{Deserialize, Serialize};

/// Tipo de nodo dentro del árbol de navegación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Root,
    Category,
    Subcategory,
    Filter,
    Brand,
    Product,
    Config,
    ConfigGroup,
    ConfigOption,
    ConfigValue,
}

impl NodeKind {
    /// Nodos cuya selección se registra como filtro de atributo y no como producto.
    pub fn is_configuration(self) -> bool {
        matches!(self, Self::Config | Self::ConfigOption | Self::ConfigValue)
    }
}

/// Claves multivaluadas (filtros de atributo).
///
/// El orden de las variantes es el orden de serialización en la búsqueda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeKey {
    Material,
    AntiReflective,
    Photosensitive,
    Coloring,
    AntiBlue,
    Index,
}

impl AttributeKey {
    pub const ALL: [AttributeKey; 6] = [
        Self::Material,
        Self::AntiReflective,
        Self::Photosensitive,
        Self::Coloring,
        Self::AntiBlue,
        Self::Index,
    ];

    /// Nombre del campo en el formulario de búsqueda del catálogo.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::AntiReflective => "antireflexo",
            Self::Photosensitive => "fotossensivel",
            Self::Coloring => "coloracao",
            Self::AntiBlue => "antiblue",
            Self::Index => "indice",
        }
    }
}

/// Claves univaluadas (contexto: dónde estamos conceptualmente en el catálogo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextKey {
    VisionType,
    Brand,
    Family,
}

impl ContextKey {
    pub const ALL: [ContextKey; 3] = [Self::VisionType, Self::Brand, Self::Family];

    pub fn field_name(self) -> &'static str {
        match self {
            Self::VisionType => "visao",
            Self::Brand => "marca",
            Self::Family => "familia",
        }
    }

    /// Nivel de breadcrumb al que se vuelve cuando se elimina esta selección.
    pub fn level(self) -> usize {
        match self {
            Self::VisionType => 0,
            Self::Brand => 1,
            Self::Family => 2,
        }
    }
}

/// Clave de cualquier selección, tal como llega desde la superficie de presentación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionKey {
    Context(ContextKey),
    Attribute(AttributeKey),
}

/// Subtipo de coloración (se envía junto a cada valor de coloración).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColoringKind {
    Total,
    #[serde(rename = "Degradê")]
    Degrade,
}

impl ColoringKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Total => "Total",
            Self::Degrade => "Degradê",
        }
    }
}

/// Nodo del árbol del catálogo. Inmutable una vez cargado.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub brand_override: Option<String>,
    #[serde(default)]
    pub family_override: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub color_image: Option<String>,
    /// Categoría de atributo fijada al cargar el catálogo.
    #[serde(default, rename = "attribute")]
    pub attribute_category: Option<AttributeKey>,
    #[serde(default)]
    pub coloring_kind: Option<ColoringKind>,
    #[serde(default)]
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child(&self, id: &str) -> Option<&NavigationNode> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Texto de cabecera: la etiqueta, o el título si la etiqueta está vacía.
    pub fn header_text(&self) -> &str {
        if self.label.is_empty() {
            &self.title
        } else {
            &self.label
        }
    }

    /// Compara por título o etiqueta contra una lista de nombres permitidos.
    pub fn matches_any(&self, names: &[String]) -> bool {
        names.iter().any(|n| *n == self.title || *n == self.label)
    }

    pub fn card(&self) -> NodeCard {
        NodeCard {
            id: self.id.clone(),
            kind: self.kind,
            label: self.label.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            color_hex: self.color_hex.clone(),
            color_image: self.color_image.clone(),
            attribute: self.attribute_category,
            has_children: self.has_children(),
        }
    }

    pub fn option_record(&self) -> OptionRecord {
        OptionRecord {
            id: self.id.clone(),
            label: self.label.clone(),
            icon: self.icon.clone(),
            coloring_kind: self.coloring_kind,
        }
    }
}

/// Vista plana de un hijo visible, lista para la superficie de presentación.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeCard {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributeKey>,
    pub has_children: bool,
}

/// Entrada de la pila de breadcrumbs. `level` es el índice aceptado por `ascend_to_level`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub kind: NodeKind,
    pub level: usize,
}

/// Opción seleccionada (contexto o atributo).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coloring_kind: Option<ColoringKind>,
}

/// Producto concreto elegido. Su identidad es `brand`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedProduct {
    pub vision_type: Option<String>,
    pub family: Option<String>,
    pub brand: String,
    pub label: String,
    pub icon: String,
    pub path: String,
}
