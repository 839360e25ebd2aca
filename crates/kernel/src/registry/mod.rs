//! Structure registries: content types and taxonomies.
//!
//! Both registries merge two layers: definitions declared in the boot
//! definitions file (or by plugins at boot) and user-defined rows from
//! the database. Database rows shadow declared definitions with the
//! same handle. The merged view is held in memory and the database
//! layer is cached through the cache layer.

mod content_types;
mod taxonomy;

pub use content_types::{ContentTypeDefinition, ContentTypeRegistry, FieldDefinition};
pub use taxonomy::{TaxonomyDefinition, TaxonomyRegistry};

/// Cache tag shared by registry cache entries.
pub const REGISTRY_CACHE_TAG: &str = "registry";

/// Where a registry definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionOrigin {
    /// Declared in the boot definitions file or by a plugin.
    Declared,

    /// Created through the API and stored in the database.
    Database,
}
