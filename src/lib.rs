//! # nested-binding — Observable Collections over Nested Property Paths
//!
//! Lets a display layer bind columns to dotted property paths such as
//! `Address.City.Name`, keep a list of domain objects sorted by any such
//! path, and hear about every change, however deep.
//!
//! ## Design Principles
//!
//! 1. **Schema, not reflection**: a [`TypeRegistry`] describes each type's
//!    properties with getter/setter closures; every path is resolved against it
//! 2. **Clean DTOs**: [`Value`] is the one currency between paths, comparers
//!    and events
//! 3. **Self-rewiring subscriptions**: a [`ChangeSubscriptionTree`] follows
//!    the objects *currently* reachable, never the ones that used to be
//! 4. **Synchronous delivery**: events fire on the mutating thread, after
//!    internal locks are released
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nested_binding::{CollectionConfig, ObservableSortableCollection, SortDirection};
//!
//! let registry = Arc::new(my_registry());
//! let people = ObservableSortableCollection::<Person>::new(registry, CollectionConfig::with_depth(2))?;
//! people.subscribe(|event| println!("{event:?}"));
//!
//! people.set_sort("Address.City.Name", SortDirection::Descending)?;
//! people.append(Arc::new(Person::named("Ada")))?;
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`model`] | `Value`, `ObjectRef`, `Notifier` |
//! | [`schema`] | type and property descriptors, the registry |
//! | [`path`] | path resolution and enumeration |
//! | [`sort`] | `PropertyComparer`, `SortKey` |
//! | [`tree`] | `ChangeSubscriptionTree` |
//! | [`collection`] | `ObservableSortableCollection` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod path;
pub mod sort;
pub mod tree;
pub mod collection;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    ChangeNotifier, FromValue, Model, Notifier, ObjectRef, Observable,
    PropertyChanged, SubscriptionId, Value,
};

// ============================================================================
// Re-exports: Schema and paths
// ============================================================================

pub use schema::{
    PropertyDescriptor, SortStrategy, TypeBuilder, TypeDescriptor, TypeKind,
    TypeRegistry, Visibility,
};
pub use path::{PropertyPath, PropertyPaths, ResolvedAccessor, enumerate, resolve};

// ============================================================================
// Re-exports: Sorting, trees, collections
// ============================================================================

pub use sort::{PropertyComparer, SortDirection, SortKey};
pub use tree::{ChangeSubscriptionTree, TreeTemplate};
pub use collection::{CollectionConfig, ListChanged, ObservableSortableCollection, PendingAdd};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown path: type {type_name} has no property {segment:?}")]
    UnknownPath { type_name: String, segment: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Not sortable: {path} has type {type_name}, which has no ordering")]
    NotSortable { path: String, type_name: String },

    #[error("Absent link: cannot set {path}, {segment} is null")]
    AbsentLink { path: String, segment: String },

    #[error("Read-only property: {0}")]
    ReadOnly(String),
}

pub type Result<T> = std::result::Result<T, Error>;
