//! Resolved accessors: a path plus the per-segment properties that read
//! and write it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::PropertyPath;
use crate::model::{ObjectRef, SubscriptionId, Value};
use crate::schema::{PropertyDescriptor, TypeRegistry};
use crate::{Error, Result};

type ValueChangedHandler = Arc<dyn Fn(&ObjectRef) + Send + Sync>;

/// Handlers registered per root object, fired on writes through the accessor.
#[derive(Default)]
struct ValueChangedListeners {
    entries: Mutex<Vec<(SubscriptionId, ObjectRef, ValueChangedHandler)>>,
    next_id: AtomicU64,
}

/// A property path bound to the properties that implement each hop.
///
/// Clones share value-changed listeners.
#[derive(Clone)]
pub struct ResolvedAccessor {
    path: PropertyPath,
    name: String,
    links: SmallVec<[Arc<PropertyDescriptor>; 4]>,
    default_value: Value,
    listeners: Arc<ValueChangedListeners>,
}

impl ResolvedAccessor {
    fn from_links(
        registry: &TypeRegistry,
        component_type: &str,
        links: SmallVec<[Arc<PropertyDescriptor>; 4]>,
    ) -> Self {
        let segments = links.iter().map(|l| l.name().to_string()).collect();
        let value_type = links.last().map(|l| l.value_type()).unwrap_or_default();
        let default_value = registry
            .get(value_type)
            .map(|t| t.default_value().clone())
            .unwrap_or(Value::Null);
        let path = PropertyPath::new(component_type, value_type, segments);

        Self {
            name: path.name(),
            path,
            links,
            default_value,
            listeners: Arc::new(ValueChangedListeners::default()),
        }
    }

    /// A depth-0 accessor for `prop` on `component_type`.
    pub(crate) fn direct(registry: &TypeRegistry, component_type: &str, prop: Arc<PropertyDescriptor>) -> Self {
        let mut links = SmallVec::new();
        links.push(prop);
        Self::from_links(registry, component_type, links)
    }

    /// This path extended by one more segment.
    pub(crate) fn extend(&self, registry: &TypeRegistry, prop: Arc<PropertyDescriptor>) -> Self {
        let mut links = self.links.clone();
        links.push(prop);
        Self::from_links(registry, self.path.component_type(), links)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn path(&self) -> &PropertyPath { &self.path }
    pub fn depth(&self) -> usize { self.path.depth() }
    pub fn component_type(&self) -> &str { self.path.component_type() }
    pub fn value_type(&self) -> &str { self.path.value_type() }

    /// The property behind the final segment.
    pub fn property(&self) -> &Arc<PropertyDescriptor> {
        // links is never empty
        &self.links[self.links.len() - 1]
    }

    pub fn is_read_only(&self) -> bool {
        self.property().is_read_only()
    }

    /// Walk the path from `root`. Any absent link along the way reads as
    /// `Value::Null`.
    pub fn get(&self, root: &Value) -> Value {
        self.links.iter().fold(root.clone(), |owner, link| link.get(&owner))
    }

    /// Assign the final segment, walking to its owner first.
    ///
    /// Fails with `AbsentLink` if an intermediate link is absent and
    /// `ReadOnly` if the final property has no setter. Value-changed
    /// listeners registered for `root` fire after a successful write.
    pub fn set(&self, root: &Value, value: Value) -> Result<()> {
        if root.is_null() {
            return Err(Error::InvalidArgument(format!("cannot set '{}' on a null root", self.name)));
        }
        let Some((last, parents)) = self.links.split_last() else {
            return Err(Error::InvalidArgument("empty accessor".into()));
        };

        let mut owner = root.clone();
        for link in parents {
            owner = link.get(&owner);
            if owner.is_null() {
                return Err(Error::AbsentLink {
                    path: self.name.clone(),
                    segment: link.name().to_string(),
                });
            }
        }

        last.set(&owner, value)?;
        trace!(path = %self.name, "value set through accessor");

        if let Value::Object(root) = root {
            self.fire_value_changed(root);
        }
        Ok(())
    }

    /// Write the value type's default.
    pub fn reset(&self, root: &Value) -> Result<()> {
        self.set(root, self.default_value.clone())
    }

    /// Call `handler` whenever a value is written through this accessor
    /// (or a clone of it) on `root`.
    pub fn add_value_changed<F>(&self, root: &ObjectRef, handler: F) -> SubscriptionId
    where
        F: Fn(&ObjectRef) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.listeners.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.entries.lock().push((id, root.clone(), Arc::new(handler)));
        id
    }

    pub fn remove_value_changed(&self, id: SubscriptionId) -> bool {
        let mut entries = self.listeners.entries.lock();
        let before = entries.len();
        entries.retain(|(sid, _, _)| *sid != id);
        entries.len() != before
    }

    fn fire_value_changed(&self, root: &ObjectRef) {
        let handlers: Vec<ValueChangedHandler> = self
            .listeners
            .entries
            .lock()
            .iter()
            .filter(|(_, obj, _)| obj.ptr_eq(root))
            .map(|(_, _, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            handler(root);
        }
    }
}

impl PartialEq for ResolvedAccessor {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl fmt::Debug for ResolvedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedAccessor")
            .field("component_type", &self.component_type())
            .field("name", &self.name)
            .field("value_type", &self.value_type())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

impl fmt::Display for ResolvedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Resolve a dotted `name` against `root_type`.
///
/// Each segment is looked up on the type produced by the previous one,
/// including non-public and inherited members. Fails with `UnknownPath`
/// on the first segment that does not exist.
pub fn resolve(registry: &TypeRegistry, root_type: &str, name: &str) -> Result<ResolvedAccessor> {
    let segments = PropertyPath::parse_segments(name)?;
    registry.require(root_type)?;

    let mut links: SmallVec<[Arc<PropertyDescriptor>; 4]> = SmallVec::new();
    let mut current = root_type.to_string();
    for segment in &segments {
        let prop = registry
            .find_property(&current, segment)
            .ok_or_else(|| Error::UnknownPath {
                type_name: current.clone(),
                segment: segment.clone(),
            })?;
        current = prop.value_type().to_string();
        links.push(prop);
    }

    Ok(ResolvedAccessor::from_links(registry, root_type, links))
}
