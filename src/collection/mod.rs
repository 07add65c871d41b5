//! # Observable Sortable Collection
//!
//! An ordered list of model objects that republishes every structural
//! mutation and every (nested) property change of its items as a
//! [`ListChanged`] event, and keeps itself ordered by an optional sort key.
//!
//! ## Events
//!
//! | Cause | Event |
//! |-------|-------|
//! | `insert`/`append`/`begin_add` | `ItemAdded(post-sort index)` |
//! | `remove_at`/`cancel_add` | `ItemDeleted(index)` |
//! | `replace` | `ItemChanged { index, path: None }` |
//! | property change on an item | `ItemChanged { index, path: Some(..) }` |
//! | `clear`, `set_sort`, depth change, permission toggles | `Reset` |
//!
//! Events are delivered synchronously, after the collection's lock has been
//! released, so handlers may read or mutate the collection.
//!
//! ## Sorting
//!
//! While a sort key is active, inserts and changes on (or above) the sort
//! path silently re-sort the list. An item added with `begin_add` stays
//! where it was appended until `commit_add`, or until any other structural
//! mutation commits it implicitly.

pub mod config;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::model::{Model, Notifier, ObjectRef, SubscriptionId, Value};
use crate::path::{self, ResolvedAccessor};
use crate::schema::TypeRegistry;
use crate::sort::{SortDirection, SortKey};
use crate::tree::{ChangeSubscriptionTree, TreeTemplate};
use crate::{Error, Result};

pub use config::CollectionConfig;

// ============================================================================
// Public types
// ============================================================================

/// Change-event contract consumed by display layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListChanged {
    /// Treat the whole view as stale.
    Reset,
    ItemAdded(usize),
    ItemDeleted(usize),
    /// `path` is the dotted property path, or `None` for a coarse change.
    ItemChanged { index: usize, path: Option<String> },
}

/// The single tentatively added item, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingAdd {
    #[default]
    Idle,
    /// Appended by `begin_add` at this index, not yet committed.
    Pending(usize),
}

type NewItemFactory<T> = Arc<dyn Fn() -> Option<Arc<T>> + Send + Sync>;
type Constructor<T> = Arc<dyn Fn() -> T + Send + Sync>;

// ============================================================================
// Internal state
// ============================================================================

struct Entry<T> {
    id: u64,
    item: Arc<T>,
    tree: ChangeSubscriptionTree,
}

struct State<T> {
    entries: Vec<Entry<T>>,
    next_id: u64,
    config: CollectionConfig,
    template: Arc<TreeTemplate>,
    sort: Option<SortKey>,
    pending: PendingAdd,
    factory: Option<NewItemFactory<T>>,
    constructor: Option<Constructor<T>>,
}

fn root_value<T: Model>(item: &Arc<T>) -> Value {
    Value::Object(ObjectRef::new(Arc::clone(item)))
}

impl<T: Model> State<T> {
    fn position(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn allow_new(&self) -> bool {
        self.config
            .allow_new
            .unwrap_or(self.constructor.is_some() || self.factory.is_some())
    }

    /// Stable re-sort by the active key; no event.
    fn apply_sort(&mut self) {
        let Some(key) = &self.sort else { return };
        let accessor = key.accessor();
        let comparer = key.comparer();

        let mut keyed: Vec<(Value, Entry<T>)> = self
            .entries
            .drain(..)
            .map(|e| (accessor.get(&root_value(&e.item)), e))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| comparer.compare_values(a, b));
        self.entries = keyed.into_iter().map(|(_, e)| e).collect();

        trace!(path = %key.path(), items = self.entries.len(), "re-sorted");
    }

    /// Commit an outstanding `begin_add`, sorting it into place. Returns
    /// whether that moved any item.
    fn commit_pending(&mut self) -> bool {
        let PendingAdd::Pending(index) = self.pending else { return false };
        self.pending = PendingAdd::Idle;
        if self.sort.is_none() {
            debug!(index, "committed pending add");
            return false;
        }

        let before: Vec<u64> = self.entries.iter().map(|e| e.id).collect();
        self.apply_sort();
        let moved = self.entries.iter().map(|e| e.id).ne(before);
        debug!(index, moved, "committed pending add");
        moved
    }

    /// Whether a change at `changed` can move the value the list is sorted by.
    fn affects_sort(&self, changed: &str) -> bool {
        self.sort.as_ref().is_some_and(|key| path::is_within(key.path(), changed))
    }

    fn structural(&self, event: ListChanged) -> Option<ListChanged> {
        self.config.raise_list_changed_events.then_some(event)
    }
}

struct Shared<T: Model> {
    registry: Arc<TypeRegistry>,
    state: Mutex<State<T>>,
    events: Notifier<ListChanged>,
    dispatch_depth: AtomicUsize,
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Model> Shared<T> {
    fn make_tree(self: &Arc<Self>, state: &State<T>, id: u64, item: &Arc<T>) -> ChangeSubscriptionTree {
        let tree = ChangeSubscriptionTree::from_template(Arc::clone(&state.template));
        tree.set_cascade_notifications(state.config.cascade_nested_notifications);

        let weak = Arc::downgrade(self);
        tree.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_item_changed(id, &event.name);
            }
        });
        tree.set_object(Some(ObjectRef::new(Arc::clone(item))));
        tree
    }

    fn make_entry(self: &Arc<Self>, state: &mut State<T>, item: Arc<T>) -> Entry<T> {
        let id = state.next_id;
        state.next_id += 1;
        let tree = self.make_tree(state, id, &item);
        Entry { id, item, tree }
    }

    fn on_item_changed(&self, id: u64, changed: &str) {
        let (event, limit) = {
            let mut state = self.state.lock();
            let Some(mut index) = state.position(id) else {
                debug!(id, path = changed, "change from an item no longer in the list");
                return;
            };
            if state.pending == PendingAdd::Idle && state.affects_sort(changed) {
                state.apply_sort();
                index = state.position(id).unwrap_or(index);
            }
            (
                ListChanged::ItemChanged { index, path: Some(changed.to_string()) },
                state.config.max_dispatch_depth,
            )
        };
        self.dispatch(&event, limit);
    }

    fn dispatch(&self, event: &ListChanged, limit: usize) {
        let depth = self.dispatch_depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = DepthGuard(&self.dispatch_depth);
        if depth > limit {
            warn!(depth, limit, ?event, "dropping list change raised from too deep inside handlers");
            return;
        }
        self.events.emit(event);
    }

    fn dispatch_opt(&self, event: Option<ListChanged>, limit: usize) {
        if let Some(event) = event {
            self.dispatch(&event, limit);
        }
    }
}

// ============================================================================
// ObservableSortableCollection
// ============================================================================

/// Observable, sortable list of `Arc<T>` with nested property tracking.
pub struct ObservableSortableCollection<T: Model> {
    shared: Arc<Shared<T>>,
}

impl<T: Model> ObservableSortableCollection<T> {
    pub fn new(registry: Arc<TypeRegistry>, config: CollectionConfig) -> Result<Self> {
        Self::with_items(registry, Vec::new(), config)
    }

    /// Wrap existing items. Their changes are tracked from the start; no
    /// events are raised for them.
    pub fn with_items(registry: Arc<TypeRegistry>, items: Vec<Arc<T>>, config: CollectionConfig) -> Result<Self> {
        config.validate()?;
        let template = TreeTemplate::build(&registry, T::TYPE_NAME, config.traversal_depth)?;

        let shared = Arc::new(Shared {
            registry,
            state: Mutex::new(State {
                entries: Vec::with_capacity(items.len()),
                next_id: 1,
                config,
                template,
                sort: None,
                pending: PendingAdd::Idle,
                factory: None,
                constructor: None,
            }),
            events: Notifier::new(),
            dispatch_depth: AtomicUsize::new(0),
        });

        {
            let mut state = shared.state.lock();
            for item in items {
                let entry = shared.make_entry(&mut state, item);
                state.entries.push(entry);
            }
        }

        Ok(Self { shared })
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ListChanged) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.shared.state.lock().entries.get(index).map(|e| Arc::clone(&e.item))
    }

    /// Snapshot of the items in their current order.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.shared.state.lock().entries.iter().map(|e| Arc::clone(&e.item)).collect()
    }

    /// Index of `item` by identity.
    pub fn index_of(&self, item: &Arc<T>) -> Option<usize> {
        self.shared.state.lock().entries.iter().position(|e| Arc::ptr_eq(&e.item, item))
    }

    pub fn contains(&self, item: &Arc<T>) -> bool {
        self.index_of(item).is_some()
    }

    /// Index of the first item whose value at `path` equals `key`.
    pub fn find(&self, path: &str, key: &Value) -> Result<Option<usize>> {
        let accessor = path::resolve(&self.shared.registry, T::TYPE_NAME, path)?;
        let state = self.shared.state.lock();
        Ok(state
            .entries
            .iter()
            .position(|e| accessor.get(&root_value(&e.item)) == *key))
    }

    pub fn config(&self) -> CollectionConfig {
        self.shared.state.lock().config.clone()
    }

    pub fn traversal_depth(&self) -> usize {
        self.shared.state.lock().config.traversal_depth
    }

    /// Every bindable path at the current traversal depth.
    pub fn item_properties(&self) -> Vec<ResolvedAccessor> {
        self.shared.state.lock().template.properties().to_vec()
    }

    pub fn find_property(&self, name: &str, ignore_case: bool) -> Option<ResolvedAccessor> {
        let state = self.shared.state.lock();
        state
            .template
            .properties()
            .iter()
            .find(|p| {
                if ignore_case {
                    p.name().eq_ignore_ascii_case(name)
                } else {
                    p.name() == name
                }
            })
            .cloned()
    }

    pub fn is_sorted(&self) -> bool {
        self.shared.state.lock().sort.is_some()
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.shared.state.lock().sort.clone()
    }

    pub fn pending_add(&self) -> PendingAdd {
        self.shared.state.lock().pending
    }

    pub fn allow_edit(&self) -> bool {
        self.shared.state.lock().config.allow_edit
    }

    pub fn allow_remove(&self) -> bool {
        self.shared.state.lock().config.allow_remove
    }

    /// Explicit setting, else whether a factory or constructor is available.
    pub fn allow_new(&self) -> bool {
        self.shared.state.lock().allow_new()
    }

    // ========================================================================
    // Structural mutation
    // ========================================================================

    /// Insert at `index`. Returns where the item ended up, which differs
    /// from `index` when the list is sorted.
    pub fn insert(&self, index: usize, item: Arc<T>) -> Result<usize> {
        self.insert_item(Some(index), item, false)
    }

    /// Insert at the end (then sort, if sorted).
    pub fn append(&self, item: Arc<T>) -> Result<usize> {
        self.insert_item(None, item, false)
    }

    fn insert_item(&self, index: Option<usize>, item: Arc<T>, pending_add: bool) -> Result<usize> {
        let (event, limit, at) = {
            let mut state = self.shared.state.lock();
            let len = state.entries.len();
            let index = index.unwrap_or(len);
            if index > len {
                return Err(Error::InvalidArgument(format!("insert index {index} out of range (len {len})")));
            }

            // `index` addresses the order the caller saw, before the commit.
            let anchor = state.entries.get(index).map(|e| e.id);
            let moved = state.commit_pending();
            let index = match anchor {
                Some(anchor) => state.position(anchor).unwrap_or(index),
                None => state.entries.len(),
            };

            let entry = self.shared.make_entry(&mut state, item);
            let id = entry.id;
            state.entries.insert(index, entry);

            let mut at = index;
            if pending_add {
                state.pending = PendingAdd::Pending(index);
            } else if state.sort.is_some() {
                state.apply_sort();
                at = state.position(id).unwrap_or(index);
            }
            let event = if moved { ListChanged::Reset } else { ListChanged::ItemAdded(at) };
            (state.structural(event), state.config.max_dispatch_depth, at)
        };

        self.shared.dispatch_opt(event, limit);
        Ok(at)
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Arc<T>> {
        let (event, limit, removed) = {
            let mut state = self.shared.state.lock();
            if !state.config.allow_remove {
                return Err(Error::NotAllowed("removing items is disabled".into()));
            }
            let len = state.entries.len();
            if index >= len {
                return Err(Error::InvalidArgument(format!("remove index {index} out of range (len {len})")));
            }

            let target = state.entries[index].id;
            let moved = state.commit_pending();
            let at = state.position(target).unwrap_or(index);
            let removed = state.entries.remove(at);
            let event = if moved { ListChanged::Reset } else { ListChanged::ItemDeleted(at) };
            (state.structural(event), state.config.max_dispatch_depth, removed)
        };

        let item = Arc::clone(&removed.item);
        drop(removed);
        self.shared.dispatch_opt(event, limit);
        Ok(item)
    }

    /// Put `item` at `index`, returning the item it displaced.
    pub fn replace(&self, index: usize, item: Arc<T>) -> Result<Arc<T>> {
        let (event, limit, old) = {
            let mut state = self.shared.state.lock();
            if !state.config.allow_edit {
                return Err(Error::NotAllowed("editing items is disabled".into()));
            }
            let len = state.entries.len();
            if index >= len {
                return Err(Error::InvalidArgument(format!("replace index {index} out of range (len {len})")));
            }

            let target = state.entries[index].id;
            let moved = state.commit_pending();
            let index = state.position(target).unwrap_or(index);
            let entry = self.shared.make_entry(&mut state, item);
            let id = entry.id;
            let old = std::mem::replace(&mut state.entries[index], entry);

            let mut at = index;
            if state.sort.is_some() {
                state.apply_sort();
                at = state.position(id).unwrap_or(index);
            }
            let event = if moved { ListChanged::Reset } else { ListChanged::ItemChanged { index: at, path: None } };
            (
                state.structural(event),
                state.config.max_dispatch_depth,
                old,
            )
        };

        let item = Arc::clone(&old.item);
        drop(old);
        self.shared.dispatch_opt(event, limit);
        Ok(item)
    }

    /// Remove every item.
    pub fn clear(&self) -> Result<()> {
        let (event, limit, removed) = {
            let mut state = self.shared.state.lock();
            if !state.config.allow_remove {
                return Err(Error::NotAllowed("removing items is disabled".into()));
            }
            state.pending = PendingAdd::Idle;
            let removed: Vec<Entry<T>> = state.entries.drain(..).collect();
            (state.structural(ListChanged::Reset), state.config.max_dispatch_depth, removed)
        };

        drop(removed);
        self.shared.dispatch_opt(event, limit);
        Ok(())
    }

    // ========================================================================
    // Pending add
    // ========================================================================

    /// Create a new item and append it unsorted, pending `commit_add` or
    /// `cancel_add`.
    ///
    /// The new-item factory is asked first; if it declines, the default
    /// constructor is used.
    pub fn begin_add(&self) -> Result<Arc<T>> {
        let (allowed, factory, constructor) = {
            let state = self.shared.state.lock();
            (state.allow_new(), state.factory.clone(), state.constructor.clone())
        };
        if !allowed {
            return Err(Error::NotAllowed("adding new items is disabled".into()));
        }

        let item = match factory.and_then(|f| f()) {
            Some(item) => item,
            None => match constructor {
                Some(construct) => Arc::new(construct()),
                None => {
                    return Err(Error::NotAllowed(format!(
                        "no factory produced a {} and it has no default constructor",
                        T::TYPE_NAME
                    )));
                }
            },
        };

        let index = self.insert_item(None, Arc::clone(&item), true)?;
        debug!(index, "began add");
        Ok(item)
    }

    /// Commit the pending add at `index`, sorting it into place.
    /// Any other index is ignored.
    pub fn commit_add(&self, index: usize) {
        let event = {
            let mut state = self.shared.state.lock();
            if state.pending != PendingAdd::Pending(index) {
                trace!(index, pending = ?state.pending, "commit_add ignored");
                return;
            }
            let sorted = state.sort.is_some();
            state.commit_pending();
            sorted.then_some((ListChanged::Reset, state.config.max_dispatch_depth))
        };

        if let Some((event, limit)) = event {
            self.shared.dispatch(&event, limit);
        }
    }

    /// Discard the pending add at `index`. Any other index is ignored.
    pub fn cancel_add(&self, index: usize) {
        let (event, limit, removed) = {
            let mut state = self.shared.state.lock();
            if state.pending != PendingAdd::Pending(index) {
                trace!(index, pending = ?state.pending, "cancel_add ignored");
                return;
            }
            state.pending = PendingAdd::Idle;
            if index >= state.entries.len() {
                return;
            }
            let removed = state.entries.remove(index);
            debug!(index, "cancelled pending add");
            (state.structural(ListChanged::ItemDeleted(index)), state.config.max_dispatch_depth, removed)
        };

        drop(removed);
        self.shared.dispatch_opt(event, limit);
    }

    /// Register the hook `begin_add` asks for new items.
    pub fn set_new_item_factory<F>(&self, factory: F)
    where
        F: Fn() -> Option<Arc<T>> + Send + Sync + 'static,
    {
        self.shared.state.lock().factory = Some(Arc::new(factory));
    }

    pub fn clear_new_item_factory(&self) {
        self.shared.state.lock().factory = None;
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    /// Sort by the value at `path`. Fails with `NotSortable` if that value
    /// type has no ordering.
    pub fn set_sort(&self, path: &str, direction: SortDirection) -> Result<()> {
        let accessor = path::resolve(&self.shared.registry, T::TYPE_NAME, path)?;
        self.set_sort_accessor(accessor, direction)
    }

    /// Sort by one of the `item_properties`, looked up by name.
    pub fn sort_by(&self, name: &str, ignore_case: bool, direction: SortDirection) -> Result<()> {
        let accessor = self.find_property(name, ignore_case).ok_or_else(|| Error::UnknownPath {
            type_name: T::TYPE_NAME.to_string(),
            segment: name.to_string(),
        })?;
        self.set_sort_accessor(accessor, direction)
    }

    pub fn set_sort_accessor(&self, accessor: ResolvedAccessor, direction: SortDirection) -> Result<()> {
        let key = SortKey::new(&self.shared.registry, accessor, direction)?;
        debug!(path = %key.path(), ?direction, "applying sort");

        let limit = {
            let mut state = self.shared.state.lock();
            state.commit_pending();
            state.sort = Some(key);
            state.apply_sort();
            state.config.max_dispatch_depth
        };
        self.shared.dispatch(&ListChanged::Reset, limit);
        Ok(())
    }

    /// Forget the sort key. The current order is kept.
    pub fn clear_sort(&self) {
        let (event, limit) = {
            let mut state = self.shared.state.lock();
            if state.sort.take().is_none() {
                return;
            }
            (state.structural(ListChanged::Reset), state.config.max_dispatch_depth)
        };
        self.shared.dispatch_opt(event, limit);
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Rebuild the path set and every item's subscription tree at `depth`.
    pub fn set_traversal_depth(&self, depth: usize) -> Result<()> {
        let template = TreeTemplate::build(&self.shared.registry, T::TYPE_NAME, depth)?;

        let (limit, old_trees) = {
            let mut state = self.shared.state.lock();
            if state.config.traversal_depth == depth {
                return Ok(());
            }
            state.config.traversal_depth = depth;
            state.template = template;

            let rebuilt: Vec<ChangeSubscriptionTree> = state
                .entries
                .iter()
                .map(|e| self.shared.make_tree(&state, e.id, &e.item))
                .collect();
            let old_trees: Vec<ChangeSubscriptionTree> = state
                .entries
                .iter_mut()
                .zip(rebuilt)
                .map(|(e, tree)| std::mem::replace(&mut e.tree, tree))
                .collect();
            debug!(depth, items = state.entries.len(), "traversal depth changed");
            (state.config.max_dispatch_depth, old_trees)
        };

        drop(old_trees);
        self.shared.dispatch(&ListChanged::Reset, limit);
        Ok(())
    }

    pub fn set_cascade_notifications(&self, cascade: bool) {
        let mut state = self.shared.state.lock();
        state.config.cascade_nested_notifications = cascade;
        for entry in &state.entries {
            entry.tree.set_cascade_notifications(cascade);
        }
    }

    pub fn set_allow_edit(&self, allow: bool) {
        self.toggle(|config| &mut config.allow_edit, allow);
    }

    pub fn set_allow_remove(&self, allow: bool) {
        self.toggle(|config| &mut config.allow_remove, allow);
    }

    /// Explicitly permit or forbid `begin_add`. Emits `Reset` only when the
    /// effective permission changes.
    pub fn set_allow_new(&self, allow: bool) {
        let (event, limit) = {
            let mut state = self.shared.state.lock();
            if state.allow_new() == allow {
                return;
            }
            state.config.allow_new = Some(allow);
            (state.structural(ListChanged::Reset), state.config.max_dispatch_depth)
        };
        self.shared.dispatch_opt(event, limit);
    }

    pub fn set_raise_list_changed_events(&self, raise: bool) {
        self.shared.state.lock().config.raise_list_changed_events = raise;
    }

    fn toggle(&self, field: impl Fn(&mut CollectionConfig) -> &mut bool, value: bool) {
        let (event, limit) = {
            let mut state = self.shared.state.lock();
            let slot = field(&mut state.config);
            if *slot == value {
                return;
            }
            *slot = value;
            (state.structural(ListChanged::Reset), state.config.max_dispatch_depth)
        };
        self.shared.dispatch_opt(event, limit);
    }
}

impl<T: Model + Default> ObservableSortableCollection<T> {
    /// Let `begin_add` construct items with `T::default()`.
    pub fn with_default_constructor(self) -> Self {
        let constructor: Constructor<T> = Arc::new(T::default);
        self.shared.state.lock().constructor = Some(constructor);
        self
    }
}

impl<T: Model> fmt::Debug for ObservableSortableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ObservableSortableCollection")
            .field("type", &T::TYPE_NAME)
            .field("len", &state.entries.len())
            .field("sort", &state.sort.as_ref().map(|k| (k.path().to_string(), k.direction())))
            .field("pending", &state.pending)
            .field("config", &state.config)
            .finish()
    }
}
