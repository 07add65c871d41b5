//! # Change Subscription Tree
//!
//! Re-publishes the change notifications of an object *and* of the
//! notifying objects nested inside it, under fully dotted path names.
//!
//! A [`TreeTemplate`] is built once per (root type, depth): the enumerated
//! path set plus the sub-paths whose value type notifies and whose depth is
//! below the limit. Those sub-paths get a live subscription node each.
//!
//! A [`ChangeSubscriptionTree`] attaches the template to one root object.
//! When a notification arrives for full path `F`:
//!
//! 1. every node at `F` or below is rewired to the object now reachable
//!    there, so nothing keeps listening to a replaced object;
//! 2. a change for `F` is emitted;
//! 3. with cascading on, a change is emitted for every known path below `F`.
//!
//! ## Lifecycle
//!
//! Nodes live in an arena indexed like `TreeTemplate::watched`. Every
//! (re)subscription bumps the node's generation; callbacks capture the
//! generation they were registered with and ignore themselves once it has
//! moved on. Callbacks hold only a `Weak` reference to the tree, and
//! dropping the tree unsubscribes everything it still observes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::model::{ChangeNotifier, Model, ObjectRef, PropertyChanged, SubscriptionId, Value};
use crate::path::{self, ResolvedAccessor};
use crate::schema::TypeRegistry;
use crate::Result;

// ============================================================================
// TreeTemplate
// ============================================================================

/// The immutable part of a tree, shareable between trees on many roots.
#[derive(Debug)]
pub struct TreeTemplate {
    root_type: String,
    depth: usize,
    properties: Vec<ResolvedAccessor>,
    watched: Vec<ResolvedAccessor>,
}

impl TreeTemplate {
    pub fn build(registry: &TypeRegistry, root_type: &str, depth: usize) -> Result<Arc<Self>> {
        let properties: Vec<ResolvedAccessor> = path::enumerate(registry, root_type, depth, false)?.collect();
        let watched: Vec<ResolvedAccessor> = properties
            .iter()
            .filter(|p| p.depth() < depth)
            .filter(|p| registry.get(p.value_type()).is_some_and(|t| t.notifies()))
            .cloned()
            .collect();

        debug!(
            root_type,
            depth,
            properties = properties.len(),
            watched = watched.len(),
            "built change subscription template"
        );

        Ok(Arc::new(Self {
            root_type: root_type.to_string(),
            depth,
            properties,
            watched,
        }))
    }

    pub fn root_type(&self) -> &str { &self.root_type }
    pub fn depth(&self) -> usize { self.depth }

    /// Every path known to the tree, in enumeration order.
    pub fn properties(&self) -> &[ResolvedAccessor] { &self.properties }

    /// The sub-paths that get a live subscription node.
    pub fn watched(&self) -> &[ResolvedAccessor] { &self.watched }

    pub fn find(&self, name: &str) -> Option<&ResolvedAccessor> {
        self.properties.iter().find(|p| p.name() == name)
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Root,
    Node(usize),
}

/// The subscription a slot currently holds.
#[derive(Debug, Default)]
struct Link {
    observed: Option<ObjectRef>,
    subscription: Option<SubscriptionId>,
    generation: u64,
}

impl Link {
    fn detach(&mut self) {
        if let (Some(obj), Some(id)) = (&self.observed, self.subscription.take()) {
            if let Some(notifier) = obj.change_notifier() {
                notifier.unsubscribe(id);
            }
        }
        self.observed = None;
    }
}

#[derive(Debug, Default)]
struct TreeState {
    root: Link,
    nodes: Vec<Link>,
}

impl TreeState {
    fn link(&self, slot: Slot) -> Option<&Link> {
        match slot {
            Slot::Root => Some(&self.root),
            Slot::Node(i) => self.nodes.get(i),
        }
    }

    fn link_mut(&mut self, slot: Slot) -> Option<&mut Link> {
        match slot {
            Slot::Root => Some(&mut self.root),
            Slot::Node(i) => self.nodes.get_mut(i),
        }
    }
}

struct TreeInner {
    template: Arc<TreeTemplate>,
    state: Mutex<TreeState>,
    events: ChangeNotifier,
    cascade: AtomicBool,
}

impl TreeInner {
    /// Point `slot` at `next`, moving its subscription along.
    /// A no-op when `next` is the object already observed.
    fn attach(self: &Arc<Self>, state: &mut TreeState, slot: Slot, next: Option<ObjectRef>) {
        let Some(link) = state.link_mut(slot) else { return };
        if ObjectRef::same(link.observed.as_ref(), next.as_ref()) {
            return;
        }

        link.detach();
        link.generation += 1;
        link.observed = next;

        let generation = link.generation;
        if let Some(notifier) = link.observed.as_ref().and_then(|o| o.change_notifier()) {
            let weak: Weak<TreeInner> = Arc::downgrade(self);
            link.subscription = Some(notifier.subscribe(move |event: &PropertyChanged| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_changed(slot, generation, event);
                }
            }));
        }
        trace!(?slot, generation, observing = link.observed.is_some(), "rewired subscription");
    }

    fn on_changed(self: &Arc<Self>, slot: Slot, generation: u64, event: &PropertyChanged) {
        let full = {
            let state = self.state.lock();
            match state.link(slot) {
                Some(link) if link.generation == generation => {}
                _ => {
                    trace!(?slot, generation, "ignoring stale notification");
                    return;
                }
            }
            match slot {
                Slot::Root => event.name.clone(),
                Slot::Node(i) => path::join(self.template.watched[i].name(), &event.name),
            }
        };

        // Private or unregistered names never reach subscribers.
        if self.template.find(&full).is_none() {
            trace!(path = %full, "ignoring change to a path the tree does not list");
            return;
        }

        self.rewire_within(&full);
        self.emit(&full);
    }

    /// Rewire every node at or below `changed` against the current root.
    fn rewire_within(self: &Arc<Self>, changed: &str) {
        let mut state = self.state.lock();
        let root = state.root.observed.clone().map(Value::Object).unwrap_or(Value::Null);

        for (i, accessor) in self.template.watched.iter().enumerate() {
            if !path::is_within(accessor.name(), changed) {
                continue;
            }
            let next = accessor.get(&root).as_object().cloned();
            self.attach(&mut state, Slot::Node(i), next);
        }
    }

    fn emit(&self, changed: &str) {
        self.events.notify(changed);

        if self.cascade.load(Ordering::Relaxed) {
            for prop in &self.template.properties {
                if path::is_proper_descendant(prop.name(), changed) {
                    self.events.notify(prop.name());
                }
            }
        }
    }

    fn set_root(self: &Arc<Self>, obj: Option<ObjectRef>) {
        let mut state = self.state.lock();
        if ObjectRef::same(state.root.observed.as_ref(), obj.as_ref()) {
            return;
        }

        self.attach(&mut state, Slot::Root, obj.clone());
        let root = obj.map(Value::Object).unwrap_or(Value::Null);
        for (i, accessor) in self.template.watched.iter().enumerate() {
            let next = accessor.get(&root).as_object().cloned();
            self.attach(&mut state, Slot::Node(i), next);
        }
    }
}

impl Drop for TreeInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.root.detach();
        for node in &mut state.nodes {
            node.detach();
        }
    }
}

// ============================================================================
// ChangeSubscriptionTree
// ============================================================================

/// Live, self-rewiring subscription to one root object and the notifying
/// objects nested inside it.
pub struct ChangeSubscriptionTree {
    inner: Arc<TreeInner>,
}

impl ChangeSubscriptionTree {
    /// Build a template for `root_type` at `depth` and an unattached tree.
    pub fn new(registry: &TypeRegistry, root_type: &str, depth: usize) -> Result<Self> {
        Ok(Self::from_template(TreeTemplate::build(registry, root_type, depth)?))
    }

    pub fn for_model<M: Model>(registry: &TypeRegistry, depth: usize) -> Result<Self> {
        Self::new(registry, M::TYPE_NAME, depth)
    }

    /// An unattached tree sharing `template`. Cascading is on.
    pub fn from_template(template: Arc<TreeTemplate>) -> Self {
        let nodes = template.watched.iter().map(|_| Link::default()).collect();
        Self {
            inner: Arc::new(TreeInner {
                template,
                state: Mutex::new(TreeState { root: Link::default(), nodes }),
                events: ChangeNotifier::new(),
                cascade: AtomicBool::new(true),
            }),
        }
    }

    /// A new tree with this tree's template and cascade setting, attached
    /// to `obj`. Subscribers are not copied.
    pub fn spawn(&self, obj: Option<ObjectRef>) -> Self {
        let tree = Self::from_template(Arc::clone(&self.inner.template));
        tree.set_cascade_notifications(self.cascade_notifications());
        tree.set_object(obj);
        tree
    }

    pub fn template(&self) -> &Arc<TreeTemplate> {
        &self.inner.template
    }

    /// The root object currently observed.
    pub fn object(&self) -> Option<ObjectRef> {
        self.inner.state.lock().root.observed.clone()
    }

    /// Attach to `obj`, tearing down every subscription held for the
    /// previous root. `None` detaches everything.
    pub fn set_object(&self, obj: Option<ObjectRef>) {
        self.inner.set_root(obj);
    }

    /// The object the node for `path` is observing, if `path` is watched.
    pub fn observed(&self, path: &str) -> Option<ObjectRef> {
        let index = self.inner.template.watched.iter().position(|w| w.name() == path)?;
        self.inner.state.lock().nodes.get(index)?.observed.clone()
    }

    pub fn cascade_notifications(&self) -> bool {
        self.inner.cascade.load(Ordering::Relaxed)
    }

    /// Whether a change to an intermediate link also reports every path
    /// below it.
    pub fn set_cascade_notifications(&self, cascade: bool) {
        self.inner.cascade.store(cascade, Ordering::Relaxed);
    }

    /// Receive path-qualified change notifications.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PropertyChanged) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }
}

impl fmt::Debug for ChangeSubscriptionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscriptionTree")
            .field("root_type", &self.inner.template.root_type)
            .field("depth", &self.inner.template.depth)
            .field("cascade", &self.cascade_notifications())
            .field("object", &self.object())
            .finish()
    }
}
