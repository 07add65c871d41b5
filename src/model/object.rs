//! Domain objects as seen by the binding engine.
//!
//! The engine never inspects objects directly. It reaches their fields
//! through getter/setter closures registered in the `TypeRegistry`, and it
//! listens to them through the optional `ChangeNotifier` they expose.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::ChangeNotifier;

/// Upcasting helper so `dyn Observable` can be downcast to its concrete type.
///
/// Implemented for every `Any + Send + Sync` type; never implement it by hand.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object whose properties can be bound.
///
/// Objects that raise change notifications return their notifier; plain
/// objects keep the default and are read, never watched.
pub trait Observable: AsAny + fmt::Debug {
    fn change_notifier(&self) -> Option<&ChangeNotifier> {
        None
    }
}

/// An `Observable` with a statically known registry type name.
pub trait Model: Observable + Sized {
    const TYPE_NAME: &'static str;
}

/// Shared handle to a live domain object.
///
/// Equality is identity: two handles are equal when they point at the same
/// allocation, regardless of the object's field values.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Observable>);

impl ObjectRef {
    pub fn new<T: Observable>(obj: Arc<T>) -> Self {
        Self(obj)
    }

    pub fn from_dyn(obj: Arc<dyn Observable>) -> Self {
        Self(obj)
    }

    pub fn downcast_ref<T: Observable>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// Recover the typed `Arc`, sharing the same allocation.
    pub fn downcast<T: Observable>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).into_any().downcast::<T>().ok()
    }

    pub fn change_notifier(&self) -> Option<&ChangeNotifier> {
        self.0.change_notifier()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Address of the underlying allocation, stable for the object's lifetime.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Identity comparison of two optional handles.
    pub fn same(a: Option<&ObjectRef>, b: Option<&ObjectRef>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef@{:#x}({:?})", self.addr(), self.0)
    }
}

impl<T: Observable> From<Arc<T>> for ObjectRef {
    fn from(obj: Arc<T>) -> Self {
        Self::new(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Plain {
        value: i64,
    }

    impl Observable for Plain {}

    #[derive(Debug, Default)]
    struct Other;

    impl Observable for Other {}

    #[test]
    fn test_identity_equality() {
        let a = Arc::new(Plain { value: 1 });
        let b = Arc::new(Plain { value: 1 });

        let ra = ObjectRef::new(Arc::clone(&a));
        assert_eq!(ra, ObjectRef::new(Arc::clone(&a)));
        assert_ne!(ra, ObjectRef::new(b));
    }

    #[test]
    fn test_downcast() {
        let a = Arc::new(Plain { value: 7 });
        let r = ObjectRef::new(Arc::clone(&a));

        assert_eq!(r.downcast_ref::<Plain>().map(|p| p.value), Some(7));
        assert!(r.downcast_ref::<Other>().is_none());

        let back = r.downcast::<Plain>().unwrap();
        assert!(Arc::ptr_eq(&back, &a));
        assert!(r.downcast::<Other>().is_none());
        assert!(r.change_notifier().is_none());
    }

    #[test]
    fn test_from_dyn_keeps_identity() {
        let a: Arc<dyn Observable> = Arc::new(Plain { value: 3 });
        let r = ObjectRef::from_dyn(Arc::clone(&a));

        assert_eq!(r, ObjectRef::from_dyn(a));
        assert_eq!(r.downcast_ref::<Plain>().map(|p| p.value), Some(3));
    }
}
