//! # Type Registry
//!
//! An explicit, build-once description of the type graph: for every type,
//! its kind, how values of it are ordered, whether its instances raise
//! change notifications, and its declared properties with getter/setter
//! closures.
//!
//! Everything the path engine needs to know about domain types comes from
//! here. Registries are immutable once built and are shared via `Arc`.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::model::{FromValue, Model, Observable, Value};
use crate::{Error, Result};

/// Names of the built-in value-like types every registry starts with.
pub mod builtin {
    pub const BOOL: &str = "Bool";
    pub const INT: &str = "Int";
    pub const FLOAT: &str = "Float";
    pub const STRING: &str = "String";
    pub const DATE: &str = "Date";
    pub const DATETIME: &str = "DateTime";
}

// ============================================================================
// Descriptors
// ============================================================================

/// Whether a type is a leaf value or a composite object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Primitives, strings, enums. Not descended into by default.
    ValueLike,
    /// Objects with properties of their own.
    Composite,
}

/// How values of a type are ordered when sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    /// The value has a total order (`Value::natural_cmp`).
    Natural,
    /// Compare the canonical string form, case-insensitively.
    CanonicalString,
    /// Not comparable.
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    /// Resolvable by explicit path, never enumerated.
    Private,
}

pub type Getter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(&Value, Value) -> Result<()> + Send + Sync>;
pub type Formatter = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// One declared property of one type.
pub struct PropertyDescriptor {
    name: String,
    declaring_type: String,
    value_type: String,
    visibility: Visibility,
    getter: Getter,
    setter: Option<Setter>,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str { &self.name }
    pub fn declaring_type(&self) -> &str { &self.declaring_type }
    pub fn value_type(&self) -> &str { &self.value_type }
    pub fn visibility(&self) -> Visibility { self.visibility }
    pub fn is_read_only(&self) -> bool { self.setter.is_none() }

    /// Read this property from `owner`. A `Null` owner reads as `Null`.
    pub fn get(&self, owner: &Value) -> Value {
        if owner.is_null() {
            return Value::Null;
        }
        (self.getter)(owner)
    }

    /// Write this property on `owner`.
    pub fn set(&self, owner: &Value, value: Value) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(owner, value),
            None => Err(Error::ReadOnly(format!("{}.{}", self.declaring_type, self.name))),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("value_type", &self.value_type)
            .field("visibility", &self.visibility)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// Everything the registry knows about one type.
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    strategy: SortStrategy,
    notifies: bool,
    base: Option<String>,
    default_value: Value,
    formatter: Option<Formatter>,
    properties: Vec<Arc<PropertyDescriptor>>,
}

impl TypeDescriptor {
    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> TypeKind { self.kind }
    pub fn is_value_like(&self) -> bool { self.kind == TypeKind::ValueLike }
    pub fn sort_strategy(&self) -> SortStrategy { self.strategy }
    /// Whether instances expose a `ChangeNotifier`.
    pub fn notifies(&self) -> bool { self.notifies }
    pub fn base(&self) -> Option<&str> { self.base.as_deref() }
    /// Value written by `ResolvedAccessor::reset`.
    pub fn default_value(&self) -> &Value { &self.default_value }

    /// Properties declared on this type itself, in declaration order.
    pub fn declared_properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    /// Canonical string for a value of this type, if it has one.
    pub fn format(&self, value: &Value) -> Option<String> {
        match &self.formatter {
            Some(f) => f(value),
            None => value.canonical_string(),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("strategy", &self.strategy)
            .field("notifies", &self.notifies)
            .field("base", &self.base)
            .field("properties", &self.properties)
            .finish()
    }
}

// ============================================================================
// TypeBuilder
// ============================================================================

/// Fluent construction of a `TypeDescriptor`.
///
/// ```rust,ignore
/// let person = TypeBuilder::model::<Person>()
///     .notifying()
///     .property("Name", builtin::STRING, |p: &Person| p.name().into(), |p: &Person, v| p.set_name(v))
///     .read_only("ID", builtin::INT, |p: &Person| p.id().into())
///     .build();
/// ```
pub struct TypeBuilder {
    desc: TypeDescriptor,
}

impl TypeBuilder {
    fn with(name: &str, kind: TypeKind, strategy: SortStrategy) -> Self {
        Self {
            desc: TypeDescriptor {
                name: name.to_string(),
                kind,
                strategy,
                notifies: false,
                base: None,
                default_value: Value::Null,
                formatter: None,
                properties: Vec::new(),
            },
        }
    }

    /// A composite object type. Unordered until `display_with` or
    /// `natural_order` says otherwise.
    pub fn composite(name: &str) -> Self {
        Self::with(name, TypeKind::Composite, SortStrategy::Unordered)
    }

    /// A composite type named after `M::TYPE_NAME`.
    pub fn model<M: Model>() -> Self {
        Self::composite(M::TYPE_NAME)
    }

    /// A leaf type with a natural order.
    pub fn value_like(name: &str) -> Self {
        Self::with(name, TypeKind::ValueLike, SortStrategy::Natural)
    }

    /// Instances expose a `ChangeNotifier` and will be watched.
    pub fn notifying(mut self) -> Self {
        self.desc.notifies = true;
        self
    }

    /// Inherit the properties of `base` (resolved after own members).
    pub fn extends(mut self, base: &str) -> Self {
        self.desc.base = Some(base.to_string());
        self
    }

    pub fn natural_order(mut self) -> Self {
        self.desc.strategy = SortStrategy::Natural;
        self
    }

    pub fn unordered(mut self) -> Self {
        self.desc.strategy = SortStrategy::Unordered;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.desc.default_value = value.into();
        self
    }

    /// Give instances of `O` a canonical string, making the type sortable
    /// by that string.
    pub fn display_with<O, F>(mut self, display: F) -> Self
    where
        O: Observable,
        F: Fn(&O) -> String + Send + Sync + 'static,
    {
        self.desc.strategy = SortStrategy::CanonicalString;
        self.desc.formatter = Some(Arc::new(move |v: &Value| {
            v.as_object().and_then(|o| o.downcast_ref::<O>()).map(&display)
        }));
        self
    }

    /// A public read/write property on objects of type `O`.
    ///
    /// The setter receives the raw value converted with `FromValue`.
    pub fn property<O, V, G, S>(self, name: &str, value_type: &str, get: G, set: S) -> Self
    where
        O: Observable,
        V: FromValue,
        G: Fn(&O) -> Value + Send + Sync + 'static,
        S: Fn(&O, V) + Send + Sync + 'static,
    {
        self.typed_property(name, value_type, Visibility::Public, get, Some(set))
    }

    /// A public property without a setter.
    pub fn read_only<O, G>(self, name: &str, value_type: &str, get: G) -> Self
    where
        O: Observable,
        G: Fn(&O) -> Value + Send + Sync + 'static,
    {
        self.typed_property::<O, Value, G, fn(&O, Value)>(name, value_type, Visibility::Public, get, None)
    }

    /// A read/write property that resolves by explicit path but is never
    /// enumerated.
    pub fn private_property<O, V, G, S>(self, name: &str, value_type: &str, get: G, set: S) -> Self
    where
        O: Observable,
        V: FromValue,
        G: Fn(&O) -> Value + Send + Sync + 'static,
        S: Fn(&O, V) + Send + Sync + 'static,
    {
        self.typed_property(name, value_type, Visibility::Private, get, Some(set))
    }

    fn typed_property<O, V, G, S>(
        self,
        name: &str,
        value_type: &str,
        visibility: Visibility,
        get: G,
        set: Option<S>,
    ) -> Self
    where
        O: Observable,
        V: FromValue,
        G: Fn(&O) -> Value + Send + Sync + 'static,
        S: Fn(&O, V) + Send + Sync + 'static,
    {
        let getter: Getter = Arc::new(move |owner: &Value| {
            owner
                .as_object()
                .and_then(|o| o.downcast_ref::<O>())
                .map(&get)
                .unwrap_or(Value::Null)
        });

        let owner_type = self.desc.name.clone();
        let prop_name = name.to_string();
        let setter = set.map(|set| -> Setter {
            Arc::new(move |owner: &Value, value: Value| {
                let target = owner
                    .as_object()
                    .and_then(|o| o.downcast_ref::<O>())
                    .ok_or_else(|| Error::InvalidArgument(format!(
                        "cannot set {owner_type}.{prop_name} on a {}", owner.type_name()
                    )))?;
                set(target, V::from_value(value)?);
                Ok(())
            })
        });

        self.raw_property(name, value_type, visibility, getter, setter)
    }

    /// A property backed by untyped closures over the owner value.
    pub fn raw_property(
        mut self,
        name: &str,
        value_type: &str,
        visibility: Visibility,
        getter: Getter,
        setter: Option<Setter>,
    ) -> Self {
        self.desc.properties.push(Arc::new(PropertyDescriptor {
            name: name.to_string(),
            declaring_type: self.desc.name.clone(),
            value_type: value_type.to_string(),
            visibility,
            getter,
            setter,
        }));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.desc
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// The type graph paths are resolved against.
#[derive(Debug)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// A registry holding only the built-in value types.
    pub fn new() -> Self {
        let mut registry = Self { types: HashMap::new() };

        registry.register(TypeBuilder::value_like(builtin::BOOL).default_value(false).build());
        registry.register(TypeBuilder::value_like(builtin::INT).default_value(0i64).build());
        registry.register(TypeBuilder::value_like(builtin::FLOAT).default_value(0.0).build());
        registry.register(TypeBuilder::value_like(builtin::DATE).build());
        registry.register(TypeBuilder::value_like(builtin::DATETIME).build());
        registry.register(
            TypeBuilder::value_like(builtin::STRING)
                .raw_property(
                    "Length",
                    builtin::INT,
                    Visibility::Public,
                    Arc::new(|v: &Value| {
                        v.as_str()
                            .map(|s| Value::Int(s.chars().count() as i64))
                            .unwrap_or(Value::Null)
                    }),
                    None,
                )
                .build(),
        );

        registry
    }

    /// Add (or replace) a type.
    pub fn register(&mut self, desc: TypeDescriptor) -> &mut Self {
        debug!(
            type_name = %desc.name,
            properties = desc.properties.len(),
            notifies = desc.notifies,
            "registered type"
        );
        self.types.insert(desc.name.clone(), Arc::new(desc));
        self
    }

    /// Register an enumeration. Values are `Value::Enum` ordered by ordinal;
    /// the first variant is the default.
    pub fn register_enum(&mut self, name: &str, variants: &[&str]) -> &mut Self {
        let mut builder = TypeBuilder::value_like(name);
        if let Some(first) = variants.first() {
            builder = builder.default_value(Value::Enum { name: first.to_string(), ordinal: 0 });
        }
        self.register(builder.build())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<TypeDescriptor>> {
        self.get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("type '{name}' is not registered")))
    }

    /// Find a property by exact name on `type_name` or its bases, public or
    /// not. Own members shadow inherited ones.
    pub fn find_property(&self, type_name: &str, name: &str) -> Option<Arc<PropertyDescriptor>> {
        let mut current = self.get(type_name);
        let mut hops = 0;
        while let Some(desc) = current {
            if let Some(prop) = desc.properties.iter().find(|p| p.name == name) {
                return Some(Arc::clone(prop));
            }
            hops += 1;
            if hops > self.types.len() {
                // inheritance cycle
                return None;
            }
            current = desc.base.as_deref().and_then(|b| self.get(b));
        }
        None
    }

    /// Public properties of `type_name`: own members first, then inherited
    /// ones not shadowed by a more derived member.
    pub fn public_properties(&self, type_name: &str) -> Vec<Arc<PropertyDescriptor>> {
        let mut out: Vec<Arc<PropertyDescriptor>> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        let mut current = self.get(type_name);
        let mut hops = 0;

        while let Some(desc) = current {
            for prop in &desc.properties {
                if seen.contains(&prop.name.as_str()) {
                    continue;
                }
                seen.push(&prop.name);
                if prop.visibility == Visibility::Public {
                    out.push(Arc::clone(prop));
                }
            }
            hops += 1;
            if hops > self.types.len() {
                break;
            }
            current = desc.base.as_deref().and_then(|b| self.get(b));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectRef;
    use parking_lot::RwLock;

    #[derive(Debug, Default)]
    struct Animal {
        name: RwLock<Option<String>>,
        secret: RwLock<i64>,
    }
    impl Observable for Animal {}

    #[derive(Debug, Default)]
    struct Dog {
        base: Animal,
        breed: RwLock<Option<String>>,
    }
    impl Observable for Dog {}

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.register(
            TypeBuilder::composite("Animal")
                .property("Name", builtin::STRING,
                    |a: &Animal| a.name.read().clone().into(),
                    |a: &Animal, v: Option<String>| *a.name.write() = v)
                .private_property("Secret", builtin::INT,
                    |a: &Animal| (*a.secret.read()).into(),
                    |a: &Animal, v: i64| *a.secret.write() = v)
                .build(),
        );
        reg.register(
            TypeBuilder::composite("Dog")
                .extends("Animal")
                .property("Breed", builtin::STRING,
                    |d: &Dog| d.breed.read().clone().into(),
                    |d: &Dog, v: Option<String>| *d.breed.write() = v)
                .property("Name", builtin::STRING,
                    |d: &Dog| d.base.name.read().clone().into(),
                    |d: &Dog, v: Option<String>| *d.base.name.write() = v)
                .build(),
        );
        reg
    }

    #[test]
    fn test_builtins_registered() {
        let reg = TypeRegistry::new();
        for name in [builtin::BOOL, builtin::INT, builtin::FLOAT, builtin::STRING] {
            assert!(reg.require(name).unwrap().is_value_like());
        }
        let length = reg.find_property(builtin::STRING, "Length").unwrap();
        assert_eq!(length.get(&Value::from("héllo")), Value::Int(5));
        assert!(length.is_read_only());
    }

    #[test]
    fn test_inherited_and_private_lookup() {
        let reg = registry();

        // Own member shadows the inherited one
        let name = reg.find_property("Dog", "Name").unwrap();
        assert_eq!(name.declaring_type(), "Dog");

        // Private members are resolvable through the base chain
        let secret = reg.find_property("Dog", "Secret").unwrap();
        assert_eq!(secret.declaring_type(), "Animal");
        assert_eq!(secret.visibility(), Visibility::Private);

        // ...but never listed
        let names: Vec<_> = reg.public_properties("Dog").iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["Breed", "Name"]);

        assert!(reg.find_property("Dog", "name").is_none());
    }

    #[test]
    fn test_typed_setter_rejects_wrong_type() {
        let reg = registry();
        let dog = ObjectRef::new(std::sync::Arc::new(Dog::default()));
        let breed = reg.find_property("Dog", "Breed").unwrap();

        breed.set(&Value::Object(dog.clone()), Value::from("Kelpie")).unwrap();
        assert_eq!(breed.get(&Value::Object(dog.clone())), Value::from("Kelpie"));
        assert!(breed.set(&Value::Object(dog), Value::Int(3)).is_err());
        assert!(breed.set(&Value::Int(1), Value::from("x")).is_err());
    }

    #[test]
    fn test_enum_default() {
        let mut reg = TypeRegistry::new();
        reg.register_enum("State", &["ACT", "NSW"]);
        let state = reg.require("State").unwrap();
        assert_eq!(state.sort_strategy(), SortStrategy::Natural);
        assert_eq!(state.default_value(), &Value::Enum { name: "ACT".into(), ordinal: 0 });
    }
}
