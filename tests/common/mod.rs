//! Shared fixtures: a small Person → Address → City graph.

#![allow(dead_code)]

use std::sync::Arc;

use nested_binding::schema::builtin;
use nested_binding::{
    ChangeNotifier, ListChanged, Model, Observable, ObservableSortableCollection, TypeBuilder,
    TypeRegistry, Value,
};
use parking_lot::{Mutex, RwLock};

// ============================================================================
// City
// ============================================================================

#[derive(Debug, Default)]
pub struct City {
    name: RwLock<Option<String>>,
    state: RwLock<Value>,
    post_code: RwLock<i64>,
    pub changes: ChangeNotifier,
}

impl Observable for City {
    fn change_notifier(&self) -> Option<&ChangeNotifier> { Some(&self.changes) }
}

impl Model for City {
    const TYPE_NAME: &'static str = "City";
}

impl City {
    pub fn named(name: &str) -> Arc<Self> {
        let city = Self::default();
        *city.name.write() = Some(name.to_string());
        Arc::new(city)
    }

    pub fn name(&self) -> Option<String> { self.name.read().clone() }

    pub fn set_name(&self, name: Option<String>) {
        *self.name.write() = name;
        self.changes.notify("Name");
    }

    pub fn set_state(&self, state: Value) {
        *self.state.write() = state;
        self.changes.notify("State");
    }

    pub fn set_post_code(&self, code: i64) {
        *self.post_code.write() = code;
        self.changes.notify("PostCode");
    }
}

// ============================================================================
// Address
// ============================================================================

#[derive(Debug, Default)]
pub struct Address {
    street: RwLock<Option<String>>,
    city: RwLock<Option<Arc<City>>>,
    pub changes: ChangeNotifier,
}

impl Observable for Address {
    fn change_notifier(&self) -> Option<&ChangeNotifier> { Some(&self.changes) }
}

impl Model for Address {
    const TYPE_NAME: &'static str = "Address";
}

impl Address {
    pub fn in_city(city: Arc<City>) -> Arc<Self> {
        let address = Self::default();
        *address.city.write() = Some(city);
        Arc::new(address)
    }

    pub fn city(&self) -> Option<Arc<City>> { self.city.read().clone() }

    pub fn set_street(&self, street: Option<String>) {
        *self.street.write() = street;
        self.changes.notify("Street");
    }

    pub fn set_city(&self, city: Option<Arc<City>>) {
        *self.city.write() = city;
        self.changes.notify("City");
    }
}

// ============================================================================
// Person
// ============================================================================

#[derive(Debug, Default)]
pub struct Person {
    id: RwLock<i64>,
    name: RwLock<Option<String>>,
    address: RwLock<Option<Arc<Address>>>,
    pub changes: ChangeNotifier,
}

impl Observable for Person {
    fn change_notifier(&self) -> Option<&ChangeNotifier> { Some(&self.changes) }
}

impl Model for Person {
    const TYPE_NAME: &'static str = "Person";
}

impl Person {
    pub fn named(name: Option<&str>) -> Arc<Self> {
        let person = Self::default();
        *person.name.write() = name.map(str::to_string);
        Arc::new(person)
    }

    pub fn living_in(name: &str, city: &str) -> Arc<Self> {
        let person = Self::default();
        *person.name.write() = Some(name.to_string());
        *person.address.write() = Some(Address::in_city(City::named(city)));
        Arc::new(person)
    }

    pub fn id(&self) -> i64 { *self.id.read() }
    pub fn name(&self) -> Option<String> { self.name.read().clone() }
    pub fn address(&self) -> Option<Arc<Address>> { self.address.read().clone() }

    pub fn set_id(&self, id: i64) {
        *self.id.write() = id;
        self.changes.notify("ID");
    }

    pub fn set_name(&self, name: Option<String>) {
        *self.name.write() = name;
        self.changes.notify("Name");
    }

    pub fn set_address(&self, address: Option<Arc<Address>>) {
        *self.address.write() = address;
        self.changes.notify("Address");
    }
}

// ============================================================================
// Plain (non-notifying) types
// ============================================================================

#[derive(Debug, Default)]
pub struct Tag {
    pub label: RwLock<Option<String>>,
}

impl Observable for Tag {}

/// A notifying holder of a plain `Tag`.
#[derive(Debug, Default)]
pub struct Labelled {
    tag: RwLock<Option<Arc<Tag>>>,
    pub changes: ChangeNotifier,
}

impl Observable for Labelled {
    fn change_notifier(&self) -> Option<&ChangeNotifier> { Some(&self.changes) }
}

impl Model for Labelled {
    const TYPE_NAME: &'static str = "Labelled";
}

impl Labelled {
    pub fn set_tag(&self, tag: Option<Arc<Tag>>) {
        *self.tag.write() = tag;
        self.changes.notify("Tag");
    }
}

// ============================================================================
// Registry
// ============================================================================

pub const STATES: &[&str] = &["Unknown", "Ohio", "Texas"];

pub fn state(ordinal: usize) -> Value {
    Value::Enum { name: STATES[ordinal].to_string(), ordinal: ordinal as i64 }
}

pub fn registry() -> Arc<TypeRegistry> {
    let mut reg = TypeRegistry::new();
    reg.register_enum("UsState", STATES);

    reg.register(
        TypeBuilder::model::<City>()
            .notifying()
            .display_with(|c: &City| c.name().unwrap_or_default())
            .property("Name", builtin::STRING,
                |c: &City| c.name().into(),
                |c: &City, v: Option<String>| c.set_name(v))
            .property("State", "UsState",
                |c: &City| c.state.read().clone(),
                |c: &City, v: Value| c.set_state(v))
            .property("PostCode", builtin::INT,
                |c: &City| Value::Int(*c.post_code.read()),
                |c: &City, v: i64| c.set_post_code(v))
            .build(),
    );
    reg.register(
        TypeBuilder::model::<Address>()
            .notifying()
            .property("Street", builtin::STRING,
                |a: &Address| a.street.read().clone().into(),
                |a: &Address, v: Option<String>| a.set_street(v))
            .property("City", "City",
                |a: &Address| a.city().into(),
                |a: &Address, v: Option<Arc<City>>| a.set_city(v))
            .build(),
    );
    reg.register(
        TypeBuilder::model::<Person>()
            .notifying()
            .property("ID", builtin::INT,
                |p: &Person| Value::Int(p.id()),
                |p: &Person, v: i64| p.set_id(v))
            .property("Name", builtin::STRING,
                |p: &Person| p.name().into(),
                |p: &Person, v: Option<String>| p.set_name(v))
            .property("Address", "Address",
                |p: &Person| p.address().into(),
                |p: &Person, v: Option<Arc<Address>>| p.set_address(v))
            .build(),
    );

    reg.register(
        TypeBuilder::composite("Tag")
            .property("Label", builtin::STRING,
                |t: &Tag| t.label.read().clone().into(),
                |t: &Tag, v: Option<String>| *t.label.write() = v)
            .build(),
    );
    reg.register(
        TypeBuilder::model::<Labelled>()
            .notifying()
            .property("Tag", "Tag",
                |l: &Labelled| l.tag.read().clone().into(),
                |l: &Labelled, v: Option<Arc<Tag>>| l.set_tag(v))
            .build(),
    );

    Arc::new(reg)
}

// ============================================================================
// Event recording
// ============================================================================

pub type Recorded<E> = Arc<Mutex<Vec<E>>>;

pub fn record_list<T: Model>(list: &ObservableSortableCollection<T>) -> Recorded<ListChanged> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    list.subscribe(move |e| sink.lock().push(e.clone()));
    seen
}

pub fn names(list: &ObservableSortableCollection<Person>) -> Vec<Option<String>> {
    list.items().iter().map(|p| p.name()).collect()
}
