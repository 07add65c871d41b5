//! # Binding Model
//!
//! The types every other module speaks: property values, handles to live
//! domain objects, and the multicast change notifier.
//!
//! Design rule: nothing here knows about paths, sorting or collections.

pub mod notifier;
pub mod object;
pub mod value;

pub use notifier::{ChangeNotifier, Notifier, PropertyChanged, SubscriptionId};
pub use object::{AsAny, Model, ObjectRef, Observable};
pub use value::{FromValue, Value};
