//! Ordering of root objects by the value at a property path.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Value;
use crate::model::value::cmp_ignore_case;
use crate::path::ResolvedAccessor;
use crate::schema::{SortStrategy, TypeDescriptor, TypeRegistry};
use crate::{Error, Result};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Whether values of `type_name` can be ordered at all.
pub fn can_compare(registry: &TypeRegistry, type_name: &str) -> bool {
    registry
        .get(type_name)
        .is_some_and(|t| t.sort_strategy() != SortStrategy::Unordered)
}

/// Compares two roots by the value each has at a path.
///
/// The strategy is fixed when the comparer is built. Absent values,
/// including those behind an absent intermediate link, sort first in
/// ascending order.
#[derive(Clone)]
pub struct PropertyComparer {
    accessor: ResolvedAccessor,
    direction: SortDirection,
    strategy: SortStrategy,
    value_type: Arc<TypeDescriptor>,
}

impl PropertyComparer {
    /// Fails with `NotSortable` if the path's value type has no ordering.
    pub fn new(registry: &TypeRegistry, accessor: ResolvedAccessor, direction: SortDirection) -> Result<Self> {
        let not_sortable = || Error::NotSortable {
            path: accessor.name().to_string(),
            type_name: accessor.value_type().to_string(),
        };
        let value_type = registry.get(accessor.value_type()).cloned().ok_or_else(not_sortable)?;
        let strategy = value_type.sort_strategy();
        if strategy == SortStrategy::Unordered {
            return Err(not_sortable());
        }

        Ok(Self { accessor, direction, strategy, value_type })
    }

    pub fn accessor(&self) -> &ResolvedAccessor { &self.accessor }
    pub fn direction(&self) -> SortDirection { self.direction }
    pub fn strategy(&self) -> SortStrategy { self.strategy }

    /// Compare two roots.
    pub fn compare(&self, left: &Value, right: &Value) -> Ordering {
        let l = self.accessor.get(left);
        let r = self.accessor.get(right);
        self.compare_values(&l, &r)
    }

    /// Compare two already-extracted path values.
    pub fn compare_values(&self, left: &Value, right: &Value) -> Ordering {
        let ordering = match self.strategy {
            SortStrategy::Natural => left.natural_cmp(right),
            SortStrategy::CanonicalString => {
                let l = self.value_type.format(left);
                let r = self.value_type.format(right);
                compare_canonical(l.as_deref(), r.as_deref())
            }
            SortStrategy::Unordered => Ordering::Equal,
        };
        self.direction.apply(ordering)
    }
}

impl fmt::Debug for PropertyComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyComparer")
            .field("path", &self.accessor.name())
            .field("direction", &self.direction)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Case-insensitive, with `None` first and the exact string as tie-break.
fn compare_canonical(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => cmp_ignore_case(l, r),
    }
}

/// The active sort of a collection.
#[derive(Debug, Clone)]
pub struct SortKey {
    comparer: PropertyComparer,
}

impl SortKey {
    pub fn new(registry: &TypeRegistry, accessor: ResolvedAccessor, direction: SortDirection) -> Result<Self> {
        Ok(Self { comparer: PropertyComparer::new(registry, accessor, direction)? })
    }

    pub fn accessor(&self) -> &ResolvedAccessor { self.comparer.accessor() }
    pub fn path(&self) -> &str { self.comparer.accessor().name() }
    pub fn direction(&self) -> SortDirection { self.comparer.direction() }
    pub fn comparer(&self) -> &PropertyComparer { &self.comparer }
}
