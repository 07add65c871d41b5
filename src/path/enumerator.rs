//! Enumeration of every path reachable from a type, up to a depth.

use std::sync::Arc;

use super::ResolvedAccessor;
use crate::schema::{PropertyDescriptor, TypeRegistry};
use crate::Result;

/// Lazy, depth-first iterator over the paths of a type.
///
/// Within a type, properties come in declaration order (own members before
/// inherited ones) and each property is immediately followed by its nested
/// paths. A clone continues independently from the same position, so a
/// clone taken before iteration replays the full sequence.
#[derive(Clone)]
pub struct PropertyPaths<'r> {
    registry: &'r TypeRegistry,
    component_type: String,
    include_value_like: bool,
    stack: Vec<Frame>,
}

#[derive(Clone)]
struct Frame {
    parent: Option<ResolvedAccessor>,
    props: std::vec::IntoIter<Arc<PropertyDescriptor>>,
    depth_left: usize,
}

impl<'r> PropertyPaths<'r> {
    /// The frame listing the properties of `type_name`, or `None` when the
    /// type is unknown or a value-like type we should not descend into.
    fn frame_for(
        &self,
        type_name: &str,
        parent: Option<ResolvedAccessor>,
        depth_left: usize,
    ) -> Option<Frame> {
        let desc = self.registry.get(type_name)?;
        if desc.is_value_like() && !self.include_value_like {
            return None;
        }
        Some(Frame {
            parent,
            props: self.registry.public_properties(type_name).into_iter(),
            depth_left,
        })
    }
}

impl Iterator for PropertyPaths<'_> {
    type Item = ResolvedAccessor;

    fn next(&mut self) -> Option<ResolvedAccessor> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(prop) = frame.props.next() else {
                self.stack.pop();
                continue;
            };

            let depth_left = frame.depth_left;
            let accessor = match &frame.parent {
                None => ResolvedAccessor::direct(self.registry, &self.component_type, prop),
                Some(parent) => parent.extend(self.registry, prop),
            };

            if depth_left > 0 {
                if let Some(child) = self.frame_for(accessor.value_type(), Some(accessor.clone()), depth_left - 1) {
                    self.stack.push(child);
                }
            }
            return Some(accessor);
        }
    }
}

/// Every path of `root_type` with depth `<= max_depth`.
///
/// `max_depth = 0` is the flat property list. Value-like types (scalars,
/// strings, enums) are only descended into when `include_value_like` is
/// set, in which case their own properties (such as `String.Length`) are
/// listed too.
pub fn enumerate<'r>(
    registry: &'r TypeRegistry,
    root_type: &str,
    max_depth: usize,
    include_value_like: bool,
) -> Result<PropertyPaths<'r>> {
    registry.require(root_type)?;

    let mut paths = PropertyPaths {
        registry,
        component_type: root_type.to_string(),
        include_value_like,
        stack: Vec::new(),
    };
    if let Some(frame) = paths.frame_for(root_type, None, max_depth) {
        paths.stack.push(frame);
    }
    Ok(paths)
}
