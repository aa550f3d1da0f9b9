//! Core [`Component`] and [`Resource`] traits and associated metadata.
//!
//! Every piece of data attached to an entity implements [`Component`]; every
//! world-global singleton implements [`Resource`]. Component types receive a
//! dense [`ComponentId`] from the [`TypeRegistry`](crate::TypeRegistry) when
//! they are registered on the engine.

use std::any::{Any, TypeId};

use serde::{Deserialize, Serialize};

/// A dense, 0-based identifier for a registered component type.
///
/// Ids are handed out in registration order, so they double as bit indices
/// into a [`ComponentMask`](crate::ComponentMask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Returns the id as an index into per-type tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    /// The dense type identifier.
    pub id: ComponentId,
    /// The human-readable name of the component (e.g. `"Position"`).
    pub name: &'static str,
    /// The Rust type behind the component.
    pub type_id: TypeId,
}

/// The core component trait.
///
/// # Examples
///
/// ```rust
/// use engine_component::Component;
///
/// #[derive(Debug, Clone)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: 'static {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// A world-global singleton.
///
/// Resources are constructed by the engine when it is finalized, so they must
/// provide a [`Default`] value. They are never re-created afterwards.
pub trait Resource: Default + 'static {
    /// A human-readable name for this resource type.
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Strips the module path from a Rust type name (`a::b::Position` -> `Position`).
pub fn short_type_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    match full.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// A set of components handed to a command in one call.
///
/// Implemented for every [`Component`] and for tuples of up to eight
/// components, so `spawn(Position::default())` and
/// `spawn((Position::default(), Name::new("a")))` both work.
pub trait Bundle: 'static {
    /// Appends the Rust type and name of every member.
    fn component_types(out: &mut Vec<(TypeId, &'static str)>);

    /// Moves every member into `out`, in the order of
    /// [`Bundle::component_types`].
    fn into_components(self, out: &mut Vec<Box<dyn Any>>);
}

impl<C: Component> Bundle for C {
    fn component_types(out: &mut Vec<(TypeId, &'static str)>) {
        out.push((TypeId::of::<C>(), C::type_name()));
    }

    fn into_components(self, out: &mut Vec<Box<dyn Any>>) {
        out.push(Box::new(self));
    }
}

impl Bundle for () {
    fn component_types(_out: &mut Vec<(TypeId, &'static str)>) {}

    fn into_components(self, _out: &mut Vec<Box<dyn Any>>) {}
}

macro_rules! tuple_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn component_types(out: &mut Vec<(TypeId, &'static str)>) {
                $(out.push((TypeId::of::<$name>(), $name::type_name()));)+
            }

            #[allow(non_snake_case)]
            fn into_components(self, out: &mut Vec<Box<dyn Any>>) {
                let ($($name,)+) = self;
                $(out.push(Box::new($name));)+
            }
        }
    };
}

tuple_bundle!(A);
tuple_bundle!(A, B);
tuple_bundle!(A, B, C);
tuple_bundle!(A, B, C, D);
tuple_bundle!(A, B, C, D, E);
tuple_bundle!(A, B, C, D, E, F);
tuple_bundle!(A, B, C, D, E, F, G);
tuple_bundle!(A, B, C, D, E, F, G, H);
