//! Typed conversion of resolved values.

pub mod builtin;
pub mod context;
pub mod registry;

pub use context::{ContextGuard, ConversionContext, ConversionContextBuilder, InjectionSite};
pub use registry::{ConfigEnum, Converter, ConverterRegistry, FnConverter, PropertyConverter};

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a conversion target type.
///
/// Equality and hashing use the `TypeId`; the name is kept for messages.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, e.g. `Duration` for
    /// `core::time::Duration`.
    pub fn simple_name(&self) -> &'static str {
        simple_type_name(self.name)
    }
}

pub(crate) fn simple_type_name(name: &'static str) -> &'static str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_key_identity_and_names() {
        assert_eq!(TypeKey::of::<i32>(), TypeKey::of::<i32>());
        assert_ne!(TypeKey::of::<i32>(), TypeKey::of::<i64>());
        assert_eq!(TypeKey::of::<std::time::Duration>().simple_name(), "Duration");
        assert_eq!(TypeKey::of::<String>().simple_name(), "String");
        assert_eq!(TypeKey::of::<Vec<u8>>().simple_name(), "Vec");
        assert_eq!(TypeKey::of::<u8>().simple_name(), "u8");
    }
}
