//! Visibility and modifier flags for types and members.

use std::fmt;

use bitflags::bitflags;

/// Visibility modifier, recorded verbatim on each descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Internal => write!(f, "internal"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

bitflags! {
    /// Member modifier flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Static member (no receiver).
        const STATIC = 1;
        /// Virtual method (overridable in derived types).
        const VIRTUAL = 1 << 1;
        /// Override of a base virtual method.
        const OVERRIDE = 1 << 2;
    }
}

impl Modifiers {
    /// Check the static flag.
    pub fn is_static(self) -> bool {
        self.contains(Modifiers::STATIC)
    }
}
