//! Global and local names.

use std::fmt;

/// A function-local SSA name, unique within one function body.
///
/// Prints as `_<id>`; value positions prepend `%`, block labels append
/// `.<split>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(pub u64);

impl Local {
    pub const fn new(id: u64) -> Self {
        Local(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// A hierarchical global name.
///
/// `Top` names a top-level class or object; `Member` nests under another
/// global. The member id preserves the source signature tag verbatim, so
/// the printed `::`-joined form is injective and doubles as the normalized
/// identity key used by the emitter's sets and maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Global {
    /// A top-level definition owner.
    Top(String),
    /// A member of another global.
    Member(Box<Global>, String),
}

impl Global {
    pub fn top(id: impl Into<String>) -> Self {
        Global::Top(id.into())
    }

    pub fn member(owner: Global, id: impl Into<String>) -> Self {
        Global::Member(Box::new(owner), id.into())
    }

    /// The id of the enclosing top-level owner.
    pub fn top_id(&self) -> &str {
        match self {
            Global::Top(id) => id,
            Global::Member(owner, _) => owner.top_id(),
        }
    }

    /// The normalized identity form (the printed `::`-joined chain).
    pub fn show(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Global::Top(id) => f.write_str(id),
            Global::Member(owner, id) => write!(f, "{owner}::{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_prints_with_underscore() {
        assert_eq!(Local::new(42).to_string(), "_42");
    }

    #[test]
    fn member_chain_joins_with_double_colon() {
        let name = Global::member(
            Global::member(Global::top("module"), "Class"),
            "method_i32",
        );
        assert_eq!(name.show(), "module::Class::method_i32");
        assert_eq!(name.top_id(), "module");
    }
}
