//! Top-level definitions and their attributes.

use crate::nir::{Global, Inst, Type, Val};

/// Inlining hint attached to functions. `MayInline` is the default and
/// prints nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InlineHint {
    #[default]
    MayInline,
    InlineHint,
    NoInline,
    AlwaysInline,
}

impl InlineHint {
    /// The LLVM attribute word, or `None` for the default hint.
    pub fn show(self) -> Option<&'static str> {
        match self {
            InlineHint::MayInline => None,
            InlineHint::InlineHint => Some("inlinehint"),
            InlineHint::NoInline => Some("noinline"),
            InlineHint::AlwaysInline => Some("alwaysinline"),
        }
    }
}

/// Attributes carried by every defn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attrs {
    /// External globals print `external` and drop their initializer;
    /// local ones print `hidden`.
    pub is_extern: bool,
    pub inline_hint: InlineHint,
}

impl Attrs {
    pub fn extern_() -> Self {
        Attrs {
            is_extern: true,
            ..Attrs::default()
        }
    }
}

/// A top-level NIR definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Defn {
    /// A named struct type layout: `%"name" = type { ... }`.
    Struct {
        attrs: Attrs,
        name: Global,
        tys: Vec<Type>,
    },
    /// A mutable global. `rhs: None` declares the slot by type only.
    Var {
        attrs: Attrs,
        name: Global,
        ty: Type,
        rhs: Option<Val>,
    },
    /// An immutable global.
    Const {
        attrs: Attrs,
        name: Global,
        ty: Type,
        rhs: Option<Val>,
    },
    /// A function declaration (signature only).
    Declare {
        attrs: Attrs,
        name: Global,
        sig: Type,
    },
    /// A function definition with its instruction list.
    Define {
        attrs: Attrs,
        name: Global,
        sig: Type,
        insts: Vec<Inst>,
    },
}

impl Defn {
    pub fn name(&self) -> &Global {
        match self {
            Defn::Struct { name, .. }
            | Defn::Var { name, .. }
            | Defn::Const { name, .. }
            | Defn::Declare { name, .. }
            | Defn::Define { name, .. } => name,
        }
    }

    pub fn attrs(&self) -> &Attrs {
        match self {
            Defn::Struct { attrs, .. }
            | Defn::Var { attrs, .. }
            | Defn::Const { attrs, .. }
            | Defn::Declare { attrs, .. }
            | Defn::Define { attrs, .. } => attrs,
        }
    }
}
