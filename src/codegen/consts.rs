//! Constant interning, the deconstify transform, and dependency lookup.

use crate::error::CodegenError;
use crate::nir::{Defn, Global, Type, Val};

use super::emitter::Emitter;

/// Owner of all interned constants. The names are `__const::<index>`.
pub(crate) const CONST_OWNER: &str = "__const";

impl Emitter<'_> {
    /// Rewrite a value so it contains no `Const` wrapper and no copied
    /// local: copies chase through the alias map, aggregates rewrite
    /// hereditarily, and each `Const` becomes the address of an interned
    /// private global. Idempotent.
    pub(crate) fn deconstify(&mut self, value: Val) -> Val {
        match value {
            Val::Local(local, _) if self.copies.contains_key(&local) => {
                let aliased = self.copies[&local].clone();
                self.deconstify(aliased)
            }
            Val::StructValue(vals) => {
                Val::StructValue(vals.into_iter().map(|v| self.deconstify(v)).collect())
            }
            Val::ArrayValue(ty, vals) => {
                Val::ArrayValue(ty, vals.into_iter().map(|v| self.deconstify(v)).collect())
            }
            Val::Const(inner) => {
                let inner = self.deconstify(*inner);
                Val::Global(self.const_for(inner), Type::Ptr)
            }
            other => other,
        }
    }

    /// Intern a (deconstified) constant value, returning its global name.
    /// Interning is structural: identical values collapse to one global.
    pub(crate) fn const_for(&mut self, value: Val) -> Global {
        if let Some(name) = self.const_map.get(&value) {
            return name.clone();
        }
        let index = self.const_map.len();
        let name = Global::member(Global::top(CONST_OWNER), index.to_string());
        self.const_ty.insert(name.clone(), value.ty());
        self.const_map.insert(value, name.clone());
        name
    }

    /// The declared type of a referenced global.
    ///
    /// Side effect: the name is recorded as a dependency so the prelude
    /// can emit an extern declaration if this shard does not define it.
    /// Interned constants are served from the emitter's own table.
    pub(crate) fn lookup(&mut self, name: &Global) -> Result<Type, CodegenError> {
        if let Global::Member(owner, _) = name {
            if matches!(&**owner, Global::Top(id) if id == CONST_OWNER) {
                return self
                    .const_ty
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CodegenError::UndefinedGlobal(name.show()));
            }
        }
        self.touch(name.clone());
        match self.env.get(&name.show()) {
            Some(Defn::Var { ty, .. }) | Some(Defn::Const { ty, .. }) => Ok(ty.clone()),
            Some(Defn::Declare { sig, .. }) | Some(Defn::Define { sig, .. }) => Ok(sig.clone()),
            Some(defn @ Defn::Struct { .. }) => {
                Err(CodegenError::unsupported("global reference", defn))
            }
            None => Err(CodegenError::UndefinedGlobal(name.show())),
        }
    }

    /// Record a cross-reference for the prelude's dependency pass.
    pub(crate) fn touch(&mut self, name: Global) {
        self.deps.insert(name);
    }
}
