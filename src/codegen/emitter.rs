//! The per-shard emitter.
//!
//! One `Emitter` owns everything a shard needs: the text buffer, the
//! constant-intern table, the copy-elision map, the dependency set, and
//! the set of names already emitted. Nothing here is shared between
//! shards.
//!
//! `gen` produces the body first (interning constants and discovering
//! dependencies as a side effect), then the prelude, and returns
//! `prelude ‖ body`.

use std::collections::{HashMap, HashSet};

use crate::error::CodegenError;
use crate::nir::{Attrs, Defn, Global, Inst, Local, Op, Type, Val};

use super::block::max_local_id;
use super::printer::ShowBuilder;

/// Itanium typeinfo symbol of the runtime's exception-wrapper class. The
/// runtime link step provides the object; every shard declares it.
pub(crate) const EXCEPTION_WRAPPER_TYPEINFO: &str = "_ZTIN5sable16ExceptionWrapperE";

/// The typeinfo object's layout as LLVM sees it.
pub(crate) const TYPEINFO_TYPE: &str = "{ i8*, i8*, i8* }";

/// Emits one shard of defns as a complete LLVM IR module.
pub struct Emitter<'a> {
    /// The whole program's defns, keyed by normalized name. Needed for
    /// signature checks and for re-declaring cross-shard references.
    pub(crate) env: &'a HashMap<String, Defn>,
    pub(crate) target_triple: &'a str,
    pub(crate) out: ShowBuilder,
    /// Structural constants interned so far, keyed by deconstified value.
    pub(crate) const_map: HashMap<Val, Global>,
    /// Type of each interned constant.
    pub(crate) const_ty: HashMap<Global, Type>,
    /// `Op::Copy` aliases of the function currently being emitted.
    pub(crate) copies: HashMap<Local, Val>,
    /// Names referenced from emitted code; the prelude closes over them.
    pub(crate) deps: HashSet<Global>,
    /// Normalized names already emitted into this shard.
    pub(crate) generated: HashSet<String>,
    pub(crate) current_block_name: Local,
    pub(crate) current_block_split: u32,
    fresh_id: u64,
}

impl<'a> Emitter<'a> {
    pub fn new(target_triple: &'a str, env: &'a HashMap<String, Defn>) -> Self {
        Emitter {
            env,
            target_triple,
            out: ShowBuilder::new(),
            const_map: HashMap::new(),
            const_ty: HashMap::new(),
            copies: HashMap::new(),
            deps: HashSet::new(),
            generated: HashSet::new(),
            current_block_name: Local::new(0),
            current_block_split: 0,
            fresh_id: 0,
        }
    }

    /// Emit a shard's defns and return the complete module text.
    pub fn gen(&mut self, defns: &[Defn]) -> Result<String, CodegenError> {
        self.gen_defns(defns)?;
        let body = self.out.take();
        self.gen_prelude()?;
        let mut module = self.out.take();
        module.push_str(&body);
        module.push('\n');
        Ok(module)
    }

    /// A fresh local for transient registers, above every id the current
    /// body mentions.
    pub(crate) fn fresh(&mut self) -> Local {
        let id = self.fresh_id;
        self.fresh_id += 1;
        Local::new(id)
    }

    /// Emit defns in the fixed kind order (structs, consts, vars,
    /// declares, defines), deduplicating by normalized name.
    fn gen_defns(&mut self, defns: &[Defn]) -> Result<(), CodegenError> {
        fn kind(defn: &Defn) -> usize {
            match defn {
                Defn::Struct { .. } => 0,
                Defn::Const { .. } => 1,
                Defn::Var { .. } => 2,
                Defn::Declare { .. } => 3,
                Defn::Define { .. } => 4,
            }
        }
        for pass in 0..5 {
            for defn in defns.iter().filter(|d| kind(d) == pass) {
                let mn = defn.name().show();
                if self.generated.contains(&mn) {
                    continue;
                }
                self.out.newline();
                self.gen_defn(defn)?;
                self.generated.insert(mn);
            }
        }
        Ok(())
    }

    pub(crate) fn gen_defn(&mut self, defn: &Defn) -> Result<(), CodegenError> {
        match defn {
            Defn::Struct { name, tys, .. } => {
                let (name, tys) = (name.clone(), tys.clone());
                self.out.str("%");
                self.gen_global(&name);
                self.out.str(" = type { ");
                for (i, ty) in tys.iter().enumerate() {
                    if i > 0 {
                        self.out.str(", ");
                    }
                    self.gen_type(ty);
                }
                self.out.str(" }");
                Ok(())
            }
            Defn::Var {
                attrs,
                name,
                ty,
                rhs,
            } => self.gen_global_defn(attrs, name, false, ty, rhs),
            Defn::Const {
                attrs,
                name,
                ty,
                rhs,
            } => self.gen_global_defn(attrs, name, true, ty, rhs),
            Defn::Declare { attrs, name, sig } => self.gen_function_defn(attrs, name, sig, &[]),
            Defn::Define {
                attrs,
                name,
                sig,
                insts,
            } => self.gen_function_defn(attrs, name, sig, insts),
        }
    }

    fn gen_global_defn(
        &mut self,
        attrs: &Attrs,
        name: &Global,
        is_const: bool,
        ty: &Type,
        rhs: &Option<Val>,
    ) -> Result<(), CodegenError> {
        let (attrs, name, ty, rhs) = (*attrs, name.clone(), ty.clone(), rhs.clone());
        self.out.str("@");
        self.gen_global(&name);
        self.out.str(" = ");
        self.out
            .str(if attrs.is_extern { "external " } else { "hidden " });
        self.out.str(if is_const { "constant " } else { "global " });
        match &rhs {
            Some(value) => self.gen_val(value)?,
            None => self.gen_type(&ty),
        }
        Ok(())
    }

    fn gen_function_defn(
        &mut self,
        attrs: &Attrs,
        name: &Global,
        sig: &Type,
        insts: &[Inst],
    ) -> Result<(), CodegenError> {
        let Type::Function(argtys, retty) = sig else {
            return Err(CodegenError::unsupported("function signature", sig));
        };
        let (attrs, name) = (*attrs, name.clone());
        let (argtys, retty) = (argtys.clone(), (**retty).clone());
        let is_decl = insts.is_empty();

        self.out.str(if is_decl { "declare " } else { "define " });
        self.gen_type(&retty);
        self.out.str(" @");
        self.gen_global(&name);
        self.out.str("(");
        if is_decl {
            for (i, ty) in argtys.iter().enumerate() {
                if i > 0 {
                    self.out.str(", ");
                }
                self.gen_type(ty);
            }
        } else {
            // Parameter names come from the entry block's label params so
            // they line up with the body.
            let params = match insts.first() {
                Some(Inst::Label(_, params)) => params.clone(),
                _ => return Err(CodegenError::unsupported("function body", &insts)),
            };
            for (i, param) in params.iter().enumerate() {
                let Val::Local(p, ty) = param else {
                    return Err(CodegenError::unsupported("parameter", param));
                };
                if i > 0 {
                    self.out.str(", ");
                }
                let (p, ty) = (*p, ty.clone());
                self.gen_type(&ty);
                self.out.str(" %");
                self.gen_local(p);
            }
        }
        self.out.str(")");
        if let Some(hint) = attrs.inline_hint.show() {
            self.out.str(" ");
            self.out.str(hint);
        }
        if !is_decl {
            self.out
                .str(" personality i8* bitcast (i32 (...)* @__gxx_personality_v0 to i8*)");
            self.out.str(" {");
            for inst in insts {
                if let Inst::Let(n, Op::Copy { value }, _) = inst {
                    self.copies.insert(*n, value.clone());
                }
            }
            self.fresh_id = max_local_id(insts) + 1;
            self.gen_blocks(insts)?;
            self.out.newline();
            self.out.str("}");
            self.copies.clear();
        }
        Ok(())
    }

    /// Target triple, runtime support declarations, interned constants,
    /// and extern declarations for everything referenced but not defined
    /// in this shard.
    fn gen_prelude(&mut self) -> Result<(), CodegenError> {
        if !self.target_triple.is_empty() {
            self.out.newline();
            self.out.str("target triple = \"");
            self.out.str(self.target_triple);
            self.out.str("\"");
        }
        for decl in [
            "declare i32 @llvm.eh.typeid.for(i8*)",
            "declare i32 @__gxx_personality_v0(...)",
            "declare i8* @__cxa_begin_catch(i8*)",
            "declare void @__cxa_end_catch()",
        ] {
            self.out.newline();
            self.out.str(decl);
        }
        self.out.newline();
        self.out.str("@");
        self.out.str(EXCEPTION_WRAPPER_TYPEINFO);
        self.out.str(" = external constant ");
        self.out.str(TYPEINFO_TYPE);

        let mut consts: Vec<(Global, Val)> = self
            .const_map
            .iter()
            .map(|(value, name)| (name.clone(), value.clone()))
            .collect();
        consts.sort_by_key(|(name, _)| name.show());
        for (name, value) in consts {
            self.out.newline();
            self.out.str("@");
            self.gen_global(&name);
            self.out.str(" = private unnamed_addr constant ");
            self.gen_val(&value)?;
        }

        // Extern declarations for cross-shard references. Emitting one
        // can mention further struct names, so drain in rounds until the
        // module is closed.
        loop {
            let mut pending: Vec<Global> = self
                .deps
                .iter()
                .filter(|name| !self.generated.contains(&name.show()))
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            pending.sort_by_key(|name| name.show());
            for name in pending {
                let mn = name.show();
                if self.generated.contains(&mn) {
                    continue;
                }
                let defn = self
                    .env
                    .get(&mn)
                    .cloned()
                    .ok_or(CodegenError::UndefinedGlobal(mn.clone()))?;
                let extern_defn = match defn {
                    Defn::Var {
                        attrs, name, ty, ..
                    } => Defn::Var {
                        attrs: Attrs {
                            is_extern: true,
                            ..attrs
                        },
                        name,
                        ty,
                        rhs: None,
                    },
                    Defn::Const {
                        attrs, name, ty, ..
                    } => Defn::Const {
                        attrs: Attrs {
                            is_extern: true,
                            ..attrs
                        },
                        name,
                        ty,
                        rhs: None,
                    },
                    Defn::Declare { attrs, name, sig } => Defn::Declare {
                        attrs: Attrs {
                            is_extern: true,
                            ..attrs
                        },
                        name,
                        sig,
                    },
                    // A defined function seen from another shard is just a
                    // declaration here.
                    Defn::Define {
                        attrs, name, sig, ..
                    } => Defn::Declare { attrs, name, sig },
                    // Struct layouts are needed verbatim in every shard
                    // that mentions them.
                    defn @ Defn::Struct { .. } => defn,
                };
                self.out.newline();
                self.gen_defn(&extern_defn)?;
                self.generated.insert(mn);
            }
        }
        Ok(())
    }
}
