//! Instruction and op emission.
//!
//! Terminators map one-to-one onto LLVM. Memory ops keep the `i8*`
//! discipline: the typed pointer exists only between a local bitcast and
//! its single use. Calls with an unwind edge become `invoke` and split
//! the current block, because LLVM requires `invoke` to terminate it.

use crate::error::CodegenError;
use crate::nir::{Inst, Local, Next, Op, Type, Val};

use super::emitter::Emitter;

impl Emitter<'_> {
    pub(crate) fn gen_inst(&mut self, inst: &Inst) -> Result<(), CodegenError> {
        match inst {
            Inst::Let(name, op, unwind) => self.gen_let(*name, op, unwind),
            Inst::Ret(None) => {
                self.out.newline();
                self.out.str("ret void");
                Ok(())
            }
            Inst::Ret(Some(value)) => {
                self.out.newline();
                self.out.str("ret ");
                self.gen_val(value)
            }
            Inst::Jump(next) => {
                self.out.newline();
                self.out.str("br ");
                self.gen_next(next)
            }
            Inst::If(cond, thenp, elsep) => {
                self.out.newline();
                self.out.str("br ");
                self.gen_val(cond)?;
                self.out.str(", ");
                self.gen_next(thenp)?;
                self.out.str(", ");
                self.gen_next(elsep)
            }
            Inst::Switch(scrut, default, cases) => {
                self.out.newline();
                self.out.str("switch ");
                self.gen_val(scrut)?;
                self.out.str(", ");
                self.gen_next(default)?;
                self.out.str(" [");
                self.out.indent();
                for case in cases {
                    self.out.newline();
                    self.gen_next(case)?;
                }
                self.out.unindent();
                self.out.newline();
                self.out.str("]");
                Ok(())
            }
            Inst::Unreachable => {
                self.out.newline();
                self.out.str("unreachable");
                Ok(())
            }
            Inst::None => Ok(()),
            Inst::Label(..) => Err(CodegenError::unsupported("instruction", inst)),
        }
    }

    /// Branch targets always name the first split of the target block;
    /// `Case` arms prepend the typed case value.
    fn gen_next(&mut self, next: &Next) -> Result<(), CodegenError> {
        match next {
            Next::Case(value, name) => {
                self.gen_val(value)?;
                self.out.str(", label %");
                self.gen_local(*name);
                self.out.str(".0");
            }
            Next::Label(name, _) | Next::Unwind(name) => {
                self.out.str("label %");
                self.gen_local(*name);
                self.out.str(".0");
            }
            Next::None => return Err(CodegenError::unsupported("next", next)),
        }
        Ok(())
    }

    fn gen_let(&mut self, name: Local, op: &Op, unwind: &Next) -> Result<(), CodegenError> {
        if !matches!(unwind, Next::None) && !matches!(op, Op::Call { .. }) {
            return Err(CodegenError::unsupported("unwinding op", op));
        }
        match op {
            // Elided; uses chase the alias through the copies map.
            Op::Copy { .. } => Ok(()),

            Op::Call { .. } => self.gen_call(name, op, unwind),

            Op::Load { ty, ptr, volatile } => {
                let (ty, volatile) = (ty.clone(), *volatile);
                let pointee = self.fresh();
                self.gen_typed_pointer(pointee, &ty, ptr)?;
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("load ");
                if volatile {
                    self.out.str("volatile ");
                }
                self.gen_type(&ty);
                self.out.str(", ");
                self.gen_type(&ty);
                self.out.str("* %");
                self.gen_local(pointee);
                Ok(())
            }

            Op::Store {
                ty,
                ptr,
                value,
                volatile,
            } => {
                let (ty, volatile) = (ty.clone(), *volatile);
                let pointee = self.fresh();
                self.gen_typed_pointer(pointee, &ty, ptr)?;
                self.out.newline();
                self.out.str("store ");
                if volatile {
                    self.out.str("volatile ");
                }
                self.gen_val(value)?;
                self.out.str(", ");
                self.gen_type(&ty);
                self.out.str("* %");
                self.gen_local(pointee);
                Ok(())
            }

            Op::Elem { ty, ptr, indexes } => {
                if indexes.is_empty() {
                    return Err(CodegenError::unsupported("elem indexes", op));
                }
                let ty = ty.clone();
                let elemty = ty.elemty(&indexes[1..])?;
                let pointee = self.fresh();
                let derived = self.fresh();
                self.gen_typed_pointer(pointee, &ty, ptr)?;
                self.out.newline();
                self.out.str("%");
                self.gen_local(derived);
                self.out.str(" = getelementptr ");
                self.gen_type(&ty);
                self.out.str(", ");
                self.gen_type(&ty);
                self.out.str("* %");
                self.gen_local(pointee);
                for index in indexes {
                    self.out.str(", ");
                    self.gen_val(index)?;
                }
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("bitcast ");
                self.gen_type(&elemty);
                self.out.str("* %");
                self.gen_local(derived);
                self.out.str(" to i8*");
                Ok(())
            }

            Op::Stackalloc { ty, n } => {
                let ty = ty.clone();
                let pointee = self.fresh();
                self.out.newline();
                self.out.str("%");
                self.gen_local(pointee);
                self.out.str(" = alloca ");
                self.gen_type(&ty);
                if let Some(n) = n {
                    self.out.str(", ");
                    self.gen_val(n)?;
                }
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("bitcast ");
                self.gen_type(&ty);
                self.out.str("* %");
                self.gen_local(pointee);
                self.out.str(" to i8*");
                Ok(())
            }

            Op::Extract { aggr, indexes } => {
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("extractvalue ");
                self.gen_val(aggr)?;
                for index in indexes {
                    self.out.str(", ");
                    self.out.show(index);
                }
                Ok(())
            }

            Op::Insert {
                aggr,
                value,
                indexes,
            } => {
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("insertvalue ");
                self.gen_val(aggr)?;
                self.out.str(", ");
                self.gen_val(value)?;
                for index in indexes {
                    self.out.str(", ");
                    self.out.show(index);
                }
                Ok(())
            }

            Op::Bin { op: bin, l, r, .. } => {
                let bin = *bin;
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str(bin.show());
                self.out.str(" ");
                self.gen_val(l)?;
                self.out.str(", ");
                self.gen_just_val(r)
            }

            Op::Comp { op: comp, l, r, .. } => {
                let comp = *comp;
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str(comp.show());
                self.out.str(" ");
                self.gen_val(l)?;
                self.out.str(", ");
                self.gen_just_val(r)
            }

            Op::Conv {
                op: conv,
                ty,
                value,
            } => {
                let (conv, ty) = (*conv, ty.clone());
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str(conv.show());
                self.out.str(" ");
                self.gen_val(value)?;
                self.out.str(" to ");
                self.gen_type(&ty);
                Ok(())
            }

            Op::Select { cond, thenv, elsev } => {
                self.out.newline();
                self.gen_bind(name, op)?;
                self.out.str("select ");
                self.gen_val(cond)?;
                self.out.str(", ");
                self.gen_val(thenv)?;
                self.out.str(", ");
                self.gen_val(elsev)
            }
        }
    }

    /// `%<tmp> = bitcast <ptr-val> to <ty>*`, the localized typed view
    /// of an `i8*` operand.
    fn gen_typed_pointer(
        &mut self,
        tmp: Local,
        ty: &Type,
        ptr: &Val,
    ) -> Result<(), CodegenError> {
        self.out.newline();
        self.out.str("%");
        self.gen_local(tmp);
        self.out.str(" = bitcast ");
        self.gen_val(ptr)?;
        self.out.str(" to ");
        self.gen_type(ty);
        self.out.str("*");
        Ok(())
    }

    /// `%<name> = ` when the op produces a value.
    fn gen_bind(&mut self, name: Local, op: &Op) -> Result<(), CodegenError> {
        if !op.resty()?.is_void() {
            self.out.str("%");
            self.gen_local(name);
            self.out.str(" = ");
        }
        Ok(())
    }

    fn gen_call(&mut self, name: Local, op: &Op, unwind: &Next) -> Result<(), CodegenError> {
        let Op::Call { ty, ptr, args } = op else {
            return Err(CodegenError::unsupported("op", op));
        };
        let (ty, args) = (ty.clone(), args.clone());
        if !matches!(ty, Type::Function(..)) {
            return Err(CodegenError::unsupported("call type", &ty));
        }
        let callee = self.deconstify(ptr.clone());

        // Direct when the callee is a known global whose recorded
        // signature matches the call-site type; otherwise cast the
        // pointer to the required function type first.
        let direct = if let Val::Global(global, _) = &callee {
            let global = global.clone();
            (self.lookup(&global)? == ty).then_some(global)
        } else {
            None
        };

        if let Some(global) = direct {
            self.out.newline();
            self.gen_bind(name, op)?;
            self.out
                .str(if matches!(unwind, Next::None) { "call " } else { "invoke " });
            self.gen_call_function_type(&ty);
            self.out.str(" @");
            self.gen_global(&global);
            self.gen_call_args(&args)?;
        } else {
            let pointee = self.fresh();
            self.out.newline();
            self.out.str("%");
            self.gen_local(pointee);
            self.out.str(" = bitcast ");
            self.gen_val(&callee)?;
            self.out.str(" to ");
            self.gen_type(&ty);
            self.out.str("*");
            self.out.newline();
            self.gen_bind(name, op)?;
            self.out
                .str(if matches!(unwind, Next::None) { "call " } else { "invoke " });
            self.gen_call_function_type(&ty);
            self.out.str(" %");
            self.gen_local(pointee);
            self.gen_call_args(&args)?;
        }

        if !matches!(unwind, Next::None) {
            self.out.str(" to label %");
            self.current_block_split += 1;
            self.gen_block_split_name();
            self.out.str(" unwind ");
            self.gen_next(unwind)?;
            self.out.unindent();
            self.gen_block_header();
            self.out.indent();
        }
        Ok(())
    }

    fn gen_call_args(&mut self, args: &[Val]) -> Result<(), CodegenError> {
        self.out.str("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.str(", ");
            }
            self.gen_val(arg)?;
        }
        self.out.str(")");
        Ok(())
    }

    /// Call sites print only the return type, except variadic signatures
    /// which need the full function type.
    fn gen_call_function_type(&mut self, ty: &Type) {
        match ty {
            Type::Function(args, ret) => {
                if args.contains(&Type::Vararg) {
                    self.gen_type(ty);
                } else {
                    let ret = (**ret).clone();
                    self.gen_type(&ret);
                }
            }
            _ => self.gen_type(ty),
        }
    }
}
