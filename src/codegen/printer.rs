//! Text buffer and the name/type/value printers.
//!
//! Printing is stateful on purpose: every type mention of a named struct
//! and every global reference must be recorded in the emitter's dependency
//! set so the prelude can close the module over cross-shard references.

use std::fmt::Write;

use crate::error::CodegenError;
use crate::nir::{chars, Global, Local, Type, Val};

use super::emitter::Emitter;

/// A growable text buffer with indentation-aware newlines.
///
/// `newline` starts a fresh line at the current indentation level; `str`
/// and `show` append to the current line. One shard's whole module is
/// accumulated here and flushed to disk once.
#[derive(Debug, Default)]
pub(crate) struct ShowBuilder {
    buf: String,
    indentation: usize,
}

impl ShowBuilder {
    pub fn new() -> Self {
        ShowBuilder::default()
    }

    pub fn str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    pub fn show(&mut self, value: impl std::fmt::Display) {
        // Writing into a String cannot fail.
        let _ = write!(self.buf, "{value}");
    }

    pub fn newline(&mut self) {
        self.buf.push('\n');
        for _ in 0..self.indentation {
            self.buf.push_str("  ");
        }
    }

    pub fn indent(&mut self) {
        self.indentation += 1;
    }

    pub fn unindent(&mut self) {
        self.indentation = self.indentation.saturating_sub(1);
    }

    /// Take the accumulated text, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}

impl Emitter<'_> {
    /// Print a local name stem (`_<id>`, no sigil).
    pub(crate) fn gen_local(&mut self, local: Local) {
        self.out.show(local);
    }

    /// Print a global name in quoted form (no sigil): `"Top::member"`.
    pub(crate) fn gen_global(&mut self, name: &Global) {
        self.out.str("\"");
        self.out.show(name);
        self.out.str("\"");
    }

    /// Print a type, recording named struct mentions as dependencies so
    /// their layouts are re-emitted into this shard's prelude.
    pub(crate) fn gen_type(&mut self, ty: &Type) {
        self.touch_type(ty);
        self.out.show(ty);
    }

    fn touch_type(&mut self, ty: &Type) {
        match ty {
            Type::Struct(Some(name), tys) => {
                self.touch(name.clone());
                for ty in tys {
                    self.touch_type(ty);
                }
            }
            Type::Struct(None, tys) => {
                for ty in tys {
                    self.touch_type(ty);
                }
            }
            Type::Array(elem, _) => self.touch_type(elem),
            Type::Function(args, ret) => {
                for arg in args {
                    self.touch_type(arg);
                }
                self.touch_type(ret);
            }
            _ => {}
        }
    }

    /// Print a value in typed form: `<ty> <val>`.
    pub(crate) fn gen_val(&mut self, value: &Val) -> Result<(), CodegenError> {
        let value = self.deconstify(value.clone());
        self.gen_type(&value.ty());
        self.out.str(" ");
        self.gen_plain_val(&value)
    }

    /// Print a value without its type.
    pub(crate) fn gen_just_val(&mut self, value: &Val) -> Result<(), CodegenError> {
        let value = self.deconstify(value.clone());
        self.gen_plain_val(&value)
    }

    /// Print an already-deconstified value.
    fn gen_plain_val(&mut self, value: &Val) -> Result<(), CodegenError> {
        match value {
            Val::True => self.out.str("true"),
            Val::False => self.out.str("false"),
            Val::Null => self.out.str("null"),
            Val::Zero(_) => self.out.str("zeroinitializer"),
            Val::Undef(_) => self.out.str("undef"),
            Val::Byte(v) => self.out.show(v),
            Val::Short(v) => self.out.show(v),
            Val::Int(v) => self.out.show(v),
            Val::Long(v) => self.out.show(v),
            Val::Float(v) => self.gen_float_hex(f64::from(*v)),
            Val::Double(v) => self.gen_float_hex(*v),
            Val::Chars(s) => {
                let bytes = chars::unescape(s);
                self.out.str("c\"");
                self.out.str(&chars::escape(&bytes));
                self.out.str("\\00\"");
            }
            Val::StructValue(vals) => {
                self.out.str("{ ");
                for (i, val) in vals.iter().enumerate() {
                    if i > 0 {
                        self.out.str(", ");
                    }
                    self.gen_val(val)?;
                }
                self.out.str(" }");
            }
            Val::ArrayValue(_, vals) => {
                self.out.str("[ ");
                for (i, val) in vals.iter().enumerate() {
                    if i > 0 {
                        self.out.str(", ");
                    }
                    self.gen_val(val)?;
                }
                self.out.str(" ]");
            }
            Val::Local(name, _) => {
                self.out.str("%");
                self.gen_local(*name);
            }
            Val::Global(name, _) => {
                // Globals are addresses; the typed pointer surfaces only
                // inside this constant bitcast back to i8*.
                let ty = self.lookup(name)?;
                self.out.str("bitcast (");
                self.gen_type(&ty);
                self.out.str("* @");
                self.gen_global(name);
                self.out.str(" to i8*)");
            }
            Val::Const(_) => {
                return Err(CodegenError::unsupported("non-deconstified value", value))
            }
        }
        Ok(())
    }

    /// LLVM renders float constants as the hex bit pattern of the IEEE
    /// double value (f32 widens losslessly).
    fn gen_float_hex(&mut self, value: f64) {
        self.out.str("0x");
        let _ = write!(self.out.buf, "{:x}", value.to_bits());
    }
}
