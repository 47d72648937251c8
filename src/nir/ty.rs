//! The closed type algebra of low-level NIR.
//!
//! Higher-level types (classes, traits, managed arrays) must have been
//! eliminated by upstream lowering; this enum can only represent types
//! with a direct LLVM rendering, so "unlowered type reached the backend"
//! is unrepresentable by construction. Structural misuse (e.g. a struct
//! index that is not an integer literal) still surfaces as
//! [`CodegenError::Unsupported`].

use std::fmt;

use crate::error::CodegenError;
use crate::nir::{Global, Val};

/// A low-level NIR type.
///
/// `Display` renders the LLVM form. All pointers at NIR boundaries are
/// `Ptr` (printed `i8*`); typed pointers appear only transiently inside a
/// single instruction pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// The `...` marker inside variadic signatures.
    Vararg,
    /// The universal `i8*` pointer.
    Ptr,
    Bool,
    /// An integer of the given bit width.
    I(u32),
    Float,
    Double,
    /// A fixed-length array value type.
    Array(Box<Type>, u64),
    /// A struct value type; named struct types print as `%"name"` and get
    /// their layout from the corresponding [`Defn::Struct`].
    ///
    /// [`Defn::Struct`]: crate::nir::Defn::Struct
    Struct(Option<Global>, Vec<Type>),
    /// A function signature: argument types and return type.
    Function(Vec<Type>, Box<Type>),
}

impl Type {
    pub const I8: Type = Type::I(8);
    pub const I16: Type = Type::I(16);
    pub const I32: Type = Type::I(32);
    pub const I64: Type = Type::I(64);

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// The element type addressed by a `getelementptr` index path.
    ///
    /// The caller strips the leading index (which steps over the pointer
    /// itself) before calling. Array steps accept any index value; struct
    /// steps require an `Int` literal.
    pub fn elemty(&self, path: &[Val]) -> Result<Type, CodegenError> {
        let mut ty = self;
        for index in path {
            ty = match ty {
                Type::Array(elem, _) => &**elem,
                Type::Struct(_, fields) => match index {
                    Val::Int(idx) => fields
                        .get(*idx as usize)
                        .ok_or_else(|| CodegenError::unsupported("struct index", index))?,
                    other => return Err(CodegenError::unsupported("struct index", other)),
                },
                other => return Err(CodegenError::unsupported("indexed type", &other)),
            };
        }
        Ok(ty.clone())
    }

    /// The element type reached by an `extractvalue`/`insertvalue` path.
    pub fn aggregate_elemty(&self, path: &[u64]) -> Result<Type, CodegenError> {
        let mut ty = self;
        for &index in path {
            ty = match ty {
                Type::Array(elem, _) => &**elem,
                Type::Struct(_, fields) => fields
                    .get(index as usize)
                    .ok_or_else(|| CodegenError::unsupported("aggregate index", &index))?,
                other => return Err(CodegenError::unsupported("aggregate type", &other)),
            };
        }
        Ok(ty.clone())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Vararg => f.write_str("..."),
            Type::Ptr => f.write_str("i8*"),
            Type::Bool => f.write_str("i1"),
            Type::I(width) => write!(f, "i{width}"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Array(elem, n) => write!(f, "[{n} x {elem}]"),
            Type::Struct(Some(name), _) => write!(f, "%\"{name}\""),
            Type::Struct(None, fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(" }")
            }
            Type::Function(args, ret) => {
                write!(f, "{ret} (")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_print_llvm_forms() {
        assert_eq!(Type::Void.to_string(), "void");
        assert_eq!(Type::Ptr.to_string(), "i8*");
        assert_eq!(Type::Bool.to_string(), "i1");
        assert_eq!(Type::I32.to_string(), "i32");
        assert_eq!(Type::Double.to_string(), "double");
    }

    #[test]
    fn compound_types_print_llvm_forms() {
        let arr = Type::Array(Box::new(Type::I8), 3);
        assert_eq!(arr.to_string(), "[3 x i8]");

        let anon = Type::Struct(None, vec![Type::I32, Type::Ptr]);
        assert_eq!(anon.to_string(), "{ i32, i8* }");

        let named = Type::Struct(Some(Global::top("Box")), vec![Type::I64]);
        assert_eq!(named.to_string(), "%\"Box\"");

        let sig = Type::Function(vec![Type::I32, Type::Vararg], Box::new(Type::Void));
        assert_eq!(sig.to_string(), "void (i32, ...)");
    }

    #[test]
    fn elemty_walks_arrays_and_structs() {
        let ty = Type::Struct(
            None,
            vec![Type::I32, Type::Array(Box::new(Type::Double), 4)],
        );
        let path = [Val::Int(1), Val::Long(2)];
        assert_eq!(ty.elemty(&path).unwrap(), Type::Double);
    }

    #[test]
    fn elemty_rejects_non_literal_struct_index() {
        let ty = Type::Struct(None, vec![Type::I32]);
        let path = [Val::Local(crate::nir::Local::new(1), Type::I32)];
        assert!(ty.elemty(&path).is_err());
    }
}
