//! Instructions, ops, and control-flow edges.

use crate::error::CodegenError;
use crate::nir::{Local, Type, Val};

/// A branch target.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// Branch to a block, supplying its SSA parameters (phi arguments).
    Label(Local, Vec<Val>),
    /// One arm of a `Switch`: a case value and its target block.
    Case(Val, Local),
    /// The exception edge of an invoking call; names the handler block.
    Unwind(Local),
    /// No edge (calls that cannot throw).
    None,
}

/// A single instruction inside a function body.
///
/// A body is a flat instruction list: each `Label` opens a basic block
/// that runs until the next terminator (`Ret`, `Jump`, `If`, `Switch`,
/// `Unreachable`).
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Block header with the block's SSA parameters.
    Label(Local, Vec<Val>),
    /// Bind the result of an op; `unwind` routes the exceptional edge of
    /// a throwing call.
    Let(Local, Op, Next),
    Ret(Option<Val>),
    Jump(Next),
    If(Val, Next, Next),
    Switch(Val, Next, Vec<Next>),
    Unreachable,
    None,
}

/// A low-level operation bound by [`Inst::Let`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Call {
        ty: Type,
        ptr: Val,
        args: Vec<Val>,
    },
    Load {
        ty: Type,
        ptr: Val,
        volatile: bool,
    },
    Store {
        ty: Type,
        ptr: Val,
        value: Val,
        volatile: bool,
    },
    /// Address arithmetic: `getelementptr` over a typed view of `ptr`.
    Elem {
        ty: Type,
        ptr: Val,
        indexes: Vec<Val>,
    },
    Stackalloc {
        ty: Type,
        n: Option<Val>,
    },
    Extract {
        aggr: Val,
        indexes: Vec<u64>,
    },
    Insert {
        aggr: Val,
        value: Val,
        indexes: Vec<u64>,
    },
    Bin {
        op: Bin,
        ty: Type,
        l: Val,
        r: Val,
    },
    Comp {
        op: Comp,
        ty: Type,
        l: Val,
        r: Val,
    },
    Conv {
        op: Conv,
        ty: Type,
        value: Val,
    },
    Select {
        cond: Val,
        thenv: Val,
        elsev: Val,
    },
    /// An SSA alias; elided during emission.
    Copy {
        value: Val,
    },
}

impl Op {
    /// The result type of this op. A void result means the enclosing
    /// `Let` emits no binding.
    pub fn resty(&self) -> Result<Type, CodegenError> {
        match self {
            Op::Call { ty, .. } => match ty {
                Type::Function(_, ret) => Ok((**ret).clone()),
                other => Err(CodegenError::unsupported("call type", other)),
            },
            Op::Load { ty, .. } => Ok(ty.clone()),
            Op::Store { .. } => Ok(Type::Void),
            Op::Elem { .. } | Op::Stackalloc { .. } => Ok(Type::Ptr),
            Op::Extract { aggr, indexes } => aggr.ty().aggregate_elemty(indexes),
            Op::Insert { aggr, .. } => Ok(aggr.ty()),
            Op::Bin { ty, .. } | Op::Conv { ty, .. } => Ok(ty.clone()),
            Op::Comp { .. } => Ok(Type::Bool),
            Op::Select { thenv, .. } => Ok(thenv.ty()),
            Op::Copy { value } => Ok(value.ty()),
        }
    }
}

/// Binary arithmetic and bitwise opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bin {
    Iadd,
    Fadd,
    Isub,
    Fsub,
    Imul,
    Fmul,
    Sdiv,
    Udiv,
    Fdiv,
    Srem,
    Urem,
    Frem,
    Shl,
    Lshr,
    Ashr,
    And,
    Or,
    Xor,
}

impl Bin {
    /// The LLVM opcode word.
    pub fn show(self) -> &'static str {
        match self {
            Bin::Iadd => "add",
            Bin::Fadd => "fadd",
            Bin::Isub => "sub",
            Bin::Fsub => "fsub",
            Bin::Imul => "mul",
            Bin::Fmul => "fmul",
            Bin::Sdiv => "sdiv",
            Bin::Udiv => "udiv",
            Bin::Fdiv => "fdiv",
            Bin::Srem => "srem",
            Bin::Urem => "urem",
            Bin::Frem => "frem",
            Bin::Shl => "shl",
            Bin::Lshr => "lshr",
            Bin::Ashr => "ashr",
            Bin::And => "and",
            Bin::Or => "or",
            Bin::Xor => "xor",
        }
    }
}

/// Comparison opcodes. Integer comparisons carry signedness; float
/// comparisons follow the ordered-equal / unordered-not-equal convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comp {
    Ieq,
    Ine,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
    Feq,
    Fne,
    Fgt,
    Fge,
    Flt,
    Fle,
}

impl Comp {
    /// The LLVM comparison instruction with its predicate.
    pub fn show(self) -> &'static str {
        match self {
            Comp::Ieq => "icmp eq",
            Comp::Ine => "icmp ne",
            Comp::Ugt => "icmp ugt",
            Comp::Uge => "icmp uge",
            Comp::Ult => "icmp ult",
            Comp::Ule => "icmp ule",
            Comp::Sgt => "icmp sgt",
            Comp::Sge => "icmp sge",
            Comp::Slt => "icmp slt",
            Comp::Sle => "icmp sle",
            Comp::Feq => "fcmp oeq",
            Comp::Fne => "fcmp une",
            Comp::Fgt => "fcmp ogt",
            Comp::Fge => "fcmp oge",
            Comp::Flt => "fcmp olt",
            Comp::Fle => "fcmp ole",
        }
    }
}

/// Conversion opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conv {
    Trunc,
    Zext,
    Sext,
    Fptrunc,
    Fpext,
    Fptoui,
    Fptosi,
    Uitofp,
    Sitofp,
    Ptrtoint,
    Inttoptr,
    Bitcast,
}

impl Conv {
    /// The LLVM conversion mnemonic.
    pub fn show(self) -> &'static str {
        match self {
            Conv::Trunc => "trunc",
            Conv::Zext => "zext",
            Conv::Sext => "sext",
            Conv::Fptrunc => "fptrunc",
            Conv::Fpext => "fpext",
            Conv::Fptoui => "fptoui",
            Conv::Fptosi => "fptosi",
            Conv::Uitofp => "uitofp",
            Conv::Sitofp => "sitofp",
            Conv::Ptrtoint => "ptrtoint",
            Conv::Inttoptr => "inttoptr",
            Conv::Bitcast => "bitcast",
        }
    }
}
