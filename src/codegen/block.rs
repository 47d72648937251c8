//! Control-flow graph construction and basic-block emission.
//!
//! A block is the maximal straight-line run from a `Label` to a
//! terminator. Blocks are classified as entry, regular (all predecessors
//! arrive via `Jump`/`If`/`Switch`), or exception handler (reached via an
//! `unwind` edge); the classification decides the prologue: nothing, phi
//! nodes, or the landing-pad sequence.
//!
//! Every reference to a block anywhere in the output uses the
//! `<name>.<split>` form, where the split counter advances once per
//! `invoke` inside the block (and once for a handler's landing-pad
//! success continuation), so phi edges point at the LLVM block a
//! predecessor actually ends in.

use std::collections::HashMap;

use crate::error::CodegenError;
use crate::nir::{Inst, Local, Next, Op, Type, Val};

use super::emitter::{Emitter, EXCEPTION_WRAPPER_TYPEINFO, TYPEINFO_TYPE};

/// One basic block, with its resolved incoming edges.
#[derive(Debug)]
pub(crate) struct Block {
    pub name: Local,
    pub params: Vec<Val>,
    /// Body instructions (the `Label` itself is stripped).
    pub insts: Vec<Inst>,
    pub is_entry: bool,
    pub is_handler: bool,
    pub in_edges: Vec<Edge>,
}

/// An incoming regular edge. `args` carries the phi arguments of the
/// branching `Next::Label`; `Case` arms target parameterless blocks and
/// carry none.
#[derive(Debug)]
pub(crate) struct Edge {
    pub from: Local,
    pub from_split: u32,
    pub args: Option<Vec<Val>>,
}

/// The CFG of one function body, in emission order.
#[derive(Debug)]
pub(crate) struct Cfg {
    pub blocks: Vec<Block>,
}

impl Cfg {
    /// Partition an instruction list into blocks and resolve edges.
    pub fn build(insts: &[Inst]) -> Result<Cfg, CodegenError> {
        let mut raw: Vec<(Local, Vec<Val>, Vec<Inst>)> = Vec::new();
        for inst in insts {
            match inst {
                Inst::Label(name, params) => {
                    raw.push((*name, params.clone(), Vec::new()));
                }
                inst => match raw.last_mut() {
                    Some((_, _, body)) => body.push(inst.clone()),
                    None => return Err(CodegenError::unsupported("body start", inst)),
                },
            }
        }
        if raw.is_empty() {
            return Err(CodegenError::unsupported("function body", &insts));
        }

        let index: HashMap<Local, usize> = raw
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| (*name, i))
            .collect();

        // Outgoing edges in instruction order: unwind targets as calls
        // appear, then the terminator's targets.
        let mut successors: Vec<Vec<(Local, Option<Vec<Val>>, bool)>> = Vec::new();
        let mut invokes: Vec<u32> = Vec::new();
        for (_, _, body) in &raw {
            let mut outs = Vec::new();
            let mut splits = 0u32;
            for inst in body {
                match inst {
                    Inst::Let(_, op, unwind) => match unwind {
                        Next::None => {}
                        Next::Unwind(handler) => {
                            if !matches!(op, Op::Call { .. }) {
                                return Err(CodegenError::unsupported("unwinding op", op));
                            }
                            splits += 1;
                            outs.push((*handler, None, true));
                        }
                        other => return Err(CodegenError::unsupported("unwind edge", other)),
                    },
                    Inst::Jump(next) => collect_next(next, &mut outs)?,
                    Inst::If(_, thenp, elsep) => {
                        collect_next(thenp, &mut outs)?;
                        collect_next(elsep, &mut outs)?;
                    }
                    Inst::Switch(_, default, cases) => {
                        collect_next(default, &mut outs)?;
                        for case in cases {
                            collect_next(case, &mut outs)?;
                        }
                    }
                    _ => {}
                }
            }
            successors.push(outs);
            invokes.push(splits);
        }

        // A block is a handler iff some in-edge unwinds into it; mixing
        // regular and unwind predecessors has no coherent prologue.
        let mut is_handler = vec![false; raw.len()];
        let mut has_regular_in = vec![false; raw.len()];
        for outs in &successors {
            for (target, _, unwinds) in outs {
                let Some(&t) = index.get(target) else {
                    return Err(CodegenError::unsupported("branch target", target));
                };
                if *unwinds {
                    is_handler[t] = true;
                } else {
                    has_regular_in[t] = true;
                }
            }
        }
        for (i, (name, _, _)) in raw.iter().enumerate() {
            if is_handler[i] && has_regular_in[i] {
                return Err(CodegenError::unsupported("handler predecessors", name));
            }
        }

        // The split a predecessor's fall-through ends in.
        let split_count: Vec<u32> = invokes
            .iter()
            .zip(&is_handler)
            .map(|(n, handler)| n + u32::from(*handler))
            .collect();

        let mut in_edges: Vec<Vec<Edge>> = (0..raw.len()).map(|_| Vec::new()).collect();
        for (from, outs) in successors.iter().enumerate() {
            for (target, args, unwinds) in outs {
                if *unwinds {
                    continue;
                }
                in_edges[index[target]].push(Edge {
                    from: raw[from].0,
                    from_split: split_count[from],
                    args: args.clone(),
                });
            }
        }

        // A predecessor may reach the same target through several arms
        // (both sides of an `If`, multiple switch cases). The phi keeps
        // one entry per edge, which LLVM accepts only when the values
        // agree; divergent values for one incoming block are unfixable
        // at print time.
        for (i, edges) in in_edges.iter().enumerate() {
            if raw[i].1.is_empty() {
                continue;
            }
            for edge in edges {
                for other in edges {
                    if edge.from == other.from && edge.args != other.args {
                        return Err(CodegenError::unsupported(
                            "divergent phi edges from one predecessor",
                            &raw[i].0,
                        ));
                    }
                }
            }
        }

        // Emission order: DFS preorder from the entry, successors in
        // instruction order; anything unreached follows in source order.
        let mut order = Vec::with_capacity(raw.len());
        let mut visited = vec![false; raw.len()];
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            for (target, _, _) in successors[i].iter().rev() {
                let t = index[target];
                if !visited[t] {
                    stack.push(t);
                }
            }
        }
        for i in 0..raw.len() {
            if !visited[i] {
                order.push(i);
            }
        }

        let mut in_edges: Vec<Option<Vec<Edge>>> = in_edges.into_iter().map(Some).collect();
        let blocks = order
            .into_iter()
            .map(|i| {
                let (name, params, insts) = raw[i].clone();
                Block {
                    name,
                    params,
                    insts,
                    is_entry: i == 0,
                    is_handler: is_handler[i],
                    in_edges: in_edges[i].take().unwrap_or_default(),
                }
            })
            .collect();
        Ok(Cfg { blocks })
    }
}

fn collect_next(
    next: &Next,
    outs: &mut Vec<(Local, Option<Vec<Val>>, bool)>,
) -> Result<(), CodegenError> {
    match next {
        Next::Label(name, args) => outs.push((*name, Some(args.clone()), false)),
        Next::Case(_, name) => outs.push((*name, None, false)),
        Next::None => {}
        other => Err(CodegenError::unsupported("next", other))?,
    }
    Ok(())
}

/// The largest local id mentioned anywhere in a body; fresh transient
/// registers are allocated above it.
pub(crate) fn max_local_id(insts: &[Inst]) -> u64 {
    fn walk_val(val: &Val, max: &mut u64) {
        match val {
            Val::Local(local, _) => *max = (*max).max(local.id()),
            Val::StructValue(vals) => vals.iter().for_each(|v| walk_val(v, max)),
            Val::ArrayValue(_, vals) => vals.iter().for_each(|v| walk_val(v, max)),
            Val::Const(inner) => walk_val(inner, max),
            _ => {}
        }
    }
    fn walk_next(next: &Next, max: &mut u64) {
        match next {
            Next::Label(name, args) => {
                *max = (*max).max(name.id());
                args.iter().for_each(|v| walk_val(v, max));
            }
            Next::Case(val, name) => {
                walk_val(val, max);
                *max = (*max).max(name.id());
            }
            Next::Unwind(name) => *max = (*max).max(name.id()),
            Next::None => {}
        }
    }
    fn walk_op(op: &Op, max: &mut u64) {
        match op {
            Op::Call { ptr, args, .. } => {
                walk_val(ptr, max);
                args.iter().for_each(|v| walk_val(v, max));
            }
            Op::Load { ptr, .. } => walk_val(ptr, max),
            Op::Store { ptr, value, .. } => {
                walk_val(ptr, max);
                walk_val(value, max);
            }
            Op::Elem { ptr, indexes, .. } => {
                walk_val(ptr, max);
                indexes.iter().for_each(|v| walk_val(v, max));
            }
            Op::Stackalloc { n, .. } => {
                if let Some(n) = n {
                    walk_val(n, max);
                }
            }
            Op::Extract { aggr, .. } => walk_val(aggr, max),
            Op::Insert { aggr, value, .. } => {
                walk_val(aggr, max);
                walk_val(value, max);
            }
            Op::Bin { l, r, .. } | Op::Comp { l, r, .. } => {
                walk_val(l, max);
                walk_val(r, max);
            }
            Op::Conv { value, .. } => walk_val(value, max),
            Op::Select { cond, thenv, elsev } => {
                walk_val(cond, max);
                walk_val(thenv, max);
                walk_val(elsev, max);
            }
            Op::Copy { value } => walk_val(value, max),
        }
    }

    let mut max = 0;
    for inst in insts {
        match inst {
            Inst::Label(name, params) => {
                max = max.max(name.id());
                params.iter().for_each(|v| walk_val(v, &mut max));
            }
            Inst::Let(name, op, unwind) => {
                max = max.max(name.id());
                walk_op(op, &mut max);
                walk_next(unwind, &mut max);
            }
            Inst::Ret(Some(val)) => walk_val(val, &mut max),
            Inst::Jump(next) => walk_next(next, &mut max),
            Inst::If(cond, thenp, elsep) => {
                walk_val(cond, &mut max);
                walk_next(thenp, &mut max);
                walk_next(elsep, &mut max);
            }
            Inst::Switch(scrut, default, cases) => {
                walk_val(scrut, &mut max);
                walk_next(default, &mut max);
                cases.iter().for_each(|n| walk_next(n, &mut max));
            }
            _ => {}
        }
    }
    max
}

impl Emitter<'_> {
    pub(crate) fn gen_blocks(&mut self, insts: &[Inst]) -> Result<(), CodegenError> {
        let cfg = Cfg::build(insts)?;
        for block in &cfg.blocks {
            self.gen_block(block)?;
        }
        Ok(())
    }

    fn gen_block(&mut self, block: &Block) -> Result<(), CodegenError> {
        self.current_block_name = block.name;
        self.current_block_split = 0;
        self.gen_block_header();
        self.out.indent();
        self.gen_block_prologue(block)?;
        for inst in &block.insts {
            self.gen_inst(inst)?;
        }
        self.out.unindent();
        Ok(())
    }

    /// `<name>.<split>:` on a fresh line.
    pub(crate) fn gen_block_header(&mut self) {
        self.out.newline();
        self.gen_block_split_name();
        self.out.str(":");
    }

    pub(crate) fn gen_block_split_name(&mut self) {
        self.gen_local(self.current_block_name);
        self.out.str(".");
        self.out.show(self.current_block_split);
    }

    fn gen_block_prologue(&mut self, block: &Block) -> Result<(), CodegenError> {
        if block.is_entry {
            return Ok(());
        }
        if block.is_handler {
            return self.gen_landing_pad(block);
        }
        // A parameterized block nothing branches to has no phi sources;
        // an empty phi value list is not parsable LLVM, and upstream
        // handing us one is a bug better surfaced than papered over.
        if !block.params.is_empty() && block.in_edges.is_empty() {
            return Err(CodegenError::unsupported(
                "parameterized block without predecessors",
                &block.name,
            ));
        }
        for (k, param) in block.params.iter().enumerate() {
            let Val::Local(name, ty) = param else {
                return Err(CodegenError::unsupported("block parameter", param));
            };
            let (name, ty) = (*name, ty.clone());
            self.out.newline();
            self.out.str("%");
            self.gen_local(name);
            self.out.str(" = phi ");
            self.gen_type(&ty);
            self.out.str(" ");
            for i in 0..block.in_edges.len() {
                let edge = &block.in_edges[i];
                let (from, from_split) = (edge.from, edge.from_split);
                let arg = match &edge.args {
                    Some(args) => args
                        .get(k)
                        .cloned()
                        .ok_or_else(|| CodegenError::unsupported("phi edge arity", &from))?,
                    None => return Err(CodegenError::unsupported("phi edge", &from)),
                };
                if i > 0 {
                    self.out.str(", ");
                }
                self.out.str("[");
                self.gen_just_val(&arg)?;
                self.out.str(", %");
                self.gen_local(from);
                self.out.str(".");
                self.out.show(from_split);
                self.out.str("]");
            }
        }
        Ok(())
    }

    /// The canonical landing-pad prologue. The caught type-id is compared
    /// against the typeinfo of the runtime's exception wrapper; mismatch
    /// resumes unwinding, match unwraps the payload pointer at offset 1
    /// into the handler's block parameter. The success continuation is
    /// split 1 of the block so downstream references stay uniform.
    fn gen_landing_pad(&mut self, block: &Block) -> Result<(), CodegenError> {
        let exc = match block.params.as_slice() {
            [Val::Local(name, Type::Ptr)] => *name,
            _ => {
                return Err(CodegenError::unsupported(
                    "exception handler parameters",
                    &block.params,
                ))
            }
        };
        let b = block.name.to_string();
        let ti = format!("bitcast ({TYPEINFO_TYPE}* @{EXCEPTION_WRAPPER_TYPEINFO} to i8*)");

        self.line(&format!(
            "%{b}.rec = landingpad {{ i8*, i32 }} catch i8* {ti}"
        ));
        self.line(&format!(
            "%{b}.rec.0 = extractvalue {{ i8*, i32 }} %{b}.rec, 0"
        ));
        self.line(&format!(
            "%{b}.rec.1 = extractvalue {{ i8*, i32 }} %{b}.rec, 1"
        ));
        self.line(&format!(
            "%{b}.rec.id = call i32 @llvm.eh.typeid.for(i8* {ti})"
        ));
        self.line(&format!(
            "%{b}.rec.cmp = icmp eq i32 %{b}.rec.1, %{b}.rec.id"
        ));
        self.line(&format!(
            "br i1 %{b}.rec.cmp, label %{b}.{}, label %{b}.landingpad.fail",
            self.current_block_split + 1
        ));
        self.out.unindent();
        self.line(&format!("{b}.landingpad.fail:"));
        self.out.indent();
        self.line(&format!("resume {{ i8*, i32 }} %{b}.rec"));
        self.out.unindent();
        self.current_block_split += 1;
        self.gen_block_header();
        self.out.indent();
        self.line(&format!(
            "%{b}.w0 = call i8* @__cxa_begin_catch(i8* %{b}.rec.0)"
        ));
        self.line(&format!("%{b}.w1 = bitcast i8* %{b}.w0 to i8**"));
        self.line(&format!(
            "%{b}.w2 = getelementptr i8*, i8** %{b}.w1, i32 1"
        ));
        self.line(&format!("%{exc} = load i8*, i8** %{b}.w2"));
        self.line("call void @__cxa_end_catch()");
        Ok(())
    }

    fn line(&mut self, s: &str) {
        self.out.newline();
        self.out.str(s);
    }
}
