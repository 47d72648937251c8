//! # Sable Native Backend
//!
//! The backend code generator of the Sable ahead-of-time compiler. It
//! lowers NIR, Sable's typed SSA-style native intermediate
//! representation, into textual LLVM IR for consumption by an LLVM
//! toolchain (`clang`/`opt`/`llc`).
//!
//! ## Compiler Pipeline
//!
//! ```text
//! Source -> Frontend -> Linker/Reachability -> NIR -> [this crate] -> .ll -> clang
//! ```
//!
//! The input is a fully linked and reachability-pruned defn set; the
//! output is one or more `.ll` files in a working directory, partitioned
//! to control LLVM's optimization scope (see [`codegen`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use sablec_backend::nir::{Attrs, Defn, Global, Inst, Local, Type};
//! use sablec_backend::Emitter;
//!
//! let main = Defn::Define {
//!     attrs: Attrs::default(),
//!     name: Global::top("main"),
//!     sig: Type::Function(vec![], Box::new(Type::Void)),
//!     insts: vec![Inst::Label(Local::new(0), vec![]), Inst::Ret(None)],
//! };
//!
//! let mut env = HashMap::new();
//! env.insert(main.name().show(), main.clone());
//!
//! let mut emitter = Emitter::new("", &env);
//! let module = emitter.gen(&[main]).unwrap();
//! assert!(module.contains("define void @\"main\"()"));
//! ```
//!
//! Whole programs go through [`codegen::generate`], which adds the
//! lowering fan-out, shard partitioning, and file writing.
//!
//! ## Module Overview
//!
//! - [`nir`] - The NIR data model (names, types, values, instructions)
//! - [`codegen`] - Partitioning, emission, and file writing
//! - [`error`] - The stage's error type

pub mod codegen;
pub mod error;
pub mod nir;

pub use codegen::{generate, BuildMode, Config, Emitter, Lowered, Lowering, Lto};
pub use error::CodegenError;
