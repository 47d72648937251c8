//! Pipeline-level properties: determinism, shard layout, module closure,
//! and the lowering seam.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use sablec_backend::nir::{Attrs, Defn, Global, Inst, Local, Next, Op, Type, Val};
use sablec_backend::{generate, BuildMode, CodegenError, Config, Lowered, Lowering, Lto};

fn fnty(args: Vec<Type>, ret: Type) -> Type {
    Type::Function(args, Box::new(ret))
}

fn call(name: Local, callee: Global, sig: Type, args: Vec<Val>) -> Inst {
    Inst::Let(
        name,
        Op::Call {
            ty: sig,
            ptr: Val::Global(callee, Type::Ptr),
            args,
        },
        Next::None,
    )
}

/// A small multi-owner program with cross-top calls, globals, a struct,
/// and an interned constant.
fn program() -> Vec<Defn> {
    let helper_sig = fnty(vec![Type::I32], Type::I32);
    let helper = Global::member(Global::top("util"), "inc_i32");
    vec![
        Defn::Struct {
            attrs: Attrs::default(),
            name: Global::top("Box"),
            tys: vec![Type::I64, Type::Ptr],
        },
        Defn::Var {
            attrs: Attrs::default(),
            name: Global::member(Global::top("app"), "state"),
            ty: Type::I64,
            rhs: Some(Val::Long(0)),
        },
        Defn::Const {
            attrs: Attrs::default(),
            name: Global::member(Global::top("app"), "banner"),
            ty: Type::Array(Box::new(Type::I8), 6),
            rhs: Some(Val::Chars("hello".into())),
        },
        Defn::Define {
            attrs: Attrs::default(),
            name: Global::member(Global::top("app"), "main"),
            sig: fnty(vec![], Type::I32),
            insts: vec![
                Inst::Label(Local::new(0), vec![]),
                call(Local::new(1), helper.clone(), helper_sig.clone(), vec![Val::Int(41)]),
                Inst::Ret(Some(Val::Local(Local::new(1), Type::I32))),
            ],
        },
        Defn::Define {
            attrs: Attrs::default(),
            name: helper,
            sig: helper_sig,
            insts: vec![
                Inst::Label(Local::new(0), vec![Val::Local(Local::new(1), Type::I32)]),
                Inst::Let(
                    Local::new(2),
                    Op::Bin {
                        op: sablec_backend::nir::Bin::Iadd,
                        ty: Type::I32,
                        l: Val::Local(Local::new(1), Type::I32),
                        r: Val::Int(1),
                    },
                    Next::None,
                ),
                Inst::Ret(Some(Val::Local(Local::new(2), Type::I32))),
            ],
        },
        Defn::Define {
            attrs: Attrs::default(),
            name: Global::member(Global::top("util"), "banner_addr"),
            sig: fnty(vec![], Type::Ptr),
            insts: vec![
                Inst::Label(Local::new(0), vec![]),
                Inst::Ret(Some(Val::Const(Box::new(Val::Chars("hello".into()))))),
            ],
        },
    ]
}

fn config(workdir: &Path, mode: BuildMode, lto: Lto) -> Config {
    Config {
        target_triple: "x86_64-unknown-linux-gnu".to_string(),
        workdir: workdir.to_path_buf(),
        mode,
        lto,
        procs: Some(4),
    }
}

fn read_outputs(workdir: &Path) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for entry in fs::read_dir(workdir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "ll") {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            out.insert(name, fs::read_to_string(path).unwrap());
        }
    }
    out
}

/// Quoted `@"..."` names defined at the top level of a module.
fn defined_names(module: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in module.lines() {
        let is_defn = line.starts_with("@\"")
            || line.starts_with("declare ")
            || line.starts_with("define ");
        if is_defn {
            if let Some(name) = quoted_names(line).into_iter().next() {
                names.push(name);
            }
        }
    }
    names
}

/// Every quoted `@"..."` name mentioned anywhere in a module.
fn quoted_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("@\"") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find('"') else { break };
        names.push(rest[..end].to_string());
        rest = &rest[end + 1..];
    }
    names
}

#[test]
fn two_runs_are_byte_identical() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    generate(&config(dir_a.path(), BuildMode::Debug, Lto::None), program(), &Lowered).unwrap();
    generate(&config(dir_b.path(), BuildMode::Debug, Lto::None), program(), &Lowered).unwrap();

    let a = read_outputs(dir_a.path());
    let b = read_outputs(dir_b.path());
    assert_eq!(
        a.keys().collect::<HashSet<_>>(),
        b.keys().collect::<HashSet<_>>()
    );
    for (name, text) in &a {
        assert_eq!(text, &b[name], "shard {name} differs between runs");
    }
}

#[test]
fn release_without_lto_is_one_module() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate(
        &config(dir.path(), BuildMode::Release, Lto::None),
        program(),
        &Lowered,
    )
    .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].file_name().unwrap(), "out.ll");
}

#[test]
fn release_with_lto_shards_like_debug() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate(
        &config(dir.path(), BuildMode::Release, Lto::Thin),
        program(),
        &Lowered,
    )
    .unwrap();
    assert!(paths.iter().all(|p| p.file_name().unwrap() != "out.ll"));
}

#[test]
fn debug_mode_shards_are_numbered_and_cover_every_defn() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate(
        &config(dir.path(), BuildMode::Debug, Lto::None),
        program(),
        &Lowered,
    )
    .unwrap();
    for path in &paths {
        let stem = path.file_stem().unwrap().to_string_lossy();
        let id: usize = stem.parse().expect("numeric shard id");
        assert!(id < 4);
    }

    // Every function definition lands in exactly one shard.
    let outputs = read_outputs(dir.path());
    for name in ["app::main", "util::inc_i32", "util::banner_addr"] {
        let definitions: usize = outputs
            .values()
            .map(|module| {
                module
                    .lines()
                    .filter(|line| {
                        line.starts_with("define ") && line.contains(&format!("@\"{name}\"("))
                    })
                    .count()
            })
            .sum();
        assert_eq!(definitions, 1, "{name} defined {definitions} times");
    }
}

#[test]
fn every_module_is_closed_over_its_references() {
    let dir = tempfile::tempdir().unwrap();
    generate(&config(dir.path(), BuildMode::Debug, Lto::None), program(), &Lowered).unwrap();
    for (file, module) in read_outputs(dir.path()) {
        let defined: HashSet<String> = defined_names(&module).into_iter().collect();
        for name in quoted_names(&module) {
            assert!(
                defined.contains(&name),
                "{file}: @\"{name}\" referenced but neither defined nor declared"
            );
        }
    }
}

#[test]
fn no_module_defines_a_name_twice() {
    let dir = tempfile::tempdir().unwrap();
    generate(&config(dir.path(), BuildMode::Debug, Lto::None), program(), &Lowered).unwrap();
    for (file, module) in read_outputs(dir.path()) {
        let defined = defined_names(&module);
        let unique: HashSet<&String> = defined.iter().collect();
        assert_eq!(
            unique.len(),
            defined.len(),
            "{file} has duplicate top-level names:\n{module}"
        );
    }
}

#[test]
fn lowering_runs_once_per_top_level_owner() {
    struct Counting(AtomicUsize);
    impl Lowering for Counting {
        fn lower(&self, group: Vec<Defn>) -> Result<Vec<Defn>, CodegenError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(group)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let counting = Counting(AtomicUsize::new(0));
    generate(
        &config(dir.path(), BuildMode::Debug, Lto::None),
        program(),
        &counting,
    )
    .unwrap();
    // Tops: Box, app, util.
    assert_eq!(counting.0.load(Ordering::SeqCst), 3);
}

#[test]
fn unreachable_parameterized_block_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let defns = vec![Defn::Define {
        attrs: Attrs::default(),
        name: Global::top("f"),
        sig: fnty(vec![], Type::Void),
        insts: vec![
            Inst::Label(Local::new(0), vec![]),
            Inst::Ret(None),
            Inst::Label(Local::new(1), vec![Val::Local(Local::new(2), Type::I32)]),
            Inst::Ret(None),
        ],
    }];
    let err = generate(
        &config(dir.path(), BuildMode::Debug, Lto::None),
        defns,
        &Lowered,
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::Unsupported { .. }));
}

#[test]
fn divergent_phi_edges_fail_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let defns = vec![Defn::Define {
        attrs: Attrs::default(),
        name: Global::top("f"),
        sig: fnty(vec![], Type::I32),
        insts: vec![
            Inst::Label(Local::new(0), vec![]),
            Inst::If(
                Val::True,
                Next::Label(Local::new(1), vec![Val::Int(1)]),
                Next::Label(Local::new(1), vec![Val::Int(2)]),
            ),
            Inst::Label(Local::new(1), vec![Val::Local(Local::new(2), Type::I32)]),
            Inst::Ret(Some(Val::Local(Local::new(2), Type::I32))),
        ],
    }];
    let err = generate(
        &config(dir.path(), BuildMode::Debug, Lto::None),
        defns,
        &Lowered,
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::Unsupported { .. }));
}

#[test]
fn undefined_reference_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let sig = fnty(vec![], Type::Void);
    let defns = vec![Defn::Define {
        attrs: Attrs::default(),
        name: Global::top("f"),
        sig: fnty(vec![], Type::Void),
        insts: vec![
            Inst::Label(Local::new(0), vec![]),
            call(Local::new(1), Global::top("nowhere"), sig, vec![]),
            Inst::Ret(None),
        ],
    }];
    let err = generate(
        &config(dir.path(), BuildMode::Debug, Lto::None),
        defns,
        &Lowered,
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::UndefinedGlobal(name) if name == "nowhere"));
}
