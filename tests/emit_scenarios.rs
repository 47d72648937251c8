//! End-to-end emission scenarios: minimal NIR fragments and the IR they
//! must produce, compared with normalized whitespace.

use std::collections::HashMap;

use sablec_backend::nir::{Attrs, Defn, Global, Inst, Local, Next, Op, Type, Val};
use sablec_backend::Emitter;

/// Collapse whitespace runs so comparisons survive formatting drift.
fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn emit(defns: Vec<Defn>) -> String {
    let env: HashMap<String, Defn> = defns
        .iter()
        .map(|defn| (defn.name().show(), defn.clone()))
        .collect();
    let mut emitter = Emitter::new("", &env);
    emitter.gen(&defns).expect("emission should succeed")
}

fn assert_emits(defns: Vec<Defn>, fragments: &[&str]) {
    let ir = normalize(&emit(defns));
    for fragment in fragments {
        assert!(
            ir.contains(&normalize(fragment)),
            "expected fragment missing:\n  {fragment}\nin module:\n{ir}"
        );
    }
}

fn fnty(args: Vec<Type>, ret: Type) -> Type {
    Type::Function(args, Box::new(ret))
}

fn define(name: &str, sig: Type, insts: Vec<Inst>) -> Defn {
    Defn::Define {
        attrs: Attrs::default(),
        name: Global::top(name),
        sig,
        insts,
    }
}

fn declare(name: &str, sig: Type) -> Defn {
    Defn::Declare {
        attrs: Attrs::default(),
        name: Global::top(name),
        sig,
    }
}

#[test]
fn scenario_empty_function() {
    assert_emits(
        vec![define(
            "f",
            fnty(vec![], Type::Void),
            vec![Inst::Label(Local::new(0), vec![]), Inst::Ret(None)],
        )],
        &[r#"define void @"f"()"#, "_0.0: ret void"],
    );
}

#[test]
fn scenario_identity_i32() {
    assert_emits(
        vec![define(
            "id",
            fnty(vec![Type::I32], Type::I32),
            vec![
                Inst::Label(Local::new(0), vec![Val::Local(Local::new(1), Type::I32)]),
                Inst::Ret(Some(Val::Local(Local::new(1), Type::I32))),
            ],
        )],
        &[r#"define i32 @"id"(i32 %_1)"#, "_0.0: ret i32 %_1"],
    );
}

#[test]
fn scenario_direct_call_without_unwind() {
    let sig = fnty(vec![Type::I32], Type::I32);
    let ir = emit(vec![
        declare("g", sig.clone()),
        define(
            "f",
            fnty(vec![], Type::I32),
            vec![
                Inst::Label(Local::new(0), vec![]),
                Inst::Let(
                    Local::new(1),
                    Op::Call {
                        ty: sig,
                        ptr: Val::Global(Global::top("g"), Type::Ptr),
                        args: vec![Val::Int(5)],
                    },
                    Next::None,
                ),
                Inst::Ret(Some(Val::Local(Local::new(1), Type::I32))),
            ],
        ),
    ]);
    let ir = normalize(&ir);
    assert!(ir.contains(&normalize(r#"%_1 = call i32 @"g"(i32 5)"#)), "{ir}");
    assert!(!ir.contains("invoke"), "no split expected: {ir}");
    assert!(!ir.contains("_0.1:"), "no split expected: {ir}");
}

#[test]
fn scenario_indirect_call_bitcasts_first() {
    assert_emits(
        vec![define(
            "f",
            fnty(vec![Type::Ptr], Type::I32),
            vec![
                Inst::Label(Local::new(0), vec![Val::Local(Local::new(1), Type::Ptr)]),
                Inst::Let(
                    Local::new(2),
                    Op::Call {
                        ty: fnty(vec![Type::I32], Type::I32),
                        ptr: Val::Local(Local::new(1), Type::Ptr),
                        args: vec![Val::Int(7)],
                    },
                    Next::None,
                ),
                Inst::Ret(Some(Val::Local(Local::new(2), Type::I32))),
            ],
        )],
        &[
            "%_3 = bitcast i8* %_1 to i32 (i32)*",
            "%_2 = call i32 %_3(i32 7)",
        ],
    );
}

#[test]
fn scenario_constant_interning_across_functions() {
    let chars = || {
        Val::Const(Box::new(Val::ArrayValue(
            Type::I8,
            vec![Val::Byte(1), Val::Byte(2), Val::Byte(3)],
        )))
    };
    let ret_const = |name: &str| {
        define(
            name,
            fnty(vec![], Type::Ptr),
            vec![Inst::Label(Local::new(0), vec![]), Inst::Ret(Some(chars()))],
        )
    };
    let ir = normalize(&emit(vec![ret_const("f"), ret_const("g")]));
    let interned = normalize(
        r#"@"__const::0" = private unnamed_addr constant [3 x i8] [ i8 1, i8 2, i8 3 ]"#,
    );
    assert_eq!(
        ir.matches(&interned).count(),
        1,
        "exactly one intern expected: {ir}"
    );
    assert!(!ir.contains("__const::1"), "{ir}");
}

#[test]
fn scenario_exception_handler_prologue() {
    let sig = fnty(vec![], Type::Void);
    let ir = emit(vec![
        declare("may_throw", sig.clone()),
        define(
            "f",
            fnty(vec![], Type::Ptr),
            vec![
                Inst::Label(Local::new(0), vec![]),
                Inst::Let(
                    Local::new(1),
                    Op::Call {
                        ty: sig,
                        ptr: Val::Global(Global::top("may_throw"), Type::Ptr),
                        args: vec![],
                    },
                    Next::Unwind(Local::new(5)),
                ),
                Inst::Ret(Some(Val::Null)),
                Inst::Label(Local::new(5), vec![Val::Local(Local::new(6), Type::Ptr)]),
                Inst::Ret(Some(Val::Local(Local::new(6), Type::Ptr))),
            ],
        ),
    ]);
    let ir = normalize(&ir);
    let sequence = [
        "_5.0:",
        "%_5.rec = landingpad { i8*, i32 } catch i8* bitcast ({ i8*, i8*, i8* }* @_ZTIN5sable16ExceptionWrapperE to i8*)",
        "%_5.rec.0 = extractvalue { i8*, i32 } %_5.rec, 0",
        "%_5.rec.1 = extractvalue { i8*, i32 } %_5.rec, 1",
        "%_5.rec.id = call i32 @llvm.eh.typeid.for(i8* bitcast ({ i8*, i8*, i8* }* @_ZTIN5sable16ExceptionWrapperE to i8*))",
        "%_5.rec.cmp = icmp eq i32 %_5.rec.1, %_5.rec.id",
        "br i1 %_5.rec.cmp, label %_5.1, label %_5.landingpad.fail",
        "_5.landingpad.fail:",
        "resume { i8*, i32 } %_5.rec",
        "_5.1:",
        "%_5.w0 = call i8* @__cxa_begin_catch(i8* %_5.rec.0)",
        "%_5.w1 = bitcast i8* %_5.w0 to i8**",
        "%_5.w2 = getelementptr i8*, i8** %_5.w1, i32 1",
        "%_6 = load i8*, i8** %_5.w2",
        "call void @__cxa_end_catch()",
    ];
    let mut at = 0;
    for fragment in sequence {
        let fragment = normalize(fragment);
        match ir[at..].find(&fragment) {
            Some(pos) => at += pos + fragment.len(),
            None => panic!("missing or out of order: {fragment}\n{ir}"),
        }
    }
}
