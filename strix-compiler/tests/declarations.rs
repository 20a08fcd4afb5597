use std::path::PathBuf;

use strix_compiler::{
    declare_module, resolve_module, AstBuilder, CompileOptions, Compiler, ErrorMode, ErrorSink,
    MemberKind, NodeId, Session, SourceId, SourceModule, Statement, TypeId,
};

fn source(b: &AstBuilder, id: u32, name: &str, statements: Vec<Statement>) -> SourceModule {
    SourceModule::new(
        SourceId(id),
        name,
        PathBuf::from(format!("{name}.py")),
        b.module(statements),
    )
}

fn class_named(session: &Session, module: &str, name: &str) -> TypeId {
    let symbol = session
        .symbols
        .resolve(module, name)
        .unwrap_or_else(|| panic!("{name} not declared"));
    session
        .types
        .arena
        .class_instance(symbol.ty)
        .unwrap_or_else(|| panic!("{name} is not a class"))
}

#[test]
fn bases_may_refer_forward() {
    let b = AstBuilder::new();
    let module = source(
        &b,
        0,
        "foo",
        vec![
            b.class_def("B", vec![b.name("A")], vec![b.pass()]),
            b.class_def("A", vec![], vec![b.pass()]),
        ],
    );

    let mut session = Session::new();
    declare_module(&mut session, &module).unwrap();
    let mut sink = ErrorSink::new(ErrorMode::Collect, None);
    resolve_module(&mut session, &module, &mut sink).unwrap();
    assert!(!sink.has_errors(), "{:?}", sink.diagnostics().entries());

    let a = class_named(&session, "foo", "A");
    let b_ty = class_named(&session, "foo", "B");
    assert!(session.types.arena.is_subclass_of(b_ty, a));
    assert!(!session.types.arena.is_subclass_of(a, b_ty));
}

#[test]
fn resolving_twice_leaves_the_session_unchanged() {
    let b = AstBuilder::new();
    let module = source(
        &b,
        0,
        "foo",
        vec![
            b.import_from("typing", &["Optional"]),
            b.class_def(
                "Node",
                vec![],
                vec![
                    b.ann_assign(
                        b.name("next"),
                        b.subscript(b.name("Optional"), b.str("Node")),
                        None,
                    ),
                    b.function_def(
                        "__init__",
                        vec![b.param("self", None)],
                        None,
                        vec![b.ann_assign(
                            b.attr(b.name("self"), "count"),
                            b.name("int"),
                            Some(b.int(0)),
                        )],
                    ),
                ],
            ),
        ],
    );

    let mut session = Session::new();
    declare_module(&mut session, &module).unwrap();
    let mut sink = ErrorSink::new(ErrorMode::Collect, None);
    resolve_module(&mut session, &module, &mut sink).unwrap();
    let node = class_named(&session, "foo", "Node");
    let types_before = session.types.arena.len();
    let members_before = session.types.arena.member_closure(node);
    let bases_before = session.types.arena.get(node).bases.clone();

    resolve_module(&mut session, &module, &mut sink).unwrap();
    assert!(!sink.has_errors(), "{:?}", sink.diagnostics().entries());
    assert_eq!(session.types.arena.len(), types_before);
    assert_eq!(session.types.arena.member_closure(node), members_before);
    assert_eq!(session.types.arena.get(node).bases, bases_before);

    let count = session.types.arena.lookup_member(node, "count").cloned();
    assert_eq!(count.map(|member| member.ty), Some(TypeId::INT));
    let next = session.types.arena.lookup_member(node, "next").cloned();
    assert_eq!(
        next.map(|member| session.describe(member.ty)).as_deref(),
        Some("Optional[foo.Node]")
    );
    let init = session.types.arena.lookup_member(node, "__init__");
    assert_eq!(init.map(|member| member.kind), Some(MemberKind::Method));
}

#[test]
fn classes_are_shared_across_modules() {
    let b = AstBuilder::new();
    let base = source(
        &b,
        0,
        "shapes",
        vec![b.class_def("Shape", vec![], vec![b.pass()])],
    );
    let user = source(
        &b,
        1,
        "app",
        vec![
            b.import_from("shapes", &["Shape"]),
            b.import("shapes"),
            b.class_def("Square", vec![b.name("Shape")], vec![b.pass()]),
            b.function_def(
                "area",
                vec![b.param("s", Some(b.attr(b.name("shapes"), "Shape")))],
                Some(b.name("int")),
                vec![b.ret(Some(b.int(0)))],
            ),
            b.expr_stmt(b.call(
                b.name("area"),
                vec![b.call(b.name("Square"), vec![])],
            )),
        ],
    );

    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = match compiler.compile(&[base, user]) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err}: {:?}", compiler.diagnostics().entries()),
    };
    let shape = class_named(&compilation.session, "shapes", "Shape");
    let square = class_named(&compilation.session, "app", "Square");
    assert!(compilation.session.types.arena.is_subclass_of(square, shape));
    assert_eq!(compilation.modules.len(), 2);
}

#[test]
fn importing_a_missing_name_is_reported() {
    let b = AstBuilder::new();
    let base = source(&b, 0, "shapes", vec![b.pass()]);
    let user = source(&b, 1, "app", vec![b.at(3, 0).import_from("shapes", &["Circle"])]);

    let mut compiler = Compiler::new(CompileOptions::default());
    assert!(compiler.compile(&[base, user]).is_err());
    let entries = compiler.diagnostics().entries();
    assert_eq!(entries.len(), 1, "{entries:?}");
    assert_eq!(entries[0].message, "cannot import name 'Circle' from 'shapes'");
    assert_eq!(entries[0].filename.as_deref(), Some("app.py"));
    assert_eq!(entries[0].span.map(|span| span.line), Some(3));
}

#[test]
fn names_from_unknown_modules_are_dynamic() {
    let b = AstBuilder::new();
    let call = b.call(b.name("get"), vec![b.int(1), b.str("x")]);
    let call_id = call.id;
    let module = source(
        &b,
        0,
        "app",
        vec![
            b.import_from("requests", &["get"]),
            b.import("os"),
            b.assign(b.name("response"), call),
            b.expr_stmt(b.attr(b.name("os"), "environ")),
        ],
    );

    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = match compiler.compile(&[module]) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err}: {:?}", compiler.diagnostics().entries()),
    };
    assert_eq!(
        compilation.describe_node("app", call_id).as_deref(),
        Some("dynamic")
    );
}

#[test]
fn invalid_base_is_reported() {
    let b = AstBuilder::new();
    let module = source(
        &b,
        0,
        "foo",
        vec![
            b.import_from("typing", &["Optional"]),
            b.class_def(
                "C",
                vec![b.subscript(b.name("Optional"), b.name("int"))],
                vec![b.pass()],
            ),
        ],
    );

    let mut compiler = Compiler::new(CompileOptions::default());
    assert!(compiler.compile(&[module]).is_err());
    let messages: Vec<_> = compiler
        .diagnostics()
        .entries()
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(messages, vec!["Optional[int] is not a valid base class"]);
}

#[test]
fn type_report_describes_bound_nodes() {
    let b = AstBuilder::new();
    let value = b.call(b.name("C"), vec![]);
    let value_id = value.id;
    let module = source(
        &b,
        0,
        "foo",
        vec![
            b.class_def("C", vec![], vec![b.pass()]),
            b.assign(b.name("c"), value),
        ],
    );

    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = match compiler.compile(&[module]) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err}: {:?}", compiler.diagnostics().entries()),
    };
    let report = compilation.type_report();
    assert_eq!(report["modules"][0]["module"], "foo");
    assert_eq!(
        report["modules"][0]["types"][value_id.0.to_string()],
        "foo.C"
    );
    let rendered = compilation.type_report_string().unwrap();
    assert!(rendered.contains("\"foo.C\""));
}

fn union_of_related_classes(b: &AstBuilder, union_first: bool) -> (SourceModule, NodeId) {
    let target = b.name("o");
    let target_id = target.id;
    let takes_union = b.function_def(
        "f",
        vec![b.param(
            "u",
            Some(b.subscript(b.name("Union"), b.tuple(vec![b.name("A"), b.name("B")]))),
        )],
        None,
        vec![b.pass()],
    );
    let classes = vec![
        b.class_def("A", vec![], vec![b.pass()]),
        b.class_def("B", vec![b.name("A")], vec![b.pass()]),
    ];
    let joins = b.function_def(
        "g",
        vec![
            b.param("x", Some(b.name("A"))),
            b.param("y", Some(b.name("B"))),
        ],
        None,
        vec![b.assign(target, b.or(vec![b.name("x"), b.name("y")]))],
    );

    let mut statements = vec![b.import_from("typing", &["Union"])];
    if union_first {
        statements.push(takes_union);
        statements.extend(classes);
    } else {
        statements.extend(classes);
        statements.push(takes_union);
    }
    statements.push(joins);
    (source(b, 0, "foo", statements), target_id)
}

#[test]
fn unions_see_bases_declared_later_in_the_module() {
    for union_first in [false, true] {
        let b = AstBuilder::new();
        let (module, target_id) = union_of_related_classes(&b, union_first);

        let mut compiler = Compiler::new(CompileOptions::default());
        let mut compilation = match compiler.compile(&[module]) {
            Ok(compilation) => compilation,
            Err(err) => panic!("{err}: {:?}", compiler.diagnostics().entries()),
        };
        let a = class_named(&compilation.session, "foo", "A");
        let b_ty = class_named(&compilation.session, "foo", "B");
        assert_eq!(
            compilation.type_of("foo", target_id),
            Some(a),
            "union_first={union_first}"
        );
        assert_eq!(compilation.session.types.make_union(&[a, b_ty]).unwrap(), a);
        assert_eq!(compilation.session.types.make_union(&[b_ty, a]).unwrap(), a);
    }
}

#[test]
fn unions_see_bases_from_modules_compiled_later() {
    let b = AstBuilder::new();
    let user = source(
        &b,
        0,
        "app",
        vec![
            b.import_from("typing", &["Union"]),
            b.import_from("shapes", &["Base", "Derived"]),
            b.function_def(
                "f",
                vec![b.param(
                    "u",
                    Some(b.subscript(
                        b.name("Union"),
                        b.tuple(vec![b.name("Base"), b.name("Derived")]),
                    )),
                )],
                None,
                vec![b.pass()],
            ),
        ],
    );
    let shapes = source(
        &b,
        1,
        "shapes",
        vec![
            b.class_def("Base", vec![], vec![b.pass()]),
            b.class_def("Derived", vec![b.name("Base")], vec![b.pass()]),
        ],
    );

    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = match compiler.compile(&[user, shapes]) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err}: {:?}", compiler.diagnostics().entries()),
    };
    let session = &compilation.session;
    let base = class_named(session, "shapes", "Base");
    let function = session
        .symbols
        .resolve("app", "f")
        .map(|symbol| symbol.ty)
        .unwrap_or_else(|| panic!("f not declared"));
    let parameters = session
        .types
        .arena
        .signature(function)
        .map(|signature| signature.parameters.clone())
        .unwrap_or_default();
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].ty, base);
}
