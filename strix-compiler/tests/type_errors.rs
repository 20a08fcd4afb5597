use std::path::PathBuf;

use strix_compiler::{
    AstBuilder, BinaryOperator, CompileOptions, Compiler, DiagnosticLevel, ErrorMode, SourceId,
    SourceModule, SourceSpan, Statement,
};

fn source(b: &AstBuilder, statements: Vec<Statement>) -> SourceModule {
    SourceModule::new(
        SourceId(0),
        "foo",
        PathBuf::from("foo.py"),
        b.module(statements),
    )
}

fn compile_errors(statements: Vec<Statement>, b: &AstBuilder) -> Vec<String> {
    let mut compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(&[source(b, statements)]);
    assert!(result.is_err(), "expected compilation to fail");
    compiler
        .diagnostics()
        .errors()
        .map(|d| d.message.clone())
        .collect()
}

fn assert_reports(messages: &[String], expected: &str) {
    assert!(
        messages.iter().any(|msg| msg == expected),
        "expected diagnostic {expected:?}, found {messages:?}"
    );
}

#[test]
fn rejects_mismatched_annotation() {
    let b = AstBuilder::new();
    let statements = vec![b.ann_assign(b.name("x"), b.name("int"), Some(b.str("one")))];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "type mismatch: str cannot be assigned to int");
}

#[test]
fn rejects_assignment_to_annotated_local() {
    let b = AstBuilder::new();
    let statements = vec![b.function_def(
        "f",
        vec![],
        None,
        vec![
            b.ann_assign(b.name("x"), b.name("int"), Some(b.int(1))),
            b.assign(b.name("x"), b.str("two")),
        ],
    )];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "type mismatch: str cannot be assigned to int");
}

#[test]
fn rejects_return_type_mismatch() {
    let b = AstBuilder::new();
    let statements = vec![b.function_def(
        "f",
        vec![],
        Some(b.name("int")),
        vec![b.ret(Some(b.str("nope")))],
    )];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "return type must be int, not str");
}

#[test]
fn bare_return_is_checked_against_none() {
    let b = AstBuilder::new();
    let statements = vec![b.function_def("f", vec![], Some(b.name("str")), vec![b.ret(None)])];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "return type must be str, not None");
}

#[test]
fn rejects_positional_argument_mismatch() {
    let b = AstBuilder::new();
    let statements = vec![
        b.function_def(
            "f",
            vec![b.param("x", Some(b.name("int")))],
            Some(b.none()),
            vec![b.pass()],
        ),
        b.expr_stmt(b.call(b.name("f"), vec![b.str("s")])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(
        &messages,
        "type mismatch: str received for positional arg 'x', expected int",
    );
}

#[test]
fn rejects_too_many_arguments() {
    let b = AstBuilder::new();
    let statements = vec![
        b.function_def(
            "f",
            vec![b.param("x", Some(b.name("int")))],
            None,
            vec![b.pass()],
        ),
        b.expr_stmt(b.call(b.name("f"), vec![b.int(1), b.int(2)])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "Mismatched number of args for foo.f. Expected 1, got 2");
}

#[test]
fn rejects_unknown_and_missing_keywords() {
    let b = AstBuilder::new();
    let statements = vec![
        b.function_def(
            "f",
            vec![b.param("x", Some(b.name("int")))],
            None,
            vec![b.pass()],
        ),
        b.expr_stmt(b.call_kw(b.name("f"), vec![], vec![("y", b.int(1))])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(
        &messages,
        "Given argument y does not exist in the definition of foo.f",
    );
    assert_reports(&messages, "Function foo.f expects a value for argument x");
}

#[test]
fn rejects_duplicate_and_mistyped_keywords() {
    let b = AstBuilder::new();
    let statements = vec![
        b.function_def(
            "f",
            vec![
                b.param("x", Some(b.name("int"))),
                b.param_default("y", Some(b.name("str")), b.str("")),
            ],
            None,
            vec![b.pass()],
        ),
        b.expr_stmt(b.call_kw(b.name("f"), vec![b.int(1)], vec![("x", b.int(2))])),
        b.expr_stmt(b.call_kw(b.name("f"), vec![b.int(1)], vec![("y", b.int(2))])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "foo.f got multiple values for argument 'x'");
    assert_reports(
        &messages,
        "type mismatch: int received for keyword arg 'y', expected str",
    );
}

#[test]
fn constructor_arguments_are_checked_against_init() {
    let b = AstBuilder::new();
    let statements = vec![
        b.class_def(
            "C",
            vec![],
            vec![b.function_def(
                "__init__",
                vec![b.param("self", None), b.param("size", Some(b.name("int")))],
                None,
                vec![b.assign(b.attr(b.name("self"), "size"), b.name("size"))],
            )],
        ),
        b.expr_stmt(b.call(b.name("C"), vec![b.str("big")])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(
        &messages,
        "type mismatch: str received for positional arg 'size', expected int",
    );
}

#[test]
fn missing_attribute_reports_once_at_the_access() {
    let b = AstBuilder::new();
    b.at(1, 0);
    let class = b.class_def("C", vec![], vec![b.pass()]);
    b.at(4, 0);
    let param = b.param("c", Some(b.name("C")));
    let receiver = b.at(5, 4).name("c");
    let access = b.at(5, 5).attr(receiver, "missing");
    let body = vec![b.at(5, 4).expr_stmt(access)];
    let function = b.at(4, 0).function_def("g", vec![param], None, body);

    let mut compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(&[source(&b, vec![class, function])]);
    assert!(result.is_err());
    let entries = compiler.diagnostics().entries();
    assert_eq!(entries.len(), 1, "unexpected diagnostics: {entries:?}");
    assert_eq!(entries[0].message, "'C' object has no attribute 'missing'");
    assert_eq!(entries[0].span, Some(SourceSpan::single_point(5, 5)));
    assert_eq!(
        entries[0].to_string(),
        "foo.py:5:5: error: 'C' object has no attribute 'missing'"
    );
}

#[test]
fn missing_class_attribute_names_the_type_object() {
    let b = AstBuilder::new();
    let statements = vec![
        b.class_def("C", vec![], vec![b.pass()]),
        b.expr_stmt(b.attr(b.name("C"), "nothing")),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "type object 'C' has no attribute 'nothing'");
}

#[test]
fn attribute_on_optional_reports_none() {
    let b = AstBuilder::new();
    let statements = vec![
        b.import_from("typing", &["Optional"]),
        b.class_def(
            "C",
            vec![],
            vec![b.ann_assign(b.name("y"), b.name("int"), None)],
        ),
        b.function_def(
            "g",
            vec![b.param(
                "x",
                Some(b.subscript(b.name("Optional"), b.name("C"))),
            )],
            None,
            vec![b.expr_stmt(b.attr(b.name("x"), "y"))],
        ),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "'NoneType' object has no attribute 'y'");
}

#[test]
fn collect_mode_reports_every_error() {
    let b = AstBuilder::new();
    let statements = vec![
        b.ann_assign(b.name("x"), b.name("int"), Some(b.str("a"))),
        b.ann_assign(b.name("y"), b.name("str"), Some(b.int(1))),
    ];
    let messages = compile_errors(statements, &b);
    assert_eq!(messages.len(), 2, "{messages:?}");
}

#[test]
fn fail_fast_mode_stops_at_the_first_error() {
    let b = AstBuilder::new();
    let statements = vec![
        b.at(1, 0).ann_assign(b.name("x"), b.name("int"), Some(b.str("a"))),
        b.at(2, 0).ann_assign(b.name("y"), b.name("str"), Some(b.int(1))),
    ];
    let mut compiler = Compiler::new(CompileOptions {
        error_mode: ErrorMode::FailFast,
        ..CompileOptions::default()
    });
    let result = compiler.compile(&[source(&b, statements)]);
    let err = result.err().map(|err| err.to_string());
    assert_eq!(err.as_deref(), Some("Type binding failed"));
    let entries = compiler.diagnostics().entries();
    assert_eq!(entries.len(), 1, "{entries:?}");
    assert_eq!(entries[0].message, "type mismatch: str cannot be assigned to int");
    assert_eq!(entries[0].span.map(|span| span.line), Some(1));
}

#[test]
fn rejects_assignment_to_final_name() {
    let b = AstBuilder::new();
    let statements = vec![
        b.import_from("typing", &["Final"]),
        b.ann_assign(b.name("LIMIT"), b.name("Final"), Some(b.int(1))),
        b.assign(b.name("LIMIT"), b.int(2)),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "Cannot assign to a Final variable");
}

#[test]
fn rejects_subclassing_final_class() {
    let b = AstBuilder::new();
    let statements = vec![
        b.import_from("typing", &["final"]),
        b.class_def("A", vec![], vec![b.pass()])
            .with_decorators(vec![b.name("final")]),
        b.class_def("B", vec![b.name("A")], vec![b.pass()]),
    ];
    let mut compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(&[source(&b, statements)]);
    assert_eq!(
        result.err().map(|err| err.to_string()).as_deref(),
        Some("Declaration failed")
    );
    let messages: Vec<_> = compiler
        .diagnostics()
        .entries()
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec!["Class `foo.B` cannot subclass a Final class: `foo.A`"]
    );
}

#[test]
fn rejects_redefinition_of_annotated_local() {
    let b = AstBuilder::new();
    let statements = vec![b.function_def(
        "f",
        vec![],
        None,
        vec![
            b.ann_assign(b.name("x"), b.name("int"), Some(b.int(1))),
            b.ann_assign(b.name("x"), b.name("str"), Some(b.str("a"))),
        ],
    )];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "Cannot redefine local variable x");
}

#[test]
fn rejects_incompatible_if_expression_branches() {
    let b = AstBuilder::new();
    let statements = vec![b.function_def(
        "f",
        vec![b.param("flag", Some(b.name("bool")))],
        None,
        vec![b.assign(
            b.name("y"),
            b.if_exp(b.name("flag"), b.int(1), b.str("a")),
        )],
    )];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "if expression has incompatible types: int and str");
}

#[test]
fn rejects_await_of_plain_value() {
    let b = AstBuilder::new();
    let statements = vec![b.async_function_def(
        "f",
        vec![],
        None,
        vec![b.expr_stmt(b.await_(b.int(1)))],
    )];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "object int can't be used in 'await' expression");
}

#[test]
fn rejects_mixed_primitive_operands() {
    let b = AstBuilder::new();
    let statements = vec![b.expr_stmt(b.binary(b.int(1), BinaryOperator::Add, b.str("a")))];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "unsupported operand type(s) for +: 'int' and 'str'");
}

#[test]
fn rejects_calling_non_callable_values() {
    let b = AstBuilder::new();
    let statements = vec![
        b.ann_assign(b.name("count"), b.name("int"), Some(b.int(1))),
        b.expr_stmt(b.call(b.name("count"), vec![])),
        b.expr_stmt(b.call(b.none(), vec![])),
    ];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "'int' object is not callable");
    assert_reports(&messages, "'NoneType' object is not callable");
}

#[test]
fn rejects_undefined_names() {
    let b = AstBuilder::new();
    let statements = vec![b.assign(b.name("y"), b.name("z"))];
    let messages = compile_errors(statements, &b);
    assert_reports(&messages, "name 'z' is not defined");
}

#[test]
fn conflicting_nested_narrowing_warns() {
    let b = AstBuilder::new();
    let statements = vec![
        b.class_def("A", vec![], vec![b.pass()]),
        b.class_def("B", vec![], vec![b.pass()]),
        b.function_def(
            "f",
            vec![b.param("o", Some(b.name("object")))],
            None,
            vec![b.if_stmt(
                b.call(b.name("isinstance"), vec![b.name("o"), b.name("A")]),
                vec![b.if_stmt(
                    b.call(b.name("isinstance"), vec![b.name("o"), b.name("B")]),
                    vec![b.pass()],
                    vec![],
                )],
                vec![],
            )],
        ),
    ];

    let mut compiler = Compiler::new(CompileOptions::default());
    assert!(compiler.compile(&[source(&b, statements.clone())]).is_ok());
    let warnings: Vec<_> = compiler.diagnostics().warnings().collect();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert_eq!(warnings[0].level, DiagnosticLevel::Warning);
    assert_eq!(
        warnings[0].message,
        "conflicting narrowing of 'o': foo.A is narrowed again to foo.B"
    );

    let mut strict = Compiler::new(CompileOptions {
        warnings_as_errors: true,
        ..CompileOptions::default()
    });
    assert!(strict.compile(&[source(&b, statements)]).is_err());
    assert!(strict.diagnostics().has_errors());
}
