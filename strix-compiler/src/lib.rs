mod annotations;
mod ast;
mod binder;
mod compiler;
mod declarations;
mod decorators;
mod diagnostics;
mod generics;
mod narrowing;
mod session;
mod source;
mod symbols;
mod types;

pub use crate::annotations::{Annotation, AnnotationResolver, Receiver};
pub use crate::ast::{
    AnnAssignStatement, AssertStatement, AssignStatement, AstBuilder, AttributeExpression,
    AugAssignStatement, BinaryExpression, BinaryOperator, BoolOpExpression, BoolOperator,
    CallExpression, ClassDef, CompareExpression, CompareOperator, Constant, DictExpression,
    Expression, ExpressionKind, ForStatement, FunctionDef, IfExpression, IfStatement, ImportAlias,
    ImportFromStatement, KeywordArgument, LambdaExpression, Module, NodeId, Parameter, SourceSpan,
    Statement, StatementKind, SubscriptExpression, UnaryExpression, UnaryOperator,
    WhileStatement,
};
pub use crate::binder::{bind_module, BindResult, BoundModule, TypeBinder};
pub use crate::compiler::{Compilation, CompileOptions, Compiler};
pub use crate::declarations::{
    declare_module, resolve_hierarchy, resolve_members, resolve_module,
};
pub use crate::decorators::{
    apply_to_function, ClassDecoration, DecoratedShape, KnownDecorator,
};
pub use crate::diagnostics::{
    Diagnostic, DiagnosticLevel, Diagnostics, ErrorMode, ErrorSink, TypedSyntaxError,
};
pub use crate::generics::{GenericCache, TypeContext};
pub use crate::narrowing::{LocalTypes, LocalsBranch, NarrowingEffect, TerminalKind};
pub use crate::session::Session;
pub use crate::source::{SourceId, SourceModule};
pub use crate::symbols::{ModuleTable, Symbol, SymbolKind, SymbolTable};
pub use crate::types::{
    BuiltinFunction, Member, MemberKind, Signature, SignatureParameter, SpecialForm,
    TypeArena, TypeConstructionError, TypeData, TypeId, TypeKind, TypeParameter, Variance,
    BUILTINS_MODULE,
};
