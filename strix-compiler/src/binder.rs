//! The type binder: walks a module's syntax tree, gives every expression a
//! type and checks assignments, returns, calls and attribute accesses.
//!
//! Errors raised while visiting a node that carry no position of their own
//! are positioned at that node. Sequences are visited element by element so
//! each element gets its own position. In [`ErrorMode::Collect`] an
//! erroneous expression is typed as `dynamic` and traversal continues.

use std::collections::{BTreeMap, HashMap};
use std::mem;

use tracing::{debug, instrument, trace};

use crate::annotations::{Annotation, AnnotationResolver, Receiver};
use crate::ast::{
    AnnAssignStatement, AugAssignStatement, BinaryOperator, BoolOperator, CallExpression,
    ClassDef, CompareOperator, Constant, Expression, ExpressionKind, ForStatement, FunctionDef,
    IfStatement, Module, NodeId, Parameter, SourceSpan, Statement, StatementKind, UnaryOperator,
    WhileStatement,
};
use crate::diagnostics::{Diagnostics, ErrorMode, ErrorSink, TypedSyntaxError};
use crate::narrowing::{LocalTypes, LocalsBranch, NarrowingEffect, TerminalKind};
use crate::session::Session;
use crate::source::SourceModule;
use crate::types::{BuiltinFunction, MemberKind, Signature, TypeData, TypeId, TypeKind};

pub type BindResult<T> = Result<T, TypedSyntaxError>;

/// The binder's output for one module.
#[derive(Debug, Clone)]
pub struct BoundModule {
    pub name: String,
    pub node_types: BTreeMap<NodeId, TypeId>,
    pub diagnostics: Diagnostics,
}

impl BoundModule {
    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.node_types.get(&node).copied()
    }
}

/// Binds one module. In fail-fast mode the first error is returned;
/// otherwise every error ends up in the returned diagnostics.
#[instrument(skip_all, fields(module = %source.name))]
pub fn bind_module(
    session: &mut Session,
    source: &SourceModule,
    mode: ErrorMode,
) -> BindResult<BoundModule> {
    let sink = ErrorSink::new(mode, Some(source.filename()));
    TypeBinder::new(session, &source.name, sink).bind(&source.module)
}

#[derive(Debug, Clone, Copy)]
struct Declaration {
    ty: TypeId,
    is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class(TypeId),
    Function { returns: TypeId, is_init: bool },
}

#[derive(Debug)]
struct BindingScope {
    kind: ScopeKind,
    local_types: LocalTypes,
    decl_types: HashMap<String, Declaration>,
}

impl BindingScope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            local_types: LocalTypes::new(),
            decl_types: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Typed {
    ty: TypeId,
    effect: NarrowingEffect,
}

impl Typed {
    fn plain(ty: TypeId) -> Self {
        Self {
            ty,
            effect: NarrowingEffect::NoEffect,
        }
    }
}

pub struct TypeBinder<'s> {
    session: &'s mut Session,
    module: String,
    sink: ErrorSink,
    scope: BindingScope,
    outer: Vec<BindingScope>,
    node_types: HashMap<NodeId, TypeId>,
    positions: Vec<SourceSpan>,
    active_narrowings: Vec<(String, TypeId)>,
}

impl<'s> TypeBinder<'s> {
    pub fn new(session: &'s mut Session, module: &str, sink: ErrorSink) -> Self {
        Self {
            session,
            module: module.to_string(),
            sink,
            scope: BindingScope::new(ScopeKind::Module),
            outer: Vec::new(),
            node_types: HashMap::new(),
            positions: Vec::new(),
            active_narrowings: Vec::new(),
        }
    }

    pub fn bind(mut self, module: &Module) -> BindResult<BoundModule> {
        debug!("binding module");
        for statement in &module.statements {
            self.visit_statement(statement)?;
        }
        debug!(nodes = self.node_types.len(), "module bound");
        Ok(BoundModule {
            name: self.module,
            node_types: self.node_types.into_iter().collect(),
            diagnostics: self.sink.into_diagnostics(),
        })
    }

    // ----- scopes and errors -------------------------------------------------

    fn in_scope<T>(
        &mut self,
        scope: BindingScope,
        body: impl FnOnce(&mut Self) -> BindResult<T>,
    ) -> BindResult<T> {
        let enclosing = mem::replace(&mut self.scope, scope);
        self.outer.push(enclosing);
        let result = body(self);
        if let Some(enclosing) = self.outer.pop() {
            self.scope = enclosing;
        }
        result
    }

    fn locals(&self) -> &LocalTypes {
        &self.scope.local_types
    }

    fn locals_mut(&mut self) -> &mut LocalTypes {
        &mut self.scope.local_types
    }

    fn in_function(&self) -> bool {
        std::iter::once(&self.scope)
            .chain(self.outer.iter())
            .any(|scope| matches!(scope.kind, ScopeKind::Function { .. }))
    }

    fn enclosing_function(&self) -> Option<ScopeKind> {
        std::iter::once(&self.scope)
            .chain(self.outer.iter().rev())
            .map(|scope| scope.kind)
            .find(|kind| matches!(kind, ScopeKind::Function { .. }))
    }

    /// Reports `error` at the innermost node being visited unless it already
    /// has a position.
    fn report(&mut self, error: TypedSyntaxError) -> BindResult<()> {
        let error = match self.positions.last() {
            Some(span) => error.located(*span),
            None => error,
        };
        self.sink.error(error)
    }

    fn warn(&mut self, message: String) {
        let warning = TypedSyntaxError::new(message);
        let warning = match self.positions.last() {
            Some(span) => warning.located(*span),
            None => warning,
        };
        self.sink.warning(warning);
    }

    fn describe(&self, ty: TypeId) -> String {
        self.session.describe(ty)
    }

    fn can_assign(&self, dest: TypeId, src: TypeId) -> bool {
        self.session.types.arena.can_assign(dest, src)
    }

    fn widen(&mut self, types: &[TypeId]) -> TypeId {
        self.session.types.widen(types)
    }

    fn mismatch(&self, src: TypeId, dest: TypeId) -> TypedSyntaxError {
        TypedSyntaxError::new(format!(
            "type mismatch: {} cannot be assigned to {}",
            self.describe(src),
            self.describe(dest)
        ))
    }

    // ----- name resolution ---------------------------------------------------

    /// Resolves a name through the enclosing function scopes, then the
    /// module, then the builtins. Class bodies are only visible from
    /// directly inside them.
    fn lookup_name(&self, name: &str) -> Option<TypeId> {
        let in_function = self.in_function();
        let scopes = std::iter::once(&self.scope).chain(self.outer.iter().rev());
        for (depth, scope) in scopes.enumerate() {
            match scope.kind {
                ScopeKind::Class(_) if depth > 0 => continue,
                ScopeKind::Module if in_function => {
                    if let Some(declaration) = scope.decl_types.get(name) {
                        return Some(declaration.ty);
                    }
                    continue;
                }
                _ => {}
            }
            if let Some(ty) = scope.local_types.get(name) {
                return Some(*ty);
            }
            if let Some(declaration) = scope.decl_types.get(name) {
                return Some(declaration.ty);
            }
        }
        self.session
            .symbols
            .resolve(&self.module, name)
            .map(|symbol| symbol.ty)
    }

    fn not_defined(name: &str) -> TypedSyntaxError {
        TypedSyntaxError::new(format!(
            "name {} is not defined",
            strix_support::quoted(name)
        ))
    }

    // ----- statements --------------------------------------------------------

    fn visit_block(&mut self, statements: &[Statement]) -> BindResult<TerminalKind> {
        let mut terminal = TerminalKind::NonTerminal;
        for statement in statements {
            terminal = terminal.max(self.visit_statement(statement)?);
        }
        Ok(terminal)
    }

    fn visit_statement(&mut self, statement: &Statement) -> BindResult<TerminalKind> {
        self.positions.push(statement.span);
        let result = self.bind_statement(statement);
        self.positions.pop();
        match result {
            Ok(terminal) => Ok(terminal),
            Err(error) => {
                self.sink.error(error.located(statement.span))?;
                Ok(TerminalKind::NonTerminal)
            }
        }
    }

    fn bind_statement(&mut self, statement: &Statement) -> BindResult<TerminalKind> {
        match &statement.kind {
            StatementKind::FunctionDef(function) => {
                self.visit_function(statement, function)?;
            }
            StatementKind::ClassDef(class) => self.visit_class(statement, class)?,
            StatementKind::Return(value) => {
                self.visit_return(value.as_ref())?;
                return Ok(TerminalKind::Return);
            }
            StatementKind::Assign(assign) => {
                let value = self.visit_expr(&assign.value)?.ty;
                for target in &assign.targets {
                    self.assign_target(target, value)?;
                }
            }
            StatementKind::AnnAssign(assign) => self.visit_ann_assign(assign)?,
            StatementKind::AugAssign(assign) => self.visit_aug_assign(assign)?,
            StatementKind::If(branch) => return self.visit_if(branch),
            StatementKind::While(loop_) => return self.visit_while(loop_),
            StatementKind::For(loop_) => return self.visit_for(loop_),
            StatementKind::Expression(expression) => {
                self.visit_expr(expression)?;
            }
            StatementKind::Assert(assert) => {
                let test = self.visit_expr(&assert.test)?;
                if let Some(message) = &assert.message {
                    self.visit_expr(message)?;
                }
                test.effect.apply(self.locals_mut());
            }
            StatementKind::Raise(exception) => {
                if let Some(exception) = exception {
                    self.visit_expr(exception)?;
                }
                return Ok(TerminalKind::Return);
            }
            StatementKind::Import(aliases) => {
                if self.scope.kind != ScopeKind::Module {
                    for alias in aliases {
                        // `import a.b` binds `a`; `import a.b as c` binds `a.b`.
                        let target = match alias.alias {
                            Some(_) => alias.name.clone(),
                            None => alias.bound_name().to_string(),
                        };
                        let ty = self.session.types.arena.alloc(TypeData::new(
                            target.clone(),
                            target.clone(),
                            TypeKind::Module(target),
                        ));
                        self.locals_mut().insert(alias.bound_name().to_string(), ty);
                    }
                }
            }
            StatementKind::ImportFrom(import) => {
                if self.scope.kind != ScopeKind::Module {
                    for alias in &import.names {
                        let ty = self
                            .session
                            .symbols
                            .resolve_in_module(&import.module, &alias.name)
                            .map_or(TypeId::DYNAMIC, |symbol| symbol.ty);
                        self.locals_mut().insert(alias.bound_name().to_string(), ty);
                    }
                }
            }
            StatementKind::Pass => {}
            StatementKind::Break | StatementKind::Continue => {
                return Ok(TerminalKind::BreakOrContinue)
            }
        }
        Ok(TerminalKind::NonTerminal)
    }

    fn visit_function(&mut self, statement: &Statement, function: &FunctionDef) -> BindResult<()> {
        for decorator in &function.decorators {
            self.visit_expr(decorator)?;
        }
        let declared = self.session.symbols.definition(&self.module, statement.id);
        let ty = match declared {
            Some(ty) if self.outer.is_empty() || matches!(self.scope.kind, ScopeKind::Class(_)) => {
                ty
            }
            _ => self.declare_nested_function(function)?,
        };
        self.node_types.insert(statement.id, ty);

        let signature = self
            .session
            .types
            .arena
            .signature(ty)
            .cloned()
            .unwrap_or_else(Signature::dynamic);

        for (parameter, declared) in function.parameters.iter().zip(&signature.parameters) {
            self.node_types.insert(parameter.id, declared.ty);
            if let Some(default) = &parameter.default {
                let default_ty = self.visit_expr(default)?.ty;
                if !self.can_assign(declared.ty, default_ty) {
                    let error = self.mismatch(default_ty, declared.ty).located(default.span);
                    self.report(error)?;
                }
            }
        }

        if self.in_function() {
            let bound = if function.decorators.is_empty() {
                ty
            } else {
                TypeId::DYNAMIC
            };
            self.locals_mut().insert(function.name.clone(), bound);
        }

        let mut scope = BindingScope::new(ScopeKind::Function {
            returns: signature.returns,
            is_init: function.name == "__init__",
        });
        for parameter in &signature.parameters {
            scope.local_types.insert(parameter.name.clone(), parameter.ty);
            scope.decl_types.insert(
                parameter.name.clone(),
                Declaration {
                    ty: parameter.ty,
                    is_final: false,
                },
            );
        }
        // Narrowings of the enclosing code do not reach into the body.
        let active = mem::take(&mut self.active_narrowings);
        let result = self.in_scope(scope, |binder| binder.visit_block(&function.body));
        self.active_narrowings = active;
        result.map(|_| ())
    }

    /// Functions defined inside function bodies or nested classes are not
    /// seen by the declaration pass; give them a type here.
    fn declare_nested_function(&mut self, function: &FunctionDef) -> BindResult<TypeId> {
        let receiver = match self.scope.kind {
            ScopeKind::Class(class) => Receiver::Instance(class),
            _ => Receiver::None,
        };
        let ty = self
            .session
            .types
            .arena
            .declare_function(&self.module, &function.name);
        let (signature, errors) = AnnotationResolver::new(self.session, &self.module)
            .resolve_signature(function, receiver);
        self.session.types.arena.get_mut(ty).kind = TypeKind::Function(signature);
        for error in errors {
            self.report(error)?;
        }
        Ok(ty)
    }

    fn visit_class(&mut self, statement: &Statement, class: &ClassDef) -> BindResult<()> {
        for decorator in &class.decorators {
            self.visit_expr(decorator)?;
        }
        for base in &class.bases {
            self.visit_expr(base)?;
        }
        let ty = match self.session.symbols.definition(&self.module, statement.id) {
            Some(ty) if self.outer.is_empty() => ty,
            _ => {
                self.locals_mut().insert(class.name.clone(), TypeId::DYNAMIC);
                TypeId::DYNAMIC
            }
        };
        self.node_types.insert(statement.id, ty);
        self.in_scope(BindingScope::new(ScopeKind::Class(ty)), |binder| {
            binder.visit_block(&class.body).map(|_| ())
        })
    }

    fn visit_return(&mut self, value: Option<&Expression>) -> BindResult<()> {
        let Some(ScopeKind::Function { returns, .. }) = self.enclosing_function() else {
            return Err(TypedSyntaxError::new("'return' outside function"));
        };
        let (actual, span) = match value {
            Some(value) => (self.visit_expr(value)?.ty, Some(value.span)),
            None => (TypeId::NONE, None),
        };
        if !self.can_assign(returns, actual) {
            let error = TypedSyntaxError::new(format!(
                "return type must be {}, not {}",
                self.describe(returns),
                self.describe(actual)
            ));
            let error = match span {
                Some(span) => error.located(span),
                None => error,
            };
            self.report(error)?;
        }
        Ok(())
    }

    fn visit_ann_assign(&mut self, assign: &AnnAssignStatement) -> BindResult<()> {
        let resolved =
            AnnotationResolver::new(self.session, &self.module).resolve(&assign.annotation);
        let annotation = match resolved {
            Ok(annotation) => annotation,
            Err(error) => {
                self.report(error)?;
                Annotation {
                    ty: TypeId::DYNAMIC,
                    is_final: false,
                }
            }
        };
        let value = match &assign.value {
            Some(value) => {
                let ty = self.visit_expr(value)?.ty;
                if !self.can_assign(annotation.ty, ty) {
                    let error = self.mismatch(ty, annotation.ty).located(value.span);
                    self.report(error)?;
                }
                Some(ty)
            }
            None => None,
        };

        match &assign.target.kind {
            ExpressionKind::Name(name) => {
                if matches!(self.scope.kind, ScopeKind::Function { .. })
                    && self.scope.decl_types.contains_key(name)
                {
                    let error = TypedSyntaxError::at(
                        format!("Cannot redefine local variable {name}"),
                        assign.target.span,
                    );
                    self.report(error)?;
                }
                self.scope.decl_types.insert(
                    name.clone(),
                    Declaration {
                        ty: annotation.ty,
                        is_final: annotation.is_final,
                    },
                );
                let current = self.narrow_on_assign(annotation.ty, value);
                self.locals_mut().insert(name.clone(), current);
                self.node_types.insert(assign.target.id, annotation.ty);
            }
            ExpressionKind::Attribute(attribute) => {
                let receiver = self.visit_expr(&attribute.value)?.ty;
                self.assign_attribute(receiver, &attribute.attr, value.unwrap_or(annotation.ty))?;
                self.node_types.insert(assign.target.id, annotation.ty);
            }
            _ => {
                self.visit_expr(&assign.target)?;
            }
        }
        Ok(())
    }

    /// The type a declared name holds right after an assignment: unions
    /// narrow to the assigned value.
    fn narrow_on_assign(&self, declared: TypeId, value: Option<TypeId>) -> TypeId {
        match value {
            Some(value)
                if !value.is_dynamic()
                    && self.session.types.arena.is_union(declared)
                    && self.can_assign(declared, value) =>
            {
                value
            }
            _ => declared,
        }
    }

    fn assign_target(&mut self, target: &Expression, value: TypeId) -> BindResult<()> {
        match &target.kind {
            ExpressionKind::Name(name) => {
                let declaration = self.scope.decl_types.get(name).copied();
                let current = match declaration {
                    Some(declaration) => {
                        if declaration.is_final {
                            let error = TypedSyntaxError::at(
                                "Cannot assign to a Final variable",
                                target.span,
                            );
                            self.report(error)?;
                        }
                        if !self.can_assign(declaration.ty, value) {
                            let error = self.mismatch(value, declaration.ty).located(target.span);
                            self.report(error)?;
                        }
                        self.narrow_on_assign(declaration.ty, Some(value))
                    }
                    None => value,
                };
                self.locals_mut().insert(name.clone(), current);
                self.node_types.insert(target.id, current);
            }
            ExpressionKind::Attribute(attribute) => {
                let receiver = self.visit_expr(&attribute.value)?.ty;
                self.positions.push(target.span);
                let result = self.assign_attribute(receiver, &attribute.attr, value);
                self.positions.pop();
                result?;
                self.node_types.insert(target.id, value);
            }
            ExpressionKind::Subscript(subscript) => {
                self.visit_expr(&subscript.value)?;
                self.visit_expr(&subscript.index)?;
                self.node_types.insert(target.id, value);
            }
            ExpressionKind::Tuple(elements) | ExpressionKind::List(elements) => {
                for element in elements {
                    self.assign_target(element, TypeId::DYNAMIC)?;
                }
                self.node_types.insert(target.id, value);
            }
            _ => {
                return Err(TypedSyntaxError::at("cannot assign to expression", target.span));
            }
        }
        Ok(())
    }

    fn assign_attribute(&mut self, receiver: TypeId, attr: &str, value: TypeId) -> BindResult<()> {
        let in_init = matches!(
            self.enclosing_function(),
            Some(ScopeKind::Function { is_init: true, .. })
        );
        for member_ty in self.session.types.arena.union_members(receiver) {
            if member_ty.is_dynamic() {
                continue;
            }
            if member_ty == TypeId::NONE {
                self.report(TypedSyntaxError::new(format!(
                    "'NoneType' object has no attribute {}",
                    strix_support::quoted(attr)
                )))?;
                continue;
            }
            let arena = &self.session.types.arena;
            let is_class = matches!(arena.kind(member_ty), TypeKind::Class);
            let has_dynamic_base = arena.has_dynamic_base(member_ty);
            match arena.lookup_member(member_ty, attr).cloned() {
                Some(member) if member.kind == MemberKind::Attribute => {
                    if member.is_final && !in_init {
                        self.report(TypedSyntaxError::new("Cannot assign to a Final variable"))?;
                    }
                    if !self.can_assign(member.ty, value) {
                        let error = self.mismatch(value, member.ty);
                        self.report(error)?;
                    }
                }
                Some(_) => {}
                None if is_class && !has_dynamic_base => {
                    let name = self.session.types.arena.instance_name(member_ty);
                    self.report(TypedSyntaxError::new(format!(
                        "{} object has no attribute {}",
                        strix_support::quoted(&name),
                        strix_support::quoted(attr)
                    )))?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn visit_aug_assign(&mut self, assign: &AugAssignStatement) -> BindResult<()> {
        let current = self.visit_expr(&assign.target)?.ty;
        let value = self.visit_expr(&assign.value)?.ty;
        let result = self.binary_type(current, assign.operator, value)?;
        if let ExpressionKind::Name(name) = &assign.target.kind {
            if let Some(declaration) = self.scope.decl_types.get(name).copied() {
                if declaration.is_final {
                    self.report(TypedSyntaxError::new("Cannot assign to a Final variable"))?;
                }
                if !self.can_assign(declaration.ty, result) {
                    let error = self.mismatch(result, declaration.ty);
                    self.report(error)?;
                }
            }
            self.locals_mut().insert(name.clone(), result);
        }
        Ok(())
    }

    /// Visits `body` with `effect` applied, warning when a name that is
    /// already narrowed by an enclosing branch is narrowed to an unrelated
    /// type. The innermost narrowing wins.
    fn visit_narrowed_block(
        &mut self,
        effect: &NarrowingEffect,
        body: &[Statement],
    ) -> BindResult<TerminalKind> {
        let narrowed: Vec<(String, TypeId)> = effect
            .narrowed_names()
            .into_iter()
            .map(|(name, ty)| (name.to_string(), ty))
            .collect();
        for (name, inst) in &narrowed {
            let enclosing = self
                .active_narrowings
                .iter()
                .rev()
                .find(|(active, _)| active == name)
                .map(|(_, ty)| *ty);
            if let Some(outer) = enclosing {
                if !outer.is_dynamic()
                    && !inst.is_dynamic()
                    && !self.can_assign(outer, *inst)
                    && !self.can_assign(*inst, outer)
                {
                    let message = format!(
                        "conflicting narrowing of {}: {} is narrowed again to {}",
                        strix_support::quoted(name),
                        self.describe(outer),
                        self.describe(*inst)
                    );
                    self.warn(message);
                }
            }
        }
        effect.apply(self.locals_mut());
        let depth = self.active_narrowings.len();
        self.active_narrowings.extend(narrowed);
        let result = self.visit_block(body);
        self.active_narrowings.truncate(depth);
        result
    }

    fn visit_if(&mut self, branch: &IfStatement) -> BindResult<TerminalKind> {
        let test = self.visit_expr(&branch.test)?;
        let entry = LocalsBranch::capture(self.locals());

        let body_terminal = self.visit_narrowed_block(&test.effect, &branch.body)?;
        let body_end = self.locals().clone();

        entry.restore(self.locals_mut());
        let else_terminal = self.visit_narrowed_block(&test.effect.reverse(), &branch.orelse)?;
        let else_end = self.locals().clone();

        let merged = entry.merge(
            &mut self.session.types,
            &[(body_end, body_terminal), (else_end, else_terminal)],
        );
        *self.locals_mut() = merged;
        Ok(body_terminal.min(else_terminal))
    }

    fn visit_while(&mut self, loop_: &WhileStatement) -> BindResult<TerminalKind> {
        let test = self.visit_expr(&loop_.test)?;
        let entry = LocalsBranch::capture(self.locals());

        let body_terminal = self.visit_narrowed_block(&test.effect, &loop_.body)?;
        let body_end = self.locals().clone();

        entry.restore(self.locals_mut());
        test.effect.reverse().apply(self.locals_mut());
        let exit = self.locals().clone();
        self.join_loop(&entry, exit, body_end, body_terminal);

        self.visit_block(&loop_.orelse)?;
        Ok(TerminalKind::NonTerminal)
    }

    fn visit_for(&mut self, loop_: &ForStatement) -> BindResult<TerminalKind> {
        let iterable = self.visit_expr(&loop_.iter)?.ty;
        let element = self.element_type(iterable);
        let entry = LocalsBranch::capture(self.locals());

        self.assign_target(&loop_.target, element)?;
        let body_terminal = self.visit_block(&loop_.body)?;
        let body_end = self.locals().clone();

        entry.restore(self.locals_mut());
        let exit = self.locals().clone();
        self.join_loop(&entry, exit, body_end, body_terminal);

        self.visit_block(&loop_.orelse)?;
        Ok(TerminalKind::NonTerminal)
    }

    /// After a loop the names hold whatever they held on loop exit or at
    /// the end of any iteration that did not return.
    fn join_loop(
        &mut self,
        entry: &LocalsBranch,
        exit: LocalTypes,
        body_end: LocalTypes,
        body_terminal: TerminalKind,
    ) {
        let body_flow = if body_terminal == TerminalKind::Return {
            TerminalKind::Return
        } else {
            TerminalKind::NonTerminal
        };
        let merged = entry.merge(
            &mut self.session.types,
            &[(exit, TerminalKind::NonTerminal), (body_end, body_flow)],
        );
        *self.locals_mut() = merged;
    }

    fn element_type(&self, iterable: TypeId) -> TypeId {
        let arena = &self.session.types.arena;
        if iterable == TypeId::STR {
            return TypeId::STR;
        }
        match arena.instantiation(iterable) {
            Some((TypeId::LIST, [element])) => *element,
            Some((TypeId::DICT, [key, _])) => *key,
            _ => TypeId::DYNAMIC,
        }
    }

    // ----- expressions -------------------------------------------------------

    fn visit_expr(&mut self, expr: &Expression) -> BindResult<Typed> {
        self.positions.push(expr.span);
        let result = self.bind_expr(expr);
        self.positions.pop();
        match result {
            Ok(typed) => {
                self.node_types.insert(expr.id, typed.ty);
                Ok(typed)
            }
            Err(error) => {
                self.node_types.insert(expr.id, TypeId::DYNAMIC);
                self.sink.error(error.located(expr.span))?;
                Ok(Typed::plain(TypeId::DYNAMIC))
            }
        }
    }

    fn bind_expr(&mut self, expr: &Expression) -> BindResult<Typed> {
        match &expr.kind {
            ExpressionKind::Name(name) => self.visit_name(name),
            ExpressionKind::Constant(constant) => Ok(Typed::plain(match constant {
                Constant::None => TypeId::NONE,
                Constant::Bool(_) => TypeId::BOOL,
                Constant::Int(_) => TypeId::INT,
                Constant::Float(_) => TypeId::FLOAT,
                Constant::Str(_) => TypeId::STR,
            })),
            ExpressionKind::Attribute(attribute) => {
                let receiver = self.visit_expr(&attribute.value)?.ty;
                Ok(Typed::plain(self.attribute_type(receiver, &attribute.attr)?))
            }
            ExpressionKind::Call(call) => self.visit_call(call),
            ExpressionKind::BoolOp(bool_op) => match bool_op.operator {
                BoolOperator::Or => self.visit_or(&bool_op.values),
                BoolOperator::And => self.visit_and(&bool_op.values),
            },
            ExpressionKind::Binary(binary) => {
                let left = self.visit_expr(&binary.left)?.ty;
                let right = self.visit_expr(&binary.right)?.ty;
                Ok(Typed::plain(self.binary_type(left, binary.operator, right)?))
            }
            ExpressionKind::Unary(unary) => {
                let operand = self.visit_expr(&unary.operand)?;
                match unary.operator {
                    UnaryOperator::Not => Ok(Typed {
                        ty: TypeId::BOOL,
                        effect: operand.effect.reverse(),
                    }),
                    operator => Ok(Typed::plain(self.unary_type(operator, operand.ty)?)),
                }
            }
            ExpressionKind::Compare(compare) => {
                let left = self.visit_expr(&compare.left)?;
                for comparator in &compare.comparators {
                    self.visit_expr(comparator)?;
                }
                let effect = match (compare.operators.as_slice(), compare.comparators.as_slice()) {
                    ([operator], [right]) => {
                        self.none_comparison(*operator, &compare.left, left.ty, right)
                    }
                    _ => NarrowingEffect::NoEffect,
                };
                Ok(Typed {
                    ty: TypeId::BOOL,
                    effect,
                })
            }
            ExpressionKind::IfExp(if_exp) => {
                let test = self.visit_expr(&if_exp.test)?;
                let entry = LocalsBranch::capture(self.locals());
                test.effect.apply(self.locals_mut());
                let body = self.visit_expr(&if_exp.body)?.ty;
                entry.restore(self.locals_mut());
                test.effect.reverse().apply(self.locals_mut());
                let orelse = self.visit_expr(&if_exp.orelse)?.ty;
                entry.restore(self.locals_mut());
                Ok(Typed::plain(self.if_exp_type(body, orelse)?))
            }
            ExpressionKind::Tuple(elements) => {
                for element in elements {
                    self.visit_expr(element)?;
                }
                Ok(Typed::plain(TypeId::TUPLE))
            }
            ExpressionKind::List(elements) => {
                let element = self.uniform_type(elements)?;
                Ok(Typed::plain(self.session.types.list_of(element)?))
            }
            ExpressionKind::Dict(dict) => {
                let key = self.uniform_type(&dict.keys)?;
                let value = self.uniform_type(&dict.values)?;
                Ok(Typed::plain(self.session.types.dict_of(key, value)?))
            }
            ExpressionKind::Subscript(subscript) => {
                let value = self.visit_expr(&subscript.value)?.ty;
                self.visit_expr(&subscript.index)?;
                Ok(Typed::plain(self.subscript_type(value)?))
            }
            ExpressionKind::Await(value) => {
                let awaited = self.visit_expr(value)?.ty;
                if awaited.is_dynamic() {
                    return Ok(Typed::plain(TypeId::DYNAMIC));
                }
                match self.session.types.arena.awaited(awaited) {
                    Some(result) => Ok(Typed::plain(result)),
                    None => Err(TypedSyntaxError::new(format!(
                        "object {} can't be used in 'await' expression",
                        self.describe(awaited)
                    ))),
                }
            }
            ExpressionKind::Lambda(lambda) => {
                let mut scope = BindingScope::new(ScopeKind::Function {
                    returns: TypeId::DYNAMIC,
                    is_init: false,
                });
                for parameter in &lambda.parameters {
                    scope
                        .local_types
                        .insert(parameter.name.clone(), TypeId::DYNAMIC);
                    self.node_types.insert(parameter.id, TypeId::DYNAMIC);
                }
                self.visit_lambda_defaults(&lambda.parameters)?;
                self.in_scope(scope, |binder| binder.visit_expr(&lambda.body).map(|_| ()))?;
                Ok(Typed::plain(TypeId::DYNAMIC))
            }
        }
    }

    fn visit_lambda_defaults(&mut self, parameters: &[Parameter]) -> BindResult<()> {
        for parameter in parameters {
            if let Some(default) = &parameter.default {
                self.visit_expr(default)?;
            }
        }
        Ok(())
    }

    fn visit_name(&mut self, name: &str) -> BindResult<Typed> {
        let ty = self
            .lookup_name(name)
            .ok_or_else(|| Self::not_defined(name))?;
        // Truthiness of an optional value rules out None.
        let effect = if ty != TypeId::NONE && self.session.types.arena.is_optional(ty) {
            let present = self.session.types.arena.non_optional_members(ty);
            let inst = self.widen(&present);
            NarrowingEffect::is_instance(name, ty, inst, ty)
        } else {
            NarrowingEffect::NoEffect
        };
        Ok(Typed { ty, effect })
    }

    fn none_comparison(
        &mut self,
        operator: CompareOperator,
        left: &Expression,
        left_ty: TypeId,
        right: &Expression,
    ) -> NarrowingEffect {
        let is_none =
            |expr: &Expression| matches!(expr.kind, ExpressionKind::Constant(Constant::None));
        let (name, prev) = match (&left.kind, &right.kind) {
            (ExpressionKind::Name(name), _) if is_none(right) => (name, left_ty),
            (_, ExpressionKind::Name(name)) if is_none(left) => match self.lookup_name(name) {
                Some(ty) => (name, ty),
                None => return NarrowingEffect::NoEffect,
            },
            _ => return NarrowingEffect::NoEffect,
        };
        if prev == TypeId::NONE || !self.session.types.arena.is_optional(prev) {
            return NarrowingEffect::NoEffect;
        }
        let rev = self
            .session
            .types
            .without(prev, TypeId::NONE)
            .unwrap_or(prev);
        let effect = NarrowingEffect::is_instance(name.as_str(), prev, TypeId::NONE, rev);
        match operator {
            CompareOperator::Is | CompareOperator::Equal => effect,
            CompareOperator::IsNot | CompareOperator::NotEqual => effect.reverse(),
            _ => NarrowingEffect::NoEffect,
        }
    }

    fn visit_or(&mut self, values: &[Expression]) -> BindResult<Typed> {
        let mut types = Vec::with_capacity(values.len());
        let mut effects = Vec::with_capacity(values.len());
        let mut applied = Vec::new();
        for (index, value) in values.iter().enumerate() {
            let typed = self.visit_expr(value)?;
            let is_last = index + 1 == values.len();
            if is_last {
                types.push(typed.ty);
            } else {
                // A falsy operand is skipped, so only its present part flows on.
                types.push(self.strip_optional(typed.ty));
                let reversed = typed.effect.reverse();
                reversed.apply(self.locals_mut());
                applied.push(reversed);
            }
            effects.push(typed.effect);
        }
        for effect in applied.iter().rev() {
            effect.undo(self.locals_mut());
        }
        let ty = self.widen(&types);
        let effect = NarrowingEffect::or(&mut self.session.types, effects);
        Ok(Typed { ty, effect })
    }

    fn visit_and(&mut self, values: &[Expression]) -> BindResult<Typed> {
        let mut types = Vec::with_capacity(values.len());
        let mut effects = Vec::with_capacity(values.len());
        for value in values {
            let typed = self.visit_expr(value)?;
            typed.effect.apply(self.locals_mut());
            types.push(typed.ty);
            effects.push(typed.effect);
        }
        for effect in effects.iter().rev() {
            effect.undo(self.locals_mut());
        }
        let ty = self.widen(&types);
        Ok(Typed {
            ty,
            effect: NarrowingEffect::and(effects),
        })
    }

    fn strip_optional(&mut self, ty: TypeId) -> TypeId {
        if ty == TypeId::NONE || !self.session.types.arena.is_optional(ty) {
            return ty;
        }
        let present = self.session.types.arena.non_optional_members(ty);
        self.widen(&present)
    }

    fn uniform_type(&mut self, elements: &[Expression]) -> BindResult<TypeId> {
        let mut types = Vec::with_capacity(elements.len());
        for element in elements {
            types.push(self.visit_expr(element)?.ty);
        }
        types.dedup();
        Ok(match types.as_slice() {
            [single] => *single,
            _ => TypeId::DYNAMIC,
        })
    }

    fn if_exp_type(&mut self, body: TypeId, orelse: TypeId) -> BindResult<TypeId> {
        if self.can_assign(body, orelse) && !body.is_dynamic() {
            return Ok(body);
        }
        if self.can_assign(orelse, body) {
            return Ok(orelse);
        }
        let arena = &self.session.types.arena;
        if arena.is_optional(body) || arena.is_optional(orelse) {
            return Ok(self.widen(&[body, orelse]));
        }
        Err(TypedSyntaxError::new(format!(
            "if expression has incompatible types: {} and {}",
            self.describe(body),
            self.describe(orelse)
        )))
    }

    fn subscript_type(&self, value: TypeId) -> BindResult<TypeId> {
        if value == TypeId::NONE {
            return Err(TypedSyntaxError::new(
                "'NoneType' object is not subscriptable",
            ));
        }
        if value == TypeId::STR {
            return Ok(TypeId::STR);
        }
        Ok(match self.session.types.arena.instantiation(value) {
            Some((TypeId::LIST, [element])) => *element,
            Some((TypeId::DICT, [_, value])) => *value,
            _ => TypeId::DYNAMIC,
        })
    }

    // ----- attributes --------------------------------------------------------

    fn attribute_type(&mut self, receiver: TypeId, attr: &str) -> BindResult<TypeId> {
        let members = self.session.types.arena.union_members(receiver);
        let mut results = Vec::with_capacity(members.len());
        for member in members {
            results.push(self.member_attribute(member, attr)?);
        }
        Ok(self.widen(&results))
    }

    fn member_attribute(&mut self, ty: TypeId, attr: &str) -> BindResult<TypeId> {
        if ty.is_dynamic() {
            return Ok(TypeId::DYNAMIC);
        }
        if ty == TypeId::NONE {
            return Err(TypedSyntaxError::new(format!(
                "'NoneType' object has no attribute {}",
                strix_support::quoted(attr)
            )));
        }
        if let Some(instance) = self.session.types.arena.class_instance(ty) {
            return self.class_attribute(instance, attr);
        }
        match self.session.types.arena.kind(ty).clone() {
            TypeKind::Module(module) => {
                if !self.session.symbols.has_module(&module) {
                    return Ok(TypeId::DYNAMIC);
                }
                self.session
                    .symbols
                    .resolve_in_module(&module, attr)
                    .map(|symbol| symbol.ty)
                    .ok_or_else(|| {
                        TypedSyntaxError::new(format!(
                            "module {} has no attribute {}",
                            strix_support::quoted(&module),
                            strix_support::quoted(attr)
                        ))
                    })
            }
            TypeKind::Class | TypeKind::Primitive | TypeKind::Instantiation { .. } => {
                self.instance_attribute(ty, attr)
            }
            _ => Ok(TypeId::DYNAMIC),
        }
    }

    fn instance_attribute(&mut self, ty: TypeId, attr: &str) -> BindResult<TypeId> {
        let member = self.session.types.arena.lookup_member(ty, attr).cloned();
        let Some(member) = member else {
            return self.missing_member(ty, attr, false);
        };
        let result = match member.kind {
            MemberKind::Attribute => member.ty,
            MemberKind::DecoratedMethod => TypeId::DYNAMIC,
            MemberKind::Method | MemberKind::ClassMethod => {
                self.session.types.bound_method(member.ty)
            }
            MemberKind::StaticMethod => member.ty,
            MemberKind::Property | MemberKind::CachedProperty => self.declared_return(member.ty),
            MemberKind::AsyncCachedProperty => {
                let value = self.declared_return(member.ty);
                self.session.types.awaitable(value)?
            }
        };
        trace!(attr, kind = ?member.kind, "resolved instance attribute");
        Ok(result)
    }

    fn class_attribute(&mut self, instance: TypeId, attr: &str) -> BindResult<TypeId> {
        if instance.is_dynamic() {
            return Ok(TypeId::DYNAMIC);
        }
        let member = self.session.types.arena.lookup_member(instance, attr).cloned();
        let Some(member) = member else {
            return self.missing_member(instance, attr, true);
        };
        Ok(match member.kind {
            MemberKind::Attribute => member.ty,
            MemberKind::Method | MemberKind::StaticMethod => member.ty,
            MemberKind::ClassMethod => self.session.types.bound_method(member.ty),
            MemberKind::Property
            | MemberKind::CachedProperty
            | MemberKind::AsyncCachedProperty
            | MemberKind::DecoratedMethod => TypeId::DYNAMIC,
        })
    }

    /// Missing members are errors on user classes whose whole hierarchy is
    /// known; anything else falls back to `dynamic`.
    fn missing_member(&self, ty: TypeId, attr: &str, on_class_object: bool) -> BindResult<TypeId> {
        let arena = &self.session.types.arena;
        if !matches!(arena.kind(ty), TypeKind::Class) || arena.has_dynamic_base(ty) {
            return Ok(TypeId::DYNAMIC);
        }
        let name = strix_support::quoted(&arena.instance_name(ty));
        let attr = strix_support::quoted(attr);
        Err(TypedSyntaxError::new(if on_class_object {
            format!("type object {name} has no attribute {attr}")
        } else {
            format!("{name} object has no attribute {attr}")
        }))
    }

    fn declared_return(&self, function: TypeId) -> TypeId {
        self.session
            .types
            .arena
            .signature(function)
            .map_or(TypeId::DYNAMIC, |signature| signature.returns)
    }

    // ----- calls -------------------------------------------------------------

    fn visit_call(&mut self, call: &CallExpression) -> BindResult<Typed> {
        let callee = self.visit_expr(&call.func)?.ty;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.visit_expr(arg)?.ty);
        }
        let mut keywords = Vec::with_capacity(call.keywords.len());
        for keyword in &call.keywords {
            let ty = self.visit_expr(&keyword.value)?.ty;
            keywords.push(KeywordArg {
                name: keyword.name.as_str(),
                ty,
                span: keyword.value.span,
            });
        }

        if let TypeKind::Builtin(BuiltinFunction::IsInstance) =
            self.session.types.arena.kind(callee)
        {
            return self.visit_isinstance(call, &args);
        }

        let site = CallSite {
            call,
            args: &args,
            keywords: &keywords,
        };
        let callees = self.session.types.arena.union_members(callee);
        let mut results = Vec::with_capacity(callees.len());
        for member in callees {
            results.push(self.call_type(member, &site)?);
        }
        Ok(Typed::plain(self.widen(&results)))
    }

    fn visit_isinstance(&mut self, call: &CallExpression, args: &[TypeId]) -> BindResult<Typed> {
        if args.len() != 2 {
            self.report(TypedSyntaxError::new(format!(
                "Mismatched number of args for isinstance. Expected 2, got {}",
                args.len()
            )))?;
            return Ok(Typed::plain(TypeId::BOOL));
        }
        let ExpressionKind::Name(name) = &call.args[0].kind else {
            return Ok(Typed::plain(TypeId::BOOL));
        };
        let class_objects: Vec<TypeId> = match &call.args[1].kind {
            ExpressionKind::Tuple(elements) => elements
                .iter()
                .map(|element| {
                    self.node_types
                        .get(&element.id)
                        .copied()
                        .unwrap_or(TypeId::DYNAMIC)
                })
                .collect(),
            _ => vec![args[1]],
        };
        let mut instances = Vec::with_capacity(class_objects.len());
        for class_object in class_objects {
            match self.session.types.arena.class_instance(class_object) {
                Some(instance) if !instance.is_dynamic() => instances.push(instance),
                _ => return Ok(Typed::plain(TypeId::BOOL)),
            }
        }
        let prev = args[0];
        let inst = self.widen(&instances);
        let rev = if prev.is_dynamic() {
            prev
        } else {
            self.session.types.without(prev, inst).unwrap_or(prev)
        };
        trace!(name = name.as_str(), "isinstance narrowing");
        Ok(Typed {
            ty: TypeId::BOOL,
            effect: NarrowingEffect::is_instance(name.as_str(), prev, inst, rev),
        })
    }

    fn call_type(&mut self, callee: TypeId, site: &CallSite<'_>) -> BindResult<TypeId> {
        if let Some(instance) = self.session.types.arena.class_instance(callee) {
            return self.construct(instance, site);
        }
        match self.session.types.arena.kind(callee).clone() {
            TypeKind::Dynamic | TypeKind::Decorator(_) | TypeKind::SpecialForm(_) => {
                Ok(TypeId::DYNAMIC)
            }
            TypeKind::Function(signature) => {
                self.check_call(callee, &signature, 0, site)?;
                self.call_result(&signature)
            }
            TypeKind::BoundMethod { function } => {
                let signature = self
                    .session
                    .types
                    .arena
                    .signature(function)
                    .cloned()
                    .unwrap_or_else(Signature::dynamic);
                self.check_call(function, &signature, 1, site)?;
                self.call_result(&signature)
            }
            TypeKind::Template {
                parameters,
                variadic: false,
            } if callee != TypeId::TYPE => {
                let args = vec![TypeId::DYNAMIC; parameters.len()];
                Ok(self.session.types.make_generic_type(callee, &args)?)
            }
            TypeKind::Template { .. } => Ok(TypeId::DYNAMIC),
            TypeKind::Builtin(BuiltinFunction::Len) => {
                self.check_builtin_arity("len", 1, site)?;
                Ok(TypeId::INT)
            }
            TypeKind::Builtin(BuiltinFunction::Print) => Ok(TypeId::NONE),
            TypeKind::Builtin(BuiltinFunction::IsInstance) => Ok(TypeId::BOOL),
            TypeKind::Module(_) => Err(TypedSyntaxError::new("'module' object is not callable")),
            TypeKind::Class | TypeKind::Primitive | TypeKind::Instantiation { .. } => {
                self.call_instance(callee, site)
            }
            TypeKind::Union(_) => Ok(TypeId::DYNAMIC),
        }
    }

    /// Calls an instance through its `__call__` method.
    fn call_instance(&mut self, instance: TypeId, site: &CallSite<'_>) -> BindResult<TypeId> {
        let arena = &self.session.types.arena;
        let call_method = arena
            .lookup_member(instance, "__call__")
            .filter(|member| member.kind == MemberKind::Method)
            .map(|member| member.ty);
        if let Some(function) = call_method {
            let signature = arena
                .signature(function)
                .cloned()
                .unwrap_or_else(Signature::dynamic);
            self.check_call(function, &signature, 1, site)?;
            return self.call_result(&signature);
        }
        if matches!(arena.kind(instance), TypeKind::Class) && arena.has_dynamic_base(instance) {
            return Ok(TypeId::DYNAMIC);
        }
        Err(TypedSyntaxError::new(format!(
            "{} object is not callable",
            strix_support::quoted(&arena.instance_name(instance))
        )))
    }

    fn construct(&mut self, instance: TypeId, site: &CallSite<'_>) -> BindResult<TypeId> {
        if instance.is_dynamic() {
            return Ok(TypeId::DYNAMIC);
        }
        let arena = &self.session.types.arena;
        if !matches!(arena.kind(instance), TypeKind::Class) {
            return Ok(instance);
        }
        let init = arena
            .lookup_member(instance, "__init__")
            .filter(|member| member.kind == MemberKind::Method)
            .map(|member| member.ty);
        match init {
            Some(function) => {
                let signature = arena
                    .signature(function)
                    .cloned()
                    .unwrap_or_else(Signature::dynamic);
                self.check_call(function, &signature, 1, site)?;
            }
            None => {
                let open_ended = arena.mro(instance).into_iter().any(|ancestor| {
                    ancestor.is_dynamic()
                        || (ancestor != TypeId::OBJECT
                            && matches!(arena.kind(ancestor), TypeKind::Primitive))
                });
                let given = site.args.len() + site.keywords.len();
                if !open_ended && given > 0 {
                    let name = arena.get(instance).qualified_name();
                    self.report(TypedSyntaxError::new(format!(
                        "Mismatched number of args for {name}. Expected 0, got {given}"
                    )))?;
                }
            }
        }
        Ok(instance)
    }

    fn call_result(&mut self, signature: &Signature) -> BindResult<TypeId> {
        if signature.is_async {
            Ok(self.session.types.awaitable(signature.returns)?)
        } else {
            Ok(signature.returns)
        }
    }

    fn check_builtin_arity(
        &mut self,
        name: &str,
        expected: usize,
        site: &CallSite<'_>,
    ) -> BindResult<()> {
        let given = site.args.len() + site.keywords.len();
        if given != expected {
            self.report(TypedSyntaxError::new(format!(
                "Mismatched number of args for {name}. Expected {expected}, got {given}"
            )))?;
        }
        Ok(())
    }

    /// Checks a call's arguments against a signature, skipping the first
    /// `skip` parameters (the bound receiver).
    fn check_call(
        &mut self,
        function: TypeId,
        signature: &Signature,
        skip: usize,
        site: &CallSite<'_>,
    ) -> BindResult<()> {
        let name = self.session.types.arena.get(function).qualified_name();
        let parameters = &signature.parameters[skip.min(signature.parameters.len())..];
        if site.args.len() > parameters.len() {
            return self.report(TypedSyntaxError::new(format!(
                "Mismatched number of args for {name}. Expected {}, got {}",
                parameters.len(),
                site.args.len()
            )));
        }

        let mut provided = vec![false; parameters.len()];
        for (index, (arg, parameter)) in site.args.iter().zip(parameters).enumerate() {
            provided[index] = true;
            if !self.can_assign(parameter.ty, *arg) {
                let error = TypedSyntaxError::at(
                    format!(
                        "type mismatch: {} received for positional arg {}, expected {}",
                        self.describe(*arg),
                        strix_support::quoted(&parameter.name),
                        self.describe(parameter.ty)
                    ),
                    site.call.args[index].span,
                );
                self.report(error)?;
            }
        }

        for keyword in site.keywords {
            match parameters.iter().position(|parameter| parameter.name == keyword.name) {
                None => {
                    let error = TypedSyntaxError::at(
                        format!(
                            "Given argument {} does not exist in the definition of {name}",
                            keyword.name
                        ),
                        keyword.span,
                    );
                    self.report(error)?;
                }
                Some(index) if provided[index] => {
                    let error = TypedSyntaxError::at(
                        format!(
                            "{name} got multiple values for argument {}",
                            strix_support::quoted(keyword.name)
                        ),
                        keyword.span,
                    );
                    self.report(error)?;
                }
                Some(index) => {
                    provided[index] = true;
                    let parameter = &parameters[index];
                    if !self.can_assign(parameter.ty, keyword.ty) {
                        let error = TypedSyntaxError::at(
                            format!(
                                "type mismatch: {} received for keyword arg {}, expected {}",
                                self.describe(keyword.ty),
                                strix_support::quoted(keyword.name),
                                self.describe(parameter.ty)
                            ),
                            keyword.span,
                        );
                        self.report(error)?;
                    }
                }
            }
        }

        for (parameter, provided) in parameters.iter().zip(provided) {
            if !provided && !parameter.has_default {
                self.report(TypedSyntaxError::new(format!(
                    "Function {name} expects a value for argument {}",
                    parameter.name
                )))?;
            }
        }
        Ok(())
    }

    // ----- operators ---------------------------------------------------------

    fn binary_type(
        &mut self,
        left: TypeId,
        operator: BinaryOperator,
        right: TypeId,
    ) -> BindResult<TypeId> {
        if left.is_dynamic() || right.is_dynamic() {
            return Ok(TypeId::DYNAMIC);
        }
        let arena = &self.session.types.arena;
        if arena.is_union(left) || arena.is_union(right) {
            let lefts = arena.union_members(left);
            let rights = arena.union_members(right);
            let mut results = Vec::new();
            for l in &lefts {
                for r in &rights {
                    results.push(self.binary_type(*l, operator, *r)?);
                }
            }
            return Ok(self.widen(&results));
        }

        let int_like = |ty: TypeId| ty == TypeId::INT || ty == TypeId::BOOL;
        let numeric = |ty: TypeId| int_like(ty) || ty == TypeId::FLOAT;
        let builtin = match operator {
            BinaryOperator::Divide if numeric(left) && numeric(right) => Some(TypeId::FLOAT),
            BinaryOperator::Add
            | BinaryOperator::Subtract
            | BinaryOperator::Multiply
            | BinaryOperator::FloorDivide
            | BinaryOperator::Modulo
                if numeric(left) && numeric(right) =>
            {
                Some(if int_like(left) && int_like(right) {
                    TypeId::INT
                } else {
                    TypeId::FLOAT
                })
            }
            BinaryOperator::BitOr if int_like(left) && int_like(right) => Some(TypeId::INT),
            BinaryOperator::Add if left == TypeId::STR && right == TypeId::STR => Some(TypeId::STR),
            BinaryOperator::Add if left == right && arena.instantiation(left).is_some() => {
                Some(left)
            }
            BinaryOperator::Multiply
                if (left == TypeId::STR && int_like(right))
                    || (int_like(left) && right == TypeId::STR) =>
            {
                Some(TypeId::STR)
            }
            BinaryOperator::Modulo if left == TypeId::STR => Some(TypeId::STR),
            _ => None,
        };
        if let Some(result) = builtin {
            return Ok(result);
        }

        let dunder = match operator {
            BinaryOperator::Add => "__add__",
            BinaryOperator::Subtract => "__sub__",
            BinaryOperator::Multiply => "__mul__",
            BinaryOperator::Divide => "__truediv__",
            BinaryOperator::FloorDivide => "__floordiv__",
            BinaryOperator::Modulo => "__mod__",
            BinaryOperator::BitOr => "__or__",
        };
        if let Some(member) = arena.lookup_member(left, dunder) {
            if member.kind == MemberKind::Method {
                return Ok(self.declared_return(member.ty));
            }
        }
        let is_primitive = |ty: TypeId| matches!(arena.kind(ty), TypeKind::Primitive);
        if is_primitive(left) && is_primitive(right) {
            return Err(TypedSyntaxError::new(format!(
                "unsupported operand type(s) for {}: {} and {}",
                operator.symbol(),
                strix_support::quoted(&arena.instance_name(left)),
                strix_support::quoted(&arena.instance_name(right))
            )));
        }
        Ok(TypeId::DYNAMIC)
    }

    fn unary_type(&self, operator: UnaryOperator, operand: TypeId) -> BindResult<TypeId> {
        if operand.is_dynamic() {
            return Ok(TypeId::DYNAMIC);
        }
        let symbol = match operator {
            UnaryOperator::Negative => "-",
            UnaryOperator::Positive => "+",
            UnaryOperator::Invert => "~",
            UnaryOperator::Not => return Ok(TypeId::BOOL),
        };
        match operand {
            TypeId::INT | TypeId::BOOL => Ok(TypeId::INT),
            TypeId::FLOAT if operator != UnaryOperator::Invert => Ok(TypeId::FLOAT),
            _ => {
                let arena = &self.session.types.arena;
                if matches!(arena.kind(operand), TypeKind::Primitive) {
                    Err(TypedSyntaxError::new(format!(
                        "bad operand type for unary {symbol}: {}",
                        strix_support::quoted(&arena.instance_name(operand))
                    )))
                } else {
                    Ok(TypeId::DYNAMIC)
                }
            }
        }
    }
}

struct KeywordArg<'e> {
    name: &'e str,
    ty: TypeId,
    span: SourceSpan,
}

struct CallSite<'e> {
    call: &'e CallExpression,
    args: &'e [TypeId],
    keywords: &'e [KeywordArg<'e>],
}
