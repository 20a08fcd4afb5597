//! The declaration pass that fills the symbol table before binding.
//!
//! It runs in phases over every module of a compilation. `declare_module`
//! registers the names each module defines. Once every module is declared,
//! `resolve_hierarchy` fixes class decorators and bases everywhere, and only
//! then `resolve_members` fills in members, function signatures and imports,
//! so types built from annotations see the finished hierarchy.

use tracing::{debug, instrument};

use crate::annotations::{AnnotationResolver, Receiver};
use crate::ast::{ClassDef, Expression, ExpressionKind, FunctionDef, Statement, StatementKind};
use crate::decorators::{self, ClassDecoration, DecoratedShape, KnownDecorator};
use crate::diagnostics::{ErrorSink, TypedSyntaxError};
use crate::session::Session;
use crate::source::SourceModule;
use crate::symbols::{Symbol, SymbolKind};
use crate::types::{Member, MemberKind, TypeData, TypeId, TypeKind};

type DeclareResult<T> = Result<T, TypedSyntaxError>;

/// Registers the module and every name it defines at the top level. Types
/// are allocated without bases or signatures; those are filled in by
/// [`resolve_module`].
#[instrument(skip_all, fields(module = %source.name))]
pub fn declare_module(session: &mut Session, source: &SourceModule) -> DeclareResult<()> {
    debug!("declaring module");
    let module = source.name.as_str();
    session
        .symbols
        .add_module(module, Some(source.filename()));

    for statement in &source.module.statements {
        match &statement.kind {
            StatementKind::ClassDef(class) => declare_class(session, module, statement, class)?,
            StatementKind::FunctionDef(function) => {
                let ty = session
                    .types
                    .arena
                    .declare_function(module, &function.name);
                record_definition(session, module, statement, ty);
                session.symbols.declare(
                    module,
                    &function.name,
                    Symbol::new(ty, SymbolKind::Function).at(function.name_span),
                );
            }
            StatementKind::AnnAssign(assign) => {
                if let ExpressionKind::Name(name) = &assign.target.kind {
                    session.symbols.declare(
                        module,
                        name,
                        Symbol::new(TypeId::DYNAMIC, SymbolKind::Variable).at(statement.span),
                    );
                }
            }
            StatementKind::Assign(assign) => {
                for target in &assign.targets {
                    if let ExpressionKind::Name(name) = &target.kind {
                        let already_declared = session
                            .symbols
                            .module(module)
                            .is_some_and(|table| table.children.contains_key(name));
                        if !already_declared {
                            session.symbols.declare(
                                module,
                                name,
                                Symbol::new(TypeId::DYNAMIC, SymbolKind::Variable)
                                    .at(statement.span),
                            );
                        }
                    }
                }
            }
            StatementKind::Import(aliases) => {
                for alias in aliases {
                    let bound = alias.bound_name().to_string();
                    let target = match &alias.alias {
                        Some(_) => alias.name.clone(),
                        None => bound.clone(),
                    };
                    let ty = session.types.arena.alloc(TypeData::new(
                        target.clone(),
                        target.clone(),
                        TypeKind::Module(target),
                    ));
                    session.symbols.declare(
                        module,
                        &bound,
                        Symbol::new(ty, SymbolKind::Module).at(alias.span),
                    );
                }
            }
            StatementKind::ImportFrom(import) => {
                for alias in &import.names {
                    session.symbols.declare(
                        module,
                        alias.bound_name(),
                        Symbol::new(
                            TypeId::DYNAMIC,
                            SymbolKind::Import {
                                module: import.module.clone(),
                                name: alias.name.clone(),
                            },
                        )
                        .at(alias.span),
                    );
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn declare_class(
    session: &mut Session,
    module: &str,
    statement: &Statement,
    class: &ClassDef,
) -> DeclareResult<()> {
    let ty = session.types.arena.declare_class(module, &class.name);
    let class_object = session.types.class_object(ty)?;
    record_definition(session, module, statement, ty);
    session.symbols.declare(
        module,
        &class.name,
        Symbol::new(class_object, SymbolKind::Class).at(class.name_span),
    );
    for member in &class.body {
        if let StatementKind::FunctionDef(function) = &member.kind {
            let qualname = format!("{}.{}", class.name, function.name);
            let method = session.types.arena.declare_function(module, &qualname);
            record_definition(session, module, member, method);
        }
    }
    Ok(())
}

fn record_definition(session: &mut Session, module: &str, statement: &Statement, ty: TypeId) {
    if let Some(table) = session.symbols.module_mut(module) {
        table.definitions.insert(statement.id, ty);
    }
}

/// Fixes the class hierarchy of a module: class decorators first, then
/// bases. Every module of a compilation goes through this before any of
/// them runs [`resolve_members`], so no annotation is resolved against a
/// class whose bases are still unknown.
#[instrument(skip_all, fields(module = %source.name))]
pub fn resolve_hierarchy(
    session: &mut Session,
    source: &SourceModule,
    sink: &mut ErrorSink,
) -> DeclareResult<()> {
    debug!("resolving class hierarchy");
    let classes: Vec<(&Statement, &ClassDef)> = source
        .module
        .statements
        .iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::ClassDef(class) => Some((statement, class)),
            _ => None,
        })
        .collect();
    let mut resolver = DeclarationResolver {
        session,
        module: source.name.as_str(),
        sink,
    };
    for (statement, class) in &classes {
        resolver.resolve_class_decorators(statement, class)?;
    }
    for (statement, class) in &classes {
        resolver.resolve_class_bases(statement, class)?;
    }
    Ok(())
}

/// Resolves imports, annotated variables, class members and function
/// signatures. Expects [`resolve_hierarchy`] to have run for every module.
#[instrument(skip_all, fields(module = %source.name))]
pub fn resolve_members(
    session: &mut Session,
    source: &SourceModule,
    sink: &mut ErrorSink,
) -> DeclareResult<()> {
    debug!("resolving declarations");
    let mut resolver = DeclarationResolver {
        session,
        module: source.name.as_str(),
        sink,
    };
    for statement in &source.module.statements {
        resolver.resolve_statement(statement)?;
    }
    debug!("declarations resolved");
    Ok(())
}

/// Both resolution phases for a single module. Safe to run more than once;
/// a second run leaves the session unchanged.
pub fn resolve_module(
    session: &mut Session,
    source: &SourceModule,
    sink: &mut ErrorSink,
) -> DeclareResult<()> {
    resolve_hierarchy(session, source, sink)?;
    resolve_members(session, source, sink)
}

struct DeclarationResolver<'a> {
    session: &'a mut Session,
    module: &'a str,
    sink: &'a mut ErrorSink,
}

impl<'a> DeclarationResolver<'a> {
    fn report(&mut self, error: TypedSyntaxError, statement: &Statement) -> DeclareResult<()> {
        self.sink.error(error.located(statement.span))
    }

    fn resolve_statement(&mut self, statement: &Statement) -> DeclareResult<()> {
        match &statement.kind {
            StatementKind::ImportFrom(import) => {
                if !self.session.symbols.has_module(&import.module) {
                    return Ok(());
                }
                for alias in &import.names {
                    if self
                        .session
                        .symbols
                        .resolve_in_module(&import.module, &alias.name)
                        .is_none()
                    {
                        let error = TypedSyntaxError::at(
                            format!(
                                "cannot import name {} from {}",
                                strix_support::quoted(&alias.name),
                                strix_support::quoted(&import.module)
                            ),
                            alias.span,
                        );
                        self.report(error, statement)?;
                    }
                }
                Ok(())
            }
            StatementKind::ClassDef(class) => self.resolve_class(statement, class),
            StatementKind::FunctionDef(function) => {
                let Some(ty) = self.definition(statement) else {
                    return Ok(());
                };
                self.resolve_function(statement, function, ty, Receiver::None)?;
                let shape = self.decorated_shape(&function.decorators);
                if shape != DecoratedShape::Member(MemberKind::Method) {
                    self.session.symbols.declare(
                        self.module,
                        &function.name,
                        Symbol::new(TypeId::DYNAMIC, SymbolKind::Function).at(function.name_span),
                    );
                }
                Ok(())
            }
            StatementKind::AnnAssign(assign) => {
                let ExpressionKind::Name(name) = &assign.target.kind else {
                    return Ok(());
                };
                let resolved =
                    AnnotationResolver::new(self.session, self.module).resolve(&assign.annotation);
                match resolved {
                    Ok(annotation) => {
                        let mut symbol =
                            Symbol::new(annotation.ty, SymbolKind::Variable).at(statement.span);
                        symbol.is_final = annotation.is_final;
                        self.session.symbols.declare(self.module, name, symbol);
                        Ok(())
                    }
                    Err(error) => self.report(error, statement),
                }
            }
            _ => Ok(()),
        }
    }

    fn definition(&self, statement: &Statement) -> Option<TypeId> {
        self.session.symbols.definition(self.module, statement.id)
    }

    /// `final` marks the class final; any decorator other than the rejected
    /// property-like ones makes the class name dynamic.
    fn resolve_class_decorators(
        &mut self,
        statement: &Statement,
        class: &ClassDef,
    ) -> DeclareResult<()> {
        let Some(ty) = self.definition(statement) else {
            return Ok(());
        };
        let mut dynamic = false;
        for decorator in &class.decorators {
            let decoration = match self.known_decorator(decorator) {
                Some(known) => known.decorate_class(),
                None => Ok(ClassDecoration::Dynamic),
            };
            match decoration {
                Ok(ClassDecoration::Final) => {
                    self.session.types.arena.get_mut(ty).is_final = true;
                }
                Ok(ClassDecoration::Dynamic) => dynamic = true,
                Err(error) => self.report(error.located(decorator.span), statement)?,
            }
        }
        if dynamic {
            debug!(class = class.name.as_str(), "decorated class is dynamic");
            self.session.symbols.declare(
                self.module,
                &class.name,
                Symbol::new(TypeId::DYNAMIC, SymbolKind::Class).at(class.name_span),
            );
        }
        Ok(())
    }

    fn resolve_class_bases(
        &mut self,
        statement: &Statement,
        class: &ClassDef,
    ) -> DeclareResult<()> {
        let Some(ty) = self.definition(statement) else {
            return Ok(());
        };
        let mut bases = Vec::with_capacity(class.bases.len());
        for base in &class.bases {
            match self.resolve_base(base) {
                Ok(base_ty) => bases.push(base_ty),
                Err(error) => {
                    self.report(error, statement)?;
                    bases.push(TypeId::DYNAMIC);
                }
            }
        }
        self.session
            .symbols
            .backfill_bases(&mut self.session.types.arena, ty, &bases);
        Ok(())
    }

    fn resolve_class(&mut self, statement: &Statement, class: &ClassDef) -> DeclareResult<()> {
        let Some(ty) = self.definition(statement) else {
            return Ok(());
        };

        let bases = self.session.types.arena.get(ty).bases.clone();
        for (base, base_ty) in class.bases.iter().zip(bases) {
            if self.session.types.arena.get(base_ty).is_final {
                let error = TypedSyntaxError::at(
                    format!(
                        "Class `{}` cannot subclass a Final class: `{}`",
                        self.session.describe(ty),
                        self.session.describe(base_ty)
                    ),
                    base.span,
                );
                self.report(error, statement)?;
            }
        }

        for member in &class.body {
            self.resolve_class_member(ty, member)?;
        }
        Ok(())
    }

    fn resolve_base(&mut self, base: &Expression) -> DeclareResult<TypeId> {
        let resolved = AnnotationResolver::new(self.session, self.module).resolve_type(base)?;
        match self.session.types.arena.kind(resolved) {
            TypeKind::Class | TypeKind::Primitive | TypeKind::Dynamic => Ok(resolved),
            _ => Err(TypedSyntaxError::at(
                format!(
                    "{} is not a valid base class",
                    self.session.describe(resolved)
                ),
                base.span,
            )),
        }
    }

    fn resolve_class_member(&mut self, class: TypeId, member: &Statement) -> DeclareResult<()> {
        match &member.kind {
            StatementKind::AnnAssign(assign) => {
                let ExpressionKind::Name(name) = &assign.target.kind else {
                    return Ok(());
                };
                let resolved =
                    AnnotationResolver::new(self.session, self.module).resolve(&assign.annotation);
                match resolved {
                    Ok(annotation) => {
                        let mut attribute = Member::attribute(annotation.ty);
                        attribute.is_final = annotation.is_final;
                        self.add_member(class, name, attribute);
                        Ok(())
                    }
                    Err(error) => self.report(error, member),
                }
            }
            StatementKind::Assign(assign) => {
                for target in &assign.targets {
                    if let ExpressionKind::Name(name) = &target.kind {
                        self.add_member_if_missing(class, name, Member::attribute(TypeId::DYNAMIC));
                    }
                }
                Ok(())
            }
            StatementKind::FunctionDef(function) => {
                let Some(method) = self.definition(member) else {
                    return Ok(());
                };
                let shape = self.decorated_shape(&function.decorators);
                let receiver = match shape {
                    DecoratedShape::Member(MemberKind::StaticMethod) => Receiver::None,
                    DecoratedShape::Member(MemberKind::ClassMethod) => Receiver::Class(class),
                    _ => Receiver::Instance(class),
                };
                self.resolve_function(member, function, method, receiver)?;
                let entry = match shape {
                    DecoratedShape::Member(kind) => Member::method(method, kind),
                    DecoratedShape::Dynamic => Member::attribute(TypeId::DYNAMIC),
                };
                self.add_member(class, &function.name, entry);
                if function.name == "__init__" {
                    self.declare_instance_attributes(class, function, member)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `self.x: T = ...` and `self.x = ...` in `__init__` declare attributes.
    fn declare_instance_attributes(
        &mut self,
        class: TypeId,
        init: &FunctionDef,
        statement: &Statement,
    ) -> DeclareResult<()> {
        let Some(receiver) = init.parameters.first().map(|param| param.name.as_str()) else {
            return Ok(());
        };
        let mut pending = Vec::new();
        collect_self_assignments(&init.body, receiver, &mut pending);
        for (name, annotation) in pending {
            match annotation {
                Some(annotation) => {
                    let resolved =
                        AnnotationResolver::new(self.session, self.module).resolve(annotation);
                    match resolved {
                        Ok(annotation) => {
                            let mut attribute = Member::attribute(annotation.ty);
                            attribute.is_final = annotation.is_final;
                            self.add_member(class, name, attribute);
                        }
                        Err(error) => self.report(error, statement)?,
                    }
                }
                None => self.add_member_if_missing(class, name, Member::attribute(TypeId::DYNAMIC)),
            }
        }
        Ok(())
    }

    fn resolve_function(
        &mut self,
        statement: &Statement,
        function: &FunctionDef,
        ty: TypeId,
        receiver: Receiver,
    ) -> DeclareResult<()> {
        let (signature, errors) = AnnotationResolver::new(self.session, self.module)
            .resolve_signature(function, receiver);
        self.session.types.arena.get_mut(ty).kind = TypeKind::Function(signature);
        for error in errors {
            self.report(error, statement)?;
        }
        Ok(())
    }

    fn known_decorator(&self, decorator: &Expression) -> Option<KnownDecorator> {
        let ty = match &decorator.kind {
            ExpressionKind::Name(name) => self.session.symbols.resolve(self.module, name)?.ty,
            ExpressionKind::Attribute(attribute) => {
                let ExpressionKind::Name(module_name) = &attribute.value.kind else {
                    return None;
                };
                let module_ty = self.session.symbols.resolve(self.module, module_name)?.ty;
                let TypeKind::Module(module) = self.session.types.arena.kind(module_ty) else {
                    return None;
                };
                self.session
                    .symbols
                    .resolve_in_module(module, &attribute.attr)?
                    .ty
            }
            _ => return None,
        };
        match self.session.types.arena.kind(ty) {
            TypeKind::Decorator(known) => Some(*known),
            _ => None,
        }
    }

    fn decorated_shape(&self, decorators: &[Expression]) -> DecoratedShape {
        let known: Vec<Option<KnownDecorator>> = decorators
            .iter()
            .map(|decorator| self.known_decorator(decorator))
            .collect();
        decorators::apply_to_function(known.into_iter())
    }

    fn add_member(&mut self, class: TypeId, name: &str, member: Member) {
        self.session
            .symbols
            .backfill_member(&mut self.session.types.arena, class, name, member);
    }

    fn add_member_if_missing(&mut self, class: TypeId, name: &str, member: Member) {
        if !self
            .session
            .types
            .arena
            .get(class)
            .members
            .contains_key(name)
        {
            self.add_member(class, name, member);
        }
    }
}

fn collect_self_assignments<'s>(
    body: &'s [Statement],
    receiver: &str,
    out: &mut Vec<(&'s str, Option<&'s Expression>)>,
) {
    let self_attribute = |target: &'s Expression| -> Option<&'s str> {
        let ExpressionKind::Attribute(attribute) = &target.kind else {
            return None;
        };
        match &attribute.value.kind {
            ExpressionKind::Name(name) if name == receiver => Some(attribute.attr.as_str()),
            _ => None,
        }
    };
    for statement in body {
        match &statement.kind {
            StatementKind::AnnAssign(assign) => {
                if let Some(name) = self_attribute(&assign.target) {
                    out.push((name, Some(&assign.annotation)));
                }
            }
            StatementKind::Assign(assign) => {
                for target in &assign.targets {
                    if let Some(name) = self_attribute(target) {
                        out.push((name, None));
                    }
                }
            }
            StatementKind::If(branch) => {
                collect_self_assignments(&branch.body, receiver, out);
                collect_self_assignments(&branch.orelse, receiver, out);
            }
            _ => {}
        }
    }
}
