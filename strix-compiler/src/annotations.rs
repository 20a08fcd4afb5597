use crate::ast::{BinaryOperator, Constant, Expression, ExpressionKind, FunctionDef};
use crate::diagnostics::TypedSyntaxError;
use crate::session::Session;
use crate::types::{Signature, SignatureParameter, SpecialForm, TypeId, TypeKind};

/// A resolved annotation. `Final[T]` resolves to `T` with `is_final` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub ty: TypeId,
    pub is_final: bool,
}

/// What the first parameter of a function is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    None,
    Instance(TypeId),
    Class(TypeId),
}

type ResolveResult<T> = Result<T, TypedSyntaxError>;

/// Turns annotation expressions into types, looking names up in one module.
pub struct AnnotationResolver<'a> {
    session: &'a mut Session,
    module: &'a str,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(session: &'a mut Session, module: &'a str) -> Self {
        Self { session, module }
    }

    pub fn resolve(&mut self, expr: &Expression) -> ResolveResult<Annotation> {
        let result = self.resolve_outermost(expr);
        result.map_err(|err| err.located(expr.span))
    }

    fn resolve_outermost(&mut self, expr: &Expression) -> ResolveResult<Annotation> {
        match &expr.kind {
            ExpressionKind::Subscript(subscript) => {
                let value = self.value_of(&subscript.value)?;
                if self.is_special(value, SpecialForm::Final) {
                    let ty = self.resolve_type(&subscript.index)?;
                    return Ok(Annotation { ty, is_final: true });
                }
            }
            ExpressionKind::Name(_) | ExpressionKind::Attribute(_) => {
                let value = self.value_of(expr)?;
                if self.is_special(value, SpecialForm::Final) {
                    return Ok(Annotation {
                        ty: TypeId::DYNAMIC,
                        is_final: true,
                    });
                }
            }
            _ => {}
        }
        Ok(Annotation {
            ty: self.resolve_type(expr)?,
            is_final: false,
        })
    }

    pub fn resolve_type(&mut self, expr: &Expression) -> ResolveResult<TypeId> {
        let result = self.resolve_type_inner(expr);
        result.map_err(|err| err.located(expr.span))
    }

    fn resolve_type_inner(&mut self, expr: &Expression) -> ResolveResult<TypeId> {
        match &expr.kind {
            ExpressionKind::Constant(Constant::None) => Ok(TypeId::NONE),
            ExpressionKind::Constant(Constant::Str(name)) => {
                let value = self.value_of_name(name)?;
                self.instance_of(value)
            }
            ExpressionKind::Name(_) | ExpressionKind::Attribute(_) => {
                let value = self.value_of(expr)?;
                self.instance_of(value)
            }
            ExpressionKind::Subscript(subscript) => {
                let value = self.value_of(&subscript.value)?;
                let arg_exprs: Vec<&Expression> = match &subscript.index.kind {
                    ExpressionKind::Tuple(elements) => elements.iter().collect(),
                    _ => vec![subscript.index.as_ref()],
                };
                let mut args = Vec::with_capacity(arg_exprs.len());
                for arg in arg_exprs {
                    args.push(self.resolve_type(arg)?);
                }
                self.subscript(value, &args)
            }
            ExpressionKind::Binary(binary) if binary.operator == BinaryOperator::BitOr => {
                let left = self.resolve_type(&binary.left)?;
                let right = self.resolve_type(&binary.right)?;
                Ok(self.session.types.make_union(&[left, right])?)
            }
            _ => Err(TypedSyntaxError::new("invalid type annotation")),
        }
    }

    fn subscript(&mut self, value: TypeId, args: &[TypeId]) -> ResolveResult<TypeId> {
        match self.session.types.arena.kind(value) {
            TypeKind::Dynamic => Ok(TypeId::DYNAMIC),
            TypeKind::SpecialForm(SpecialForm::Optional) => match args {
                [inner] => Ok(self.session.types.optional(*inner)?),
                _ => Err(TypedSyntaxError::new(
                    "Optional requires a single type argument",
                )),
            },
            TypeKind::SpecialForm(SpecialForm::Union) => Ok(self.session.types.make_union(args)?),
            TypeKind::SpecialForm(SpecialForm::Final) => Err(TypedSyntaxError::new(
                "Final is only valid as the outermost annotation",
            )),
            _ => Ok(self.session.types.make_generic_type(value, args)?),
        }
    }

    fn is_special(&self, value: TypeId, form: SpecialForm) -> bool {
        self.session.types.arena.kind(value) == &TypeKind::SpecialForm(form)
    }

    /// The type of the value an annotation expression names, e.g.
    /// `Type[foo.C]` for the class `C`.
    fn value_of(&mut self, expr: &Expression) -> ResolveResult<TypeId> {
        match &expr.kind {
            ExpressionKind::Name(name) => self.value_of_name(name),
            ExpressionKind::Attribute(attribute) => {
                let base = self.value_of(&attribute.value)?;
                match self.session.types.arena.kind(base) {
                    TypeKind::Dynamic => Ok(TypeId::DYNAMIC),
                    TypeKind::Module(module) => {
                        if !self.session.symbols.has_module(module) {
                            return Ok(TypeId::DYNAMIC);
                        }
                        self.session
                            .symbols
                            .resolve_in_module(module, &attribute.attr)
                            .map(|symbol| symbol.ty)
                            .ok_or_else(|| {
                                TypedSyntaxError::at(
                                    format!(
                                        "module {} has no attribute {}",
                                        strix_support::quoted(module),
                                        strix_support::quoted(&attribute.attr)
                                    ),
                                    expr.span,
                                )
                            })
                    }
                    _ => Err(TypedSyntaxError::at("invalid type annotation", expr.span)),
                }
            }
            _ => Err(TypedSyntaxError::at("invalid type annotation", expr.span)),
        }
    }

    fn value_of_name(&self, name: &str) -> ResolveResult<TypeId> {
        self.session
            .symbols
            .resolve(self.module, name)
            .map(|symbol| symbol.ty)
            .ok_or_else(|| {
                TypedSyntaxError::new(format!(
                    "name {} is not defined",
                    strix_support::quoted(name)
                ))
            })
    }

    fn instance_of(&mut self, value: TypeId) -> ResolveResult<TypeId> {
        let arena = &self.session.types.arena;
        if let Some(instance) = arena.class_instance(value) {
            return Ok(instance);
        }
        match arena.kind(value) {
            TypeKind::Dynamic => Ok(TypeId::DYNAMIC),
            TypeKind::Template {
                variadic: false,
                parameters,
            } => {
                let args = vec![TypeId::DYNAMIC; parameters.len()];
                Ok(self.session.types.make_generic_type(value, &args)?)
            }
            TypeKind::Template { variadic: true, .. } => Ok(TypeId::DYNAMIC),
            TypeKind::SpecialForm(SpecialForm::Final) => Ok(TypeId::DYNAMIC),
            TypeKind::SpecialForm(form) => Err(TypedSyntaxError::new(format!(
                "{form:?} requires type arguments"
            ))),
            _ => Err(TypedSyntaxError::new(format!(
                "{} is not a valid type",
                arena.describe(value)
            ))),
        }
    }

    /// Resolves a function's parameter and return annotations. Annotation
    /// errors are returned alongside a signature that uses `dynamic` in
    /// their place.
    pub fn resolve_signature(
        &mut self,
        function: &FunctionDef,
        receiver: Receiver,
    ) -> (Signature, Vec<TypedSyntaxError>) {
        let mut errors = Vec::new();
        let mut parameters = Vec::with_capacity(function.parameters.len());
        for (index, parameter) in function.parameters.iter().enumerate() {
            let ty = match (&parameter.annotation, index, receiver) {
                (Some(annotation), _, _) => match self.resolve(annotation) {
                    Ok(annotation) => annotation.ty,
                    Err(err) => {
                        errors.push(err);
                        TypeId::DYNAMIC
                    }
                },
                (None, 0, Receiver::Instance(class)) => class,
                (None, 0, Receiver::Class(class)) => self
                    .session
                    .types
                    .class_object(class)
                    .unwrap_or(TypeId::DYNAMIC),
                (None, _, _) => TypeId::DYNAMIC,
            };
            parameters.push(SignatureParameter {
                name: parameter.name.clone(),
                ty,
                has_default: parameter.default.is_some(),
            });
        }
        let returns = match &function.returns {
            Some(annotation) => match self.resolve(annotation) {
                Ok(annotation) => annotation.ty,
                Err(err) => {
                    errors.push(err);
                    TypeId::DYNAMIC
                }
            },
            None => TypeId::DYNAMIC,
        };
        (
            Signature {
                parameters,
                returns,
                is_async: function.is_async,
            },
            errors,
        )
    }
}
