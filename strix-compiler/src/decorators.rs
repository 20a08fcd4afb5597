use serde::Serialize;
use tracing::debug;

use crate::diagnostics::TypedSyntaxError;
use crate::types::MemberKind;

/// Decorators the binder understands. Anything else applied to a function
/// makes the decorated name dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KnownDecorator {
    Property,
    CachedProperty,
    AsyncCachedProperty,
    StaticMethod,
    ClassMethod,
    Final,
}

impl KnownDecorator {
    pub const ALL: [KnownDecorator; 6] = [
        KnownDecorator::Property,
        KnownDecorator::CachedProperty,
        KnownDecorator::AsyncCachedProperty,
        KnownDecorator::StaticMethod,
        KnownDecorator::ClassMethod,
        KnownDecorator::Final,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KnownDecorator::Property => "property",
            KnownDecorator::CachedProperty => "cached_property",
            KnownDecorator::AsyncCachedProperty => "async_cached_property",
            KnownDecorator::StaticMethod => "staticmethod",
            KnownDecorator::ClassMethod => "classmethod",
            KnownDecorator::Final => "final",
        }
    }

    /// The module a program imports the decorator from; `None` for builtins.
    pub fn home_module(self) -> Option<&'static str> {
        match self {
            KnownDecorator::CachedProperty | KnownDecorator::AsyncCachedProperty => {
                Some("functools")
            }
            KnownDecorator::Final => Some("typing"),
            _ => None,
        }
    }

    pub fn is_caching(self) -> bool {
        matches!(
            self,
            KnownDecorator::CachedProperty | KnownDecorator::AsyncCachedProperty
        )
    }

    /// Applies the decorator to a function-like member whose current shape
    /// is `current`. A property-like decorator wrapping something that is
    /// already decorated loses its meaning and the member becomes a plain
    /// dynamic attribute.
    pub fn decorate_function(self, current: DecoratedShape) -> DecoratedShape {
        match (self, current) {
            (KnownDecorator::Final, shape) => shape,
            (_, DecoratedShape::Dynamic) => DecoratedShape::Dynamic,
            (KnownDecorator::StaticMethod, DecoratedShape::Member(MemberKind::StaticMethod)) => {
                DecoratedShape::Member(MemberKind::StaticMethod)
            }
            (decorator, DecoratedShape::Member(MemberKind::Method)) => {
                DecoratedShape::Member(decorator.member_kind())
            }
            (decorator, DecoratedShape::Member(_)) => {
                debug!(
                    decorator = decorator.name(),
                    "decorator over an already decorated method degrades to a plain attribute"
                );
                DecoratedShape::Dynamic
            }
        }
    }

    /// Applies the decorator to a class definition. Property-like
    /// decorators are rejected, `final` marks the class final and anything
    /// else leaves a class the binder cannot see through.
    pub fn decorate_class(self) -> Result<ClassDecoration, TypedSyntaxError> {
        match self {
            KnownDecorator::Final => Ok(ClassDecoration::Final),
            KnownDecorator::Property
            | KnownDecorator::CachedProperty
            | KnownDecorator::AsyncCachedProperty => Err(TypedSyntaxError::new(format!(
                "Cannot decorate a class with @{}",
                self.name()
            ))),
            KnownDecorator::StaticMethod | KnownDecorator::ClassMethod => {
                Ok(ClassDecoration::Dynamic)
            }
        }
    }

    fn member_kind(self) -> MemberKind {
        match self {
            KnownDecorator::Property => MemberKind::Property,
            KnownDecorator::CachedProperty => MemberKind::CachedProperty,
            KnownDecorator::AsyncCachedProperty => MemberKind::AsyncCachedProperty,
            KnownDecorator::StaticMethod => MemberKind::StaticMethod,
            KnownDecorator::ClassMethod => MemberKind::ClassMethod,
            KnownDecorator::Final => MemberKind::Method,
        }
    }
}

/// What a function definition turns into after its decorators ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratedShape {
    Member(MemberKind),
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDecoration {
    Final,
    Dynamic,
}

/// Runs `decorators` (listed outermost first, as written) over a plain
/// function, innermost first.
pub fn apply_to_function<I>(decorators: I) -> DecoratedShape
where
    I: DoubleEndedIterator<Item = Option<KnownDecorator>>,
{
    let mut shape = DecoratedShape::Member(MemberKind::Method);
    for decorator in decorators.rev() {
        shape = match decorator {
            Some(known) => known.decorate_function(shape),
            // An unknown decorator may return anything; a method it wraps is
            // no longer a plain method, so later property-like decorators degrade.
            None => match shape {
                DecoratedShape::Member(MemberKind::Method) => {
                    DecoratedShape::Member(MemberKind::DecoratedMethod)
                }
                _ => DecoratedShape::Dynamic,
            },
        };
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caching_over_unknown_decorator_degrades_silently() {
        let shape = apply_to_function(vec![Some(KnownDecorator::CachedProperty), None].into_iter());
        assert_eq!(shape, DecoratedShape::Dynamic);
    }

    #[test]
    fn single_caching_decorator_is_a_cached_property() {
        let shape = apply_to_function(vec![Some(KnownDecorator::CachedProperty)].into_iter());
        assert_eq!(shape, DecoratedShape::Member(MemberKind::CachedProperty));
    }

    #[test]
    fn repeated_staticmethod_is_harmless() {
        let shape = apply_to_function(
            vec![Some(KnownDecorator::StaticMethod), Some(KnownDecorator::StaticMethod)]
                .into_iter(),
        );
        assert_eq!(shape, DecoratedShape::Member(MemberKind::StaticMethod));
    }

    #[test]
    fn property_over_staticmethod_degrades() {
        let shape = apply_to_function(
            vec![Some(KnownDecorator::Property), Some(KnownDecorator::StaticMethod)].into_iter(),
        );
        assert_eq!(shape, DecoratedShape::Dynamic);
    }

    #[test]
    fn class_decoration_by_kind() {
        for decorator in KnownDecorator::ALL {
            let result = decorator.decorate_class();
            match decorator {
                KnownDecorator::Final => assert_eq!(result, Ok(ClassDecoration::Final)),
                KnownDecorator::StaticMethod | KnownDecorator::ClassMethod => {
                    assert_eq!(result, Ok(ClassDecoration::Dynamic))
                }
                _ => {
                    let err = result.expect_err("class decoration should fail");
                    assert_eq!(
                        err.message,
                        format!("Cannot decorate a class with @{}", decorator.name())
                    );
                }
            }
        }
    }
}
