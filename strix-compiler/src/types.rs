//! Type representations and the subclass relation between them.
//!
//! Every type lives in a [`TypeArena`] and is addressed by a [`TypeId`].
//! Class hierarchies are edges between ids, so forward-referenced bases can
//! be filled in after all classes of a module are declared. Generic
//! instantiations and unions are only ever created through the
//! [`crate::generics::TypeContext`], which makes equal instantiations the same
//! id.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::decorators::KnownDecorator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    /// The gradual-typing escape hatch: compatible with everything.
    pub const DYNAMIC: TypeId = TypeId(0);
    pub const OBJECT: TypeId = TypeId(1);
    pub const NONE: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    pub const FLOAT: TypeId = TypeId(5);
    pub const STR: TypeId = TypeId(6);
    pub const TUPLE: TypeId = TypeId(7);

    // Generic templates
    pub const TYPE: TypeId = TypeId(8);
    pub const LIST: TypeId = TypeId(9);
    pub const DICT: TypeId = TypeId(10);
    pub const AWAITABLE: TypeId = TypeId(11);
    pub const UNION: TypeId = TypeId(12);

    pub const FIRST_USER: u32 = 13;

    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_dynamic(self) -> bool {
        self == Self::DYNAMIC
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variance {
    Covariant,
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub variance: Variance,
}

impl TypeParameter {
    fn new(name: &str, variance: Variance) -> Self {
        Self {
            name: name.to_string(),
            variance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    pub name: String,
    pub ty: TypeId,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<SignatureParameter>,
    /// Declared return type; for coroutines this is the awaited value type.
    pub returns: TypeId,
    pub is_async: bool,
}

impl Signature {
    pub fn dynamic() -> Self {
        Self {
            parameters: Vec::new(),
            returns: TypeId::DYNAMIC,
            is_async: false,
        }
    }

    pub fn required_count(&self) -> usize {
        self.parameters
            .iter()
            .filter(|param| !param.has_default)
            .count()
    }
}

/// Special forms that only make sense inside annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpecialForm {
    Union,
    Optional,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuiltinFunction {
    IsInstance,
    Len,
    Print,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Dynamic,
    /// Built-in nominal types (`int`, `bool`, `str`, ...).
    Primitive,
    /// A user-declared class.
    Class,
    /// A parameterised type definition such as `list` or `Awaitable`.
    /// Variadic templates (`Union`) accept any number of arguments.
    Template {
        parameters: Vec<TypeParameter>,
        variadic: bool,
    },
    Instantiation {
        template: TypeId,
        args: Vec<TypeId>,
    },
    /// A normalised union; members are sorted and pairwise unrelated.
    Union(Vec<TypeId>),
    Function(Signature),
    /// A method looked up through an instance; the receiver is already bound.
    BoundMethod {
        function: TypeId,
    },
    Module(String),
    Decorator(KnownDecorator),
    SpecialForm(SpecialForm),
    Builtin(BuiltinFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberKind {
    Attribute,
    Method,
    StaticMethod,
    ClassMethod,
    Property,
    CachedProperty,
    AsyncCachedProperty,
    /// A method wrapped by a decorator the binder does not understand.
    DecoratedMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub ty: TypeId,
    pub kind: MemberKind,
    pub is_final: bool,
}

impl Member {
    pub fn attribute(ty: TypeId) -> Self {
        Self {
            ty,
            kind: MemberKind::Attribute,
            is_final: false,
        }
    }

    pub fn method(function: TypeId, kind: MemberKind) -> Self {
        Self {
            ty: function,
            kind,
            is_final: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeData {
    pub name: String,
    /// Module that declared the type; `builtins` for the built-in types.
    pub module: String,
    pub kind: TypeKind,
    pub bases: Vec<TypeId>,
    pub members: IndexMap<String, Member>,
    pub is_final: bool,
}

impl TypeData {
    pub fn new(name: impl Into<String>, module: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            kind,
            bases: vec![TypeId::OBJECT],
            members: IndexMap::new(),
            is_final: false,
        }
    }

    fn builtin(name: &str, kind: TypeKind, bases: Vec<TypeId>) -> Self {
        Self {
            bases,
            ..Self::new(name, BUILTINS_MODULE, kind)
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.module == BUILTINS_MODULE {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }
}

pub const BUILTINS_MODULE: &str = "builtins";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeConstructionError {
    #[error("{template} expects {expected}, got {actual}")]
    Arity {
        template: String,
        expected: String,
        actual: usize,
    },
    #[error("{0} is not a generic type")]
    NotGeneric(String),
    #[error("Union requires at least one type argument")]
    EmptyUnion,
    #[error("generic type {0} must be instantiated before use as a type argument")]
    UninstantiatedTemplate(String),
}

#[derive(Debug, Clone)]
pub struct TypeArena {
    types: Vec<TypeData>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    pub fn new() -> Self {
        use Variance::{Covariant, Invariant};

        let template = |parameters: Vec<TypeParameter>| TypeKind::Template {
            parameters,
            variadic: false,
        };
        let object = vec![TypeId::OBJECT];
        let types = vec![
            TypeData::builtin("dynamic", TypeKind::Dynamic, Vec::new()),
            TypeData::builtin("object", TypeKind::Primitive, Vec::new()),
            TypeData::builtin("NoneType", TypeKind::Primitive, object.clone()),
            TypeData::builtin("int", TypeKind::Primitive, object.clone()),
            TypeData::builtin("bool", TypeKind::Primitive, vec![TypeId::INT]),
            TypeData::builtin("float", TypeKind::Primitive, object.clone()),
            TypeData::builtin("str", TypeKind::Primitive, object.clone()),
            TypeData::builtin("tuple", TypeKind::Primitive, object.clone()),
            TypeData::builtin(
                "Type",
                template(vec![TypeParameter::new("T", Covariant)]),
                object.clone(),
            ),
            TypeData::builtin(
                "list",
                template(vec![TypeParameter::new("T", Invariant)]),
                object.clone(),
            ),
            TypeData::builtin(
                "dict",
                template(vec![
                    TypeParameter::new("K", Invariant),
                    TypeParameter::new("V", Invariant),
                ]),
                object.clone(),
            ),
            TypeData::builtin(
                "Awaitable",
                template(vec![TypeParameter::new("T", Covariant)]),
                object.clone(),
            ),
            TypeData::builtin(
                "Union",
                TypeKind::Template {
                    parameters: Vec::new(),
                    variadic: true,
                },
                object,
            ),
        ];
        debug_assert_eq!(types.len(), TypeId::FIRST_USER as usize);
        Self { types }
    }

    pub fn alloc(&mut self, data: TypeData) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(data);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.index()]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.get(id).kind
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn declare_class(&mut self, module: &str, name: &str) -> TypeId {
        self.alloc(TypeData::new(name, module, TypeKind::Class))
    }

    pub fn declare_function(&mut self, module: &str, qualname: &str) -> TypeId {
        self.alloc(TypeData::new(
            qualname,
            module,
            TypeKind::Function(Signature::dynamic()),
        ))
    }

    pub fn signature(&self, id: TypeId) -> Option<&Signature> {
        match self.kind(id) {
            TypeKind::Function(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn is_template(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Template { .. })
    }

    pub fn is_union(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Union(_))
    }

    /// The members of a union, or the type itself.
    pub fn union_members(&self, id: TypeId) -> Vec<TypeId> {
        match self.kind(id) {
            TypeKind::Union(members) => members.clone(),
            _ => vec![id],
        }
    }

    /// The template and arguments of an instantiation.
    pub fn instantiation(&self, id: TypeId) -> Option<(TypeId, &[TypeId])> {
        match self.kind(id) {
            TypeKind::Instantiation { template, args } => Some((*template, args.as_slice())),
            _ => None,
        }
    }

    /// `T` for `Type[T]`, i.e. the instance type of a class object.
    pub fn class_instance(&self, id: TypeId) -> Option<TypeId> {
        match self.instantiation(id) {
            Some((TypeId::TYPE, [instance])) => Some(*instance),
            _ => None,
        }
    }

    /// `T` for `Awaitable[T]`.
    pub fn awaited(&self, id: TypeId) -> Option<TypeId> {
        match self.instantiation(id) {
            Some((TypeId::AWAITABLE, [value])) => Some(*value),
            _ => None,
        }
    }

    fn direct_bases(&self, id: TypeId) -> &[TypeId] {
        match self.kind(id) {
            TypeKind::Instantiation { template, .. } => &self.get(*template).bases,
            _ => &self.get(id).bases,
        }
    }

    /// The type followed by all of its ancestors, nearest first, each once.
    pub fn mro(&self, id: TypeId) -> Vec<TypeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            queue.extend(self.direct_bases(current).iter().copied());
        }
        order
    }

    pub fn has_dynamic_base(&self, id: TypeId) -> bool {
        self.mro(id).contains(&TypeId::DYNAMIC)
    }

    /// Nominal subclassing extended to unions and generic instantiations.
    pub fn is_subclass_of(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        if let TypeKind::Union(members) = self.kind(sub) {
            return members.iter().all(|member| self.is_subclass_of(*member, sup));
        }
        if let TypeKind::Union(members) = self.kind(sup) {
            return members.iter().any(|member| self.is_subclass_of(sub, *member));
        }
        if let (
            TypeKind::Instantiation {
                template: sub_template,
                args: sub_args,
            },
            TypeKind::Instantiation {
                template: sup_template,
                args: sup_args,
            },
        ) = (self.kind(sub), self.kind(sup))
        {
            if sub_template != sup_template || sub_args.len() != sup_args.len() {
                return false;
            }
            return self.arguments_compatible(*sub_template, sub_args, sup_args);
        }
        if matches!(self.kind(sup), TypeKind::Instantiation { .. }) {
            return false;
        }
        self.mro(sub).into_iter().skip(1).any(|base| base == sup)
    }

    fn arguments_compatible(
        &self,
        template: TypeId,
        sub_args: &[TypeId],
        sup_args: &[TypeId],
    ) -> bool {
        let TypeKind::Template { parameters, .. } = self.kind(template) else {
            return false;
        };
        parameters
            .iter()
            .zip(sub_args.iter().zip(sup_args))
            .all(|(parameter, (sub, sup))| {
                if sub.is_dynamic() || sup.is_dynamic() {
                    return true;
                }
                match parameter.variance {
                    Variance::Covariant => self.is_subclass_of(*sub, *sup),
                    Variance::Invariant => sub == sup,
                }
            })
    }

    /// Whether a value of type `src` may be stored where `dest` is declared.
    pub fn can_assign(&self, dest: TypeId, src: TypeId) -> bool {
        dest.is_dynamic() || src.is_dynamic() || self.is_subclass_of(src, dest)
    }

    /// Finds `name` in the type's own members or any ancestor's.
    pub fn lookup_member(&self, id: TypeId, name: &str) -> Option<&Member> {
        let owner = match self.kind(id) {
            TypeKind::Instantiation { template, .. } => *template,
            _ => id,
        };
        self.mro(owner)
            .into_iter()
            .find_map(|ancestor| self.get(ancestor).members.get(name))
    }

    /// Every member name visible on the type, nearest declaration first.
    pub fn member_closure(&self, id: TypeId) -> IndexMap<String, Member> {
        let mut closure = IndexMap::new();
        for ancestor in self.mro(id) {
            for (name, member) in &self.get(ancestor).members {
                closure
                    .entry(name.clone())
                    .or_insert_with(|| member.clone());
            }
        }
        closure
    }

    /// Drops `None` from an optional type.
    pub fn non_optional_members(&self, id: TypeId) -> Vec<TypeId> {
        self.union_members(id)
            .into_iter()
            .filter(|member| *member != TypeId::NONE)
            .collect()
    }

    pub fn is_optional(&self, id: TypeId) -> bool {
        id == TypeId::NONE || self.union_members(id).contains(&TypeId::NONE)
    }

    /// Human-readable name used in diagnostics.
    pub fn describe(&self, id: TypeId) -> String {
        let data = self.get(id);
        match &data.kind {
            TypeKind::Dynamic => "dynamic".to_string(),
            TypeKind::Primitive if id == TypeId::NONE => "None".to_string(),
            TypeKind::Primitive | TypeKind::Template { .. } | TypeKind::Class => {
                data.qualified_name()
            }
            TypeKind::Instantiation { template, args } => format!(
                "{}[{}]",
                self.get(*template).name,
                strix_support::join_described(args.iter().map(|arg| self.describe(*arg)))
            ),
            TypeKind::Union(members) => {
                if let [TypeId::NONE, other] = members.as_slice() {
                    format!("Optional[{}]", self.describe(*other))
                } else {
                    format!(
                        "Union[{}]",
                        strix_support::join_described(
                            members.iter().map(|member| self.describe(*member))
                        )
                    )
                }
            }
            TypeKind::Function(_) => format!("function {}", data.qualified_name()),
            TypeKind::BoundMethod { function } => {
                format!("bound method {}", self.get(*function).qualified_name())
            }
            TypeKind::Module(name) => format!("module {name}"),
            TypeKind::Decorator(decorator) => format!("decorator {}", decorator.name()),
            TypeKind::SpecialForm(form) => format!("typing.{form:?}"),
            TypeKind::Builtin(_) => format!("builtin {}", data.name),
        }
    }

    /// The name Python-style attribute errors use for an instance type.
    pub fn instance_name(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Instantiation { template, .. } => self.get(*template).name.clone(),
            _ => self.get(id).name.clone(),
        }
    }
}
