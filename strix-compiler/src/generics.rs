use std::collections::HashMap;

use tracing::trace;

use crate::types::{
    TypeArena, TypeConstructionError, TypeData, TypeId, TypeKind, BUILTINS_MODULE,
};

type CacheKey = (TypeId, Vec<TypeId>);

/// Canonical instantiations keyed by template and argument tuple. Entries
/// are never evicted; the number of instantiations is bounded by the program.
#[derive(Debug, Default, Clone)]
pub struct GenericCache {
    entries: HashMap<CacheKey, TypeId>,
}

impl GenericCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, template: TypeId, args: &[TypeId]) -> Option<TypeId> {
        self.entries.get(&(template, args.to_vec())).copied()
    }

    /// Returns the cached instantiation or inserts the one built by `create`.
    pub fn get_or_create<F>(
        &mut self,
        template: TypeId,
        args: &[TypeId],
        create: F,
    ) -> Result<TypeId, TypeConstructionError>
    where
        F: FnOnce() -> Result<TypeId, TypeConstructionError>,
    {
        let key = (template, args.to_vec());
        if let Some(existing) = self.entries.get(&key) {
            trace!(template = template.0, ?args, "generic cache hit");
            return Ok(*existing);
        }
        trace!(template = template.0, ?args, "generic cache miss");
        let created = create()?;
        self.entries.insert(key, created);
        Ok(created)
    }

    /// Records that another spelling of the arguments maps to `ty`.
    fn alias(&mut self, template: TypeId, args: &[TypeId], ty: TypeId) {
        self.entries.entry((template, args.to_vec())).or_insert(ty);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The type arena together with the instantiation cache. Everything that can
/// construct a generic type goes through here, under an exclusive borrow.
#[derive(Debug, Default, Clone)]
pub struct TypeContext {
    pub arena: TypeArena,
    generics: GenericCache,
    bound_methods: HashMap<TypeId, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generics(&self) -> &GenericCache {
        &self.generics
    }

    pub fn make_generic_type(
        &mut self,
        template: TypeId,
        args: &[TypeId],
    ) -> Result<TypeId, TypeConstructionError> {
        let (expected, variadic) = match self.arena.kind(template) {
            TypeKind::Template {
                parameters,
                variadic,
            } => (parameters.len(), *variadic),
            _ => {
                return Err(TypeConstructionError::NotGeneric(
                    self.arena.describe(template),
                ))
            }
        };
        if variadic {
            return self.make_union(args);
        }
        if args.len() != expected {
            return Err(TypeConstructionError::Arity {
                template: self.arena.describe(template),
                expected: strix_support::plural(expected, "type argument", "type arguments"),
                actual: args.len(),
            });
        }
        self.reject_templates(args)?;

        let arena = &mut self.arena;
        self.generics.get_or_create(template, args, || {
            let name = arena.get(template).name.clone();
            Ok(arena.alloc(TypeData::new(
                name,
                BUILTINS_MODULE,
                TypeKind::Instantiation {
                    template,
                    args: args.to_vec(),
                },
            )))
        })
    }

    /// Builds `Union[args]`: nested unions are flattened, duplicates and
    /// members subsumed by another member are dropped, and a single survivor
    /// is returned as itself. A union mentioning `dynamic` is `dynamic`.
    pub fn make_union(&mut self, args: &[TypeId]) -> Result<TypeId, TypeConstructionError> {
        if args.is_empty() {
            return Err(TypeConstructionError::EmptyUnion);
        }
        if let Some(existing) = self.generics.get(TypeId::UNION, args) {
            trace!(?args, "union cache hit");
            return Ok(existing);
        }
        self.reject_templates(args)?;

        let members = self.normalize_union(args);
        let result = match members.as_slice() {
            [] => return Err(TypeConstructionError::EmptyUnion),
            [single] => *single,
            _ => {
                let arena = &mut self.arena;
                let members_for_kind = members.clone();
                self.generics.get_or_create(TypeId::UNION, &members, || {
                    Ok(arena.alloc(TypeData::new(
                        "Union",
                        BUILTINS_MODULE,
                        TypeKind::Union(members_for_kind),
                    )))
                })?
            }
        };
        self.generics.alias(TypeId::UNION, args, result);
        Ok(result)
    }

    fn normalize_union(&self, args: &[TypeId]) -> Vec<TypeId> {
        let mut flat: Vec<TypeId> = args
            .iter()
            .flat_map(|arg| self.arena.union_members(*arg))
            .collect();
        if flat.contains(&TypeId::DYNAMIC) {
            return vec![TypeId::DYNAMIC];
        }
        flat.sort();
        flat.dedup();

        let mut kept: Vec<TypeId> = Vec::with_capacity(flat.len());
        for candidate in flat {
            if kept
                .iter()
                .any(|existing| self.arena.is_subclass_of(candidate, *existing))
            {
                continue;
            }
            kept.retain(|existing| !self.arena.is_subclass_of(*existing, candidate));
            kept.push(candidate);
        }
        kept.sort();
        kept
    }

    fn reject_templates(&self, args: &[TypeId]) -> Result<(), TypeConstructionError> {
        match args.iter().find(|arg| self.arena.is_template(**arg)) {
            Some(template) => Err(TypeConstructionError::UninstantiatedTemplate(
                self.arena.describe(*template),
            )),
            None => Ok(()),
        }
    }

    pub fn optional(&mut self, ty: TypeId) -> Result<TypeId, TypeConstructionError> {
        self.make_union(&[ty, TypeId::NONE])
    }

    /// `Type[instance]`, the type of a class object.
    pub fn class_object(&mut self, instance: TypeId) -> Result<TypeId, TypeConstructionError> {
        self.make_generic_type(TypeId::TYPE, &[instance])
    }

    pub fn awaitable(&mut self, value: TypeId) -> Result<TypeId, TypeConstructionError> {
        self.make_generic_type(TypeId::AWAITABLE, &[value])
    }

    pub fn list_of(&mut self, element: TypeId) -> Result<TypeId, TypeConstructionError> {
        self.make_generic_type(TypeId::LIST, &[element])
    }

    pub fn dict_of(&mut self, key: TypeId, value: TypeId) -> Result<TypeId, TypeConstructionError> {
        self.make_generic_type(TypeId::DICT, &[key, value])
    }

    /// Joins the types of several control-flow paths or operands. Unlike
    /// [`TypeContext::make_union`] this never fails.
    pub fn widen(&mut self, types: &[TypeId]) -> TypeId {
        match types {
            [] => TypeId::DYNAMIC,
            [single] => *single,
            _ => self.make_union(types).unwrap_or(TypeId::DYNAMIC),
        }
    }

    /// The union of `ty`'s members that are not subclasses of `removed`.
    /// Returns `None` when nothing is left.
    pub fn without(&mut self, ty: TypeId, removed: TypeId) -> Option<TypeId> {
        let remaining: Vec<TypeId> = self
            .arena
            .union_members(ty)
            .into_iter()
            .filter(|member| !self.arena.can_assign(removed, *member) || member.is_dynamic())
            .collect();
        if remaining.is_empty() {
            None
        } else {
            Some(self.widen(&remaining))
        }
    }

    /// The type a method has once looked up through an instance.
    pub fn bound_method(&mut self, function: TypeId) -> TypeId {
        if let Some(existing) = self.bound_methods.get(&function) {
            return *existing;
        }
        let name = self.arena.get(function).name.clone();
        let module = self.arena.get(function).module.clone();
        let bound = self
            .arena
            .alloc(TypeData::new(name, module, TypeKind::BoundMethod { function }));
        self.bound_methods.insert(function, bound);
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiations_are_canonical() {
        let mut ctx = TypeContext::new();
        let first = ctx.list_of(TypeId::INT).unwrap();
        let second = ctx.list_of(TypeId::INT).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, ctx.list_of(TypeId::STR).unwrap());
        assert_eq!(ctx.arena.describe(first), "list[int]");
    }

    #[test]
    fn arity_mismatch_is_a_construction_error() {
        let mut ctx = TypeContext::new();
        let err = ctx
            .make_generic_type(TypeId::DICT, &[TypeId::INT])
            .unwrap_err();
        assert_eq!(err.to_string(), "dict expects 2 type arguments, got 1");
    }

    #[test]
    fn non_templates_cannot_be_instantiated() {
        let mut ctx = TypeContext::new();
        assert_eq!(
            ctx.make_generic_type(TypeId::INT, &[TypeId::STR]),
            Err(TypeConstructionError::NotGeneric("int".into()))
        );
    }

    #[test]
    fn union_is_order_independent() {
        let mut ctx = TypeContext::new();
        let a = ctx.make_union(&[TypeId::INT, TypeId::STR]).unwrap();
        let b = ctx.make_union(&[TypeId::STR, TypeId::INT, TypeId::STR]).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.arena.describe(a), "Union[int, str]");
    }

    #[test]
    fn union_subsumes_and_collapses() {
        let mut ctx = TypeContext::new();
        assert_eq!(
            ctx.make_union(&[TypeId::BOOL, TypeId::INT]).unwrap(),
            TypeId::INT
        );
        assert_eq!(
            ctx.make_union(&[TypeId::INT, TypeId::DYNAMIC]).unwrap(),
            TypeId::DYNAMIC
        );
        let optional = ctx.optional(TypeId::STR).unwrap();
        assert_eq!(ctx.arena.describe(optional), "Optional[str]");
        let nested = ctx.make_union(&[optional, TypeId::STR]).unwrap();
        assert_eq!(nested, optional);
    }

    #[test]
    fn empty_union_is_rejected() {
        let mut ctx = TypeContext::new();
        assert_eq!(ctx.make_union(&[]), Err(TypeConstructionError::EmptyUnion));
    }

    #[test]
    fn without_removes_matching_members() {
        let mut ctx = TypeContext::new();
        let optional = ctx.optional(TypeId::INT).unwrap();
        assert_eq!(ctx.without(optional, TypeId::NONE), Some(TypeId::INT));
        assert_eq!(ctx.without(TypeId::INT, TypeId::INT), None);
    }
}
