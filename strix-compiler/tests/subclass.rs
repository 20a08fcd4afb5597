use strix_compiler::{TypeConstructionError, TypeContext, TypeId};

const PRIMITIVES: [TypeId; 7] = [
    TypeId::OBJECT,
    TypeId::NONE,
    TypeId::INT,
    TypeId::BOOL,
    TypeId::FLOAT,
    TypeId::STR,
    TypeId::TUPLE,
];

#[test]
fn primitive_pairs_follow_the_nominal_hierarchy() {
    let ctx = TypeContext::new();
    for sub in PRIMITIVES {
        for sup in PRIMITIVES {
            let expected =
                sub == sup || sup == TypeId::OBJECT || (sub == TypeId::BOOL && sup == TypeId::INT);
            assert_eq!(
                ctx.arena.is_subclass_of(sub, sup),
                expected,
                "{} <: {}",
                ctx.arena.describe(sub),
                ctx.arena.describe(sup)
            );
        }
    }
}

#[test]
fn awaitable_is_covariant_and_list_is_invariant() {
    let mut ctx = TypeContext::new();
    let awaitable_bool = ctx.awaitable(TypeId::BOOL).unwrap();
    let awaitable_int = ctx.awaitable(TypeId::INT).unwrap();
    assert!(ctx.arena.is_subclass_of(awaitable_bool, awaitable_int));
    assert!(!ctx.arena.is_subclass_of(awaitable_int, awaitable_bool));
    assert!(ctx.arena.is_subclass_of(awaitable_int, TypeId::OBJECT));

    let list_bool = ctx.list_of(TypeId::BOOL).unwrap();
    let list_int = ctx.list_of(TypeId::INT).unwrap();
    assert!(!ctx.arena.is_subclass_of(list_bool, list_int));

    let list_dynamic = ctx.list_of(TypeId::DYNAMIC).unwrap();
    assert!(ctx.arena.is_subclass_of(list_int, list_dynamic));
    assert!(ctx.arena.is_subclass_of(list_dynamic, list_int));
}

#[test]
fn class_objects_follow_their_instances() {
    let mut ctx = TypeContext::new();
    let base = ctx.arena.declare_class("foo", "Base");
    let derived = ctx.arena.declare_class("foo", "Derived");
    ctx.arena.get_mut(derived).bases = vec![base];

    let base_object = ctx.class_object(base).unwrap();
    let derived_object = ctx.class_object(derived).unwrap();
    assert!(ctx.arena.is_subclass_of(derived_object, base_object));
    assert!(!ctx.arena.is_subclass_of(base_object, derived_object));
    assert_eq!(ctx.arena.describe(derived_object), "Type[foo.Derived]");
}

#[test]
fn union_of_bool_and_int_is_int() {
    let mut ctx = TypeContext::new();
    assert_eq!(ctx.make_union(&[TypeId::BOOL, TypeId::INT]).unwrap(), TypeId::INT);
    assert_eq!(ctx.make_union(&[TypeId::INT, TypeId::BOOL]).unwrap(), TypeId::INT);
}

#[test]
fn union_subclassing_compares_members() {
    let mut ctx = TypeContext::new();
    let wide = ctx
        .make_union(&[TypeId::INT, TypeId::STR, TypeId::TUPLE])
        .unwrap();
    let narrow = ctx.make_union(&[TypeId::INT, TypeId::STR]).unwrap();
    assert!(!ctx.arena.is_subclass_of(wide, narrow));
    assert!(ctx.arena.is_subclass_of(narrow, wide));
    assert!(ctx.arena.is_subclass_of(TypeId::BOOL, narrow));
    assert_eq!(ctx.arena.describe(wide), "Union[int, str, tuple]");
}

#[test]
fn unions_are_canonical_and_flattened() {
    let mut ctx = TypeContext::new();
    let first = ctx.make_union(&[TypeId::STR, TypeId::INT]).unwrap();
    let second = ctx.make_union(&[TypeId::INT, TypeId::STR, TypeId::INT]).unwrap();
    assert_eq!(first, second);

    let nested = ctx.make_union(&[first, TypeId::FLOAT]).unwrap();
    let flat = ctx
        .make_union(&[TypeId::INT, TypeId::FLOAT, TypeId::STR])
        .unwrap();
    assert_eq!(nested, flat);

    assert_eq!(
        ctx.make_union(&[TypeId::INT, TypeId::DYNAMIC]).unwrap(),
        TypeId::DYNAMIC
    );
    assert_eq!(
        ctx.make_union(&[TypeId::INT, TypeId::OBJECT]).unwrap(),
        TypeId::OBJECT
    );

    let optional = ctx.optional(TypeId::INT).unwrap();
    assert_eq!(ctx.arena.describe(optional), "Optional[int]");
}

#[test]
fn construction_errors_are_reported() {
    let mut ctx = TypeContext::new();
    let arity = ctx.make_generic_type(TypeId::LIST, &[TypeId::INT, TypeId::STR]);
    assert_eq!(
        arity.unwrap_err().to_string(),
        "list expects 1 type argument, got 2"
    );
    assert!(matches!(
        ctx.make_generic_type(TypeId::INT, &[TypeId::STR]),
        Err(TypeConstructionError::NotGeneric(_))
    ));
    assert!(matches!(
        ctx.make_union(&[]),
        Err(TypeConstructionError::EmptyUnion)
    ));
    assert!(matches!(
        ctx.list_of(TypeId::DICT),
        Err(TypeConstructionError::UninstantiatedTemplate(_))
    ));
}

#[test]
fn instantiations_are_cached_by_identity() {
    let mut ctx = TypeContext::new();
    let before = ctx.generics().len();
    let first = ctx.dict_of(TypeId::STR, TypeId::INT).unwrap();
    let second = ctx.dict_of(TypeId::STR, TypeId::INT).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.generics().len(), before + 1);
    assert_eq!(ctx.arena.describe(first), "dict[str, int]");
}
