use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::{NodeId, SourceSpan};
use crate::decorators::KnownDecorator;
use crate::generics::TypeContext;
use crate::types::{
    BuiltinFunction, Member, SpecialForm, TypeArena, TypeData, TypeId, TypeKind, BUILTINS_MODULE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Class,
    Function,
    Variable,
    Module,
    /// `from module import name`, resolved lazily through the exporting module.
    Import { module: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub ty: TypeId,
    pub kind: SymbolKind,
    pub span: Option<SourceSpan>,
    pub is_final: bool,
}

impl Symbol {
    pub fn new(ty: TypeId, kind: SymbolKind) -> Self {
        Self {
            ty,
            kind,
            span: None,
            is_final: false,
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    pub name: String,
    pub filename: Option<String>,
    pub children: IndexMap<String, Symbol>,
    /// Declared type of each function and class definition node.
    pub definitions: HashMap<NodeId, TypeId>,
    /// Modules backed by the built-in library rather than user source.
    pub is_library: bool,
}

impl ModuleTable {
    pub fn new(name: &str, filename: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            filename,
            ..Self::default()
        }
    }
}

/// Declared names of every module in a compilation plus the builtins.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    modules: IndexMap<String, ModuleTable>,
    builtins: IndexMap<String, Symbol>,
}

const MAX_IMPORT_CHAIN: usize = 32;

impl SymbolTable {
    pub fn new(ctx: &mut TypeContext) -> Self {
        let mut table = Self {
            modules: IndexMap::new(),
            builtins: IndexMap::new(),
        };
        table.install_builtins(ctx);
        table.install_library_modules(ctx);
        table
    }

    fn install_builtins(&mut self, ctx: &mut TypeContext) {
        for class in [
            TypeId::OBJECT,
            TypeId::INT,
            TypeId::BOOL,
            TypeId::FLOAT,
            TypeId::STR,
            TypeId::TUPLE,
        ] {
            let name = ctx.arena.get(class).name.clone();
            let ty = ctx.class_object(class).unwrap_or(TypeId::DYNAMIC);
            self.builtins.insert(name, Symbol::new(ty, SymbolKind::Class));
        }
        for (name, template) in [
            ("list", TypeId::LIST),
            ("dict", TypeId::DICT),
            ("type", TypeId::TYPE),
        ] {
            self.builtins
                .insert(name.to_string(), Symbol::new(template, SymbolKind::Class));
        }
        for (name, builtin) in [
            ("isinstance", BuiltinFunction::IsInstance),
            ("len", BuiltinFunction::Len),
            ("print", BuiltinFunction::Print),
        ] {
            let ty = ctx
                .arena
                .alloc(TypeData::new(name, BUILTINS_MODULE, TypeKind::Builtin(builtin)));
            self.builtins
                .insert(name.to_string(), Symbol::new(ty, SymbolKind::Function));
        }
        for decorator in KnownDecorator::ALL {
            if decorator.home_module().is_none() {
                let ty = alloc_decorator(&mut ctx.arena, decorator);
                self.builtins
                    .insert(decorator.name().to_string(), Symbol::new(ty, SymbolKind::Function));
            }
        }
    }

    fn install_library_modules(&mut self, ctx: &mut TypeContext) {
        let mut typing = ModuleTable::new("typing", None);
        typing.is_library = true;
        for (name, form) in [
            ("Union", SpecialForm::Union),
            ("Optional", SpecialForm::Optional),
            ("Final", SpecialForm::Final),
        ] {
            let ty = ctx
                .arena
                .alloc(TypeData::new(name, "typing", TypeKind::SpecialForm(form)));
            typing
                .children
                .insert(name.to_string(), Symbol::new(ty, SymbolKind::Variable));
        }
        for (name, template) in [
            ("Awaitable", TypeId::AWAITABLE),
            ("List", TypeId::LIST),
            ("Dict", TypeId::DICT),
            ("Type", TypeId::TYPE),
        ] {
            typing
                .children
                .insert(name.to_string(), Symbol::new(template, SymbolKind::Class));
        }
        self.modules.insert("typing".to_string(), typing);

        let mut functools = ModuleTable::new("functools", None);
        functools.is_library = true;
        self.modules.insert("functools".to_string(), functools);

        for decorator in KnownDecorator::ALL {
            if let Some(home) = decorator.home_module() {
                let ty = alloc_decorator(&mut ctx.arena, decorator);
                if let Some(module) = self.modules.get_mut(home) {
                    module.children.insert(
                        decorator.name().to_string(),
                        Symbol::new(ty, SymbolKind::Function),
                    );
                }
            }
        }
    }

    pub fn add_module(&mut self, name: &str, filename: Option<String>) -> &mut ModuleTable {
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| ModuleTable::new(name, filename))
    }

    pub fn module(&self, name: &str) -> Option<&ModuleTable> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleTable> {
        self.modules.get_mut(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleTable> {
        self.modules.values()
    }

    pub fn builtin(&self, name: &str) -> Option<&Symbol> {
        self.builtins.get(name)
    }

    pub fn declare(&mut self, module: &str, name: &str, symbol: Symbol) {
        if let Some(table) = self.modules.get_mut(module) {
            table.children.insert(name.to_string(), symbol);
        }
    }

    pub fn definition(&self, module: &str, node: NodeId) -> Option<TypeId> {
        self.modules
            .get(module)
            .and_then(|table| table.definitions.get(&node).copied())
    }

    /// A name declared directly in `module`, following re-exports. `None`
    /// when the module is known but lacks the name.
    pub fn resolve_in_module(&self, module: &str, name: &str) -> Option<Symbol> {
        self.resolve_in_module_bounded(module, name, MAX_IMPORT_CHAIN)
    }

    fn resolve_in_module_bounded(&self, module: &str, name: &str, budget: usize) -> Option<Symbol> {
        let symbol = self.modules.get(module)?.children.get(name)?;
        match &symbol.kind {
            SymbolKind::Import {
                module: source,
                name: imported,
            } => {
                if budget == 0 {
                    return None;
                }
                if !self.has_module(source) {
                    // Import machinery is external; unknown modules are dynamic.
                    return Some(Symbol {
                        ty: TypeId::DYNAMIC,
                        ..symbol.clone()
                    });
                }
                let target = self.resolve_in_module_bounded(source, imported, budget - 1)?;
                trace!(module, name, source = source.as_str(), "resolved import");
                Some(Symbol {
                    span: symbol.span,
                    ..target
                })
            }
            _ => Some(symbol.clone()),
        }
    }

    /// Looks `name` up in the module scope, then in the builtins.
    pub fn resolve(&self, module: &str, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.resolve_in_module(module, name) {
            return Some(symbol);
        }
        self.builtins.get(name).cloned()
    }

    /// Every member visible on a class, including inherited ones.
    pub fn children_of(&self, arena: &TypeArena, class: TypeId) -> IndexMap<String, Member> {
        arena.member_closure(class)
    }

    /// Sets the bases of a forward-declared class. Repeating the call with
    /// the same bases leaves the class unchanged.
    pub fn backfill_bases(&self, arena: &mut TypeArena, class: TypeId, bases: &[TypeId]) {
        let bases = if bases.is_empty() {
            vec![TypeId::OBJECT]
        } else {
            bases.to_vec()
        };
        let data = arena.get_mut(class);
        if data.bases != bases {
            trace!(class = data.name.as_str(), ?bases, "backfilled bases");
            data.bases = bases;
        }
    }

    /// Records a member on a class unless an identical one is already there.
    pub fn backfill_member(
        &self,
        arena: &mut TypeArena,
        class: TypeId,
        name: &str,
        member: Member,
    ) {
        let data = arena.get_mut(class);
        match data.members.get(name) {
            Some(existing) if *existing == member => {}
            _ => {
                data.members.insert(name.to_string(), member);
            }
        }
    }
}

fn alloc_decorator(arena: &mut TypeArena, decorator: KnownDecorator) -> TypeId {
    let module = decorator.home_module().unwrap_or(BUILTINS_MODULE);
    arena.alloc(TypeData::new(
        decorator.name(),
        module,
        TypeKind::Decorator(decorator),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_shadow_builtins() {
        let mut ctx = TypeContext::new();
        let mut table = SymbolTable::new(&mut ctx);
        table.add_module("foo", None);
        assert_eq!(
            table.resolve("foo", "int").map(|symbol| symbol.kind),
            Some(SymbolKind::Class)
        );
        table.declare("foo", "int", Symbol::new(TypeId::STR, SymbolKind::Variable));
        assert_eq!(table.resolve("foo", "int").map(|s| s.ty), Some(TypeId::STR));
    }

    #[test]
    fn imports_follow_reexports() {
        let mut ctx = TypeContext::new();
        let mut table = SymbolTable::new(&mut ctx);
        let class = ctx.arena.declare_class("a", "C");
        table.add_module("a", None);
        table.add_module("b", None);
        table.add_module("c", None);
        table.declare("a", "C", Symbol::new(class, SymbolKind::Class));
        let reexport = |module: &str| {
            Symbol::new(
                TypeId::DYNAMIC,
                SymbolKind::Import {
                    module: module.to_string(),
                    name: "C".to_string(),
                },
            )
        };
        table.declare("b", "C", reexport("a"));
        table.declare("c", "C", reexport("b"));
        assert_eq!(table.resolve("c", "C").map(|s| s.ty), Some(class));
    }

    #[test]
    fn cyclic_imports_do_not_resolve() {
        let mut ctx = TypeContext::new();
        let mut table = SymbolTable::new(&mut ctx);
        table.add_module("a", None);
        table.add_module("b", None);
        let import = |module: &str| {
            Symbol::new(
                TypeId::DYNAMIC,
                SymbolKind::Import {
                    module: module.to_string(),
                    name: "x".to_string(),
                },
            )
        };
        table.declare("a", "x", import("b"));
        table.declare("b", "x", import("a"));
        assert!(table.resolve_in_module("a", "x").is_none());
    }

    #[test]
    fn typing_exports_special_forms() {
        let mut ctx = TypeContext::new();
        let table = SymbolTable::new(&mut ctx);
        let optional = table.resolve_in_module("typing", "Optional").unwrap();
        assert_eq!(
            ctx.arena.kind(optional.ty),
            &TypeKind::SpecialForm(SpecialForm::Optional)
        );
    }
}
