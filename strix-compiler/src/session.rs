use crate::generics::TypeContext;
use crate::symbols::SymbolTable;

/// State shared by every module of one compilation: the type arena, the
/// generic instantiation cache and the symbol table. Passes borrow it
/// mutably, so only one of them can construct types at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub types: TypeContext,
    pub symbols: SymbolTable,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let mut types = TypeContext::new();
        let symbols = SymbolTable::new(&mut types);
        Self { types, symbols }
    }

    pub fn describe(&self, ty: crate::types::TypeId) -> String {
        self.types.arena.describe(ty)
    }
}
