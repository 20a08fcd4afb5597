use std::path::PathBuf;

use crate::ast::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// A parsed module handed to the compiler: its dotted name, the file it came
/// from (used only for diagnostic positions) and its syntax tree.
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub id: SourceId,
    pub name: String,
    pub path: PathBuf,
    pub module: Module,
}

impl SourceModule {
    pub fn new(id: SourceId, name: impl Into<String>, path: PathBuf, module: Module) -> Self {
        Self {
            id,
            name: name.into(),
            path,
            module,
        }
    }

    pub fn filename(&self) -> String {
        self.path.display().to_string()
    }
}
