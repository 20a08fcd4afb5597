use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::ast::NodeId;
use crate::binder::{bind_module, BoundModule};
use crate::declarations::{declare_module, resolve_hierarchy, resolve_members};
use crate::diagnostics::{
    Diagnostic, DiagnosticLevel, Diagnostics, ErrorMode, ErrorSink, TypedSyntaxError,
};
use crate::session::Session;
use crate::source::SourceModule;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub error_mode: ErrorMode,
    pub warnings_as_errors: bool,
}

/// The result of a successful compilation: every module's node types and
/// the session that owns the types they refer to.
pub struct Compilation {
    pub modules: Vec<BoundModule>,
    pub session: Session,
}

#[derive(Serialize)]
struct ModuleReport<'a> {
    module: &'a str,
    types: BTreeMap<u32, String>,
}

impl Compilation {
    pub fn module(&self, name: &str) -> Option<&BoundModule> {
        self.modules.iter().find(|module| module.name == name)
    }

    pub fn type_of(&self, module: &str, node: NodeId) -> Option<TypeId> {
        self.module(module).and_then(|module| module.type_of(node))
    }

    pub fn describe(&self, ty: TypeId) -> String {
        self.session.describe(ty)
    }

    /// Describes the type of a node, if the binder recorded one.
    pub fn describe_node(&self, module: &str, node: NodeId) -> Option<String> {
        self.type_of(module, node).map(|ty| self.describe(ty))
    }

    /// A JSON document with the described type of every bound node, keyed
    /// by module and node id.
    pub fn type_report(&self) -> serde_json::Value {
        let reports: Vec<ModuleReport<'_>> = self
            .modules
            .iter()
            .map(|module| ModuleReport {
                module: &module.name,
                types: module
                    .node_types
                    .iter()
                    .map(|(node, ty)| (node.0, self.describe(*ty)))
                    .collect(),
            })
            .collect();
        serde_json::json!({ "modules": reports })
    }

    pub fn type_report_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.type_report()).context("failed to render type report")
    }
}

pub struct Compiler {
    diagnostics: Diagnostics,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            options,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn compile(&mut self, sources: &[SourceModule]) -> Result<Compilation> {
        let mut session = Session::new();

        for source in sources {
            if let Err(err) = declare_module(&mut session, source) {
                self.push_error(err.in_file(&source.filename()));
                bail!("Declaration failed");
            }
        }

        for source in sources {
            let mut sink = ErrorSink::new(self.options.error_mode, Some(source.filename()));
            let result = resolve_hierarchy(&mut session, source, &mut sink);
            self.diagnostics.extend(sink.into_diagnostics());
            if let Err(err) = result {
                self.push_error(err);
                bail!("Declaration failed");
            }
        }
        for source in sources {
            let mut sink = ErrorSink::new(self.options.error_mode, Some(source.filename()));
            let result = resolve_members(&mut session, source, &mut sink);
            self.diagnostics.extend(sink.into_diagnostics());
            if let Err(err) = result {
                self.push_error(err);
                bail!("Declaration failed");
            }
        }
        // In collect mode binding still runs so one pass reports everything.
        let declaration_failed = self.diagnostics.has_errors();

        let mut modules = Vec::with_capacity(sources.len());
        for source in sources {
            match bind_module(&mut session, source, self.options.error_mode) {
                Ok(mut bound) => {
                    let mut diagnostics = std::mem::take(&mut bound.diagnostics);
                    if self.options.warnings_as_errors {
                        diagnostics.escalate_warnings();
                    }
                    self.diagnostics.extend(diagnostics.clone());
                    bound.diagnostics = diagnostics;
                    modules.push(bound);
                }
                Err(err) => {
                    self.push_error(err);
                    bail!("Type binding failed");
                }
            }
        }
        if declaration_failed {
            bail!("Declaration failed");
        }
        if self.diagnostics.has_errors() {
            bail!("Type binding failed");
        }

        debug!(
            modules = modules.len(),
            instantiations = session.types.generics().len(),
            "compilation finished"
        );
        Ok(Compilation { modules, session })
    }

    fn push_error(&mut self, error: TypedSyntaxError) {
        self.diagnostics
            .push_diagnostic(Diagnostic::from_error(error, DiagnosticLevel::Error));
    }
}
