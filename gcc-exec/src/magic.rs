//! Cell magics: the named commands a notebook host dispatches cells to.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{report, service::CellExecutionService, types::CompileMode};

/// Name of the metadata-aware magic
pub const GCC_MAGIC: &str = "gcc";

/// Name of the plain `.c` file magic
pub const GCC_FILE_MAGIC: &str = "gcc_file";

/// A cell-level command. `run` always returns printable text and never fails.
#[async_trait]
pub trait CellMagic: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, line: &str, cell: &str) -> String;
}

/// Compiles and runs a C cell through the execution service
pub struct GccMagic {
    name: &'static str,
    mode: CompileMode,
    service: CellExecutionService,
}

impl GccMagic {
    /// `%%gcc`: metadata header, auto-wrap and scanf echo
    pub fn gcc(service: CellExecutionService) -> Self {
        Self {
            name: GCC_MAGIC,
            mode: CompileMode::Stdin,
            service,
        }
    }

    /// `%%gcc_file`: the cell is compiled verbatim from a `.c` file
    pub fn gcc_file(service: CellExecutionService) -> Self {
        Self {
            name: GCC_FILE_MAGIC,
            mode: CompileMode::SourceFile,
            service,
        }
    }
}

#[async_trait]
impl CellMagic for GccMagic {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, line: &str, cell: &str) -> String {
        if !line.trim().is_empty() {
            debug!("Ignoring %%{} arguments: {:?}", self.name, line);
        }
        let request = self.service.request(cell, self.mode);
        let outcome = self.service.execute(request).await;
        report::render(self.mode, &outcome)
    }
}

/// Magics by name
#[derive(Clone, Default)]
pub struct MagicRegistry {
    magics: BTreeMap<String, Arc<dyn CellMagic>>,
}

impl MagicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with both C magics sharing one service
    pub fn with_defaults(service: CellExecutionService) -> Self {
        let mut registry = Self::new();
        registry.register(GccMagic::gcc(service.clone()));
        registry.register(GccMagic::gcc_file(service));
        registry
    }

    /// Add a magic, replacing any previous one with the same name
    pub fn register(&mut self, magic: impl CellMagic + 'static) {
        let name = magic.name().to_string();
        if self.magics.insert(name.clone(), Arc::new(magic)).is_some() {
            warn!("Replaced existing magic %%{}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CellMagic>> {
        self.magics.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.magics.keys().map(String::as_str)
    }

    /// Run `cell` through the magic called `name`
    pub async fn run_cell(&self, name: &str, line: &str, cell: &str) -> String {
        match self.magics.get(name) {
            Some(magic) => magic.run(line, cell).await,
            None => format!(
                "UsageError: Cell magic `%%{}` not found. Available: {}\n",
                name,
                self.names().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}
