//! Resolution of an external per-input entry point.
//!
//! A module is anything exposing one named entry point with the [`RawEntry`]
//! signature. It comes either from a shared library loaded at runtime or from
//! a table of entry points linked into the binary; configuration picks which.

use crate::abi::RawEntry;
use crate::config::{TargetConfig, TargetMode};
use crate::error::HarnessError;
use libloading::Library;
use std::path::Path;

/// A resolved entry point the harness forwards inputs to.
pub trait EntryModule: Send + Sync {
    /// Human-readable origin, used in logs and errors.
    fn describe(&self) -> String;

    /// Calls the entry point with `data` and returns its status unchanged.
    fn invoke(&self, data: &[u8]) -> i32;
}

/// Entry point resolved from a shared library.
///
/// The library is kept loaded for as long as this value lives; a harness keeps
/// it for the rest of the process.
pub struct DynamicModule {
    path: String,
    symbol: String,
    entry: RawEntry,
    _library: Library,
}

impl DynamicModule {
    pub fn load(path: &Path, symbol: &str) -> Result<Self, HarnessError> {
        let display = path.display().to_string();

        // SAFETY: loading runs the module's initializers. The module is trusted
        // by configuration.
        let library = unsafe { Library::new(path) }.map_err(|source| {
            HarnessError::ModuleNotFound {
                module: display.clone(),
                source,
            }
        })?;

        // SAFETY: the symbol is declared by contract to have the `RawEntry`
        // signature. The copied fn pointer stays valid while `library` lives.
        let entry: RawEntry = unsafe {
            let resolved = library
                .get::<RawEntry>(symbol.as_bytes())
                .map_err(|e| HarnessError::SymbolNotFound {
                    symbol: symbol.to_string(),
                    module: display.clone(),
                    reason: e.to_string(),
                })?;
            *resolved
        };

        tracing::info!(module = %path.display(), symbol, "bound dynamic entry point");
        Ok(Self {
            path: display,
            symbol: symbol.to_string(),
            entry,
            _library: library,
        })
    }
}

impl EntryModule for DynamicModule {
    fn describe(&self) -> String {
        format!("{}!{}", self.path, self.symbol)
    }

    fn invoke(&self, data: &[u8]) -> i32 {
        // SAFETY: `data` is valid for its length for the whole call.
        unsafe { (self.entry)(data.as_ptr(), data.len()) }
    }
}

/// Entry point compiled into the binary.
#[derive(Clone, Copy)]
pub struct LinkedModule {
    symbol: &'static str,
    entry: RawEntry,
}

impl EntryModule for LinkedModule {
    fn describe(&self) -> String {
        format!("<linked>!{}", self.symbol)
    }

    fn invoke(&self, data: &[u8]) -> i32 {
        // SAFETY: `data` is valid for its length for the whole call.
        unsafe { (self.entry)(data.as_ptr(), data.len()) }
    }
}

/// Entry points available to the linked mode, looked up by symbol name.
#[derive(Clone, Default)]
pub struct LinkedEntries {
    entries: Vec<LinkedModule>,
}

impl LinkedEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &'static str, entry: RawEntry) -> Self {
        self.entries.push(LinkedModule { symbol, entry });
        self
    }

    pub fn lookup(&self, symbol: &str) -> Option<LinkedModule> {
        self.entries
            .iter()
            .find(|module| module.symbol == symbol)
            .copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|module| module.symbol)
    }
}

/// Resolves the entry point named by `target`.
///
/// Local mode has no module; callers only reach this for the forwarding modes.
pub fn resolve(
    target: &TargetConfig,
    linked: &LinkedEntries,
) -> Result<Box<dyn EntryModule>, HarnessError> {
    match target.mode {
        TargetMode::Dynamic => {
            let module = DynamicModule::load(&target.module_path(), &target.symbol)?;
            Ok(Box::new(module))
        }
        TargetMode::Linked => match linked.lookup(&target.symbol) {
            Some(module) => {
                tracing::info!(symbol = %target.symbol, "bound linked entry point");
                Ok(Box::new(module))
            }
            None => Err(HarnessError::SymbolNotFound {
                symbol: target.symbol.clone(),
                module: "<linked>".to_string(),
                reason: format!(
                    "available: [{}]",
                    linked.symbols().collect::<Vec<_>>().join(", ")
                ),
            }),
        },
        TargetMode::Local => Err(HarnessError::InvalidConfig(
            "local mode has no entry module to resolve".to_string(),
        )),
    }
}
