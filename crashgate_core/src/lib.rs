pub mod abi;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod fault;
pub mod gate;
pub mod harness;
pub mod input;
pub mod module;
pub mod options;
pub mod oracle;

pub use abi::RawEntry;
pub use config::{HarnessConfig, TargetConfig, TargetMode};
pub use dispatcher::FaultDispatcher;
pub use error::HarnessError;
pub use executor::{
    CommandExecutor, CommandExecutorConfig, Execution, ExecutionStatus, InputDelivery, ProcessOutput,
};
pub use fault::FaultKind;
pub use gate::{GateCheck, GateConfig, GateOutcome};
pub use harness::{Harness, Target};
pub use module::{DynamicModule, EntryModule, LinkedEntries, LinkedModule};
pub use options::InitOptions;
pub use oracle::{Expectation, FaultOracle, FaultReport, Verdict};
