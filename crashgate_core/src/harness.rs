//! The harness adapter: the state `Initialize` produces and `TestOneInput` reads.

use crate::config::{HarnessConfig, TargetMode};
use crate::dispatcher::FaultDispatcher;
use crate::error::HarnessError;
use crate::gate::GateConfig;
use crate::module::{self, EntryModule, LinkedEntries};
use crate::options::InitOptions;

/// Where inputs go once they reach the harness.
pub enum Target {
    Local(FaultDispatcher),
    /// Forwarding mode. `None` means initialization never bound an entry point.
    Forward(Option<Box<dyn EntryModule>>),
}

/// Harness state. Written once by [`Harness::initialize`], read by every
/// [`Harness::test_one_input`] call after that.
pub struct Harness {
    options: InitOptions,
    target: Target,
}

impl Harness {
    /// Parses the recognized flags, writes the marker file if asked to, and
    /// binds the entry point for the forwarding modes.
    ///
    /// Any error leaves no harness behind; callers must terminate rather than
    /// run inputs against a half-initialized target.
    pub fn initialize<I, S>(
        args: I,
        config: &HarnessConfig,
        linked: &LinkedEntries,
    ) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        config.validate()?;
        let options = InitOptions::parse(args);
        options.write_marker()?;

        let target = match config.target.mode {
            TargetMode::Local => Target::Local(
                FaultDispatcher::new(config.gate.clone())
                    .with_abort_suppressed(options.only_asan_failures),
            ),
            TargetMode::Dynamic | TargetMode::Linked => {
                if config.gate != GateConfig::default() {
                    tracing::warn!("[gate] applies to local mode only; the module keeps its own gate");
                }
                Target::Forward(Some(module::resolve(&config.target, linked)?))
            }
        };

        tracing::info!(
            mode = ?config.target.mode,
            only_asan_failures = options.only_asan_failures,
            "harness initialized"
        );
        Ok(Self { options, target })
    }

    /// State for a driver that never called `Initialize`.
    ///
    /// Local mode works with default options. Forwarding modes stay unbound and
    /// the first input hits the unbound-entry assertion.
    pub fn uninitialized(config: &HarnessConfig) -> Self {
        let target = match config.target.mode {
            TargetMode::Local => Target::Local(FaultDispatcher::new(config.gate.clone())),
            TargetMode::Dynamic | TargetMode::Linked => Target::Forward(None),
        };
        Self {
            options: InitOptions::default(),
            target,
        }
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Runs one input and returns its status.
    ///
    /// # Panics
    ///
    /// In forwarding mode without a bound entry point. That state means
    /// `Initialize` was skipped or its failure ignored.
    pub fn test_one_input(&self, data: &[u8]) -> i32 {
        match &self.target {
            Target::Local(dispatcher) => dispatcher.dispatch(data),
            Target::Forward(Some(entry)) => entry.invoke(data),
            Target::Forward(None) => {
                panic!("entry point is not bound; Initialize was skipped or failed")
            }
        }
    }
}
