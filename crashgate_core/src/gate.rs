//! Fixed-byte gate that guards fault injection.
//!
//! A gate is a set of `(offset, expected)` checks plus a selector offset. An input
//! triggers the gate only when enough checks match exactly; otherwise the dispatcher
//! stays in the scanning state and the input is treated as benign.

use crate::error::HarnessError;
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

/// One fixed-byte comparison.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GateCheck {
    pub offset: usize,
    #[serde(deserialize_with = "byte_literal")]
    pub expected: u8,
}

impl GateCheck {
    pub const fn new(offset: usize, expected: u8) -> Self {
        Self { offset, expected }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteLiteral {
    Int(u8),
    Text(String),
}

/// Accepts either `120` or `"x"` for an expected byte.
fn byte_literal<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    match ByteLiteral::deserialize(deserializer)? {
        ByteLiteral::Int(byte) => Ok(byte),
        ByteLiteral::Text(text) => match text.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(D::Error::custom(format!(
                "expected a single byte, got {text:?}"
            ))),
        },
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    #[serde(default = "default_checks")]
    pub checks: Vec<GateCheck>,
    /// Matches required to trigger. Unset means every check must match.
    #[serde(default)]
    pub threshold: Option<usize>,
    #[serde(default = "default_selector_offset")]
    pub selector_offset: usize,
}

pub fn default_checks() -> Vec<GateCheck> {
    vec![
        GateCheck::new(0, b'x'),
        GateCheck::new(1, b'y'),
        GateCheck::new(2, b'z'),
    ]
}

pub fn default_selector_offset() -> usize {
    3
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            checks: default_checks(),
            threshold: None,
            selector_offset: default_selector_offset(),
        }
    }
}

/// Result of evaluating one input against a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Input is shorter than [`GateConfig::min_len`]; no byte was inspected.
    TooShort,
    /// Not enough checks matched.
    Scanning { matched: usize },
    /// Gate satisfied; carries the selector byte.
    Triggered { selector: u8 },
}

impl GateConfig {
    pub fn required_matches(&self) -> usize {
        self.threshold.unwrap_or(self.checks.len())
    }

    /// Shortest input for which every check and the selector are in bounds.
    pub fn min_len(&self) -> usize {
        self.checks
            .iter()
            .map(|check| check.offset)
            .chain(std::iter::once(self.selector_offset))
            .max()
            .map_or(0, |offset| offset + 1)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.checks.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "gate needs at least one check".to_string(),
            ));
        }
        let required = self.required_matches();
        if required == 0 || required > self.checks.len() {
            return Err(HarnessError::InvalidConfig(format!(
                "gate threshold {required} must be between 1 and {}",
                self.checks.len()
            )));
        }
        for (index, check) in self.checks.iter().enumerate() {
            if check.offset == self.selector_offset {
                return Err(HarnessError::InvalidConfig(format!(
                    "gate check at offset {} overlaps the selector",
                    check.offset
                )));
            }
            if self.checks[..index]
                .iter()
                .any(|earlier| earlier.offset == check.offset)
            {
                return Err(HarnessError::InvalidConfig(format!(
                    "gate checks offset {} more than once",
                    check.offset
                )));
            }
        }
        Ok(())
    }

    /// Evaluates `data` from a fresh scanning state. Nothing is remembered
    /// between calls.
    pub fn evaluate(&self, data: &[u8]) -> GateOutcome {
        if data.len() < self.min_len() {
            return GateOutcome::TooShort;
        }

        let matched = self
            .checks
            .iter()
            .filter(|check| data.get(check.offset) == Some(&check.expected))
            .count();
        if matched < self.required_matches() {
            return GateOutcome::Scanning { matched };
        }

        match data.get(self.selector_offset) {
            Some(&selector) => GateOutcome::Triggered { selector },
            None => GateOutcome::TooShort,
        }
    }
}
