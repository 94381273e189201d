//! Construction of inputs with a known gate outcome.

use crate::gate::GateConfig;

/// Shortest input that satisfies `gate` and carries `selector`.
pub fn trigger_input(gate: &GateConfig, selector: u8) -> Vec<u8> {
    let mut input = vec![0u8; gate.min_len()];
    for check in &gate.checks {
        input[check.offset] = check.expected;
    }
    input[gate.selector_offset] = selector;
    input
}

/// Like [`trigger_input`], but with just enough gate bytes flipped that the
/// threshold is missed by one.
pub fn near_miss_input(gate: &GateConfig, selector: u8) -> Vec<u8> {
    let mut input = trigger_input(gate, selector);
    let to_break = gate.checks.len() + 1 - gate.required_matches().min(gate.checks.len());
    for check in gate.checks.iter().take(to_break) {
        input[check.offset] = check.expected.wrapping_add(1);
    }
    input
}

/// Input one byte shorter than the gate needs.
pub fn short_input(gate: &GateConfig) -> Vec<u8> {
    let mut input = trigger_input(gate, 0);
    input.pop();
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateCheck, GateOutcome};

    #[test]
    fn default_gate_inputs() {
        let gate = GateConfig::default();
        assert_eq!(trigger_input(&gate, 5), b"xyz\x05");
        assert_eq!(near_miss_input(&gate, 5), b"yyz\x05");
        assert_eq!(short_input(&gate), b"xyz");
    }

    #[test]
    fn outcomes_match_their_names() {
        let gate = GateConfig {
            checks: vec![
                GateCheck::new(0, b'F'),
                GateCheck::new(2, b'U'),
                GateCheck::new(5, b'Z'),
            ],
            threshold: Some(2),
            selector_offset: 1,
        };
        assert_eq!(
            gate.evaluate(&trigger_input(&gate, 3)),
            GateOutcome::Triggered { selector: 3 }
        );
        assert_eq!(
            gate.evaluate(&near_miss_input(&gate, 3)),
            GateOutcome::Scanning { matched: 1 }
        );
        assert_eq!(gate.evaluate(&short_input(&gate)), GateOutcome::TooShort);
    }
}
