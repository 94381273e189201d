use crate::fault::FaultKind;
use crate::gate::{GateConfig, GateOutcome};

/// Inspects an input and, when the gate is satisfied, runs the selected fault.
///
/// The dispatcher holds only configuration. Each call starts from the scanning
/// state, so a partial match in one input never carries over to the next.
#[derive(Debug, Clone, Default)]
pub struct FaultDispatcher {
    gate: GateConfig,
    suppress_abort: bool,
}

impl FaultDispatcher {
    pub fn new(gate: GateConfig) -> Self {
        Self {
            gate,
            suppress_abort: false,
        }
    }

    /// Turns [`FaultKind::Abort`] into a no-op, leaving every other kind active.
    pub fn with_abort_suppressed(mut self, suppress_abort: bool) -> Self {
        self.suppress_abort = suppress_abort;
        self
    }

    pub fn gate(&self) -> &GateConfig {
        &self.gate
    }

    pub fn abort_suppressed(&self) -> bool {
        self.suppress_abort
    }

    /// The fault `data` would trigger, without triggering it.
    pub fn plan(&self, data: &[u8]) -> Option<FaultKind> {
        let GateOutcome::Triggered { selector } = self.gate.evaluate(data) else {
            return None;
        };
        let kind = FaultKind::from_selector(selector)?;
        if self.suppress_abort && !kind.is_sanitizer_class() {
            return None;
        }
        Some(kind)
    }

    /// Runs one input. Returns 0 unless the process dies first.
    pub fn dispatch(&self, data: &[u8]) -> i32 {
        if let Some(kind) = self.plan(data) {
            tracing::debug!(fault = kind.label(), selector = kind.selector(), "gate satisfied");
            kind.trigger();
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateCheck;
    use rand::{Rng, RngCore};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn maps_every_selector_once_gate_is_open() {
        let dispatcher = FaultDispatcher::default();
        for kind in FaultKind::ALL {
            let input = [b'x', b'y', b'z', kind.selector()];
            assert_eq!(dispatcher.plan(&input), Some(kind));
        }
        assert_eq!(dispatcher.plan(b"xyz\x00"), Some(FaultKind::NullWrite));
    }

    #[test]
    fn near_miss_is_benign() {
        let dispatcher = FaultDispatcher::default();
        assert_eq!(dispatcher.plan(b"xya\x00"), None);
        assert_eq!(dispatcher.dispatch(b"xya\x00"), 0);
    }

    #[test]
    fn unknown_selector_is_a_no_op() {
        let dispatcher = FaultDispatcher::default();
        for selector in 9..=u8::MAX {
            let input = [b'x', b'y', b'z', selector];
            assert_eq!(dispatcher.plan(&input), None);
            assert_eq!(dispatcher.dispatch(&input), 0);
        }
    }

    #[test]
    fn trailing_bytes_do_not_matter() {
        let dispatcher = FaultDispatcher::default();
        assert_eq!(
            dispatcher.plan(b"xyz\x04trailing garbage"),
            Some(FaultKind::DoubleFree)
        );
    }

    #[test]
    fn suppressed_abort_leaves_other_kinds_active() {
        let dispatcher = FaultDispatcher::default().with_abort_suppressed(true);
        assert_eq!(dispatcher.plan(b"xyz\x08"), None);
        assert_eq!(dispatcher.dispatch(b"xyz\x08"), 0);
        for selector in 0..8u8 {
            let input = [b'x', b'y', b'z', selector];
            assert!(dispatcher.plan(&input).is_some(), "selector {selector}");
        }
    }

    #[test]
    fn random_short_inputs_never_plan_a_fault() {
        let dispatcher = FaultDispatcher::default();
        let mut rng = ChaCha8Rng::from_seed([7u8; 32]);
        for _ in 0..10_000 {
            let len = rng.random_range(0..dispatcher.gate().min_len());
            let mut input = vec![0u8; len];
            rng.fill_bytes(&mut input);
            assert_eq!(dispatcher.plan(&input), None, "input {input:?}");
            assert_eq!(dispatcher.dispatch(&input), 0);
        }
    }

    #[test]
    fn random_inputs_with_a_broken_gate_never_plan_a_fault() {
        let dispatcher = FaultDispatcher::default();
        let checks = dispatcher.gate().checks.clone();
        let mut rng = ChaCha8Rng::from_seed([42u8; 32]);
        for _ in 0..10_000 {
            let len = rng.random_range(4..64);
            let mut input = vec![0u8; len];
            rng.fill_bytes(&mut input);
            for check in &checks {
                input[check.offset] = check.expected;
            }
            let broken = checks[rng.random_range(0..checks.len())];
            let mut wrong = rng.random::<u8>();
            if wrong == broken.expected {
                wrong = wrong.wrapping_add(1);
            }
            input[broken.offset] = wrong;
            assert_eq!(dispatcher.plan(&input), None, "input {input:?}");
        }
    }

    #[test]
    fn configured_gate_replaces_xyz() {
        let gate = GateConfig {
            checks: vec![GateCheck::new(0, b'B'), GateCheck::new(1, b'A')],
            threshold: None,
            selector_offset: 2,
        };
        let dispatcher = FaultDispatcher::new(gate);
        assert_eq!(dispatcher.plan(b"BA\x03"), Some(FaultKind::InvalidFree));
        assert_eq!(dispatcher.plan(b"xyz\x03"), None);
        assert_eq!(dispatcher.plan(b"BA"), None);
    }
}
