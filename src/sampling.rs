//! Every-Nth-call sampling for expensive side effects.

use std::num::NonZeroU64;

/// Counter deciding whether to act on a given call.
///
/// Each call to [`should_act`](Self::should_act) counts once; the gate
/// opens on calls `N`, `2N`, `3N`, ... for period `N`. A period of 1 opens
/// on every call. Independent policies (e.g. "log every Nth message" and
/// "track every Nth detection") use independent gates.
///
/// # Example
///
/// ```rust
/// use std::num::NonZeroU64;
/// use tracksync::sampling::SamplingGate;
///
/// let every_third = NonZeroU64::new(3).unwrap();
/// let mut gate = SamplingGate::new();
///
/// let opened: Vec<bool> = (0..6).map(|_| gate.should_act(every_third)).collect();
/// assert_eq!(opened, [false, false, true, false, false, true]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SamplingGate {
    calls: u64,
}

impl SamplingGate {
    /// Create a gate that has not been called yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call and report whether the gate opens for it.
    pub fn should_act(&mut self, period: NonZeroU64) -> bool {
        self.calls += 1;
        self.calls % period.get() == 0
    }

    /// Number of calls counted so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn period(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn test_period_one_always_acts() {
        let mut gate = SamplingGate::new();
        assert!((0..10).all(|_| gate.should_act(period(1))));
        assert_eq!(gate.calls(), 10);
    }

    #[test]
    fn test_every_fourth_of_ten() {
        let mut gate = SamplingGate::new();
        let acted: Vec<u64> = (1..=10).filter(|_| gate.should_act(period(4))).collect();
        assert_eq!(acted, vec![4, 8]);
    }

    #[test]
    fn test_independent_gates() {
        let mut log_gate = SamplingGate::new();
        let mut track_gate = SamplingGate::new();

        assert!(!log_gate.should_act(period(2)));
        assert!(track_gate.should_act(period(1)));
        assert!(log_gate.should_act(period(2)));
        assert_eq!(track_gate.calls(), 1);
    }

    proptest! {
        #[test]
        fn prop_acts_exactly_on_multiples(n in 1u64..64, calls in 0u64..512) {
            let mut gate = SamplingGate::new();
            let acted: Vec<u64> = (1..=calls).filter(|_| gate.should_act(period(n))).collect();
            let expected: Vec<u64> = (1..=calls).filter(|k| k % n == 0).collect();
            prop_assert_eq!(acted, expected);
            prop_assert_eq!(gate.calls(), calls);
        }
    }
}
