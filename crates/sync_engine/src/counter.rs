//! Trigger counter model
//!
//! Hardware trigger counters are `counter_bits` wide and wrap. A channel's
//! logical trigger number is `offset + raw`, where `offset` is a multiple
//! of the modulus that grows by one modulus per detected wraparound.
//!
//! Some hardware families misreport their counter in known ways; the
//! [`QuirkRegistry`] maps a family label to the correction applied.

use std::collections::HashMap;

use contracts::{AnomalyKind, QuirkConfig, QuirkPolicy, SyncEngineConfig};

/// Modular counter arithmetic parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterModel {
    modulus: u64,
    wrap_tolerance: u64,
    zero_glitch_tolerance: u64,
}

impl CounterModel {
    pub fn new(counter_bits: u32, wrap_tolerance: u64, zero_glitch_tolerance: u64) -> Self {
        Self {
            modulus: 1u64 << counter_bits,
            wrap_tolerance,
            zero_glitch_tolerance,
        }
    }

    pub fn from_config(config: &SyncEngineConfig) -> Self {
        Self::new(
            config.counter_bits,
            config.wrap_tolerance,
            config.zero_glitch_tolerance,
        )
    }

    #[inline]
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// A backward step of at least `modulus - wrap_tolerance` is a wraparound
    #[inline]
    pub fn is_wraparound(&self, previous: u64, candidate: u64) -> bool {
        previous >= candidate
            && previous - candidate >= self.modulus.saturating_sub(self.wrap_tolerance)
    }

    /// Estimate sits within `wrap_tolerance` below a modulus boundary
    #[inline]
    fn near_boundary(&self, estimate: u64) -> bool {
        estimate % self.modulus >= self.modulus.saturating_sub(self.wrap_tolerance)
    }
}

/// Correction applied to one family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyQuirk {
    pub policy: QuirkPolicy,
    /// Bitmask applied to the raw counter before anything else
    pub mask: Option<u64>,
}

impl FamilyQuirk {
    /// Raw counter after masking
    #[inline]
    pub fn raw_trigger(&self, trigger_id: u32) -> u64 {
        let raw = u64::from(trigger_id);
        match self.mask {
            Some(mask) => raw & mask,
            None => raw,
        }
    }
}

/// Family label to correction policy
#[derive(Debug, Clone, Default)]
pub struct QuirkRegistry {
    families: HashMap<String, FamilyQuirk>,
}

impl QuirkRegistry {
    pub fn from_config(quirks: &[QuirkConfig]) -> Self {
        let families = quirks
            .iter()
            .map(|q| {
                let quirk = FamilyQuirk {
                    policy: q.policy,
                    mask: q.mask_bits.map(|bits| (1u64 << bits.min(32)) - 1),
                };
                (q.family.clone(), quirk)
            })
            .collect();
        Self { families }
    }

    /// Correction for a family; unknown families get none
    pub fn lookup(&self, family: &str) -> FamilyQuirk {
        self.families.get(family).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

/// Result of estimating one front sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    /// `None` only when a channel's very first front is unusable
    pub estimate: Option<u64>,
    pub offset: u64,
    pub desynchronized: bool,
    /// Fault that forced the estimate, if any
    pub anomaly: Option<AnomalyKind>,
    /// Offset grew by one modulus
    pub wrapped: bool,
}

/// Estimate the logical trigger number of a channel's new front
///
/// `previous` is the channel's last estimate, `None` before the first one.
/// Checks run in priority order: high counter, single skip, zero glitch,
/// then the normal path with wraparound detection.
pub fn apply_quirk(
    model: &CounterModel,
    policy: QuirkPolicy,
    raw: u64,
    previous: Option<u64>,
    offset: u64,
    is_reference: bool,
) -> CounterUpdate {
    let m = model.modulus;

    // A value above the modulus is never a counter, first front or not
    if !is_reference && raw > m {
        return CounterUpdate {
            estimate: previous,
            offset,
            desynchronized: true,
            anomaly: Some(AnomalyKind::HighCounter),
            wrapped: false,
        };
    }

    if let Some(prev) = previous {
        match policy {
            QuirkPolicy::SingleSkip if raw != (prev + 1) % m => {
                return forced_step(model, prev, offset, AnomalyKind::SingleSkip);
            }
            QuirkPolicy::ZeroGlitch => {
                let candidate = offset + raw;
                if candidate.abs_diff(prev) > model.zero_glitch_tolerance
                    && !model.near_boundary(prev)
                {
                    return forced_step(model, prev, offset, AnomalyKind::ZeroGlitch);
                }
            }
            _ => {}
        }
    }

    let mut update = CounterUpdate {
        estimate: Some(offset + raw),
        offset,
        desynchronized: false,
        anomaly: None,
        wrapped: false,
    };

    if let (Some(prev), Some(estimate)) = (previous, update.estimate) {
        if model.is_wraparound(prev, estimate) {
            update.offset += m;
            update.estimate = Some(estimate + m);
            update.wrapped = true;
        }
    }

    update
}

/// Force the estimate one past the previous one
fn forced_step(model: &CounterModel, prev: u64, offset: u64, kind: AnomalyKind) -> CounterUpdate {
    let estimate = prev + 1;
    let floor = estimate - estimate % model.modulus;
    CounterUpdate {
        estimate: Some(estimate),
        offset: offset.max(floor),
        desynchronized: true,
        anomaly: Some(kind),
        wrapped: floor > offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CounterModel {
        CounterModel::new(15, 20, 10)
    }

    fn normal(raw: u64, previous: Option<u64>, offset: u64) -> CounterUpdate {
        apply_quirk(&model(), QuirkPolicy::None, raw, previous, offset, false)
    }

    #[test]
    fn test_first_estimate_is_raw() {
        let update = normal(5, None, 0);
        assert_eq!(update.estimate, Some(5));
        assert!(!update.desynchronized);
        assert_eq!(update.anomaly, None);
    }

    #[test]
    fn test_wraparound_sequence() {
        let mut previous = None;
        let mut offset = 0;
        let mut estimates = Vec::new();
        for raw in [32766, 32767, 0, 1] {
            let update = normal(raw, previous, offset);
            previous = update.estimate;
            offset = update.offset;
            estimates.extend(update.estimate);
        }
        assert_eq!(estimates, vec![32766, 32767, 32768, 32769]);
        assert_eq!(offset, 32768);
    }

    #[test]
    fn test_backward_jump_of_32760_wraps_once() {
        let update = normal(0, Some(32760), 0);
        assert!(update.wrapped);
        assert_eq!(update.estimate, Some(32760 + 8));
        assert_eq!(update.offset, 32768);
    }

    #[test]
    fn test_small_backward_jump_is_not_a_wrap() {
        let update = normal(100, Some(200), 0);
        assert!(!update.wrapped);
        assert_eq!(update.estimate, Some(100));
        assert_eq!(update.offset, 0);
    }

    #[test]
    fn test_high_counter_keeps_previous() {
        let update = normal(32769 + 7, Some(6), 0);
        assert_eq!(update.estimate, Some(6));
        assert!(update.desynchronized);
        assert_eq!(update.anomaly, Some(AnomalyKind::HighCounter));
    }

    #[test]
    fn test_high_counter_on_first_front() {
        let update = normal(32770, None, 0);
        assert_eq!(update.estimate, None);
        assert!(update.desynchronized);
        assert_eq!(update.anomaly, Some(AnomalyKind::HighCounter));
        assert!(!update.wrapped);
    }

    #[test]
    fn test_wrap_check_with_oversized_tolerance() {
        let tiny = CounterModel::new(4, 20, 10);
        let update = apply_quirk(&tiny, QuirkPolicy::None, 1, Some(15), 0, false);
        assert!(update.wrapped);
        assert_eq!(update.estimate, Some(17));
    }

    #[test]
    fn test_high_counter_ignored_for_reference() {
        let update = apply_quirk(&model(), QuirkPolicy::None, 40000, Some(6), 0, true);
        assert_eq!(update.estimate, Some(40000));
        assert!(!update.desynchronized);
    }

    #[test]
    fn test_single_skip_forces_next() {
        let update = apply_quirk(&model(), QuirkPolicy::SingleSkip, 30, Some(30), 0, false);
        assert_eq!(update.estimate, Some(31));
        assert!(update.desynchronized);
        assert_eq!(update.anomaly, Some(AnomalyKind::SingleSkip));

        let ok = apply_quirk(&model(), QuirkPolicy::SingleSkip, 32, Some(31), 0, false);
        assert_eq!(ok.estimate, Some(32));
        assert!(!ok.desynchronized);
    }

    #[test]
    fn test_single_skip_across_boundary() {
        // stale counter right at the wrap still advances the offset
        let update = apply_quirk(&model(), QuirkPolicy::SingleSkip, 32767, Some(32767), 0, false);
        assert_eq!(update.estimate, Some(32768));
        assert_eq!(update.offset, 32768);
        assert!(update.wrapped);

        let next = apply_quirk(&model(), QuirkPolicy::SingleSkip, 1, Some(32768), 32768, false);
        assert_eq!(next.estimate, Some(32769));
        assert!(!next.desynchronized);
    }

    #[test]
    fn test_single_skip_accepts_wrap() {
        let update = apply_quirk(&model(), QuirkPolicy::SingleSkip, 0, Some(32767), 0, false);
        assert_eq!(update.estimate, Some(32768));
        assert!(update.wrapped);
        assert!(!update.desynchronized);
    }

    #[test]
    fn test_zero_glitch_forced() {
        let update = apply_quirk(&model(), QuirkPolicy::ZeroGlitch, 0, Some(500), 0, false);
        assert_eq!(update.estimate, Some(501));
        assert!(update.desynchronized);
        assert_eq!(update.anomaly, Some(AnomalyKind::ZeroGlitch));
    }

    #[test]
    fn test_zero_glitch_small_step_and_boundary() {
        let small = apply_quirk(&model(), QuirkPolicy::ZeroGlitch, 505, Some(500), 0, false);
        assert_eq!(small.estimate, Some(505));
        assert!(!small.desynchronized);

        // near the boundary a drop to zero is a genuine wrap
        let wrap = apply_quirk(&model(), QuirkPolicy::ZeroGlitch, 0, Some(32767), 0, false);
        assert_eq!(wrap.estimate, Some(32768));
        assert!(wrap.wrapped);
        assert!(!wrap.desynchronized);
    }

    #[test]
    fn test_pure_function_is_deterministic() {
        let a = normal(42, Some(41), 0);
        let b = normal(42, Some(41), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_registry_mask() {
        let registry = QuirkRegistry::from_config(&SyncEngineConfig::default().quirks);
        let pybar = registry.lookup("PyBAR");
        assert_eq!(pybar.raw_trigger(0x00AB_0005), 5);
        assert_eq!(registry.lookup("NI").policy, QuirkPolicy::SingleSkip);
        assert_eq!(registry.lookup("unknown"), FamilyQuirk::default());
        assert_eq!(registry.len(), 3);
    }
}
