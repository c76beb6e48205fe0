//! Counter deltas, wraparound correction and rate/percentage conversion.

use std::collections::BTreeMap;
use tracing::debug;

use crate::sampler::{
    io_util_key, mode_key, total_key, CounterSnapshot, CpuMode, ALL_CPU_PREFIX, PROC_CTXT,
    PROC_INTR,
};
use crate::topology::TopologyConfig;

/// Largest delta accepted for a single tick (`2^32 - 1`).
pub const COUNTER_CEILING: u64 = u32::MAX as u64;

const WRAP_32: i128 = 1 << 32;
const WRAP_64: i128 = 1 << 64;

/// Signed difference between two counter readings.
pub fn raw_delta(previous: u64, current: u64) -> i128 {
    current as i128 - previous as i128
}

/// Corrects a raw counter delta for wraparound.
///
/// Counters are assumed to be effectively 32 bits wide. Deltas above the
/// 32-bit ceiling are clamped, negative deltas are unwrapped at 2^32 or, when
/// the result lands back in 32-bit range, at 2^64. Anything else is clamped
/// to the ceiling. If the kernel ever exports genuinely 64-bit counters that
/// move more than 2^32 per tick this will under-report them.
pub fn counter_wrap(raw: i128) -> u64 {
    let ceiling = COUNTER_CEILING as i128;
    if raw > ceiling {
        return COUNTER_CEILING;
    }
    if raw >= 0 {
        return raw as u64;
    }
    if raw + WRAP_32 >= 0 {
        return (raw + WRAP_32) as u64;
    }
    let wrapped = raw + WRAP_64;
    if (0..=ceiling).contains(&wrapped) {
        wrapped as u64
    } else {
        COUNTER_CEILING
    }
}

/// I/O-busy percentage from busy milliseconds over the elapsed wall time.
pub fn io_util_percent(busy_ticks: u64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    (busy_ticks as f64 / elapsed_ms as f64 * 100.0).min(100.0)
}

/// Share of `total` jiffies spent in one mode, in percent.
///
/// Takes signed raw deltas: zero when either side is non-positive, so a
/// counter reset yields 0 rather than a wrapped spike. Capped at 100.
pub fn cpu_percent(mode_delta: i128, total_delta: i128) -> f64 {
    if mode_delta <= 0 || total_delta <= 0 {
        return 0.0;
    }
    (mode_delta as f64 / total_delta as f64 * 100.0).min(100.0)
}

/// Events per second.
pub fn rate_per_second(delta: u64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    delta as f64 / (elapsed_ms as f64 / 1000.0)
}

/// Instantaneous rates and percentages for one tick, keyed like the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSample {
    values: BTreeMap<String, f64>,
}

impl DerivedSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for DerivedSample {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Signed delta of `key`, if both snapshots carry it.
fn signed(previous: &CounterSnapshot, current: &CounterSnapshot, key: &str) -> Option<i128> {
    Some(raw_delta(previous.get(key)?, current.get(key)?))
}

/// Wrap-corrected delta of `key`, if both snapshots carry it.
fn corrected(previous: &CounterSnapshot, current: &CounterSnapshot, key: &str) -> Option<u64> {
    signed(previous, current, key).map(counter_wrap)
}

fn derive_cpu_group(
    previous: &CounterSnapshot,
    current: &CounterSnapshot,
    prefix: &str,
    out: &mut DerivedSample,
) {
    let Some(total) = signed(previous, current, &total_key(prefix)) else {
        return;
    };
    for mode in CpuMode::ALL {
        let key = mode_key(prefix, mode);
        if let Some(delta) = signed(previous, current, &key) {
            out.insert(key, cpu_percent(delta, total));
        }
    }
}

/// Converts a snapshot pair into a [`DerivedSample`].
///
/// Returns `None` when the clock did not move forward between the two
/// snapshots. Keys missing from either snapshot are left out.
pub fn derive(
    previous: &CounterSnapshot,
    current: &CounterSnapshot,
    topology: &TopologyConfig,
) -> Option<DerivedSample> {
    let elapsed_ms = (current.taken_at() - previous.taken_at()).num_milliseconds();
    if elapsed_ms <= 0 {
        debug!("Skipping derivation, elapsed time is {} ms", elapsed_ms);
        return None;
    }

    let mut out = DerivedSample::new();

    for device in &topology.block_devices {
        let key = io_util_key(device);
        if let Some(delta) = corrected(previous, current, &key) {
            out.insert(key, io_util_percent(delta, elapsed_ms));
        }
    }

    derive_cpu_group(previous, current, ALL_CPU_PREFIX, &mut out);
    for device in topology.interrupted_devices() {
        derive_cpu_group(previous, current, device, &mut out);
    }

    for key in [PROC_CTXT, PROC_INTR] {
        if let Some(delta) = corrected(previous, current, key) {
            out.insert(key, rate_per_second(delta, elapsed_ms));
        }
    }

    Some(out)
}
