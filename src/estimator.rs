//! Composite `sysload` estimation.
//!
//! The estimator first attributes software-interrupt load to the busiest
//! interrupted network device, then folds disk utilisation, aggregate CPU
//! usage and (gated) interrupt CPU usage into a single percentage.

use std::sync::Arc;
use tracing::debug;

use crate::delta::DerivedSample;
use crate::sampler::{mode_key, CpuMode, ALL_CPU_PREFIX};
use crate::topology::TopologyConfig;

/// Prefix of the per-mode percentages copied from the busiest device.
pub const SI_CPU_PREFIX: &str = "si_cpu";
/// Key of the composite value.
pub const SYSLOAD: &str = "sysload";

const IO_UTIL_SUFFIX: &str = "_io_util";

/// Picks the device with the highest softirq percentage.
///
/// Devices are visited in the order given; a later device must be strictly
/// busier to win, so ties go to the first one. Devices without a derived
/// `sintr` value are ignored.
pub fn busiest_device<'a, I>(sample: &DerivedSample, devices: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut busiest: Option<(&'a str, f64)> = None;
    for device in devices {
        let Some(sintr) = sample.get(&mode_key(device, CpuMode::Sintr)) else {
            continue;
        };
        match busiest {
            Some((_, max)) if sintr <= max => {}
            _ => busiest = Some((device, sintr)),
        }
    }
    busiest.map(|(device, _)| device)
}

/// Copies `device`'s mode percentages into the `si_cpu_*` keys.
pub fn attribute_softirq(sample: &mut DerivedSample, device: &str) {
    for mode in CpuMode::ALL {
        if let Some(value) = sample.get(&mode_key(device, mode)) {
            sample.insert(mode_key(SI_CPU_PREFIX, mode), value);
        }
    }
}

/// Maximum of the gated load signals in `sample`, clamped to `[0, 100]`.
pub fn calc_sysload(sample: &DerivedSample, threshold: f64) -> f64 {
    let mut sysload: f64 = 0.0;

    for (key, value) in sample.iter() {
        if key.ends_with(IO_UTIL_SUFFIX) {
            sysload = sysload.max(value);
        }
    }

    if let Some(idle) = sample.get(&mode_key(ALL_CPU_PREFIX, CpuMode::Idle)) {
        sysload = sysload.max(100.0 - idle);
    }

    if let Some(idle) = sample.get(&mode_key(SI_CPU_PREFIX, CpuMode::Idle)) {
        let interrupt_time: f64 = [CpuMode::Intr, CpuMode::Sintr, CpuMode::System]
            .into_iter()
            .filter_map(|mode| sample.get(&mode_key(SI_CPU_PREFIX, mode)))
            .sum();
        if interrupt_time > threshold {
            sysload = sysload.max(100.0 - idle);
        }
    }

    sysload.clamp(0.0, 100.0)
}

/// Turns a derived sample into the composite `sysload`.
#[derive(Debug, Clone)]
pub struct SysloadEstimator {
    topology: Arc<TopologyConfig>,
}

impl SysloadEstimator {
    pub fn new(topology: Arc<TopologyConfig>) -> Self {
        Self { topology }
    }

    /// Adds the `si_cpu_*` and `sysload` keys to `sample` and returns `sysload`.
    pub fn estimate(&self, sample: &mut DerivedSample) -> f64 {
        if let Some(device) = busiest_device(sample, self.topology.interrupted_devices()) {
            debug!("Busiest interrupted device: {}", device);
            attribute_softirq(sample, device);
        }
        let sysload = calc_sysload(sample, self.topology.threshold);
        sample.insert(SYSLOAD, sysload);
        sysload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sample(pairs: &[(&str, f64)]) -> DerivedSample {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn topology(devices: &[&str]) -> TopologyConfig {
        TopologyConfig {
            proc_root: PathBuf::from("/proc"),
            block_devices: Default::default(),
            net_devices: devices.iter().map(|d| d.to_string()).collect(),
            interrupt_groups: devices
                .iter()
                .map(|d| (d.to_string(), vec!["0".to_string()]))
                .collect::<BTreeMap<_, _>>(),
            cpu_count: 1,
            threshold: 40.0,
            refresh_interval: 15,
        }
    }

    #[test]
    fn test_calc_sysload_cpu_only() {
        assert_eq!(calc_sysload(&sample(&[("all_cpu_idle", 80.0)]), 40.0), 20.0);
    }

    #[test]
    fn test_calc_sysload_io_dominates() {
        let s = sample(&[("dev1_io_util", 55.0), ("all_cpu_idle", 90.0)]);
        assert_eq!(calc_sysload(&s, 40.0), 55.0);
    }

    #[test]
    fn test_calc_sysload_si_below_threshold_ignored() {
        let s = sample(&[
            ("si_cpu_idle", 30.0),
            ("si_cpu_intr", 5.0),
            ("si_cpu_sintr", 3.0),
            ("si_cpu_system", 2.0),
        ]);
        assert_eq!(calc_sysload(&s, 40.0), 0.0);
    }

    #[test]
    fn test_calc_sysload_si_above_threshold_counts() {
        let s = sample(&[
            ("all_cpu_idle", 90.0),
            ("si_cpu_idle", 30.0),
            ("si_cpu_intr", 10.0),
            ("si_cpu_sintr", 25.0),
            ("si_cpu_system", 10.0),
        ]);
        assert_eq!(calc_sysload(&s, 40.0), 70.0);
        // Same input, stricter gate.
        assert_eq!(calc_sysload(&s, 45.0), 10.0);
    }

    #[test]
    fn test_calc_sysload_empty_is_zero() {
        assert_eq!(calc_sysload(&DerivedSample::new(), 40.0), 0.0);
    }

    #[test]
    fn test_busiest_device_picks_max_sintr() {
        let s = sample(&[("eth0_sintr", 10.0), ("eth1_sintr", 30.0), ("eth2_sintr", 20.0)]);
        assert_eq!(busiest_device(&s, ["eth0", "eth1", "eth2"]), Some("eth1"));
    }

    #[test]
    fn test_busiest_device_tie_goes_to_first() {
        let s = sample(&[("eth0_sintr", 30.0), ("eth1_sintr", 30.0)]);
        assert_eq!(busiest_device(&s, ["eth0", "eth1"]), Some("eth0"));
        assert_eq!(busiest_device(&s, ["eth1", "eth0"]), Some("eth1"));
    }

    #[test]
    fn test_busiest_device_all_zero_still_selected() {
        let s = sample(&[("eth0_sintr", 0.0)]);
        assert_eq!(busiest_device(&s, ["eth0"]), Some("eth0"));
        assert_eq!(busiest_device(&s, ["eth9"]), None);
    }

    #[test]
    fn test_estimate_attributes_and_inserts_sysload() {
        let estimator = SysloadEstimator::new(Arc::new(topology(&["eth0", "eth1"])));
        let mut s = sample(&[
            ("all_cpu_idle", 95.0),
            ("eth0_sintr", 5.0),
            ("eth0_idle", 90.0),
            ("eth1_sintr", 40.0),
            ("eth1_intr", 5.0),
            ("eth1_system", 5.0),
            ("eth1_idle", 20.0),
            ("eth1_user", 30.0),
        ]);

        let sysload = estimator.estimate(&mut s);

        assert_eq!(sysload, 80.0);
        assert_eq!(s.get(SYSLOAD), Some(80.0));
        assert_eq!(s.get("si_cpu_sintr"), Some(40.0));
        assert_eq!(s.get("si_cpu_user"), Some(30.0));
        assert_eq!(s.get("si_cpu_idle"), Some(20.0));
        assert!(!s.contains("si_cpu_nice"));
    }
}
