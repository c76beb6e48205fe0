//! One-shot topology discovery.
//!
//! Determines which block devices to track, how many CPUs the machine has
//! and which CPUs service the interrupts of each configured network device.
//! The result is a [`TopologyConfig`] that is built once at startup and then
//! shared read-only (behind an `Arc`) by every component.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::SysloadError;
use crate::probe::{count_processors, BlockDeviceProbe, InterruptProbe, DEFAULT_IRQ_EXCLUDE};
use crate::source::{ProcSource, DEFAULT_PROC_ROOT};

/// Default refresh interval in seconds.
pub const DEFAULT_REFRESH_INTERVAL: u64 = 15;
/// Smallest accepted refresh interval in seconds.
pub const MIN_REFRESH_INTERVAL: u64 = 1;
/// Largest accepted refresh interval in seconds.
pub const MAX_REFRESH_INTERVAL: u64 = 30;
/// Default gate for interrupt-attributed CPU load, in percent.
pub const DEFAULT_THRESHOLD: f64 = 40.0;
/// Network devices probed when none are configured.
pub const DEFAULT_NET_DEVICES: &[&str] = &["eth0", "eth1", "eth2", "eth3"];

/// Inputs to discovery, taken from the effective configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub proc_root: PathBuf,
    pub refresh_interval: u64,
    pub threshold: f64,
    /// Explicit block devices; `None` means auto-discovery from `diskstats`.
    pub block_devices: Option<Vec<String>>,
    /// Overrides the whole-disk regular expression used by auto-discovery.
    pub block_device_pattern: Option<String>,
    pub net_devices: Vec<String>,
    /// Regex template (`{device}` placeholder) replacing the substring match.
    pub irq_match: Option<String>,
    pub irq_exclude: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            threshold: DEFAULT_THRESHOLD,
            block_devices: None,
            block_device_pattern: None,
            net_devices: DEFAULT_NET_DEVICES.iter().map(|s| s.to_string()).collect(),
            irq_match: None,
            irq_exclude: DEFAULT_IRQ_EXCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DiscoveryOptions {
    /// Checks the settings that must hold before any source is touched.
    pub fn validate(&self) -> Result<(), SysloadError> {
        if !(MIN_REFRESH_INTERVAL..=MAX_REFRESH_INTERVAL).contains(&self.refresh_interval) {
            return Err(SysloadError::Config(format!(
                "refresh_interval must be between {} and {} seconds, got {}",
                MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL, self.refresh_interval
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SysloadError::Config(format!(
                "threshold must be a non-negative percentage, got {}",
                self.threshold
            )));
        }
        if let Some(devices) = &self.block_devices {
            if devices.iter().all(|d| d.trim().is_empty()) {
                return Err(SysloadError::Config(
                    "explicit block_devices list is empty".into(),
                ));
            }
        }
        if self.net_devices.iter().all(|d| d.trim().is_empty()) {
            return Err(SysloadError::Config("net_devices list is empty".into()));
        }
        Ok(())
    }
}

/// Immutable description of what the engine samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyConfig {
    pub proc_root: PathBuf,
    /// Tracked block devices, by their `diskstats` name.
    pub block_devices: BTreeSet<String>,
    /// Network devices in configuration order.
    pub net_devices: Vec<String>,
    /// CPU index strings servicing each network device's interrupts.
    pub interrupt_groups: BTreeMap<String, Vec<String>>,
    pub cpu_count: usize,
    pub threshold: f64,
    pub refresh_interval: u64,
}

impl TopologyConfig {
    /// Runs discovery against the sources under `opts.proc_root`.
    ///
    /// Any unreadable source is fatal: the engine must not start on a
    /// partially known topology.
    pub fn discover(opts: &DiscoveryOptions) -> Result<Self, SysloadError> {
        opts.validate()?;

        let block_probe = match &opts.block_device_pattern {
            Some(pattern) => BlockDeviceProbe::with_pattern(pattern)?,
            None => BlockDeviceProbe::default(),
        };
        let irq_probe = InterruptProbe::new(opts.irq_match.clone(), opts.irq_exclude.clone())?;

        let root = opts.proc_root.as_path();
        let read = |source: ProcSource| source.read(root).map_err(SysloadError::into_startup);

        let diskstats = read(ProcSource::DiskStats)?;
        let cpuinfo = read(ProcSource::CpuInfo)?;
        let interrupts = read(ProcSource::Interrupts)?;
        // Not needed for discovery, but sampling depends on it.
        read(ProcSource::Stat)?;

        let discovered = block_probe.probe(diskstats.lines());
        let block_devices = match &opts.block_devices {
            Some(explicit) => {
                let explicit: BTreeSet<String> = explicit
                    .iter()
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect();
                let present: BTreeSet<&str> = diskstats
                    .lines()
                    .filter_map(|l| l.split_whitespace().nth(2))
                    .collect();
                for device in &explicit {
                    if !present.contains(device.as_str()) {
                        warn!("Configured block device '{}' not found in diskstats", device);
                    }
                }
                explicit
            }
            None => discovered,
        };

        let cpu_count = count_processors(cpuinfo.lines());
        if cpu_count == 0 {
            warn!("No 'processor' lines found in cpuinfo");
        }

        let mut net_devices: Vec<String> = Vec::new();
        let mut interrupt_groups = BTreeMap::new();
        for device in &opts.net_devices {
            let device = device.trim();
            if device.is_empty() || net_devices.iter().any(|d| d == device) {
                continue;
            }
            let group = irq_probe.probe(device, interrupts.lines(), cpu_count)?;
            if group.is_empty() {
                debug!("No interrupt rows attributed to '{}'", device);
            } else {
                debug!("Interrupted CPU group for '{}': {:?}", device, group);
            }
            net_devices.push(device.to_string());
            interrupt_groups.insert(device.to_string(), group);
        }

        let topology = Self {
            proc_root: opts.proc_root.clone(),
            block_devices,
            net_devices,
            interrupt_groups,
            cpu_count,
            threshold: opts.threshold,
            refresh_interval: opts.refresh_interval,
        };

        info!(
            "Topology discovered: {} block device(s) {:?}, {} CPU(s), {} interrupted group(s)",
            topology.block_devices.len(),
            topology.block_devices,
            topology.cpu_count,
            topology.interrupted_devices().count()
        );

        Ok(topology)
    }

    /// Network devices with a non-empty interrupted CPU group, in configuration order.
    pub fn interrupted_devices(&self) -> impl Iterator<Item = &str> + '_ {
        self.net_devices
            .iter()
            .filter(|d| self.interrupt_groups.get(*d).is_some_and(|g| !g.is_empty()))
            .map(String::as_str)
    }

    /// Interrupted CPU group of a network device.
    pub fn group(&self, device: &str) -> Option<&[String]> {
        self.interrupt_groups.get(device).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_proc(dir: &std::path::Path) {
        fs::write(
            dir.join("diskstats"),
            "   8 0 sda 1 0 2 3 4 0 8 9 0 100 39 0 0 0 0\n   8 1 sda1 1 0 2 3 4 0 8 9 0 90 39\n   7 0 loop0 1 0 2 3 4 0 8 9 0 1 1\n",
        )
        .unwrap();
        fs::write(
            dir.join("cpuinfo"),
            "processor\t: 0\nmodel name\t: test\n\nprocessor\t: 1\nmodel name\t: test\n",
        )
        .unwrap();
        fs::write(
            dir.join("interrupts"),
            "           CPU0       CPU1\n 24:          0        500   PCI-MSI  eth0-rx-0\n 25:        300          0   PCI-MSI  eth0-tx-0\n",
        )
        .unwrap();
        fs::write(dir.join("stat"), "cpu  1 2 3 4 5 6 7 0 0 0\nctxt 10\nintr 20 1 2\n").unwrap();
    }

    fn options(root: &std::path::Path) -> DiscoveryOptions {
        DiscoveryOptions {
            proc_root: root.to_path_buf(),
            ..DiscoveryOptions::default()
        }
    }

    #[test]
    fn test_validate_refresh_interval_bounds() {
        let mut opts = DiscoveryOptions::default();
        for ok in [1, 15, 30] {
            opts.refresh_interval = ok;
            assert!(opts.validate().is_ok(), "{ok} should be accepted");
        }
        for bad in [0, 31, 3600] {
            opts.refresh_interval = bad;
            assert!(
                matches!(opts.validate(), Err(SysloadError::Config(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_threshold_and_lists() {
        let mut opts = DiscoveryOptions {
            threshold: f64::NAN,
            ..DiscoveryOptions::default()
        };
        assert!(opts.validate().is_err());

        opts.threshold = 40.0;
        opts.block_devices = Some(vec![]);
        assert!(opts.validate().is_err());

        opts.block_devices = Some(vec!["sda".into()]);
        opts.net_devices = vec![" ".into()];
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_discover_auto() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());

        let topology = TopologyConfig::discover(&options(dir.path())).unwrap();
        assert_eq!(topology.block_devices.len(), 1);
        assert!(topology.block_devices.contains("sda"));
        assert_eq!(topology.cpu_count, 2);
        assert_eq!(topology.group("eth0"), Some(&["1".to_string()][..]));
        assert_eq!(topology.group("eth1"), Some(&[][..]));
        assert_eq!(topology.interrupted_devices().collect::<Vec<_>>(), vec!["eth0"]);
        assert_eq!(topology.net_devices, vec!["eth0", "eth1", "eth2", "eth3"]);
    }

    #[test]
    fn test_discover_explicit_block_devices() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());

        let opts = DiscoveryOptions {
            block_devices: Some(vec!["sda1".into(), " sda ".into()]),
            net_devices: vec!["eth0".into(), "eth0".into()],
            ..options(dir.path())
        };
        let topology = TopologyConfig::discover(&opts).unwrap();
        assert_eq!(
            topology.block_devices.iter().collect::<Vec<_>>(),
            vec!["sda", "sda1"]
        );
        assert_eq!(topology.net_devices, vec!["eth0"]);
    }

    #[test]
    fn test_discover_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc(dir.path());
        fs::remove_file(dir.path().join("interrupts")).unwrap();

        let err = TopologyConfig::discover(&options(dir.path())).unwrap_err();
        assert!(matches!(err, SysloadError::StartupIo { .. }));
    }

    #[test]
    fn test_discover_rejects_invalid_interval_before_reading() {
        let opts = DiscoveryOptions {
            proc_root: PathBuf::from("/nonexistent/proc"),
            refresh_interval: 0,
            ..DiscoveryOptions::default()
        };
        assert!(matches!(
            TopologyConfig::discover(&opts),
            Err(SysloadError::Config(_))
        ));
    }
}
