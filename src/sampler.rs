//! Counter sampling.
//!
//! Every tick the sampler re-reads `diskstats` and `stat` and turns them into
//! a [`CounterSnapshot`]: a flat map from metric key to cumulative counter,
//! tagged with the wall-clock time of capture.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::SysloadError;
use crate::source::ProcSource;
use crate::topology::TopologyConfig;

/// Key prefix of the machine-wide CPU counters.
pub const ALL_CPU_PREFIX: &str = "all_cpu";
/// Context switches since boot.
pub const PROC_CTXT: &str = "proc_ctxt";
/// Interrupts serviced since boot.
pub const PROC_INTR: &str = "proc_intr";

/// Jiffy accounting modes tracked per CPU group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuMode {
    User,
    Nice,
    System,
    Idle,
    Wio,
    Intr,
    Sintr,
}

impl CpuMode {
    pub const ALL: [CpuMode; 7] = [
        CpuMode::User,
        CpuMode::Nice,
        CpuMode::System,
        CpuMode::Idle,
        CpuMode::Wio,
        CpuMode::Intr,
        CpuMode::Sintr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CpuMode::User => "user",
            CpuMode::Nice => "nice",
            CpuMode::System => "system",
            CpuMode::Idle => "idle",
            CpuMode::Wio => "wio",
            CpuMode::Intr => "intr",
            CpuMode::Sintr => "sintr",
        }
    }
}

/// `<prefix>_<mode>`, e.g. `all_cpu_idle` or `eth0_sintr`.
pub fn mode_key(prefix: &str, mode: CpuMode) -> String {
    format!("{}_{}", prefix, mode.name())
}

/// `<prefix>_total`.
pub fn total_key(prefix: &str) -> String {
    format!("{prefix}_total")
}

/// `<device>_io_util`; any cciss controller collapses to `cciss_io_util`.
pub fn io_util_key(device: &str) -> String {
    if device.contains("cciss") {
        "cciss_io_util".to_string()
    } else {
        format!("{device}_io_util")
    }
}

/// Jiffy counters of one `stat` cpu row (or a sum of rows).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuJiffies {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuJiffies {
    /// Parses the numeric columns after the `cpu`/`cpuN` label.
    ///
    /// The first seven columns are required; `steal` defaults to zero on old
    /// kernels. Returns `None` for short or non-numeric rows.
    pub fn parse<'a, I>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = [0u64; 8];
        let mut seen = 0;
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = field.parse().ok()?;
            seen += 1;
        }
        if seen < 7 {
            return None;
        }
        let [user, nice, system, idle, iowait, irq, softirq, steal] = values;
        Some(Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        })
    }

    /// Calculate total CPU time (all fields).
    ///
    /// Wraps at 2^64 like the counters themselves; the delta stage corrects it.
    pub fn total(&self) -> u64 {
        [
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .into_iter()
        .fold(self.user, u64::wrapping_add)
    }

    pub fn mode(&self, mode: CpuMode) -> u64 {
        match mode {
            CpuMode::User => self.user,
            CpuMode::Nice => self.nice,
            CpuMode::System => self.system,
            CpuMode::Idle => self.idle,
            CpuMode::Wio => self.iowait,
            CpuMode::Intr => self.irq,
            CpuMode::Sintr => self.softirq,
        }
    }

    fn accumulate(&mut self, other: &CpuJiffies) {
        self.user = self.user.wrapping_add(other.user);
        self.nice = self.nice.wrapping_add(other.nice);
        self.system = self.system.wrapping_add(other.system);
        self.idle = self.idle.wrapping_add(other.idle);
        self.iowait = self.iowait.wrapping_add(other.iowait);
        self.irq = self.irq.wrapping_add(other.irq);
        self.softirq = self.softirq.wrapping_add(other.softirq);
        self.steal = self.steal.wrapping_add(other.steal);
    }

    fn insert_into(&self, prefix: &str, counters: &mut HashMap<String, u64>) {
        for mode in CpuMode::ALL {
            counters.insert(mode_key(prefix, mode), self.mode(mode));
        }
        counters.insert(total_key(prefix), self.total());
    }
}

/// Cumulative counters captured at one instant.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    taken_at: DateTime<Utc>,
    counters: HashMap<String, u64>,
}

impl CounterSnapshot {
    pub fn new(taken_at: DateTime<Utc>, counters: HashMap<String, u64>) -> Self {
        Self { taken_at, counters }
    }

    /// Builds a snapshot from `(key, value)` pairs.
    pub fn from_pairs<K, I>(taken_at: DateTime<Utc>, pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, u64)>,
    {
        Self {
            taken_at,
            counters: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.counters.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.counters.keys().map(String::as_str)
    }
}

/// Result of one sampling pass.
///
/// A source that failed to read contributes no keys; its error is listed in
/// `failures` so the caller can decide how loudly to complain.
#[derive(Debug)]
pub struct SampleOutcome {
    pub snapshot: CounterSnapshot,
    pub failures: Vec<SysloadError>,
}

impl SampleOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Records the I/O-busy ticks (field 13) of every tracked device.
///
/// Rows with fewer than 13 fields or a non-numeric counter are skipped.
pub fn parse_diskstats<'a, I>(
    lines: I,
    tracked: &BTreeSet<String>,
    counters: &mut HashMap<String, u64>,
) where
    I: IntoIterator<Item = &'a str>,
{
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 13 {
            continue;
        }
        let device = fields[2];
        if !tracked.contains(device) {
            continue;
        }
        match fields[12].parse::<u64>() {
            Ok(ticks) => {
                counters.insert(io_util_key(device), ticks);
            }
            Err(e) => debug!("Skipping diskstats row for {}: {}", device, e),
        }
    }
}

/// Parses `stat` into aggregate, per-group and process-wide counters.
///
/// The aggregate `cpu` row is recorded once. Each `cpuN` row is added to the
/// accumulator of every group whose member list contains `N`. Group
/// accumulators start from zero on every call.
pub fn parse_stat<'a, I>(
    lines: I,
    groups: &[(&str, &[String])],
    counters: &mut HashMap<String, u64>,
) where
    I: IntoIterator<Item = &'a str>,
{
    let mut accumulators: Vec<CpuJiffies> = vec![CpuJiffies::default(); groups.len()];

    for line in lines {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };

        if label == "cpu" {
            match CpuJiffies::parse(fields) {
                Some(jiffies) => jiffies.insert_into(ALL_CPU_PREFIX, counters),
                None => debug!("Skipping malformed aggregate cpu row"),
            }
        } else if let Some(index) = label.strip_prefix("cpu") {
            if groups.is_empty() {
                continue;
            }
            let Some(jiffies) = CpuJiffies::parse(fields) else {
                debug!("Skipping malformed {} row", label);
                continue;
            };
            for (acc, (_, members)) in accumulators.iter_mut().zip(groups) {
                if members.iter().any(|m| m == index) {
                    acc.accumulate(&jiffies);
                }
            }
        } else if label == "ctxt" || label == "intr" {
            // `intr` carries the total first, then one column per IRQ.
            if let Some(Ok(value)) = fields.next().map(str::parse::<u64>) {
                let key = if label == "ctxt" { PROC_CTXT } else { PROC_INTR };
                counters.insert(key.to_string(), value);
            }
        }
    }

    for (acc, (device, _)) in accumulators.iter().zip(groups) {
        acc.insert_into(device, counters);
    }
}

/// Reads the tracked counters of a [`TopologyConfig`].
#[derive(Debug, Clone)]
pub struct CounterSampler {
    topology: Arc<TopologyConfig>,
}

impl CounterSampler {
    pub fn new(topology: Arc<TopologyConfig>) -> Self {
        Self { topology }
    }

    /// Takes a snapshot stamped with the current wall-clock time.
    pub fn sample(&self) -> SampleOutcome {
        self.sample_at(Utc::now())
    }

    /// Takes a snapshot stamped with `taken_at`.
    pub fn sample_at(&self, taken_at: DateTime<Utc>) -> SampleOutcome {
        let root = self.topology.proc_root.as_path();
        let mut counters = HashMap::new();
        let mut failures = Vec::new();

        match ProcSource::DiskStats.read(root) {
            Ok(text) => parse_diskstats(text.lines(), &self.topology.block_devices, &mut counters),
            Err(e) => failures.push(e),
        }

        let groups: Vec<(&str, &[String])> = self
            .topology
            .interrupted_devices()
            .filter_map(|d| self.topology.group(d).map(|g| (d, g)))
            .collect();

        match ProcSource::Stat.read(root) {
            Ok(text) => parse_stat(text.lines(), &groups, &mut counters),
            Err(e) => failures.push(e),
        }

        SampleOutcome {
            snapshot: CounterSnapshot::new(taken_at, counters),
            failures,
        }
    }
}
