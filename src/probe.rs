//! Line probes for topology discovery.
//!
//! Each probe takes raw text lines from a procfs source and returns
//! structured matches. Nothing here touches the filesystem, so the
//! heuristics can be exercised against fixture text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::SysloadError;

/// Whole-disk device names: `sda`, `xvdb`, `vdh`, `hda`, `cciss/c0d0`, `fioa`.
pub const DEFAULT_BLOCK_DEVICE_PATTERN: &str = r"^(x?[svh]d[a-z]|cciss/c0d0|fio[a-z])$";

/// Interrupt rows containing any of these substrings are ignored.
pub const DEFAULT_IRQ_EXCLUDE: &[&str] = &["tx"];

/// Placeholder substituted with the (escaped) device name in IRQ match patterns.
pub const DEVICE_PLACEHOLDER: &str = "{device}";

static DEFAULT_BLOCK_DEVICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(DEFAULT_BLOCK_DEVICE_PATTERN).expect("default block device pattern is valid")
});

/// Selects whole-disk block devices from `diskstats` rows.
#[derive(Debug, Clone)]
pub struct BlockDeviceProbe {
    pattern: Regex,
}

impl Default for BlockDeviceProbe {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_BLOCK_DEVICE_RE.clone(),
        }
    }
}

impl BlockDeviceProbe {
    /// Builds a probe from a custom regular expression.
    pub fn with_pattern(pattern: &str) -> Result<Self, SysloadError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            SysloadError::Config(format!("invalid block_device_pattern '{pattern}': {e}"))
        })?;
        Ok(Self { pattern })
    }

    /// Returns true if `name` looks like a whole disk rather than a partition.
    pub fn is_whole_disk(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// Extracts the device-name column (field 3) from each row and keeps the
    /// names that match. Rows with fewer than three fields are skipped.
    pub fn probe<'a, I>(&self, lines: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines
            .into_iter()
            .filter_map(|line| line.split_whitespace().nth(2))
            .filter(|name| self.is_whole_disk(name))
            .map(str::to_string)
            .collect()
    }
}

/// Counts `processor` lines in `cpuinfo` text.
pub fn count_processors<'a, I>(lines: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter(|line| line.split_whitespace().next() == Some("processor"))
        .count()
}

/// Rules for deciding which `interrupts` rows belong to a device.
#[derive(Debug, Clone)]
pub struct InterruptProbe {
    match_template: Option<String>,
    exclude: Vec<String>,
}

impl Default for InterruptProbe {
    fn default() -> Self {
        Self {
            match_template: None,
            exclude: DEFAULT_IRQ_EXCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compiled match rule for one device.
#[derive(Debug)]
enum RowMatcher<'a> {
    Substring(&'a str),
    Pattern(Regex),
}

impl InterruptProbe {
    /// Builds a probe with an optional regex template and an exclusion list.
    ///
    /// Without a template a row matches when it contains the device name.
    /// With a template, `{device}` is replaced by the escaped device name and
    /// the result is used as a regular expression.
    pub fn new(match_template: Option<String>, exclude: Vec<String>) -> Result<Self, SysloadError> {
        let probe = Self {
            match_template,
            exclude,
        };
        // Compile once against a dummy device so a bad template fails at startup.
        probe.matcher("eth0")?;
        Ok(probe)
    }

    fn matcher<'a>(&self, device: &'a str) -> Result<RowMatcher<'a>, SysloadError> {
        match &self.match_template {
            None => Ok(RowMatcher::Substring(device)),
            Some(template) => {
                let expr = template.replace(DEVICE_PLACEHOLDER, &regex::escape(device));
                Regex::new(&expr).map(RowMatcher::Pattern).map_err(|e| {
                    SysloadError::Config(format!("invalid irq_match '{template}': {e}"))
                })
            }
        }
    }

    fn row_matches(&self, matcher: &RowMatcher<'_>, line: &str) -> bool {
        let hit = match matcher {
            RowMatcher::Substring(device) => line.contains(device),
            RowMatcher::Pattern(re) => re.is_match(line),
        };
        hit && !self.exclude.iter().any(|ex| line.contains(ex.as_str()))
    }

    /// Returns the CPU indices whose interrupt counters for `device` are positive.
    ///
    /// The first line is treated as the `CPU0 CPU1 ...` header when it carries
    /// CPU columns; otherwise `cpu_count` columns numbered from zero are assumed.
    /// The result keeps first-seen order and contains no duplicates.
    pub fn probe<'a, I>(
        &self,
        device: &str,
        lines: I,
        cpu_count: usize,
    ) -> Result<Vec<String>, SysloadError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let matcher = self.matcher(device)?;
        let mut lines = lines.into_iter().peekable();

        let header_ids: Vec<String> = lines
            .peek()
            .map(|header| {
                header
                    .split_whitespace()
                    .filter_map(|col| col.strip_prefix("CPU"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let cpu_ids = if header_ids.is_empty() {
            (0..cpu_count).map(|i| i.to_string()).collect()
        } else {
            lines.next();
            header_ids
        };

        let mut group: Vec<String> = Vec::new();
        for line in lines {
            if !self.row_matches(&matcher, line) {
                continue;
            }
            // First column is the IRQ label ("24:"), then one counter per CPU.
            let counters = line.split_whitespace().skip(1).take(cpu_ids.len());
            for (idx, field) in counters.enumerate() {
                match field.parse::<u64>() {
                    Ok(count) if count > 0 => {
                        let id = &cpu_ids[idx];
                        if !group.contains(id) {
                            group.push(id.clone());
                        }
                    }
                    Ok(_) => {}
                    // Descriptor text started early (short row), stop here.
                    Err(_) => break,
                }
            }
        }

        Ok(group)
    }
}
