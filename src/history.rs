//! Trailing moving averages of the composite sysload.
//!
//! Each window is a fixed-size circular buffer of `f64` samples. Buffers are
//! zero-filled at startup, so the published averages ramp up from zero over
//! the first window's worth of ticks.

/// Window names and their durations in seconds.
pub const WINDOWS: [(&str, u64); 3] = [
    ("sysload_one", 60),
    ("sysload_five", 300),
    ("sysload_fifteen", 900),
];

/// Arithmetic mean of the values, or 0 for an empty input.
pub fn calc_moving_average<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// A named fixed-length FIFO of sysload samples.
#[derive(Debug, Clone)]
pub struct LoadWindow {
    name: &'static str,
    window_seconds: u64,
    refresh_interval: u64,
    entries: Vec<f64>,
    write_index: usize,
}

impl LoadWindow {
    /// Creates a zero-filled window of `window_seconds / refresh_interval`
    /// entries (at least one).
    pub fn new(name: &'static str, window_seconds: u64, refresh_interval: u64) -> Self {
        let capacity = (window_seconds / refresh_interval.max(1)).max(1) as usize;
        Self {
            name,
            window_seconds,
            refresh_interval,
            entries: vec![0.0; capacity],
            write_index: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Nominal duration the window was configured for.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Duration actually covered; differs from the nominal one when the
    /// refresh interval does not divide it evenly.
    pub fn effective_seconds(&self) -> u64 {
        self.capacity() as u64 * self.refresh_interval
    }

    /// Overwrites the oldest sample.
    pub fn push(&mut self, value: f64) {
        self.entries[self.write_index] = value;
        self.write_index = (self.write_index + 1) % self.entries.len();
    }

    pub fn mean(&self) -> f64 {
        calc_moving_average(&self.entries)
    }

    /// Samples from oldest to newest.
    pub fn history(&self) -> Vec<f64> {
        let mut result = Vec::with_capacity(self.entries.len());
        result.extend_from_slice(&self.entries[self.write_index..]);
        result.extend_from_slice(&self.entries[..self.write_index]);
        result
    }
}

/// The three sysload windows.
#[derive(Debug, Clone)]
pub struct LoadHistory {
    windows: Vec<LoadWindow>,
}

impl LoadHistory {
    pub fn new(refresh_interval: u64) -> Self {
        let windows = WINDOWS
            .iter()
            .map(|(name, secs)| LoadWindow::new(name, *secs, refresh_interval))
            .collect();
        Self { windows }
    }

    /// Pushes one sysload sample and returns every window's new mean.
    pub fn record(&mut self, sysload: f64) -> Vec<(&'static str, f64)> {
        self.windows
            .iter_mut()
            .map(|w| {
                w.push(sysload);
                (w.name(), w.mean())
            })
            .collect()
    }

    /// Current means without recording anything.
    pub fn averages(&self) -> Vec<(&'static str, f64)> {
        self.windows.iter().map(|w| (w.name(), w.mean())).collect()
    }

    pub fn windows(&self) -> &[LoadWindow] {
        &self.windows
    }
}
