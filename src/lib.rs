//! Sysload Exporter Library
//!
//! Estimates a composite "system saturation" percentage from the cumulative
//! counters in procfs. The pipeline is:
//!
//! 1. [`topology`]: one-shot discovery of block devices, CPU count and the
//!    CPUs servicing each network device's interrupts.
//! 2. [`sampler`]: periodic snapshots of the tracked counters.
//! 3. [`delta`]: wraparound-safe deltas turned into rates and percentages.
//! 4. [`estimator`]: busiest-device attribution and the composite `sysload`.
//! 5. [`history`]: 1/5/15-minute moving averages.
//!
//! [`engine::SysloadEngine`] ties these together and publishes into any
//! [`engine::MetricSink`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sysload_exporter::{DiscoveryOptions, InMemorySink, SysloadEngine, TopologyConfig};
//!
//! let topology = Arc::new(TopologyConfig::discover(&DiscoveryOptions::default())?);
//! let mut engine = SysloadEngine::new(topology);
//! engine.prime()?;
//!
//! let sink = InMemorySink::new();
//! std::thread::sleep(std::time::Duration::from_secs(15));
//! let report = engine.run_tick(&sink);
//! println!("sysload: {:?}", report.sysload());
//! # Ok::<(), sysload_exporter::SysloadError>(())
//! ```

pub mod delta;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod health_stats;
pub mod history;
pub mod probe;
pub mod sampler;
pub mod source;
pub mod topology;

// Re-export main types for convenience
pub use delta::{counter_wrap, DerivedSample};
pub use engine::{InMemorySink, MetricSink, SysloadEngine, TickReport};
pub use error::SysloadError;
pub use estimator::{calc_sysload, SysloadEstimator};
pub use history::{calc_moving_average, LoadHistory};
pub use sampler::{CounterSampler, CounterSnapshot, SampleOutcome};
pub use topology::{DiscoveryOptions, TopologyConfig};
