//! Check command implementation.
//!
//! Validates the counter sources and prints the discovered topology.

use sysload_exporter::TopologyConfig;

use crate::config::{validate_effective_config, Config};
use crate::handlers::config::render_topology;
use crate::startup_checks::check_sources;

/// Validates counter sources, configuration and topology discovery.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Sysload Exporter - System Check");
    println!("==================================");

    let mut all_ok = true;
    let opts = config.to_discovery_options();

    println!("\n📁 Checking counter sources under {}...", opts.proc_root.display());
    for check in check_sources(&opts.proc_root) {
        match &check.result {
            Ok(lines) => println!("   ✅ {} ({} lines)", check.source, lines),
            Err(reason) => {
                println!("   ❌ {}: {}", check.source, reason);
                all_ok = false;
            }
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if all_ok {
        println!("\n🧭 Discovering topology...");
        match TopologyConfig::discover(&opts) {
            Ok(topology) => {
                for line in render_topology(&topology).lines() {
                    println!("   {}", line);
                }
                if topology.block_devices.is_empty() {
                    println!("   ⚠️  No block devices tracked, io_util signals will be absent");
                }
                if topology.interrupted_devices().next().is_none() {
                    println!("   ⚠️  No interrupted CPU groups found, si_cpu_* will stay at 0");
                }
            }
            Err(e) => {
                println!("   ❌ Discovery failed: {}", e);
                all_ok = false;
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
