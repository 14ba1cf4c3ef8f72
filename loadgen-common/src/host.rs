//! # Host
//!
//! Best-effort snapshots of the host the load generator runs on. Nothing here fails:
//! figures that cannot be read are reported as zero.
use std::sync::{Mutex, PoisonError};

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::debug;

const GIGABYTE: f64 = 1024.0 * 1024.0 * 1024.0;
const PROC_STAT: &str = "/proc/stat";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostMetrics {
    /// Busy share of all cpu time since boot, in percent.
    pub cpu_usage_percent: f64,
    pub load_average: LoadAverage,
    pub total_memory_bytes: u64,
    pub free_memory_bytes: u64,
    pub cores: usize,
    pub arch: &'static str,
    pub platform: &'static str,
    pub hostname: String,
    pub uptime_secs: u64,
}

impl HostMetrics {
    pub fn used_memory_bytes(&self) -> u64 {
        self.total_memory_bytes
            .saturating_sub(self.free_memory_bytes)
    }

    pub fn memory_usage_percent(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            return 0.0;
        }
        self.used_memory_bytes() as f64 / self.total_memory_bytes as f64 * 100.0
    }
}

/// Cumulative cpu ticks, aggregated over all logical cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTicks {
    pub idle: u64,
    pub total: u64,
}

impl CpuTicks {
    pub fn usage_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (1.0 - self.idle as f64 / self.total as f64) * 100.0
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
/// Counts user, nice, system, idle and irq ticks; iowait, softirq and steal are left out.
pub fn parse_proc_stat(contents: &str) -> Option<CpuTicks> {
    let line = contents
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;

    let user = *fields.first()?;
    let nice = *fields.get(1)?;
    let system = *fields.get(2)?;
    let idle = *fields.get(3)?;
    let irq = fields.get(5).copied().unwrap_or(0);

    Some(CpuTicks {
        idle,
        total: user + nice + system + idle + irq,
    })
}

pub struct HostCollector {
    system: Mutex<System>,
    cores: usize,
}

impl HostCollector {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()),
        );

        let cores = match system.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, |cores| cores.get()),
            cores => cores,
        };

        Self {
            system: Mutex::new(system),
            cores,
        }
    }

    pub fn logical_cores(&self) -> usize {
        self.cores
    }

    fn cpu_usage_percent(&self, system: &mut System) -> f64 {
        match std::fs::read_to_string(PROC_STAT) {
            Ok(contents) => {
                if let Some(ticks) = parse_proc_stat(&contents) {
                    return ticks.usage_percent();
                }
                debug!("unexpected {} format, using sysinfo cpu usage", PROC_STAT);
            }
            Err(err) => debug!("cannot read {}, using sysinfo cpu usage: {}", PROC_STAT, err),
        }

        system.refresh_cpu_usage();
        f64::from(system.global_cpu_usage())
    }

    pub fn snapshot(&self) -> HostMetrics {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();

        let load = System::load_average();

        HostMetrics {
            cpu_usage_percent: self.cpu_usage_percent(&mut system),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            total_memory_bytes: system.total_memory(),
            free_memory_bytes: system.available_memory(),
            cores: self.cores,
            arch: std::env::consts::ARCH,
            platform: std::env::consts::OS,
            hostname: System::host_name().unwrap_or_default(),
            uptime_secs: System::uptime(),
        }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_gigabytes(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / GIGABYTE)
}

pub fn format_percentage(percent: f64) -> String {
    format!("{:.2}%", percent)
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Humanize an uptime, e.g. `2 days 3 hours 1 minute`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!(
            "{} {} {}",
            plural(days, "day"),
            plural(hours, "hour"),
            plural(minutes, "minute")
        )
    } else if hours > 0 {
        format!("{} {}", plural(hours, "hour"), plural(minutes, "minute"))
    } else {
        plural(minutes, "minute")
    }
}
