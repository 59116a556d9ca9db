//! Three-valued activity signals and the rules for combining them.
use std::fmt;

use serde::Serialize;

/// Counts established TCP sessions other than SSH. One number on stdout.
pub const CONNECTIONS_COMMAND: &str = "ss -Htn state established '( not sport = :22 )' | wc -l";

/// Prints CPU busy percent, then RAM used percent, one per line.
pub const CPU_RAM_COMMAND: &str = r#"top -bn1 | awk '/Cpu\(s\)/ {print 100 - $8}'; free | awk '/^Mem:/ {print $3 / $2 * 100}'"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOutcome {
    Active,
    Inactive,
    /// Could not be evaluated this tick.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    LastAccess,
    NetworkConnections,
    CpuRamActivity,
    NetworkTraffic,
}

impl Criterion {
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::LastAccess => "lastAccess",
            Criterion::NetworkConnections => "networkConnections",
            Criterion::CpuRamActivity => "cpuRamActivity",
            Criterion::NetworkTraffic => "networkTraffic",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live signal is enough to call the node active. Otherwise any
/// unknown signal makes the tick unknown; only a full set of inactive
/// signals is inactive. No signals at all is unknown.
pub fn aggregate(outcomes: impl IntoIterator<Item = SignalOutcome>) -> SignalOutcome {
    let mut saw_unknown = false;
    let mut saw_any = false;
    for outcome in outcomes {
        saw_any = true;
        match outcome {
            SignalOutcome::Active => return SignalOutcome::Active,
            SignalOutcome::Unknown => saw_unknown = true,
            SignalOutcome::Inactive => {}
        }
    }
    if saw_unknown || !saw_any {
        SignalOutcome::Unknown
    } else {
        SignalOutcome::Inactive
    }
}

pub fn parse_connection_count(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

/// `(cpu_percent, ram_percent)` from [`CPU_RAM_COMMAND`] output.
pub fn parse_cpu_ram(stdout: &str) -> Option<(f64, f64)> {
    let mut values = stdout
        .split_whitespace()
        .map(|s| s.trim_end_matches('%').parse::<f64>());
    let cpu = values.next()?.ok()?;
    let ram = values.next()?.ok()?;
    (cpu.is_finite() && ram.is_finite()).then_some((cpu, ram))
}

pub fn connections_outcome(count: u64) -> SignalOutcome {
    if count > 0 {
        SignalOutcome::Active
    } else {
        SignalOutcome::Inactive
    }
}

pub fn cpu_ram_outcome(cpu: f64, ram: f64, cpu_threshold: f64, ram_threshold: f64) -> SignalOutcome {
    if cpu > cpu_threshold || ram > ram_threshold {
        SignalOutcome::Active
    } else {
        SignalOutcome::Inactive
    }
}

/// Compares cumulative rx+tx bytes with the previous tick. Without a
/// baseline, or after a counter reset, there is no delta to judge.
pub fn traffic_outcome(previous: Option<u64>, current: u64, threshold: u64) -> SignalOutcome {
    match previous {
        Some(prev) if current >= prev => {
            if current - prev > threshold {
                SignalOutcome::Active
            } else {
                SignalOutcome::Inactive
            }
        }
        _ => SignalOutcome::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SignalOutcome::*;

    #[test]
    fn test_aggregate_any_active_wins() {
        assert_eq!(aggregate([Inactive, Unknown, Active]), Active);
        assert_eq!(aggregate([Active]), Active);
    }

    #[test]
    fn test_aggregate_unknown_blocks_inactive() {
        assert_eq!(aggregate([Inactive, Unknown]), Unknown);
        assert_eq!(aggregate([Inactive, Inactive]), Inactive);
        assert_eq!(aggregate(Vec::<SignalOutcome>::new()), Unknown);
    }

    #[test]
    fn test_parse_probe_output() {
        assert_eq!(parse_connection_count("3\n"), Some(3));
        assert_eq!(parse_connection_count(""), None);
        assert_eq!(parse_cpu_ram("12.5\n41.07\n"), Some((12.5, 41.07)));
        assert_eq!(parse_cpu_ram("12.5\n"), None);
        assert_eq!(parse_cpu_ram("n/a 3"), None);
    }

    #[test]
    fn test_cpu_ram_thresholds_are_exclusive() {
        assert_eq!(cpu_ram_outcome(10.0, 50.0, 10.0, 50.0), Inactive);
        assert_eq!(cpu_ram_outcome(10.1, 0.0, 10.0, 50.0), Active);
        assert_eq!(cpu_ram_outcome(0.0, 75.0, 10.0, 50.0), Active);
    }

    #[test]
    fn test_traffic_needs_baseline() {
        assert_eq!(traffic_outcome(None, 5_000_000, 1024), Unknown);
        assert_eq!(traffic_outcome(Some(1000), 1500, 1024), Inactive);
        assert_eq!(traffic_outcome(Some(1000), 1_000_000, 1024), Active);
        // Counter went backwards (interface reset, reboot).
        assert_eq!(traffic_outcome(Some(1_000_000), 10, 1024), Unknown);
    }
}
