use serde::Serialize;

/// Host resource usage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemStats {
    pub cpu_percent: f32,
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    /// Usage of the filesystem mounted at `/`, if one is found.
    pub disk_percent: Option<f64>,
    /// 1, 5 and 15 minute load averages.
    pub load_average: [f64; 3],
}

#[cfg(feature = "system-metrics")]
pub(super) async fn sample() -> Result<SystemStats, super::ProbeError> {
    tokio::task::spawn_blocking(sample_blocking)
        .await
        .map_err(|e| super::ProbeError::Failed(format!("system sampler panicked: {e}")))
}

/// CPU usage needs two refreshes some time apart, so this blocks for
/// `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`.
#[cfg(feature = "system-metrics")]
fn sample_blocking() -> SystemStats {
    use std::path::Path;

    use sysinfo::{Disks, System};

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let memory_total_bytes = sys.total_memory();
    let memory_used_bytes = sys.used_memory();

    let disks = Disks::new_with_refreshed_list();
    let disk_percent = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .and_then(|d| percent(d.total_space().saturating_sub(d.available_space()), d.total_space()));

    let load = System::load_average();

    SystemStats {
        cpu_percent: sys.global_cpu_usage(),
        memory_percent: percent(memory_used_bytes, memory_total_bytes).unwrap_or(0.0),
        memory_used_bytes,
        memory_total_bytes,
        disk_percent,
        load_average: [load.one, load.five, load.fifteen],
    }
}

#[cfg(feature = "system-metrics")]
fn percent(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| (part as f64 / whole as f64 * 1000.0).round() / 10.0)
}
