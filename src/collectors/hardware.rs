use crate::format::format_uptime;
use crate::snapshot::{HardwareSnapshot, RamUsage};
#[cfg(target_os = "linux")]
use std::fs;
use std::process::Command;
use sysinfo::{ComponentExt, CpuExt, System, SystemExt};
use tracing::debug;

const NO_READING: &str = "н/д";

/// Reads the local machine into the same shape the dashboard polls for.
pub fn collect_hardware(system: &mut System) -> HardwareSnapshot {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_components_list();
    system.refresh_components();

    let cpu_usage = if system.cpus().is_empty() {
        0.0
    } else {
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        (sum / system.cpus().len() as f32) as f64
    };

    let ram_usage = if system.total_memory() > 0 {
        system.used_memory() as f64 / system.total_memory() as f64 * 100.0
    } else {
        0.0
    };

    let sensors: Vec<(String, f64)> = system
        .components()
        .iter()
        .map(|c| (c.label().to_string(), c.temperature() as f64))
        .filter(|(_, t)| *t > 0.0)
        .chain(collect_linux_thermal_zones())
        .collect();

    let gpus = collect_nvidia_smi();
    let cpu_temp = cpu_temperature(&sensors).unwrap_or(0.0);
    let gpu_temp = gpus
        .iter()
        .filter_map(|g| g.temperature_celsius)
        .chain(
            sensors
                .iter()
                .filter(|(label, _)| is_gpu_label(label))
                .map(|(_, t)| *t),
        )
        .fold(0.0_f64, f64::max);
    let gpu_usage = gpus
        .iter()
        .filter_map(|g| g.utilization_percent)
        .fold(0.0_f64, f64::max);
    let power_watts: f64 = gpus.iter().filter_map(|g| g.power_draw_watts).sum();
    let fan_speed = collect_fan_rpm().unwrap_or(0.0);

    debug!(
        sensors = sensors.len(),
        gpus = gpus.len(),
        cpu_temp,
        gpu_temp,
        "собраны показатели оборудования"
    );

    HardwareSnapshot {
        cpu_temp: round1(cpu_temp),
        gpu_temp: round1(gpu_temp),
        ram_usage: RamUsage::Numeric(round1(ram_usage)),
        fan_speed: fan_speed.round(),
        uptime: format_uptime(system.uptime()),
        power_draw: if power_watts > 0.0 {
            format!("{} W", power_watts.round())
        } else {
            NO_READING.to_string()
        },
        cpu_usage: round1(cpu_usage),
        gpu_usage: round1(gpu_usage),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct GpuReading {
    utilization_percent: Option<f64>,
    temperature_celsius: Option<f64>,
    power_draw_watts: Option<f64>,
}

fn cpu_temperature(sensors: &[(String, f64)]) -> Option<f64> {
    let primary_markers = ["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];
    let plausible = |t: &&(String, f64)| (0.0..=130.0).contains(&t.1);

    let primary = sensors
        .iter()
        .filter(plausible)
        .filter(|(label, _)| {
            let s = label.to_lowercase();
            primary_markers.iter().any(|m| s.contains(m)) && !is_gpu_label(&s)
        })
        .map(|(_, t)| *t)
        .max_by(|a, b| a.total_cmp(b));
    if primary.is_some() {
        return primary;
    }

    sensors
        .iter()
        .filter(plausible)
        .filter(|(label, _)| !is_gpu_label(label))
        .map(|(_, t)| *t)
        .max_by(|a, b| a.total_cmp(b))
}

fn is_gpu_label(label: &str) -> bool {
    let s = label.to_lowercase();
    ["gpu", "nvidia", "amdgpu", "radeon"]
        .iter()
        .any(|m| s.contains(m))
}

fn collect_nvidia_smi() -> Vec<GpuReading> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=utilization.gpu,temperature.gpu,power.draw",
            "--format=csv,noheader,nounits",
        ])
        .output();

    let Ok(output) = output else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    let Ok(text) = String::from_utf8(output.stdout) else {
        return Vec::new();
    };
    parse_nvidia_smi(&text)
}

fn parse_nvidia_smi(text: &str) -> Vec<GpuReading> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|v| v.trim()).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(GpuReading {
                utilization_percent: parse_f64_loose(parts[0]),
                temperature_celsius: parse_f64_loose(parts[1]).filter(|t| *t > 0.0),
                power_draw_watts: parse_f64_loose(parts[2]),
            })
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn collect_linux_thermal_zones() -> Vec<(String, f64)> {
    let Ok(entries) = fs::read_dir("/sys/class/thermal") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }
        let Some(v) = fs::read_to_string(path.join("temp"))
            .ok()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
        else {
            continue;
        };
        let label = fs::read_to_string(path.join("type"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| name.to_string());
        let celsius = if v > 1000.0 { v / 1000.0 } else { v };
        if celsius > 0.0 {
            out.push((label, celsius));
        }
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn collect_linux_thermal_zones() -> Vec<(String, f64)> {
    Vec::new()
}

/// Fastest fan reported by hwmon, in RPM.
#[cfg(target_os = "linux")]
fn collect_fan_rpm() -> Option<f64> {
    let entries = fs::read_dir("/sys/class/hwmon").ok()?;
    let mut best: Option<f64> = None;
    for hwmon in entries.flatten() {
        let Ok(files) = fs::read_dir(hwmon.path()) else {
            continue;
        };
        for file in files.flatten() {
            let name = file.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with("fan") && name.ends_with("_input")) {
                continue;
            }
            let rpm = fs::read_to_string(file.path())
                .ok()
                .and_then(|raw| parse_f64_loose(&raw));
            if let Some(rpm) = rpm {
                best = Some(best.map_or(rpm, |b| b.max(rpm)));
            }
        }
    }
    best
}

#[cfg(not(target_os = "linux"))]
fn collect_fan_rpm() -> Option<f64> {
    None
}

fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    trimmed.replace(',', ".").parse::<f64>().ok()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvidia_smi_lines_are_parsed() {
        let gpus = parse_nvidia_smi("37, 61, 112.45\n[N/A], 0, [N/A]\nbroken\n");
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].utilization_percent, Some(37.0));
        assert_eq!(gpus[0].temperature_celsius, Some(61.0));
        assert_eq!(gpus[0].power_draw_watts, Some(112.45));
        assert_eq!(gpus[1].utilization_percent, None);
        assert_eq!(gpus[1].temperature_celsius, None);
    }

    #[test]
    fn cpu_temperature_prefers_cpu_sensors() {
        let sensors = vec![
            ("acpitz".to_string(), 40.0),
            ("GPU Core".to_string(), 75.0),
            ("k10temp Tctl".to_string(), 58.5),
        ];
        assert_eq!(cpu_temperature(&sensors), Some(58.5));

        let no_cpu = vec![("acpitz".to_string(), 40.0), ("nvidia".to_string(), 70.0)];
        assert_eq!(cpu_temperature(&no_cpu), Some(40.0));
        assert_eq!(cpu_temperature(&[]), None);
    }

    #[test]
    fn collected_snapshot_is_well_formed() {
        let mut system = System::new();
        let snap = collect_hardware(&mut system);
        assert!((0.0..=100.0).contains(&snap.cpu_usage));
        assert!(matches!(snap.ram_usage, RamUsage::Numeric(v) if (0.0..=100.0).contains(&v)));
        assert!(crate::format::parse_uptime(&snap.uptime).is_some());
    }
}
