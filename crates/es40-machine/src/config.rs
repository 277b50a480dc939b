//! Machine configuration: the typed struct and the INI-style loader.
//!
//! The file format is sections of `Key=Value` pairs. Sections the core
//! does not consume (`[CACHE/*]`, `[Device.*]`, `[ExecTrace]`) are
//! accepted and skipped; they belong to the device and trace
//! collaborators.

use std::time::Duration;

use es40_cpu_core::PalVariant;
use es40_mmu::{PageSize, ReplacementPolicy};
use es40_types::MAX_CPUS;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: expected `key=value`, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: bad value {value:?} for {key}")]
    BadValue {
        line: usize,
        key: String,
        value: String,
    },
    #[error("CpuCount {0} out of range 1..={max}", max = MAX_CPUS)]
    CpuCount(usize),
}

#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub cpu_count: usize,
    pub mem_size: u64,
    pub pal_variant: PalVariant,
    pub page_size: PageSize,
    pub cpu_freq_hz: u64,
    pub pal_base: u64,
    /// First PC (tagged with the PAL-mode bit) after reset.
    pub initial_pc: u64,
    pub hwrpb_base: u64,
    pub replacement: ReplacementPolicy,
    pub barrier_timeout: Duration,
    /// Fill the TLB from a valid page-table walk in the core instead of
    /// vectoring every miss to PAL.
    pub hardware_tb_fill: bool,
}

impl Default for MachineConfig {
    fn default() -> MachineConfig {
        MachineConfig {
            cpu_count: 1,
            mem_size: 128 * 1024 * 1024,
            pal_variant: PalVariant::Ev6,
            page_size: PageSize::Size8K,
            cpu_freq_hz: 500_000_000,
            pal_base: 0x10000,
            initial_pc: 0x10001,
            hwrpb_base: 0x2000,
            replacement: ReplacementPolicy::Srrip,
            barrier_timeout: Duration::from_millis(100),
            hardware_tb_fill: false,
        }
    }
}

impl MachineConfig {
    pub fn from_ini_str(text: &str) -> Result<MachineConfig, ConfigError> {
        let mut cfg = MachineConfig::default();
        let mut section = String::new();

        for (n, raw_line) in text.lines().enumerate() {
            let line = n + 1;
            let stripped = raw_line
                .split(|c| c == ';' || c == '#')
                .next()
                .unwrap_or("")
                .trim();
            if stripped.is_empty() {
                continue;
            }
            if let Some(name) = stripped.strip_prefix('[') {
                section = name
                    .strip_suffix(']')
                    .ok_or_else(|| ConfigError::Malformed {
                        line,
                        text: stripped.to_string(),
                    })?
                    .to_string();
                continue;
            }
            let (key, value) = stripped.split_once('=').ok_or_else(|| {
                ConfigError::Malformed {
                    line,
                    text: stripped.to_string(),
                }
            })?;
            let key = key.trim();
            let value = value.trim();
            cfg.apply(&section, key, value, line)?;
        }

        if cfg.cpu_count == 0 || cfg.cpu_count > MAX_CPUS {
            return Err(ConfigError::CpuCount(cfg.cpu_count));
        }
        Ok(cfg)
    }

    fn apply(&mut self, section: &str, key: &str, value: &str, line: usize) -> Result<(), ConfigError> {
        let bad = |key: &str, value: &str| ConfigError::BadValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        };
        match (section, key) {
            ("System", "CpuCount") => {
                self.cpu_count = value.parse().map_err(|_| bad(key, value))?;
            }
            ("System", "MemorySizeGB") => {
                let gb: u64 = value.parse().map_err(|_| bad(key, value))?;
                self.mem_size = gb << 30;
            }
            ("System", "Platform-Ev") => {
                self.pal_variant = match value {
                    "5" => PalVariant::Ev5,
                    "6" => PalVariant::Ev6,
                    _ => return Err(bad(key, value)),
                };
            }
            ("System", "PTE-PageSize") => {
                self.page_size = match value {
                    "4K" => PageSize::Size4K,
                    "8K" => PageSize::Size8K,
                    "64K" => PageSize::Size64K,
                    "512K" => PageSize::Size512K,
                    _ => return Err(bad(key, value)),
                };
            }
            ("System", "CPU_FREQUENCY_HZ") => {
                self.cpu_freq_hz = value.parse().map_err(|_| bad(key, value))?;
            }
            ("System", "TlbReplacement") => {
                self.replacement = match value {
                    "SRRIP" => ReplacementPolicy::Srrip,
                    "CLOCK" => ReplacementPolicy::Clock,
                    "Random" => ReplacementPolicy::Random,
                    _ => return Err(bad(key, value)),
                };
            }
            ("System", "BarrierTimeoutMs") => {
                let ms: u64 = value.parse().map_err(|_| bad(key, value))?;
                self.barrier_timeout = Duration::from_millis(ms);
            }
            ("System", "HardwareTbFill") => {
                self.hardware_tb_fill = parse_bool(value).ok_or_else(|| bad(key, value))?;
            }
            ("MemoryMap", "HwrpbBase") => {
                self.hwrpb_base = parse_addr(value).ok_or_else(|| bad(key, value))?;
            }
            ("MemoryMap", "PalBase") => {
                self.pal_base = parse_addr(value).ok_or_else(|| bad(key, value))?;
            }
            ("MemoryMap", "SrmInitialPC") => {
                self.initial_pc = parse_addr(value).ok_or_else(|| bad(key, value))?;
            }
            // Remaining memory-map windows, ROM selection, and FP host
            // strategy hints belong to collaborators; accept silently.
            ("MemoryMap", _) | ("ROM", _) | ("FloatingPoint", _) => {}
            _ if section.starts_with("CACHE")
                || section.starts_with("Device.")
                || section == "ExecTrace" => {}
            _ => {
                tracing::warn!(section, key, "unrecognized configuration key ignored");
            }
        }
        Ok(())
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_addr(v: &str) -> Option<u64> {
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        v.parse().ok()
    }
}
