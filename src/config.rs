use serde::{Deserialize, Serialize};

use crate::bus::OPEN_BUS;

/// Operating mode of the 82720 graphics display controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GdcMode {
    /// High resolution graphics.
    Hrg,
    /// Uniform high resolution graphics.
    Uhrg,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GdcConfig {
    pub mode: GdcMode,
    pub vram_size: u32,
}

impl Default for GdcConfig {
    fn default() -> Self {
        Self {
            mode: GdcMode::Hrg,
            vram_size: 0x8000,
        }
    }
}

/// Host-facing machine parameters. Defaults describe the stock Compis; any
/// field missing from a JSON document keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub cpu_clock_hz: u32,
    pub frames_per_second: u32,
    /// The 80186 drives 20 address lines.
    pub address_mask: u32,
    pub unmapped_fill: u8,
    pub gdc: GdcConfig,
    pub printer_count: u32,
    pub floppy_count: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cpu_clock_hz: 8_000_000,
            frames_per_second: 50,
            address_mask: 0x000F_FFFF,
            unmapped_fill: OPEN_BUS,
            gdc: GdcConfig::default(),
            printer_count: 1,
            floppy_count: 2,
        }
    }
}

impl MachineConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// CPU cycles in one video frame.
    pub fn cycles_per_frame(&self) -> u32 {
        self.cpu_clock_hz / self.frames_per_second.max(1)
    }
}
