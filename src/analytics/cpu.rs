//! Heuristic CPU-usage inference.
//!
//! Upstream telemetry does not report CPU usage directly on every platform,
//! so it is estimated from frame rate, memory pressure and load time,
//! adjusted for the device class. There is no ground-truth calibration;
//! the validation record reports how plausible the inputs were.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

const TARGET_FPS: f64 = 60.0;
const FPS_WEIGHT: f64 = 45.0;
const MEMORY_WEIGHT: f64 = 20.0;
const LOAD_WEIGHT: f64 = 15.0;
const LOAD_CEILING_MS: f64 = 5_000.0;

/// Device class derived from a free-form device-type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClass {
    LowEnd,
    MidRange,
    HighEnd,
    Unknown,
}

impl DeviceClass {
    /// Classify a device-type label by keyword.
    pub fn from_label(label: Option<&str>) -> Self {
        let Some(label) = label.map(str::to_ascii_lowercase) else {
            return Self::Unknown;
        };
        let has = |words: &[&str]| words.iter().any(|w| label.contains(w));

        if has(&["low", "budget", "entry"]) {
            Self::LowEnd
        } else if has(&["high", "flagship", "pro", "max", "ultra"]) {
            Self::HighEnd
        } else if has(&["mid", "standard", "tablet", "phone", "desktop"]) {
            Self::MidRange
        } else {
            Self::Unknown
        }
    }

    /// Idle CPU baseline for the class, in percent.
    fn baseline(self) -> f64 {
        match self {
            Self::LowEnd => 25.0,
            Self::MidRange | Self::Unknown => 15.0,
            Self::HighEnd => 8.0,
        }
    }

    /// Memory budget (MB) beyond which the device is under pressure.
    fn memory_budget_mb(self) -> f64 {
        match self {
            Self::LowEnd => 1_024.0,
            Self::MidRange | Self::Unknown => 2_048.0,
            Self::HighEnd => 4_096.0,
        }
    }
}

/// Qualitative CPU grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CpuGrade {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl CpuGrade {
    pub fn from_percent(percent: f64) -> Self {
        if percent <= 30.0 {
            Self::Excellent
        } else if percent <= 50.0 {
            Self::Good
        } else if percent <= 70.0 {
            Self::Fair
        } else if percent <= 85.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

/// Inputs to CPU inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInputs {
    pub fps: f64,
    /// Memory usage in MB.
    pub memory_mb: f64,
    /// Load time in milliseconds.
    pub load_time_ms: f64,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Plausibility record for an inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuValidation {
    /// 0-1; each warning costs 0.2, floor 0.1.
    pub confidence: f64,
    pub is_realistic: bool,
    pub warnings: Vec<String>,
}

/// Inferred CPU usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInference {
    pub cpu_percent: f64,
    pub grade: CpuGrade,
    pub device_class: DeviceClass,
    pub validation: CpuValidation,
}

/// Infer CPU usage from rendering and memory signals.
///
/// Deterministic: identical inputs give identical output.
pub fn infer_cpu_usage(inputs: &CpuInputs) -> CpuInference {
    let device_class = DeviceClass::from_label(inputs.device_type.as_deref());
    let fps = finite_or_zero(inputs.fps);
    let memory = finite_or_zero(inputs.memory_mb);
    let load = finite_or_zero(inputs.load_time_ms);

    let fps_pressure = (TARGET_FPS - fps).clamp(0.0, TARGET_FPS) / TARGET_FPS * FPS_WEIGHT;
    let memory_pressure = (memory / device_class.memory_budget_mb()).clamp(0.0, 1.5) * MEMORY_WEIGHT;
    let load_pressure = (load / LOAD_CEILING_MS).clamp(0.0, 1.0) * LOAD_WEIGHT;

    let raw = device_class.baseline() + fps_pressure + memory_pressure + load_pressure;
    let cpu_percent = (raw.clamp(1.0, 100.0) * 10.0).round() / 10.0;

    let mut warnings = Vec::new();
    if !inputs.fps.is_finite() || inputs.fps <= 0.0 || inputs.fps > 144.0 {
        warnings.push(format!("implausible frame rate: {}", inputs.fps));
    }
    if !inputs.memory_mb.is_finite() || inputs.memory_mb <= 0.0 || inputs.memory_mb > 16_384.0 {
        warnings.push(format!("implausible memory usage: {} MB", inputs.memory_mb));
    }
    if !inputs.load_time_ms.is_finite() || inputs.load_time_ms < 0.0 || inputs.load_time_ms > 60_000.0 {
        warnings.push(format!("implausible load time: {} ms", inputs.load_time_ms));
    }
    if device_class == DeviceClass::Unknown {
        warnings.push("unknown device type, using mid-range profile".to_string());
    }
    if raw > 100.0 {
        warnings.push("estimate saturated at 100%".to_string());
    }

    let is_realistic = warnings.iter().all(|w| !w.starts_with("implausible"));
    let confidence = (1.0 - 0.2 * warnings.len() as f64).max(0.1);

    CpuInference {
        cpu_percent,
        grade: CpuGrade::from_percent(cpu_percent),
        device_class,
        validation: CpuValidation {
            confidence,
            is_realistic,
            warnings,
        },
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(fps: f64, memory_mb: f64, load_time_ms: f64, device: &str) -> CpuInputs {
        CpuInputs {
            fps,
            memory_mb,
            load_time_ms,
            device_type: Some(device.to_string()),
        }
    }

    #[test]
    fn test_device_classification() {
        assert_eq!(DeviceClass::from_label(Some("Budget Android")), DeviceClass::LowEnd);
        assert_eq!(DeviceClass::from_label(Some("iPhone 15 Pro")), DeviceClass::HighEnd);
        assert_eq!(DeviceClass::from_label(Some("tablet")), DeviceClass::MidRange);
        assert_eq!(DeviceClass::from_label(Some("toaster")), DeviceClass::Unknown);
        assert_eq!(DeviceClass::from_label(None), DeviceClass::Unknown);
    }

    #[test]
    fn test_smooth_high_end_is_excellent() {
        let result = infer_cpu_usage(&inputs(60.0, 512.0, 800.0, "flagship"));
        // 8 + 0 + 2.5 + 2.4
        assert_eq!(result.cpu_percent, 12.9);
        assert_eq!(result.grade, CpuGrade::Excellent);
        assert!(result.validation.is_realistic);
        assert_eq!(result.validation.confidence, 1.0);
    }

    #[test]
    fn test_struggling_low_end_is_critical() {
        let result = infer_cpu_usage(&inputs(15.0, 1_536.0, 6_000.0, "low-end"));
        // 25 + 33.75 + 30 + 15
        assert_eq!(result.cpu_percent, 100.0);
        assert_eq!(result.grade, CpuGrade::Critical);
        assert!(result.validation.warnings.iter().any(|w| w.contains("saturated")));
    }

    #[test]
    fn test_implausible_inputs_lower_confidence() {
        let result = infer_cpu_usage(&CpuInputs {
            fps: -1.0,
            memory_mb: 0.0,
            load_time_ms: f64::NAN,
            device_type: None,
        });
        assert!(!result.validation.is_realistic);
        assert_eq!(result.validation.warnings.len(), 4);
        assert!((result.validation.confidence - 0.2).abs() < 1e-9);
        assert!(result.cpu_percent >= 1.0 && result.cpu_percent <= 100.0);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let a = infer_cpu_usage(&inputs(42.0, 900.0, 2_500.0, "phone"));
        let b = infer_cpu_usage(&inputs(42.0, 900.0, 2_500.0, "phone"));
        assert_eq!(a, b);
    }
}
