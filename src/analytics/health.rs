//! Health scoring.
//!
//! Maps metric averages onto threshold bands and combines them with a
//! session-stability term into a single 0-100 score.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::{MetricSample, MetricType};

/// Score assigned to values beyond the `poor` threshold.
const BEYOND_POOR_SCORE: u8 = 20;

const FPS_WEIGHT: f64 = 0.4;
const MEMORY_WEIGHT: f64 = 0.25;
const LOAD_TIME_WEIGHT: f64 = 0.25;
const STABILITY_WEIGHT: f64 = 0.1;

/// Ordered band thresholds for one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
    pub lower_is_better: bool,
}

pub const FPS_BANDS: Bands = Bands {
    excellent: 55.0,
    good: 45.0,
    fair: 30.0,
    poor: 20.0,
    lower_is_better: false,
};

/// Memory usage in MB.
pub const MEMORY_BANDS: Bands = Bands {
    excellent: 200.0,
    good: 400.0,
    fair: 600.0,
    poor: 800.0,
    lower_is_better: true,
};

/// Load time in milliseconds.
pub const LOAD_TIME_BANDS: Bands = Bands {
    excellent: 1000.0,
    good: 2000.0,
    fair: 3000.0,
    poor: 5000.0,
    lower_is_better: true,
};

/// Metrics that take part in health scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoredMetric {
    Fps,
    Memory,
    LoadTime,
}

impl ScoredMetric {
    pub fn bands(self) -> Bands {
        match self {
            Self::Fps => FPS_BANDS,
            Self::Memory => MEMORY_BANDS,
            Self::LoadTime => LOAD_TIME_BANDS,
        }
    }

    /// Stored metric type this score is computed from.
    pub fn metric_type(self) -> MetricType {
        match self {
            Self::Fps => MetricType::Fps,
            Self::Memory => MetricType::MemoryUsage,
            Self::LoadTime => MetricType::LoadTime,
        }
    }
}

impl Bands {
    /// Band score: 100 (excellent), 80, 60, 40 (poor), 20 beyond poor.
    pub fn score(&self, value: f64) -> u8 {
        let within = |threshold: f64| {
            if self.lower_is_better {
                value <= threshold
            } else {
                value >= threshold
            }
        };
        if within(self.excellent) {
            100
        } else if within(self.good) {
            80
        } else if within(self.fair) {
            60
        } else if within(self.poor) {
            40
        } else {
            BEYOND_POOR_SCORE
        }
    }
}

/// Score a single metric value against its bands.
pub fn calculate_metric_score(metric: ScoredMetric, value: f64) -> u8 {
    metric.bands().score(value)
}

/// Letter grade for a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Self::A,
            80..=89 => Self::B,
            70..=79 => Self::C,
            60..=69 => Self::D,
            _ => Self::F,
        }
    }
}

/// Averages feeding the health score. `None` means no samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub fps: Option<f64>,
    pub memory: Option<f64>,
    pub load_time: Option<f64>,
}

impl MetricAverages {
    /// Average the fps, memory and load-time samples in `metrics`.
    pub fn from_samples(metrics: &[MetricSample]) -> Self {
        let average = |metric_type: MetricType| {
            let (sum, count) = metrics
                .iter()
                .filter(|m| m.metric_type == metric_type && m.value.is_finite())
                .fold((0.0, 0usize), |(sum, count), m| (sum + m.value, count + 1));
            (count > 0).then(|| sum / count as f64)
        };
        Self {
            fps: average(MetricType::Fps),
            memory: average(MetricType::MemoryUsage),
            load_time: average(MetricType::LoadTime),
        }
    }

    fn get(&self, metric: ScoredMetric) -> Option<f64> {
        match metric {
            ScoredMetric::Fps => self.fps,
            ScoredMetric::Memory => self.memory,
            ScoredMetric::LoadTime => self.load_time,
        }
    }
}

/// Health score with its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    pub overall: u8,
    pub grade: Grade,
    pub fps_score: u8,
    pub memory_score: u8,
    pub load_time_score: u8,
    pub stability_score: u8,
    pub averages: MetricAverages,
}

/// Stability: `min(100, sessions / max(days, 1) * 10)`.
pub fn stability_score(total_sessions: u64, days_since_first_seen: u64) -> f64 {
    let days = days_since_first_seen.max(1) as f64;
    (total_sessions as f64 / days * 10.0).min(100.0)
}

/// Full score breakdown from precomputed averages.
///
/// A metric without samples scores 0 and still carries its weight, so
/// sparse data pulls the overall score down.
pub fn score_breakdown(
    averages: MetricAverages,
    total_sessions: u64,
    days_since_first_seen: u64,
) -> PerformanceScore {
    let component = |metric: ScoredMetric| {
        averages
            .get(metric)
            .map_or(0, |avg| calculate_metric_score(metric, avg))
    };
    let fps_score = component(ScoredMetric::Fps);
    let memory_score = component(ScoredMetric::Memory);
    let load_time_score = component(ScoredMetric::LoadTime);
    let stability = stability_score(total_sessions, days_since_first_seen);

    let weighted = f64::from(fps_score) * FPS_WEIGHT
        + f64::from(memory_score) * MEMORY_WEIGHT
        + f64::from(load_time_score) * LOAD_TIME_WEIGHT
        + stability * STABILITY_WEIGHT;
    let overall = weighted.clamp(0.0, 100.0).round() as u8;

    PerformanceScore {
        overall,
        grade: Grade::from_score(overall),
        fps_score,
        memory_score,
        load_time_score,
        stability_score: stability.round() as u8,
        averages,
    }
}

/// Integer health score in [0, 100] for a set of recent samples.
pub fn calculate_health_score(
    metrics: &[MetricSample],
    total_sessions: u64,
    days_since_first_seen: u64,
) -> u8 {
    score_breakdown(
        MetricAverages::from_samples(metrics),
        total_sessions,
        days_since_first_seen,
    )
    .overall
}
