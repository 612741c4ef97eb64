use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Gaps longer than this count against fluency.
pub const LONG_PAUSE_MS: f64 = 1000.0;

const DEFAULT_VELOCITY: u8 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedNote {
    pub pitch: u8,
    #[serde(default)]
    pub velocity: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteMismatch {
    WrongNote { pitch: u8, at_ms: f64 },
    Missed { pitch: u8, expected_ms: f64 },
}

/// One completed take: what was played, when, and what went wrong.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSession {
    pub notes: Vec<PlayedNote>,
    /// Note-on times in ms, ordered.
    pub timing: Vec<f64>,
    pub duration: f64,
    pub errors: Vec<NoteMismatch>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub consistency: f64,
    pub tempo: f64,
    pub stability: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TechniqueMetrics {
    pub fluency: f64,
    pub evenness: f64,
    pub control: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub timing: TimingMetrics,
    pub technique: TechniqueMetrics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementTag {
    Tempo,
    Accuracy,
    Consistency,
    Stability,
    Fluency,
    Evenness,
    Control,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeTag {
    HighErrorRate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metrics: Metrics,
    pub duration: f64,
    pub improvements: BTreeSet<ImprovementTag>,
    pub challenges: BTreeSet<ChallengeTag>,
}

/// Decides which aspects of a take count as improvements.
pub trait ImprovementDetector: Send + Sync {
    fn detect(&self, session: &PracticeSession, metrics: &Metrics) -> BTreeSet<ImprovementTag>;
}

/// Always reports `tempo` and `accuracy`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderImprovements;

impl ImprovementDetector for PlaceholderImprovements {
    fn detect(&self, _session: &PracticeSession, _metrics: &Metrics) -> BTreeSet<ImprovementTag> {
        BTreeSet::from([ImprovementTag::Tempo, ImprovementTag::Accuracy])
    }
}

/// Tags every metric that beats a previous take.
#[derive(Clone, Copy, Debug)]
pub struct BaselineComparison {
    pub baseline: Metrics,
}

impl BaselineComparison {
    pub fn new(baseline: Metrics) -> Self {
        Self { baseline }
    }
}

impl ImprovementDetector for BaselineComparison {
    fn detect(&self, _session: &PracticeSession, metrics: &Metrics) -> BTreeSet<ImprovementTag> {
        let base = &self.baseline;
        let pairs = [
            (ImprovementTag::Accuracy, metrics.accuracy, base.accuracy),
            (
                ImprovementTag::Consistency,
                metrics.timing.consistency,
                base.timing.consistency,
            ),
            (
                ImprovementTag::Stability,
                metrics.timing.stability,
                base.timing.stability,
            ),
            (
                ImprovementTag::Fluency,
                metrics.technique.fluency,
                base.technique.fluency,
            ),
            (
                ImprovementTag::Evenness,
                metrics.technique.evenness,
                base.technique.evenness,
            ),
            (
                ImprovementTag::Control,
                metrics.technique.control,
                base.technique.control,
            ),
        ];

        let mut tags: BTreeSet<ImprovementTag> = pairs
            .into_iter()
            .filter(|(_, now, before)| now > before)
            .map(|(tag, _, _)| tag)
            .collect();
        // Faster is only better when it is also steadier.
        if base.timing.tempo > 0.0
            && metrics.timing.tempo > base.timing.tempo
            && metrics.timing.stability >= base.timing.stability
        {
            tags.insert(ImprovementTag::Tempo);
        }
        tags
    }
}

pub struct PerformanceAnalyzer {
    detector: Box<dyn ImprovementDetector>,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceAnalyzer {
    pub fn new() -> Self {
        Self::with_detector(Box::new(PlaceholderImprovements))
    }

    pub fn with_detector(detector: Box<dyn ImprovementDetector>) -> Self {
        Self { detector }
    }

    /// Computes every metric for a finished take. Never fails; degenerate
    /// input yields the documented fallback values.
    pub fn analyze(&self, session: &PracticeSession) -> AnalysisResult {
        let intervals = intervals(&session.timing);
        let metrics = Metrics {
            accuracy: accuracy(session.notes.len(), session.errors.len()),
            timing: TimingMetrics {
                consistency: consistency(&intervals),
                tempo: tempo_bpm(&intervals),
                stability: stability(&intervals),
            },
            technique: TechniqueMetrics {
                fluency: fluency(&intervals),
                evenness: evenness(&intervals),
                control: control(&session.notes),
            },
        };

        let mut challenges = BTreeSet::new();
        if session.errors.len() as f64 > session.notes.len() as f64 * 0.3 {
            challenges.insert(ChallengeTag::HighErrorRate);
        }

        AnalysisResult {
            improvements: self.detector.detect(session, &metrics),
            metrics,
            duration: session.duration,
            challenges,
        }
    }
}

fn intervals(timing: &[f64]) -> Vec<f64> {
    timing.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn variance(values: &[f64]) -> f64 {
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn accuracy(notes: usize, errors: usize) -> f64 {
    if notes == 0 {
        return 0.0;
    }
    ((notes as f64 - errors as f64) / notes as f64).clamp(0.0, 1.0)
}

fn consistency(intervals: &[f64]) -> f64 {
    let Some(avg) = mean(intervals) else {
        return 0.0;
    };
    let deviations: Vec<f64> = intervals.iter().map(|i| (i - avg).abs()).collect();
    let avg_deviation = mean(&deviations).unwrap_or(0.0);
    let value = 1.0 - avg_deviation / avg;
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn tempo_bpm(intervals: &[f64]) -> f64 {
    mean(intervals).map_or(0.0, |avg| finite_or_zero(60_000.0 / avg))
}

fn stability(intervals: &[f64]) -> f64 {
    if intervals.len() < 2 {
        return 1.0;
    }
    let changes: Vec<f64> = intervals
        .windows(2)
        .map(|pair| {
            let denom = if pair[0] == 0.0 { 1.0 } else { pair[0] };
            (pair[1] - pair[0]).abs() / denom
        })
        .collect();
    let avg_change = mean(&changes).unwrap_or(0.0);
    (1.0 - avg_change).max(0.0)
}

fn fluency(gaps: &[f64]) -> f64 {
    if gaps.is_empty() {
        return 0.0;
    }
    let long_pauses = gaps.iter().filter(|gap| **gap > LONG_PAUSE_MS).count();
    (1.0 - long_pauses as f64 / gaps.len() as f64).max(0.0)
}

fn evenness(intervals: &[f64]) -> f64 {
    if intervals.len() < 2 {
        return 1.0;
    }
    let avg = mean(intervals).unwrap_or(0.0);
    let denom = avg * avg;
    let denom = if denom == 0.0 { 1.0 } else { denom };
    (1.0 - variance(intervals) / denom).max(0.0)
}

fn control(notes: &[PlayedNote]) -> f64 {
    let velocities = notes
        .iter()
        .map(|note| note.velocity.filter(|v| *v > 0).unwrap_or(DEFAULT_VELOCITY));
    let (Some(lo), Some(hi)) = (velocities.clone().min(), velocities.max()) else {
        return 1.0;
    };
    (f64::from(hi - lo) / 127.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_timing_sample_has_no_intervals() {
        assert!(intervals(&[42.0]).is_empty());
        assert_eq!(consistency(&[]), 0.0);
        assert_eq!(tempo_bpm(&[]), 0.0);
    }

    #[test]
    fn zero_intervals_do_not_divide_by_zero() {
        let gaps = [0.0, 0.0, 0.0];
        assert_eq!(consistency(&gaps), 0.0);
        assert_eq!(tempo_bpm(&gaps), 0.0);
        assert_eq!(stability(&gaps), 1.0);
        assert_eq!(evenness(&gaps), 1.0);
    }

    #[test]
    fn missing_velocity_counts_as_mezzo_forte() {
        let notes = [
            PlayedNote {
                pitch: 60,
                velocity: None,
            },
            PlayedNote {
                pitch: 62,
                velocity: Some(127),
            },
        ];
        assert_eq!(control(&notes), 63.0 / 127.0);
    }
}
