// file: src/models/prediction.rs
// description: bounded prediction/risk profile produced at the end of the pipeline
// reference: fixed-shape record with documented ranges for every field

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;
pub const DEFAULT_SCORE: f64 = 50.0;

pub const TIMELINE_BOUNDS: (f64, f64) = (1.0, 120.0);
pub const DEFAULT_TIMELINE: (f64, f64) = (6.0, 18.0);
pub const COST_BOUNDS: (f64, f64) = (0.0, 10_000_000.0);
pub const DEFAULT_COST: (f64, f64) = (10_000.0, 50_000.0);
pub const SETTLEMENT_BOUNDS: (f64, f64) = (0.0, 100_000_000.0);
pub const DEFAULT_SETTLEMENT: (f64, f64) = (0.0, 0.0);

pub const MAX_LIST_ITEMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub const NAMES: [&'static str; 3] = ["low", "medium", "high"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" => Some(Level::Low),
            "medium" => Some(Level::Medium),
            "high" => Some(Level::High),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a prediction came from. Consumers treat both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Analysis,
    Fallback,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Analysis => "analysis",
            PredictionSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_pair(pair: (f64, f64)) -> Self {
        Self::new(pair.0, pair.1)
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn within(&self, bounds: (f64, f64)) -> bool {
        self.min >= bounds.0 && self.max <= bounds.1 && self.min <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub outcome_prediction_score: f64,
    pub settlement_probability: f64,
    pub case_strength_score: f64,
    pub evidence_strength_score: f64,
    pub precedent_alignment_score: f64,
    pub judge_favorability_score: f64,
    pub complexity_score: f64,
    pub risk_level: Level,
    pub confidence: Level,
    pub estimated_timeline_months: Range,
    pub estimated_cost: Range,
    pub settlement_range: Range,
    pub similar_cases_count: u32,
    pub key_factors: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub reasoning: String,
    pub source: PredictionSource,
}

impl PredictionRecord {
    pub fn scores(&self) -> [(&'static str, f64); 7] {
        [
            ("outcome_prediction_score", self.outcome_prediction_score),
            ("settlement_probability", self.settlement_probability),
            ("case_strength_score", self.case_strength_score),
            ("evidence_strength_score", self.evidence_strength_score),
            ("precedent_alignment_score", self.precedent_alignment_score),
            ("judge_favorability_score", self.judge_favorability_score),
            ("complexity_score", self.complexity_score),
        ]
    }

    /// True when every field sits inside its documented bound.
    pub fn is_within_bounds(&self) -> bool {
        let scores_ok = self
            .scores()
            .iter()
            .all(|(_, score)| score.is_finite() && (SCORE_MIN..=SCORE_MAX).contains(score));

        let lists_ok = [&self.key_factors, &self.risk_factors, &self.recommendations]
            .iter()
            .all(|list| list.len() <= MAX_LIST_ITEMS);

        scores_ok
            && lists_ok
            && self.estimated_timeline_months.within(TIMELINE_BOUNDS)
            && self.estimated_cost.within(COST_BOUNDS)
            && self.settlement_range.within(SETTLEMENT_BOUNDS)
    }
}

/// Stored form of a prediction, one per case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRow {
    pub case_id: String,
    pub prediction: PredictionRecord,
    pub updated_at: DateTime<Utc>,
}
