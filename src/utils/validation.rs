// file: src/utils/validation.rs
// description: coercion of analytical output into the prediction schema and fallback synthesis
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use crate::models::prediction::{
    COST_BOUNDS, DEFAULT_COST, DEFAULT_SCORE, DEFAULT_SETTLEMENT, DEFAULT_TIMELINE,
    MAX_LIST_ITEMS, SCORE_MAX, SCORE_MIN, SETTLEMENT_BOUNDS, TIMELINE_BOUNDS,
};
use crate::models::{Level, PredictionRecord, PredictionSource, Range};
use serde_json::Value;

static NULL_VALUE: Value = Value::Null;

/// Locally available signals used when no usable analytical output exists.
#[derive(Debug, Clone)]
pub struct FallbackSignals {
    pub complexity_score: Option<f64>,
    pub case_law_matches: usize,
    pub document_count: usize,
    pub high_complexity_threshold: f64,
    pub medium_complexity_threshold: f64,
}

impl Default for FallbackSignals {
    fn default() -> Self {
        Self {
            complexity_score: None,
            case_law_matches: 0,
            document_count: 0,
            high_complexity_threshold: 70.0,
            medium_complexity_threshold: 40.0,
        }
    }
}

impl FallbackSignals {
    pub fn risk_level(&self) -> Level {
        match self.complexity_score {
            None => Level::Medium,
            Some(score) if score > self.high_complexity_threshold => Level::High,
            Some(score) if score > self.medium_complexity_threshold => Level::Medium,
            Some(_) => Level::Low,
        }
    }
}

pub struct Validator;

impl Validator {
    /// Parses `value` as a float and clamps it to `[min, max]`; anything non-finite yields `default`.
    pub fn validate_numeric(value: &Value, default: f64, min: f64, max: f64) -> f64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };

        match Self::parse_number(value) {
            Some(number) => number.clamp(lo, hi),
            None => default,
        }
    }

    /// Case-insensitive membership check; returns the canonical allowed spelling.
    pub fn validate_enum(value: &Value, allowed: &[&str], default: &str) -> String {
        value
            .as_str()
            .map(str::trim)
            .and_then(|candidate| {
                allowed
                    .iter()
                    .find(|option| option.eq_ignore_ascii_case(candidate))
            })
            .map(|option| option.to_string())
            .unwrap_or_else(|| default.to_string())
    }

    /// Requires an object exposing both a low and a high bound (`min`/`max` or `low`/`high`).
    pub fn validate_range(value: &Value, default_min: f64, default_max: f64) -> Range {
        let Some(object) = value.as_object() else {
            return Range::new(default_min, default_max);
        };

        let low = object
            .get("min")
            .or_else(|| object.get("low"))
            .and_then(Self::parse_number);
        let high = object
            .get("max")
            .or_else(|| object.get("high"))
            .and_then(Self::parse_number);

        match (low, high) {
            (Some(low), Some(high)) => Range::new(low, high),
            _ => Range::new(default_min, default_max),
        }
    }

    /// Validates a range and clamps both bounds into `bounds`.
    pub fn validate_bounded_range(value: &Value, default: Range, bounds: (f64, f64)) -> Range {
        let range = Self::validate_range(value, default.min, default.max);
        Range::new(
            range.min.clamp(bounds.0, bounds.1),
            range.max.clamp(bounds.0, bounds.1),
        )
    }

    /// Accepts an array of scalars or a single string; blank entries are dropped.
    pub fn validate_string_list(value: &Value) -> Vec<String> {
        let items: Vec<String> = match value {
            Value::Array(values) => values
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
            Value::String(s) => vec![s.trim().to_string()],
            _ => Vec::new(),
        };

        items
            .into_iter()
            .filter(|item| !item.is_empty())
            .take(MAX_LIST_ITEMS)
            .collect()
    }

    /// Coerces a raw analytical payload into a complete record. Never fails.
    pub fn validate_prediction(raw: &Value, signals: &FallbackSignals) -> PredictionRecord {
        let fallback = Self::build_fallback_prediction(signals);

        let payload = match raw.get("prediction") {
            Some(inner) if inner.is_object() => inner,
            _ => raw,
        };

        if !payload.is_object() {
            return fallback;
        }

        let field = |name: &str| payload.get(name).unwrap_or(&NULL_VALUE);
        let score = |name: &str, default: f64| {
            Self::validate_numeric(field(name), default, SCORE_MIN, SCORE_MAX)
        };

        let risk_level = Level::from_name(&Self::validate_enum(
            field("risk_level"),
            &Level::NAMES,
            fallback.risk_level.as_str(),
        ))
        .unwrap_or(fallback.risk_level);

        let confidence = Level::from_name(&Self::validate_enum(
            field("confidence"),
            &Level::NAMES,
            Level::Low.as_str(),
        ))
        .unwrap_or(Level::Low);

        let key_factors = Self::validate_string_list(field("key_factors"));
        let risk_factors = Self::validate_string_list(field("risk_factors"));
        let recommendations = Self::validate_string_list(field("recommendations"));

        PredictionRecord {
            outcome_prediction_score: score(
                "outcome_prediction_score",
                fallback.outcome_prediction_score,
            ),
            settlement_probability: score("settlement_probability", fallback.settlement_probability),
            case_strength_score: score("case_strength_score", fallback.case_strength_score),
            evidence_strength_score: score(
                "evidence_strength_score",
                fallback.evidence_strength_score,
            ),
            precedent_alignment_score: score(
                "precedent_alignment_score",
                fallback.precedent_alignment_score,
            ),
            judge_favorability_score: score(
                "judge_favorability_score",
                fallback.judge_favorability_score,
            ),
            complexity_score: score("complexity_score", fallback.complexity_score),
            risk_level,
            confidence,
            estimated_timeline_months: Self::validate_bounded_range(
                field("estimated_timeline_months"),
                fallback.estimated_timeline_months,
                TIMELINE_BOUNDS,
            ),
            estimated_cost: Self::validate_bounded_range(
                field("estimated_cost"),
                fallback.estimated_cost,
                COST_BOUNDS,
            ),
            settlement_range: Self::validate_bounded_range(
                field("settlement_range"),
                fallback.settlement_range,
                SETTLEMENT_BOUNDS,
            ),
            similar_cases_count: Self::validate_numeric(
                field("similar_cases_count"),
                fallback.similar_cases_count as f64,
                0.0,
                u32::MAX as f64,
            ) as u32,
            key_factors: if key_factors.is_empty() {
                fallback.key_factors
            } else {
                key_factors
            },
            risk_factors,
            recommendations: if recommendations.is_empty() {
                fallback.recommendations
            } else {
                recommendations
            },
            reasoning: field("reasoning")
                .as_str()
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            source: PredictionSource::Analysis,
        }
    }

    /// Builds a complete record from local signals only.
    pub fn build_fallback_prediction(signals: &FallbackSignals) -> PredictionRecord {
        let complexity = signals
            .complexity_score
            .filter(|score| score.is_finite())
            .map(|score| score.clamp(SCORE_MIN, SCORE_MAX))
            .unwrap_or(DEFAULT_SCORE);
        let risk_level = signals.risk_level();
        let has_precedent = signals.case_law_matches > 0;

        let (timeline, cost) = match risk_level {
            Level::High => ((12.0, 36.0), (50_000.0, 250_000.0)),
            Level::Medium => (DEFAULT_TIMELINE, DEFAULT_COST),
            Level::Low => ((3.0, 12.0), (5_000.0, 25_000.0)),
        };

        let mut risk_factors = Vec::new();
        if risk_level == Level::High {
            risk_factors.push("High case complexity".to_string());
        }
        if !has_precedent {
            risk_factors.push("No comparable case law located".to_string());
        }
        if signals.document_count == 0 {
            risk_factors.push("No extracted case documents".to_string());
        }

        PredictionRecord {
            outcome_prediction_score: DEFAULT_SCORE,
            settlement_probability: DEFAULT_SCORE,
            case_strength_score: DEFAULT_SCORE,
            evidence_strength_score: if signals.document_count > 0 { DEFAULT_SCORE } else { 30.0 },
            precedent_alignment_score: if has_precedent { 55.0 } else { 40.0 },
            judge_favorability_score: DEFAULT_SCORE,
            complexity_score: complexity,
            risk_level,
            confidence: Level::Low,
            estimated_timeline_months: Range::from_pair(timeline),
            estimated_cost: Range::from_pair(cost),
            settlement_range: Range::from_pair(DEFAULT_SETTLEMENT),
            similar_cases_count: u32::try_from(signals.case_law_matches).unwrap_or(u32::MAX),
            key_factors: vec!["Derived from case metadata without automated analysis".to_string()],
            risk_factors,
            recommendations: vec!["Re-run the analysis once the analysis service recovers".to_string()],
            reasoning: "Fallback prediction generated from locally available signals".to_string(),
            source: PredictionSource::Fallback,
        }
    }

    pub fn validate_identifier(value: &str, what: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(PipelineError::Validation(format!("{} cannot be empty", what)));
        }

        if value.chars().any(|c| c.is_control() || c == '/') {
            return Err(PipelineError::Validation(format!(
                "{} contains invalid characters: {:?}",
                what, value
            )));
        }

        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PipelineError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            None => text.to_string(),
            Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        }
    }

    fn parse_number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        }?;

        number.is_finite().then_some(number)
    }
}
