//! # Trend Analysis Input
//!
//! Validated planner input. Each field is deserialized on its own so the first
//! missing or mistyped field is reported by name as a [`CoreError::Validation`]
//! before any action is derived.

use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for CompetitionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for CompetitionLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid competition level: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub engagement_rate: f64,
    pub audience_size: u64,
    pub content_types: Vec<String>,
    pub competition_level: CompetitionLevel,
    #[serde(default)]
    pub sentiment: f64,
    #[serde(default)]
    pub trending_topics: Vec<String>,
    #[serde(default)]
    pub peak_hours: Vec<u8>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl TrendAnalysis {
    /// Parse and validate a camelCase JSON analysis
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| CoreError::validation("analysis", "expected a JSON object"))?;

        let analysis = Self {
            engagement_rate: required(object, "engagementRate")?,
            audience_size: required(object, "audienceSize")?,
            content_types: required(object, "contentTypes")?,
            competition_level: required(object, "competitionLevel")?,
            sentiment: optional(object, "sentiment")?.unwrap_or(0.0),
            trending_topics: optional(object, "trendingTopics")?.unwrap_or_default(),
            peak_hours: optional(object, "peakHours")?.unwrap_or_default(),
            platform: optional(object, "platform")?,
        };
        analysis.validate()?;
        Ok(analysis)
    }

    /// Range checks for an already-typed analysis
    pub fn validate(&self) -> Result<()> {
        if !self.engagement_rate.is_finite() || !(0.0..=1.0).contains(&self.engagement_rate) {
            return Err(CoreError::validation(
                "engagementRate",
                format!("must be within [0, 1], got {}", self.engagement_rate),
            ));
        }
        if !self.sentiment.is_finite() || !(-1.0..=1.0).contains(&self.sentiment) {
            return Err(CoreError::validation(
                "sentiment",
                format!("must be within [-1, 1], got {}", self.sentiment),
            ));
        }
        if let Some(hour) = self.peak_hours.iter().find(|hour| **hour > 23) {
            return Err(CoreError::validation(
                "peakHours",
                format!("hour {hour} is outside 0-23"),
            ));
        }
        Ok(())
    }

    pub fn is_high_competition(&self) -> bool {
        self.competition_level == CompetitionLevel::High
    }
}

/// Deserialize one field, treating `null` as absent
fn optional<T: DeserializeOwned>(object: &Map<String, Value>, field: &str) -> Result<Option<T>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| CoreError::validation(field, e.to_string())),
    }
}

fn required<T: DeserializeOwned>(object: &Map<String, Value>, field: &str) -> Result<T> {
    optional(object, field)?.ok_or_else(|| CoreError::validation(field, "is required"))
}
