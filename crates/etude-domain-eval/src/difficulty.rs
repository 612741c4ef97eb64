use crate::analyzer::AnalysisResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Challenge,
    Song,
    Practice,
    Technique,
    Basics,
    Fundamentals,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub name: String,
    pub difficulty: DifficultyTier,
}

impl Recommendation {
    fn new(kind: RecommendationKind, name: &str, difficulty: DifficultyTier) -> Self {
        Self {
            kind,
            name: name.to_string(),
            difficulty,
        }
    }
}

/// Maps an analysis onto one of three fixed recommendation tiers.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdaptiveDifficulty;

impl AdaptiveDifficulty {
    pub fn overall_score(result: &AnalysisResult) -> f64 {
        (result.metrics.accuracy + result.metrics.timing.consistency) / 2.0
    }

    pub fn tier(result: &AnalysisResult) -> DifficultyTier {
        let score = Self::overall_score(result);
        if score > 0.9 {
            DifficultyTier::Hard
        } else if score > 0.7 {
            DifficultyTier::Medium
        } else {
            DifficultyTier::Easy
        }
    }

    pub fn recommendations(&self, result: &AnalysisResult) -> Vec<Recommendation> {
        use RecommendationKind::*;
        let tier = Self::tier(result);
        match tier {
            DifficultyTier::Hard => vec![
                Recommendation::new(Challenge, "Increase tempo by 10%", tier),
                Recommendation::new(Song, "Advanced piece suggestion", tier),
            ],
            DifficultyTier::Medium => vec![
                Recommendation::new(Practice, "Maintain current level", tier),
                Recommendation::new(Technique, "Focus on expression", tier),
            ],
            DifficultyTier::Easy => vec![
                Recommendation::new(Basics, "Slow practice recommended", tier),
                Recommendation::new(Fundamentals, "Review basics", tier),
            ],
        }
    }
}
