//! Influence scoring.
//!
//! A single implementation of the platform's contribution-weighted score.
//! Per-category points accumulate from row counts, get weighted, and the
//! weighted sum is divided down to the displayed score:
//!
//! `total = floor((pubs*3000 + reviews*2000 + data*2500 + collab*1500 + gov*1000) / 10000)`
//!
//! The arithmetic here is load-bearing: clients display the exact same
//! numbers the leaderboard ranks by, so every path goes through
//! [`total_score`].

use serde::Serialize;

/// Points granted per contribution
pub mod points {
    pub const PUBLICATION_PUBLISHED: i64 = 100;
    pub const PUBLICATION_DRAFT: i64 = 20;
    pub const DATASET_UPLOADED: i64 = 80;
    pub const PROJECT_COMPLETED: i64 = 120;
    pub const PROJECT_ACTIVE: i64 = 50;
    pub const NFT_MINTED: i64 = 60;
    pub const COLLABORATION: i64 = 30;
    pub const GOVERNANCE_BASE: i64 = 50;
    pub const REVIEW: i64 = 40;
}

/// Category weights applied to accumulated points
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Weights {
    pub publication: i64,
    pub review: i64,
    pub data: i64,
    pub collaboration: i64,
    pub governance: i64,
}

pub const WEIGHTS: Weights = Weights {
    publication: 3000,
    review: 2000,
    data: 2500,
    collaboration: 1500,
    governance: 1000,
};

const SCORE_DIVISOR: i64 = 10_000;

/// Accumulated points per category for one user
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryScores {
    pub publications: i64,
    pub reviews: i64,
    pub datasets: i64,
    pub collaborations: i64,
    pub governance: i64,
}

impl CategoryScores {
    /// Start from the governance base every user gets
    pub fn base() -> Self {
        Self {
            governance: points::GOVERNANCE_BASE,
            ..Self::default()
        }
    }

    /// Derive the simulated review score from total contribution volume:
    /// one review per three contributions.
    pub fn set_simulated_reviews(&mut self, total_contributions: i64) {
        self.reviews = (total_contributions * 3 / 10) * points::REVIEW;
    }
}

/// Weighted total score. Integer division floors, which is exactly the
/// rounding clients expect.
pub fn total_score(scores: &CategoryScores) -> i64 {
    (scores.publications * WEIGHTS.publication
        + scores.reviews * WEIGHTS.review
        + scores.datasets * WEIGHTS.data
        + scores.collaborations * WEIGHTS.collaboration
        + scores.governance * WEIGHTS.governance)
        / SCORE_DIVISOR
}

/// Researcher level derived from the total score
#[derive(Debug, Clone, Serialize)]
pub struct Level {
    pub level: u8,
    pub name: &'static str,
    #[serde(rename = "nextLevelAt")]
    pub next_level_at: Option<i64>,
}

pub fn level_for(total_score: i64) -> Level {
    match total_score {
        s if s >= 1000 => Level { level: 5, name: "Research Leader", next_level_at: None },
        s if s >= 500 => Level { level: 4, name: "Senior Researcher", next_level_at: Some(1000) },
        s if s >= 200 => Level { level: 3, name: "Active Contributor", next_level_at: Some(500) },
        s if s >= 50 => Level { level: 2, name: "Contributor", next_level_at: Some(200) },
        _ => Level { level: 1, name: "Newcomer", next_level_at: Some(50) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference arithmetic: with p published publications, r reviews,
    /// d datasets and c collaborations the total must equal
    /// floor((100p*3000 + 40r*2000 + 80d*2500 + 30c*1500 + 50*1000)/10000).
    #[test]
    fn matches_reference_formula() {
        for (p, r, d, c) in [(0, 0, 0, 0), (1, 0, 0, 0), (3, 2, 5, 1), (10, 7, 4, 9)] {
            let scores = CategoryScores {
                publications: 100 * p,
                reviews: 40 * r,
                datasets: 80 * d,
                collaborations: 30 * c,
                governance: 50,
            };
            let expected =
                (100 * p * 3000 + 40 * r * 2000 + 80 * d * 2500 + 30 * c * 1500 + 50 * 1000)
                    / 10000;
            assert_eq!(total_score(&scores), expected, "p={p} r={r} d={d} c={c}");
        }
    }

    #[test]
    fn governance_base_alone_scores_five() {
        // 50 * 1000 / 10000 = 5
        assert_eq!(total_score(&CategoryScores::base()), 5);
    }

    #[test]
    fn simulated_reviews_floor() {
        let mut scores = CategoryScores::base();
        scores.set_simulated_reviews(5); // floor(5 * 0.3) = 1 review
        assert_eq!(scores.reviews, 40);
        scores.set_simulated_reviews(2); // floor(0.6) = 0
        assert_eq!(scores.reviews, 0);
        scores.set_simulated_reviews(10); // floor(3.0) = 3
        assert_eq!(scores.reviews, 120);
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(level_for(0).level, 1);
        assert_eq!(level_for(49).level, 1);
        assert_eq!(level_for(50).level, 2);
        assert_eq!(level_for(200).level, 3);
        assert_eq!(level_for(500).level, 4);
        assert_eq!(level_for(1200).level, 5);
        assert!(level_for(1200).next_level_at.is_none());
    }
}
