//! Scoring formulas and team-points utilities called by the scoreboard
//! projections. All pure; the hub itself never scores anything.

use crate::athlete::Gender;
use itertools::Itertools;
use serde::Serialize;

/// Which Sinclair coefficient cycle to use. The federation republishes
/// the coefficients each Olympic cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SinclairEra {
    Y2020,
    #[default]
    Y2024,
}

struct SinclairCoefficients {
    a: f64,
    b: f64,
}

fn sinclair_coefficients(era: SinclairEra, gender: Gender) -> SinclairCoefficients {
    match (era, gender) {
        (SinclairEra::Y2020, Gender::M) => SinclairCoefficients {
            a: 0.751945030,
            b: 175.508,
        },
        (SinclairEra::Y2020, Gender::F) => SinclairCoefficients {
            a: 0.783497476,
            b: 153.655,
        },
        (SinclairEra::Y2024, Gender::M) => SinclairCoefficients {
            a: 0.722762521,
            b: 193.609,
        },
        (SinclairEra::Y2024, Gender::F) => SinclairCoefficients {
            a: 0.787004341,
            b: 153.757,
        },
    }
}

/// Sinclair points: the total scaled to what the lifter would total at
/// the reference body weight. Lifters at or above the reference weight
/// score their raw total.
pub fn sinclair(total: f64, body_weight: f64, gender: Gender, era: SinclairEra) -> f64 {
    if total <= 0.0 || body_weight <= 0.0 {
        return 0.0;
    }
    let c = sinclair_coefficients(era, gender);
    if body_weight >= c.b {
        return total;
    }
    let x = (body_weight / c.b).log10();
    total * 10f64.powf(c.a * x * x)
}

struct QPointsCoefficients {
    scale: f64,
    span: f64,
    decay: f64,
}

fn qpoints_coefficients(gender: Gender) -> QPointsCoefficients {
    match gender {
        Gender::M => QPointsCoefficients {
            scale: 463.27,
            span: 372.84,
            decay: 0.01685,
        },
        Gender::F => QPointsCoefficients {
            scale: 306.54,
            span: 241.65,
            decay: 0.01883,
        },
    }
}

/// Q-points: a body-weight normalization with a saturating exponential
/// denominator, flatter than Sinclair at the heavy end.
pub fn qpoints(total: f64, body_weight: f64, gender: Gender) -> f64 {
    if total <= 0.0 || body_weight <= 0.0 {
        return 0.0;
    }
    let c = qpoints_coefficients(gender);
    let denominator = c.scale - c.span * (-c.decay * body_weight).exp();
    total * c.scale / denominator
}

/// Anchor points for the masters age multiplier, every five years from
/// age 30. Linear interpolation between anchors, clamped at both ends.
const MASTERS_FACTORS_M: [(i32, f64); 11] = [
    (30, 1.000),
    (35, 1.023),
    (40, 1.068),
    (45, 1.131),
    (50, 1.211),
    (55, 1.315),
    (60, 1.443),
    (65, 1.603),
    (70, 1.803),
    (75, 2.058),
    (80, 2.390),
];

const MASTERS_FACTORS_F: [(i32, f64); 11] = [
    (30, 1.000),
    (35, 1.032),
    (40, 1.085),
    (45, 1.158),
    (50, 1.254),
    (55, 1.378),
    (60, 1.535),
    (65, 1.734),
    (70, 1.988),
    (75, 2.316),
    (80, 2.749),
];

/// Age multiplier for masters lifters; 1.0 for anyone under 30.
pub fn masters_factor(age: i32, gender: Gender) -> f64 {
    let table = match gender {
        Gender::M => &MASTERS_FACTORS_M,
        Gender::F => &MASTERS_FACTORS_F,
    };
    if age <= table[0].0 {
        return table[0].1;
    }
    let (last_age, last_factor) = table[table.len() - 1];
    if age >= last_age {
        return last_factor;
    }
    for window in table.windows(2) {
        let (a0, f0) = window[0];
        let (a1, f1) = window[1];
        if age < a1 {
            let t = (age - a0) as f64 / (a1 - a0) as f64;
            return f0 + t * (f1 - f0);
        }
    }
    last_factor
}

/// The age-adjusted variant: Q-points times the masters multiplier.
pub fn age_adjusted_qpoints(total: f64, body_weight: f64, gender: Gender, age: i32) -> f64 {
    qpoints(total, body_weight, gender) * masters_factor(age, gender)
}

/// Points awarded per category scale: first three ranks from the scale,
/// then one point less per place below third, floored at zero. Rank 0
/// means unranked (e.g. a zero-lift athlete) and scores nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeamPointsScale {
    pub first: u32,
    pub second: u32,
    pub third: u32,
}

impl Default for TeamPointsScale {
    fn default() -> Self {
        // The customary 28/25/23/22/21/... scale.
        TeamPointsScale {
            first: 28,
            second: 25,
            third: 23,
        }
    }
}

pub fn points_for_rank(rank: u32, scale: TeamPointsScale) -> u32 {
    match rank {
        0 => 0,
        1 => scale.first,
        2 => scale.second,
        3 => scale.third,
        n => scale.third.saturating_sub(n - 3),
    }
}

/// One team's accumulated standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    pub team: String,
    pub points: u32,
    pub counted_athletes: usize,
    /// How many 1st..5th places the counted athletes took, for
    /// tiebreaking.
    pub place_counts: [u32; 5],
}

/// Aggregate `(team, category rank)` pairs into a ranked team standing.
/// With `top_n`, only each team's best-scoring athletes count. Ties on
/// points break on most firsts, then seconds, down through fifths.
pub fn rank_teams(
    results: impl IntoIterator<Item = (String, u32)>,
    scale: TeamPointsScale,
    top_n: Option<usize>,
) -> Vec<TeamScore> {
    let mut by_team: Vec<(String, Vec<u32>)> = Vec::new();
    for (team, rank) in results {
        match by_team.iter_mut().find(|(name, _)| *name == team) {
            Some((_, ranks)) => ranks.push(rank),
            None => by_team.push((team, vec![rank])),
        }
    }

    let mut scores: Vec<TeamScore> = by_team
        .into_iter()
        .map(|(team, ranks)| {
            let mut counted: Vec<u32> = ranks
                .iter()
                .map(|rank| points_for_rank(*rank, scale))
                .sorted_unstable_by(|a, b| b.cmp(a))
                .collect();
            if let Some(n) = top_n {
                counted.truncate(n);
            }
            let counted_athletes = counted.len();
            let points: u32 = counted.iter().sum();

            // Tiebreak counts come from the same athletes that scored.
            let mut counted_ranks: Vec<u32> = ranks
                .iter()
                .copied()
                .sorted_unstable_by_key(|rank| std::cmp::Reverse(points_for_rank(*rank, scale)))
                .collect();
            if let Some(n) = top_n {
                counted_ranks.truncate(n);
            }
            let mut place_counts = [0u32; 5];
            for rank in counted_ranks {
                if (1..=5).contains(&rank) {
                    place_counts[(rank - 1) as usize] += 1;
                }
            }

            TeamScore {
                team,
                points,
                counted_athletes,
                place_counts,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.place_counts.cmp(&a.place_counts))
            .then_with(|| a.team.cmp(&b.team))
    });
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinclair_is_identity_at_reference_weight() {
        let total = 300.0;
        assert_eq!(sinclair(total, 200.0, Gender::M, SinclairEra::Y2024), total);
        assert_eq!(sinclair(total, 193.609, Gender::M, SinclairEra::Y2024), total);
    }

    #[test]
    fn sinclair_rewards_lighter_lifters() {
        let light = sinclair(300.0, 73.0, Gender::M, SinclairEra::Y2024);
        let heavy = sinclair(300.0, 109.0, Gender::M, SinclairEra::Y2024);
        assert!(light > heavy);
        assert!(heavy > 300.0);
    }

    #[test]
    fn sinclair_of_nothing_is_nothing() {
        assert_eq!(sinclair(0.0, 80.0, Gender::F, SinclairEra::Y2020), 0.0);
        assert_eq!(sinclair(200.0, 0.0, Gender::F, SinclairEra::Y2020), 0.0);
    }

    #[test]
    fn qpoints_monotonic_in_total() {
        let less = qpoints(200.0, 81.0, Gender::M);
        let more = qpoints(210.0, 81.0, Gender::M);
        assert!(more > less);
        assert!(less > 200.0);
    }

    #[test]
    fn masters_factor_interpolates() {
        assert_eq!(masters_factor(25, Gender::M), 1.0);
        assert_eq!(masters_factor(30, Gender::M), 1.0);
        let f42 = masters_factor(42, Gender::M);
        assert!(f42 > 1.068 && f42 < 1.131);
        assert_eq!(masters_factor(95, Gender::F), 2.749);
    }

    #[test]
    fn age_adjustment_multiplies() {
        let base = qpoints(180.0, 75.0, Gender::F);
        let adjusted = age_adjusted_qpoints(180.0, 75.0, Gender::F, 60);
        assert!((adjusted - base * 1.535).abs() < 1e-9);
    }

    #[test]
    fn rank_points_descend_and_floor() {
        let scale = TeamPointsScale::default();
        assert_eq!(points_for_rank(1, scale), 28);
        assert_eq!(points_for_rank(2, scale), 25);
        assert_eq!(points_for_rank(3, scale), 23);
        assert_eq!(points_for_rank(4, scale), 22);
        assert_eq!(points_for_rank(10, scale), 16);
        assert_eq!(points_for_rank(26, scale), 0);
        assert_eq!(points_for_rank(500, scale), 0);
        assert_eq!(points_for_rank(0, scale), 0);
    }

    #[test]
    fn team_ranking_sums_and_orders() {
        let results = vec![
            ("CAN".to_string(), 1),
            ("CAN".to_string(), 4),
            ("USA".to_string(), 2),
            ("USA".to_string(), 3),
            ("MEX".to_string(), 0),
        ];
        let ranked = rank_teams(results, TeamPointsScale::default(), None);
        assert_eq!(ranked[0].team, "CAN");
        assert_eq!(ranked[0].points, 28 + 22);
        assert_eq!(ranked[1].team, "USA");
        assert_eq!(ranked[1].points, 25 + 23);
        assert_eq!(ranked[2].team, "MEX");
        assert_eq!(ranked[2].points, 0);
    }

    #[test]
    fn top_n_truncates_to_best_athletes() {
        let results = vec![
            ("CAN".to_string(), 1),
            ("CAN".to_string(), 2),
            ("CAN".to_string(), 3),
        ];
        let ranked = rank_teams(results, TeamPointsScale::default(), Some(2));
        assert_eq!(ranked[0].points, 28 + 25);
        assert_eq!(ranked[0].counted_athletes, 2);
        assert_eq!(ranked[0].place_counts, [1, 1, 0, 0, 0]);
    }

    #[test]
    fn ties_break_on_place_counts() {
        // 1st + 21pts(5th) = 49 vs 25 + 23 + 1pt: engineer equal points,
        // different firsts.
        let results = vec![
            ("AAA".to_string(), 1), // 28
            ("AAA".to_string(), 6), // 20
            ("BBB".to_string(), 2), // 25
            ("BBB".to_string(), 3), // 23
        ];
        let ranked = rank_teams(results, TeamPointsScale::default(), None);
        assert_eq!(ranked[0].points, 48);
        assert_eq!(ranked[1].points, 48);
        // Equal points: AAA's first place wins the tie.
        assert_eq!(ranked[0].team, "AAA");
    }
}
