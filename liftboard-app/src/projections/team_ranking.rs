use super::support::{merged_session_rows, rank_category_rows};
use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use itertools::Itertools;
use liftboard_hub::Gender;
use liftboard_hub::scoring::{TeamPointsScale, rank_teams};
use serde_json::{Value, json};

/// Team standings: category ranks converted to points on the customary
/// scale, summed per team.
pub struct TeamRanking;

impl Projection for TeamRanking {
    fn name(&self) -> &'static str {
        "team-ranking"
    }

    fn description(&self) -> &'static str {
        "Team points standings with per-place tiebreaks"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::choice("gender", "Restrict to one gender", vec!["M", "F", "all"], "all"),
            OptionSpec::number("topN", "Best athletes counted per team (0 = all)", 0.0)
                .bounded(0.0, 50.0),
        ]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let gender_filter = ctx
            .options
            .get("gender")
            .and_then(|v| v.as_str())
            .unwrap_or("all")
            .to_owned();
        let top_n = ctx
            .options
            .get("topN")
            .and_then(|v| v.as_usize())
            .filter(|n| *n > 0);

        let keep = |gender: Gender| match gender_filter.as_str() {
            "M" => gender == Gender::M,
            "F" => gender == Gender::F,
            _ => true,
        };

        // Rank each category, then feed (team, rank) pairs to the points
        // table. Unranked athletes contribute zero but still count as
        // entrants.
        let mut contributions: Vec<(String, u32)> = Vec::new();
        for (_, members) in merged_session_rows(ctx.snapshot)
            .into_iter()
            .filter(|row| keep(row.athlete.gender))
            .into_group_map_by(|row| row.athlete.category.clone())
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
        {
            let mut ranked: Vec<_> = members.into_iter().map(|row| (row, None)).collect();
            rank_category_rows(&mut ranked);
            for (row, rank) in ranked {
                if row.athlete.team_name.is_empty() {
                    continue;
                }
                contributions.push((row.athlete.team_name.clone(), rank.unwrap_or(0)));
            }
        }

        let scale = TeamPointsScale::default();
        let standings = rank_teams(contributions, scale, top_n);

        Ok(json!({
            "competitionName": ctx.snapshot.database.competition.name,
            "gender": gender_filter,
            "scale": scale,
            "teams": standings,
        }))
    }
}
