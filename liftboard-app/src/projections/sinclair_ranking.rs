use super::support::merged_session_rows;
use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use itertools::Itertools;
use liftboard_hub::Gender;
use liftboard_hub::scoring::{self, SinclairEra};
use serde_json::{Value, json};

/// Cross-category ranking on Sinclair points, the board used for best
/// lifter awards.
pub struct SinclairRanking;

impl Projection for SinclairRanking {
    fn name(&self) -> &'static str {
        "sinclair-ranking"
    }

    fn description(&self) -> &'static str {
        "Best-lifter ranking across categories on Sinclair points"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::choice("gender", "Restrict to one gender", vec!["M", "F", "all"], "all"),
            OptionSpec::choice("era", "Coefficient cycle", vec!["2020", "2024"], "2024"),
            OptionSpec::number("topN", "Rows to show", 20.0).bounded(1.0, 200.0),
        ]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let gender_filter = ctx
            .options
            .get("gender")
            .and_then(|v| v.as_str())
            .unwrap_or("all")
            .to_owned();
        let era = match ctx.options.get("era").and_then(|v| v.as_str()) {
            Some("2020") => SinclairEra::Y2020,
            _ => SinclairEra::Y2024,
        };
        let top_n = ctx
            .options
            .get("topN")
            .and_then(|v| v.as_usize())
            .unwrap_or(20);

        let keep = |gender: Gender| match gender_filter.as_str() {
            "M" => gender == Gender::M,
            "F" => gender == Gender::F,
            _ => true,
        };

        let rows: Vec<Value> = merged_session_rows(ctx.snapshot)
            .into_iter()
            .filter(|row| keep(row.athlete.gender) && row.total > 0.0)
            .map(|row| {
                let points = scoring::sinclair(
                    row.total,
                    row.athlete.body_weight.unwrap_or(0.0),
                    row.athlete.gender,
                    era,
                );
                (row, points)
            })
            .sorted_by(|(_, a), (_, b)| b.total_cmp(a))
            .take(top_n)
            .enumerate()
            .map(|(index, (row, points))| {
                json!({
                    "rank": index + 1,
                    "name": row.athlete.display_name(),
                    "teamName": row.athlete.team_name,
                    "category": row.athlete.category,
                    "bodyWeight": row.athlete.body_weight,
                    "total": row.total,
                    "sinclair": format!("{points:.2}"),
                })
            })
            .collect();

        Ok(json!({
            "competitionName": ctx.snapshot.database.competition.name,
            "gender": gender_filter,
            "athletes": rows,
        }))
    }
}
