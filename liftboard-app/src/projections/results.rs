use super::support::{athlete_row, merged_session_rows, rank_category_rows};
use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use itertools::Itertools;
use liftboard_hub::scoring::{self, SinclairEra};
use serde_json::{Value, json};

/// Category results across the whole competition, not just the running
/// session. Session athletes keep their upstream rows; everyone else is
/// reconstructed from raw registration fields.
pub struct Results;

impl Projection for Results {
    fn name(&self) -> &'static str {
        "results"
    }

    fn description(&self) -> &'static str {
        "Results by category with Sinclair and Q-points"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::string("category", "Restrict to one category code", ""),
            OptionSpec::choice(
                "scoring",
                "Secondary score column",
                vec!["sinclair", "qpoints", "none"],
                "sinclair",
            ),
        ]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let wanted_category = ctx
            .options
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let scoring_column = ctx
            .options
            .get("scoring")
            .and_then(|v| v.as_str())
            .unwrap_or("sinclair");

        let rows = merged_session_rows(ctx.snapshot);
        let categories: Vec<Value> = rows
            .into_iter()
            .filter(|row| wanted_category.is_empty() || row.athlete.category == wanted_category)
            .into_group_map_by(|row| row.athlete.category.clone())
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(category, members)| {
                let mut ranked: Vec<_> = members.into_iter().map(|row| (row, None)).collect();
                rank_category_rows(&mut ranked);

                let age_group = ctx
                    .snapshot
                    .database
                    .age_group_of(&category)
                    .map(|group| group.code.clone());

                let rows: Vec<Value> = ranked
                    .into_iter()
                    .map(|(row, rank)| {
                        let mut value = athlete_row(&row);
                        value["rank"] = json!(rank);
                        let body_weight = row.athlete.body_weight.unwrap_or(0.0);
                        match scoring_column {
                            "sinclair" => {
                                value["score"] = json!(format!(
                                    "{:.2}",
                                    scoring::sinclair(
                                        row.total,
                                        body_weight,
                                        row.athlete.gender,
                                        SinclairEra::default(),
                                    )
                                ));
                            }
                            "qpoints" => {
                                value["score"] = json!(format!(
                                    "{:.2}",
                                    scoring::qpoints(row.total, body_weight, row.athlete.gender)
                                ));
                            }
                            _ => {}
                        }
                        value
                    })
                    .collect();

                json!({
                    "category": category,
                    "ageGroup": age_group,
                    "athletes": rows,
                })
            })
            .collect();

        Ok(json!({
            "competitionName": ctx.snapshot.database.competition.name,
            "scoring": scoring_column,
            "categories": categories,
        }))
    }
}
