use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use itertools::Itertools;
use serde_json::{Value, json};

/// The records wall: every record band on file, grouped by federation
/// and kind, with records set during this meet flagged.
pub struct RecordsBoard;

impl Projection for RecordsBoard {
    fn name(&self) -> &'static str {
        "records"
    }

    fn description(&self) -> &'static str {
        "Record holders by federation, with marks set this meet highlighted"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::string(
            "federation",
            "Restrict to one federation code",
            "",
        )]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let federation_filter = ctx
            .options
            .get("federation")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let federations: Vec<Value> = ctx
            .snapshot
            .database
            .records
            .iter()
            .filter(|record| {
                federation_filter.is_empty() || record.federation == federation_filter
            })
            .into_group_map_by(|record| record.federation.clone())
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(federation, records)| {
                let rows: Vec<Value> = records
                    .into_iter()
                    .sorted_by(|a, b| {
                        a.gender
                            .to_string()
                            .cmp(&b.gender.to_string())
                            .then(a.bw_upper.total_cmp(&b.bw_upper))
                    })
                    .map(|record| {
                        json!({
                            "kind": record.kind,
                            "gender": record.gender,
                            "bwLower": record.bw_lower,
                            "bwUpper": record.bw_upper,
                            "ageLower": record.age_lower,
                            "ageUpper": record.age_upper,
                            "value": record.value,
                            "holder": record.holder,
                            "setThisMeet": record.set_this_meet(),
                            "sessionName": record.session_name,
                        })
                    })
                    .collect();
                json!({"federation": federation, "records": rows})
            })
            .collect();

        Ok(json!({
            "competitionName": ctx.snapshot.database.competition.name,
            "federations": federations,
        }))
    }
}
