use super::support::{athlete_row, picture_url};
use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use liftboard_hub::AttemptStatus;
use serde_json::{Value, json};

/// The big single-athlete display behind the platform: who is on the
/// bar, which attempt, at what weight, and any records within reach.
pub struct AttemptBoard;

impl Projection for AttemptBoard {
    fn name(&self) -> &'static str {
        "attempt-board"
    }

    fn description(&self) -> &'static str {
        "Current athlete with requested weight and records within reach"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::boolean(
            "showPicture",
            "Include the athlete picture URL",
            false,
        )]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let update = &ctx.snapshot.update;
        let show_picture = ctx
            .options
            .get("showPicture")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let Some(current) = update.current_athlete() else {
            return Ok(json!({
                "sessionName": update.session_name,
                "breakType": update.break_type,
                "athlete": Value::Null,
            }));
        };

        let pending = current
            .attempts
            .iter()
            .enumerate()
            .find(|(_, cell)| {
                matches!(cell.status, AttemptStatus::Request | AttemptStatus::Empty)
            });
        let (attempt_number, requested_weight) = match pending {
            Some((index, cell)) => (Some(index + 1), cell.display_value.clone()),
            None => (None, String::new()),
        };

        // Records the athlete could take with this bar.
        let requested: f64 = requested_weight.parse().unwrap_or(0.0);
        let in_reach: Vec<Value> = match (current.athlete.body_weight, current.athlete.birth_year())
        {
            (Some(body_weight), birth_year) => {
                let age = birth_year
                    .map(|year| {
                        use chrono::Datelike;
                        chrono::Utc::now().year() - year
                    })
                    .unwrap_or(0);
                ctx.snapshot
                    .database
                    .records
                    .iter()
                    .filter(|record| {
                        record.applies_to(current.athlete.gender, age, body_weight)
                            && requested > record.value
                    })
                    .map(|record| {
                        json!({
                            "federation": record.federation,
                            "kind": record.kind,
                            "value": record.value,
                            "holder": record.holder,
                        })
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        let mut athlete = athlete_row(current);
        if show_picture {
            athlete["pictureUrl"] = json!(picture_url(&current.athlete.key));
        }

        Ok(json!({
            "sessionName": update.session_name,
            "fopState": update.fop_state,
            "breakType": update.break_type,
            "athlete": athlete,
            "attemptNumber": attempt_number,
            "requestedWeight": requested_weight,
            "recordsInReach": in_reach,
        }))
    }
}
