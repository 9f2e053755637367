use super::support::athlete_row;
use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use liftboard_hub::database::sort_officials;
use liftboard_hub::scoring::{self, SinclairEra};
use liftboard_hub::{OrderEntry, SessionPhase};
use serde_json::{Value, json};

/// The main session scoreboard: the running session's athletes in start
/// order, exactly as the upstream computed them.
pub struct Scoreboard;

impl Projection for Scoreboard {
    fn name(&self) -> &'static str {
        "scoreboard"
    }

    fn description(&self) -> &'static str {
        "Current session in start order with attempts, bests and totals"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::boolean(
            "showSinclair",
            "Add a Sinclair column",
            false,
        )]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let update = &ctx.snapshot.update;
        let show_sinclair = ctx
            .options
            .get("showSinclair")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let rows: Vec<Value> = update
            .start_order
            .iter()
            .map(|entry| match entry {
                OrderEntry::Spacer { spacer } => json!({"spacer": spacer}),
                OrderEntry::Athlete(key) => {
                    // Order entries were validated against the session
                    // list when the update merged.
                    let Some(session_athlete) = update.session_athlete(key) else {
                        return json!({"spacer": ""});
                    };
                    let mut row = athlete_row(session_athlete);
                    if show_sinclair {
                        let sinclair = if session_athlete.sinclair > 0.0 {
                            session_athlete.sinclair
                        } else {
                            scoring::sinclair(
                                session_athlete.total,
                                session_athlete.athlete.body_weight.unwrap_or(0.0),
                                session_athlete.athlete.gender,
                                SinclairEra::default(),
                            )
                        };
                        row["sinclair"] = json!(format!("{sinclair:.2}"));
                    }
                    row
                }
            })
            .collect();

        let mut officials = ctx.snapshot.database.officials.clone();
        sort_officials(&mut officials);

        Ok(json!({
            "title": ctx.translate("Scoreboard.Title"),
            "locale": ctx.locale,
            "competitionName": update.competition_name,
            "sessionName": update.session_name,
            "fopState": update.fop_state,
            "breakType": update.break_type,
            "sessionDone": ctx.snapshot.phase == SessionPhase::Done,
            "currentAthleteKey": update.current_athlete_key,
            "nextAthleteKey": update.next_athlete_key,
            "officials": officials,
            "athletes": rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::populated_hub;
    use crate::projections::{Options, OptionValue};

    fn project(options: Options) -> Value {
        let hub = populated_hub();
        let hub = hub.read().unwrap();
        let snapshot = hub.snapshot("A").unwrap();
        let translations = hub.translations("en");
        Scoreboard
            .project(&ProjectionContext {
                snapshot: &snapshot,
                options: &options,
                locale: "en",
                translations: &translations,
            })
            .unwrap()
    }

    #[test]
    fn rows_follow_start_order_with_upstream_styling() {
        let view = project(Options::new());
        assert_eq!(view["sessionName"], "M1");
        assert_eq!(view["title"], "Scoreboard");
        let rows = view["athletes"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "STOEV, Ivan");
        assert_eq!(rows[0]["classname"], "current");
        assert_eq!(rows[1]["total"], 310.0);
        // Officials come out in announcing order, speaker first.
        assert_eq!(view["officials"][0]["name"], "M. Dupont");
        // No clock state in the cached payload.
        assert!(view.get("timer").is_none());
    }

    #[test]
    fn sinclair_column_is_optional() {
        let without = project(Options::new());
        assert!(without["athletes"][1].get("sinclair").is_none());

        let mut options = Options::new();
        options.insert("showSinclair".into(), OptionValue::Bool(true));
        let with = project(options);
        let sinclair: f64 = with["athletes"][1]["sinclair"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(sinclair > 310.0);
    }
}
