use super::{OptionSpec, Projection, ProjectionContext, ProjectionError};
use liftboard_hub::AttemptStatus;
use serde_json::{Value, json};

/// Who lifts next: the lifting order with each athlete's pending
/// request. Spacers are dropped; this board is a queue, not a grid.
pub struct LiftingOrder;

impl Projection for LiftingOrder {
    fn name(&self) -> &'static str {
        "lifting-order"
    }

    fn description(&self) -> &'static str {
        "Upcoming athletes in lifting order with requested weights"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::number("topN", "Athletes to show", 10.0).bounded(1.0, 50.0)]
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Value, ProjectionError> {
        let update = &ctx.snapshot.update;
        let top_n = ctx
            .options
            .get("topN")
            .and_then(|v| v.as_usize())
            .unwrap_or(10);

        let order: Vec<Value> = update
            .lifting_order
            .iter()
            .filter_map(|entry| entry.athlete_key())
            .filter_map(|key| update.session_athlete(key))
            .take(top_n)
            .map(|row| {
                // The next pending attempt is the first non-decided cell;
                // its slot number doubles as the attempt count display.
                let pending = row
                    .attempts
                    .iter()
                    .enumerate()
                    .find(|(_, cell)| {
                        matches!(cell.status, AttemptStatus::Request | AttemptStatus::Empty)
                    });
                let (attempt_number, requested) = match pending {
                    Some((index, cell)) => (Some(index + 1), cell.display_value.clone()),
                    None => (None, String::new()),
                };
                json!({
                    "key": row.athlete.key,
                    "name": row.athlete.display_name(),
                    "teamName": row.athlete.team_name,
                    "category": row.athlete.category,
                    "startNumber": row.athlete.start_number,
                    "attemptNumber": attempt_number,
                    "requestedWeight": requested,
                    "classname": row.classname,
                })
            })
            .collect();

        Ok(json!({
            "sessionName": update.session_name,
            "currentAthleteKey": update.current_athlete_key,
            "order": order,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::populated_hub;
    use crate::projections::{OptionValue, Options};

    fn project(options: Options) -> Value {
        let hub = populated_hub();
        let hub = hub.read().unwrap();
        let snapshot = hub.snapshot("A").unwrap();
        let translations = hub.translations("en");
        LiftingOrder
            .project(&ProjectionContext {
                snapshot: &snapshot,
                options: &options,
                locale: "en",
                translations: &translations,
            })
            .unwrap()
    }

    #[test]
    fn order_carries_pending_requests() {
        let view = project(Options::new());
        let order = view["order"].as_array().unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0]["name"], "STOEV, Ivan");
        assert_eq!(order[0]["attemptNumber"], 1);
        assert_eq!(order[0]["requestedWeight"], "150");
        // Louis made his first and missed his second.
        assert_eq!(order[1]["attemptNumber"], 3);
    }

    #[test]
    fn top_n_truncates() {
        let mut options = Options::new();
        options.insert("topN".into(), OptionValue::Number(1.0));
        let view = project(options);
        assert_eq!(view["order"].as_array().unwrap().len(), 1);
    }
}
