use liftboard_hub::{AthleteKey, FopSnapshot, SessionAthlete};
use serde_json::{Value, json};
use std::collections::HashSet;

/// URL paths for extracted resources, matching the fixed mapping the
/// static server exposes.
pub fn flag_url(team: &str) -> String {
    format!("/local/flags/{}.svg", slug(team))
}

pub fn logo_url(team: &str) -> String {
    format!("/local/logos/{}.png", slug(team))
}

pub fn picture_url(key: &AthleteKey) -> String {
    format!("/local/pictures/{key}.jpg")
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Every athlete in the database as a display row: the running
/// session's rows verbatim where the upstream computed them, raw-field
/// construction everywhere else. Membership is decided on lot numbers
/// compared as strings.
pub fn merged_session_rows(snapshot: &FopSnapshot) -> Vec<SessionAthlete> {
    let session_lots: HashSet<&str> = snapshot
        .update
        .session_athletes
        .iter()
        .map(|a| a.athlete.lot_number.as_str())
        .collect();

    snapshot
        .database
        .athletes
        .iter()
        .map(|athlete| {
            if session_lots.contains(athlete.lot_number.as_str()) {
                if let Some(row) = snapshot.update.session_athlete(&athlete.key) {
                    return row.clone();
                }
            }
            SessionAthlete::from_athlete(athlete)
        })
        .collect()
}

/// The standard row JSON every board shares.
pub fn athlete_row(row: &SessionAthlete) -> Value {
    json!({
        "key": row.athlete.key,
        "name": row.athlete.display_name(),
        "teamName": row.athlete.team_name,
        "flagUrl": flag_url(&row.athlete.team_name),
        "category": row.athlete.category,
        "startNumber": row.athlete.start_number,
        "lotNumber": row.athlete.lot_number,
        "attempts": row.attempts,
        "bestSnatch": row.best_snatch,
        "bestCleanJerk": row.best_clean_jerk,
        "total": row.total,
        "rank": row.rank,
        "classname": row.classname,
    })
}

/// Competition-rules ordering within one category: best total first,
/// lighter body weight breaks ties, lot number decides the rest. Rows
/// without a total sort last and stay unranked.
pub fn rank_category_rows(rows: &mut [(SessionAthlete, Option<u32>)]) {
    rows.sort_by(|(a, _), (b, _)| {
        let a_total = a.total;
        let b_total = b.total;
        b_total
            .partial_cmp(&a_total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let a_bw = a.athlete.body_weight.unwrap_or(f64::MAX);
                let b_bw = b.athlete.body_weight.unwrap_or(f64::MAX);
                a_bw.partial_cmp(&b_bw).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.athlete.lot_number.cmp(&b.athlete.lot_number))
    });

    let mut next_rank = 1;
    for (row, rank) in rows.iter_mut() {
        if row.total > 0.0 {
            *rank = Some(next_rank);
            next_rank += 1;
        } else {
            *rank = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::populated_hub;
    use liftboard_hub::AttemptStatus;

    #[test]
    fn url_helpers_stay_inside_local() {
        assert_eq!(flag_url("North"), "/local/flags/North.svg");
        assert_eq!(flag_url("Team/École"), "/local/flags/Team_École.svg");
        assert_eq!(picture_url(&AthleteKey::Int(-3)), "/local/pictures/-3.jpg");
    }

    #[test]
    fn merged_rows_prefer_upstream_snapshots() {
        let hub = populated_hub();
        let hub = hub.read().unwrap();
        let snapshot = hub.snapshot("A").unwrap();

        let rows = merged_session_rows(&snapshot);
        assert_eq!(rows.len(), 3);

        // Ivan is in the running session: his upstream row (with the
        // highlight) is used verbatim.
        let ivan = rows
            .iter()
            .find(|r| r.athlete.key == AthleteKey::Int(11))
            .unwrap();
        assert_eq!(ivan.attempts[0].highlight_class, "current");

        // Marta lifts in another session: her row is built from raw
        // fields and carries no styling.
        let marta = rows
            .iter()
            .find(|r| r.athlete.key == AthleteKey::Int(13))
            .unwrap();
        assert_eq!(marta.classname, liftboard_hub::RowClass::None);
        assert_eq!(marta.attempts[0].status, AttemptStatus::Good);
        assert_eq!(marta.total, 213.0);
    }

    #[test]
    fn category_ranking_orders_and_skips_zero_totals() {
        let hub = populated_hub();
        let hub = hub.read().unwrap();
        let snapshot = hub.snapshot("A").unwrap();

        let mut rows: Vec<_> = merged_session_rows(&snapshot)
            .into_iter()
            .filter(|r| r.athlete.category == "SR_M89")
            .map(|r| (r, None))
            .collect();
        rank_category_rows(&mut rows);

        // Louis has a 310 total; Ivan hasn't lifted yet.
        assert_eq!(rows[0].0.athlete.key, AthleteKey::Int(12));
        assert_eq!(rows[0].1, Some(1));
        assert_eq!(rows[1].1, None);
    }
}
