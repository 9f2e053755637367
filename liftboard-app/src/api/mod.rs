mod error;

use crate::broker::Broker;
use crate::projections::{QueryOutcome, ViewHost};
use chrono::Utc;
use error::ApiError;
use liftboard_hub::SharedHub;
use liftboard_ingest::{IngressTask, RelayConfig};
use rocket::http::Status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{Shutdown, State, get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![index, projection_query, action, events, status]
}

#[get("/")]
async fn index() -> &'static str {
    "liftboard relay. Scoreboards talk to /projection, /action and /events."
}

/// GET-style projection query: positional projection and platform,
/// arbitrary option keys, plus the reserved `locale`.
#[get("/projection/<name>/<fop>?<params..>")]
async fn projection_query(
    name: &str,
    fop: &str,
    params: HashMap<String, String>,
    host: &State<Arc<ViewHost>>,
) -> (Status, Json<Value>) {
    let mut raw: BTreeMap<String, String> = params.into_iter().collect();
    let locale = raw.remove("locale");

    match host.query(name, fop, &raw, locale.as_deref()) {
        QueryOutcome::Ok(response) => (
            Status::Ok,
            Json(serde_json::to_value(*response).unwrap_or_else(|_| {
                json!({"success": false, "reason": "response serialization failed"})
            })),
        ),
        QueryOutcome::Waiting => (
            Status::Ok,
            Json(json!({
                "status": "waiting",
                "message": "Waiting for competition data...",
            })),
        ),
        QueryOutcome::UnknownProjection => (
            Status::Ok,
            Json(json!({"success": false, "error": "unknown_projection"})),
        ),
        QueryOutcome::InvalidOptions(err) => (
            Status::BadRequest,
            Json(json!({
                "success": false,
                "error": "invalid_options",
                "reason": err.to_string(),
            })),
        ),
        QueryOutcome::Failed(reason) => (
            Status::Ok,
            Json(json!({"success": false, "reason": reason})),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
}

/// POST-style actions: discovery and operator controls.
#[post("/action", data = "<request>")]
async fn action(
    request: Json<ActionRequest>,
    hub: &State<SharedHub>,
    host: &State<Arc<ViewHost>>,
    broker: &State<Arc<Broker>>,
    ingress: &State<IngressTask>,
    config: &State<RelayConfig>,
) -> Result<Json<Value>, ApiError> {
    match request.action.as_str() {
        "list_scoreboards" => Ok(Json(json!({
            "success": true,
            "scoreboards": host.list(),
        }))),
        "list_fops" => {
            let fops = hub.read().expect("hub lock poisoned").fop_names();
            Ok(Json(json!({"success": true, "fops": fops})))
        }
        "get_state" => Ok(Json(state_payload(hub, broker, ingress, config))),
        "clear_cache" => {
            let cleared = host.registry().clear_all();
            Ok(Json(json!({"success": true, "clearedCaches": cleared})))
        }
        other => Err(ApiError::UnknownAction(other.to_owned())),
    }
}

/// The operator status surface, also exposed as a plain GET.
#[get("/status")]
async fn status(
    hub: &State<SharedHub>,
    broker: &State<Arc<Broker>>,
    ingress: &State<IngressTask>,
    config: &State<RelayConfig>,
) -> Json<Value> {
    Json(state_payload(hub, broker, ingress, config))
}

fn state_payload(
    hub: &SharedHub,
    broker: &Arc<Broker>,
    ingress: &IngressTask,
    config: &RelayConfig,
) -> Value {
    let hub = hub.read().expect("hub lock poisoned");
    let fops: Vec<Value> = hub
        .fop_names()
        .into_iter()
        .map(|fop| {
            json!({
                "name": fop,
                "version": hub.fop_state_version(&fop),
                "sessionPhase": hub.session_phase(&fop),
            })
        })
        .collect();

    json!({
        "success": true,
        "ready": hub.is_ready(),
        "missing": hub.missing_preconditions(),
        "ingress": {
            "connection": ingress.status(),
            "counters": ingress.counters().snapshot(),
            "protocolVersion": config.current_protocol_version,
            "minProtocolVersion": config.min_protocol_version,
        },
        "broker": {
            "subscribers": broker.subscriber_count(),
            "droppedNotifications": broker.dropped_notifications(),
        },
        "translations": {
            "locales": hub.translation_locales(),
            "checksumMismatches": hub.translation_checksum_mismatches(),
        },
        "fops": fops,
        "timestamp": Utc::now(),
    })
}

/// The one-way push channel: coalesced notifications as server-sent
/// events. Clients reconnect freely; the stream carries triggers, never
/// payloads.
#[get("/events?<fop>")]
async fn events(
    fop: Option<String>,
    broker: &State<Arc<Broker>>,
    mut end: Shutdown,
) -> EventStream![Event] {
    let handle = broker.subscribe(fop);
    EventStream! {
        loop {
            tokio::select! {
                notification = handle.next() => {
                    yield Event::json(&notification)
                        .event(notification.event_kind.to_string());
                }
                _ = &mut end => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::populated_hub;
    use liftboard_ingest::RelayConfig;
    use rocket::local::asynchronous::Client;
    use std::time::Duration;

    async fn client_with_populated_hub() -> Client {
        let hub = populated_hub();
        let host = Arc::new(ViewHost::with_default_projections(hub.clone()));
        let broker = Arc::new(Broker::new(Duration::from_millis(0), 8));
        let rocket = rocket::build()
            .manage(hub)
            .manage(host)
            .manage(broker)
            .manage(IngressTask::new())
            .manage(RelayConfig::default())
            .mount("/", routes());
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[rocket::async_test]
    async fn projection_query_round_trips() {
        let client = client_with_populated_hub().await;
        let response = client
            .get("/projection/lifting-order/A?topN=10")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["type"], "lifting-order");
        assert_eq!(body["fop"], "A");
        assert_eq!(body["options"]["topN"], 10.0);
        assert_eq!(body["data"]["order"][0]["name"], "STOEV, Ivan");
        // Live overlay is present on every response.
        assert_eq!(body["data"]["timer"]["state"], "set");
    }

    #[rocket::async_test]
    async fn unknown_option_is_a_400() {
        let client = client_with_populated_hub().await;
        let response = client
            .get("/projection/lifting-order/A?bogus=1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "invalid_options");
    }

    #[rocket::async_test]
    async fn unknown_projection_is_reported_in_band() {
        let client = client_with_populated_hub().await;
        let response = client.get("/projection/nope/A").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unknown_projection");
    }

    #[rocket::async_test]
    async fn fresh_hub_reports_waiting() {
        let hub = liftboard_hub::CompetitionHub::new("en").into_shared();
        let host = Arc::new(ViewHost::with_default_projections(hub.clone()));
        let broker = Arc::new(Broker::new(Duration::from_millis(0), 8));
        let rocket = rocket::build()
            .manage(hub)
            .manage(host)
            .manage(broker)
            .manage(IngressTask::new())
            .manage(RelayConfig::default())
            .mount("/", routes());
        let client = Client::tracked(rocket).await.unwrap();

        let response = client.get("/projection/scoreboard/A").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "waiting");
        assert_eq!(body["message"], "Waiting for competition data...");
    }

    #[rocket::async_test]
    async fn discovery_lists_projections_and_fops() {
        let client = client_with_populated_hub().await;

        let response = client
            .post("/action")
            .header(rocket::http::ContentType::JSON)
            .body(r#"{"action": "list_scoreboards"}"#)
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        let names: Vec<&str> = body["scoreboards"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"scoreboard"));
        assert!(names.contains(&"lifting-order"));
        let lifting = body["scoreboards"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == "lifting-order")
            .unwrap();
        assert_eq!(lifting["options"][0]["key"], "topN");
        assert_eq!(lifting["options"][0]["type"], "number");

        let response = client
            .post("/action")
            .header(rocket::http::ContentType::JSON)
            .body(r#"{"action": "list_fops"}"#)
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["fops"], json!(["A"]));
    }

    #[rocket::async_test]
    async fn unknown_action_is_a_400() {
        let client = client_with_populated_hub().await;
        let response = client
            .post("/action")
            .header(rocket::http::ContentType::JSON)
            .body(r#"{"action": "destroy_everything"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn status_reports_readiness_and_counters() {
        let client = client_with_populated_hub().await;
        let response = client.get("/status").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["ready"], true);
        assert_eq!(body["fops"][0]["name"], "A");
        assert_eq!(body["broker"]["subscribers"], 0);
        assert_eq!(body["ingress"]["connection"]["state"], "starting");
        assert_eq!(body["ingress"]["protocolVersion"], "2.0.0");
        assert_eq!(body["ingress"]["minProtocolVersion"], "2.0.0");
    }
}
