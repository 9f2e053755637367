mod api;
mod broker;
mod cache;
mod ingress;
mod projections;

use crate::broker::Broker;
use crate::ingress::RelayFairing;
use crate::projections::ViewHost;
use liftboard_hub::CompetitionHub;
use liftboard_ingest::{IngressTask, RelayConfig};
use miette::IntoDiagnostic;
use rocket::fs::FileServer;
use std::sync::Arc;
use std::time::Duration;

#[rocket::main]
async fn main() -> miette::Result<()> {
    let config = RelayConfig::config().into_diagnostic()?;

    // The static mount refuses to start on a missing directory, and the
    // extractor needs it anyway.
    std::fs::create_dir_all(&config.local_files_dir).into_diagnostic()?;

    let hub = CompetitionHub::new(&config.default_locale).into_shared();
    let host = Arc::new(ViewHost::with_default_projections(hub.clone()));
    let broker = Arc::new(Broker::new(
        Duration::from_millis(config.coalesce_window_ms),
        config.subscriber_queue_depth,
    ));

    rocket::build()
        .manage(hub)
        .manage(host)
        .manage(broker)
        .manage(IngressTask::new())
        .manage(config.clone())
        .mount("/", api::routes())
        .mount("/local", FileServer::from(&config.local_files_dir))
        .attach(RelayFairing::new())
        .launch()
        .await
        .into_diagnostic()?;

    Ok(())
}
