use crate::broker::Broker;
use liftboard_hub::SharedHub;
use liftboard_ingest::{IngressTask, RelayConfig, run_ingress};
use log::{error, info};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Launches the background half of the relay when Rocket lifts off: the
/// WebSocket ingress listener and the fan-out broker pump. Both stop on
/// the shared cancellation token, which Rocket's shutdown trips.
pub struct RelayFairing {
    stop: CancellationToken,
}

impl RelayFairing {
    pub fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for RelayFairing {
    fn info(&self) -> Info {
        Info {
            name: "Relay ingress and fan-out",
            kind: Kind::Liftoff | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let Some(hub) = rocket.state::<SharedHub>() else {
            error!("Cannot launch relay tasks: Rocket is not managing the hub");
            return;
        };
        let Some(config) = rocket.state::<RelayConfig>() else {
            error!("Cannot launch relay tasks: Rocket is not managing the relay config");
            return;
        };
        let Some(task) = rocket.state::<IngressTask>() else {
            error!("Cannot launch relay tasks: Rocket is not managing an IngressTask");
            return;
        };
        let Some(broker) = rocket.state::<Arc<Broker>>() else {
            error!("Cannot launch relay tasks: Rocket is not managing the broker");
            return;
        };

        let events = hub.read().expect("hub lock poisoned").subscribe();
        tokio::spawn(broker.clone().run(events, self.stop.clone()));

        let ingress_hub = hub.clone();
        let ingress_config = config.clone();
        let ingress_task = task.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            if let Err(err) = run_ingress(
                ingress_config,
                ingress_hub,
                ingress_task.clone(),
                stop,
            )
            .await
            {
                error!("Ingress listener exited with an error: {err}");
                ingress_task.mark_failed(err.to_string());
            }
        });

        info!("Relay ingress and fan-out tasks launched");
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        info!("Stopping relay ingress and fan-out tasks");
        self.stop.cancel();
    }
}
