//! Main controller implementation.
//!
//! Wires the hub client, reconciler, watcher and probe server together and
//! runs them until one of them stops.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::manifest::ManifestCodec;
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{ManagedCluster, ManifestWork};
use hub_client::HubClient;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Hosted import controller: ManagedCluster watcher plus probe server.
#[derive(Debug)]
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing hosted import controller");

        let kube_client = Client::try_default().await?;
        let hub = HubClient::new(kube_client.clone(), &config.controller_name);

        let clusters: Api<ManagedCluster> = Api::all(kube_client.clone());
        let works: Api<ManifestWork> = Api::all(kube_client.clone());
        let secrets: Api<Secret> = Api::all(kube_client);

        let concurrency = config.concurrency;
        let debounce = config.debounce;
        let probe_addr = config.probe_addr;
        let reconciler = Arc::new(Reconciler::new(hub, ManifestCodec::new(), config));
        let watcher = Watcher::new(reconciler, clusters, works, secrets);

        let readiness = Readiness::default();
        let probe_server = tokio::spawn(probes::serve(probe_addr, readiness.clone()));

        let cluster_watcher = tokio::spawn(async move {
            readiness.set_ready();
            watcher.watch_managed_clusters(concurrency, debounce).await
        });

        Ok(Self {
            cluster_watcher,
            probe_server,
        })
    }

    /// Runs the controller until the watcher or the probe server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Hosted import controller running");

        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ManagedCluster watcher panicked: {e}")))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {e}")))??;
            }
        }

        self.cluster_watcher.abort();
        self.probe_server.abort();
        info!("Hosted import controller stopped");
        Ok(())
    }
}
