//! Hub Resource Accessors
//!
//! Typed read/write access to the hub resources the hosted import controller
//! works with: ManagedClusters, ManifestWorks, Secrets and ManagedClusterAddOns,
//! plus Kubernetes Event publishing.
//!
//! The controller only talks to [`HubClientTrait`]. [`HubClient`] backs it with
//! a `kube::Client`; [`MockHubClient`] (feature `test-util`) keeps everything in
//! memory for unit tests.
//!
//! # Example
//!
//! ```no_run
//! use hub_client::{HubClient, HubClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let hub = HubClient::new(client, "hosted-manifestwork-controller");
//!
//! if let Some(cluster) = hub.get_managed_cluster("cluster1").await? {
//!     println!("{:?}", cluster.metadata.annotations);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event;
#[path = "trait.rs"]
pub mod hub_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::HubClient;
pub use error::HubError;
pub use event::{EventKind, HubEvent};
pub use hub_trait::HubClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockHubClient;
