//! Open Cluster Management resource types
//!
//! Typed records for the hub resources the hosted import controller reads and
//! writes. Only the fields the controller consumes are modelled.

pub mod addon;
pub mod condition;
pub mod managed_cluster;
pub mod manifest_work;

pub use addon::*;
pub use condition::*;
pub use managed_cluster::*;
pub use manifest_work::*;
