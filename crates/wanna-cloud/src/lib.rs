//! WANNA のクラウドリソース調停
//!
//! リモートの単一リソースを安定名で upsert する調停器、パイプラインの
//! デプロイ順序、長期稼働インスタンス群の差分計算を提供します。
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 wanna CLI                     │
//! │   pipeline deploy   │   notebook sync         │
//! └─────────┬───────────┴──────────┬─────────────┘
//!           │                      │
//! ┌─────────▼──────────┐ ┌─────────▼─────────────┐
//! │ PipelineDeployer   │ │ FleetDiffer           │
//! │  UpsertReconciler  │ │  diff / run_bounded   │
//! └─────────┬──────────┘ └─────────┬─────────────┘
//!           │ ResourceApi          │ FleetApi
//! ┌─────────▼──────────────────────▼─────────────┐
//! │              wanna-cloud-gcp                  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod deploy;
pub mod error;
pub mod fanout;
pub mod fleet;
pub mod provider;
pub mod reconciler;
pub mod resource;
pub mod waiter;

pub use action::{Action, ActionType, Plan, PlanSummary};
pub use deploy::{DeployReport, DeploymentNames, PipelineDeploySpec, PipelineDeployer};
pub use error::{CloudError, Result};
pub use fanout::{DEFAULT_PARALLELISM, run_bounded};
pub use fleet::{FleetDiff, FleetDiffer, FleetMember, FleetReport, diff};
pub use provider::{FleetApi, Probe, ResourceApi};
pub use reconciler::{UpsertOutcome, UpsertReconciler, UpsertState};
pub use resource::{GcpResource, RemoteResource, ResourceKind, ResourceLocator};
pub use waiter::{Readiness, Waiter};
