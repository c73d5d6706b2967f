//! The bridge core: settings → store on the way in, status → queue on
//! the way out.

pub mod bridge;
pub mod operator;
pub mod spec;
pub mod status_watcher;

pub use bridge::{BridgeState, SettingsBridge};
pub use operator::WorkspaceOperator;
pub use spec::{build_workspace, WORKSPACE_NAMESPACE};
pub use status_watcher::StatusWatcher;
