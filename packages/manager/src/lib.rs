// Workspace Manager - bridge core
//
// Bridges workspace settings messages from the event queue onto the
// Workspace custom resource, and mirrors observed status changes back
// out. The kernel provides the queue/store/service seams; the manager
// module holds the bridge logic itself.

pub mod config;
pub mod kernel;
pub mod manager;
pub mod models;

pub use config::Config;
