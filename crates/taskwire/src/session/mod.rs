/*
[INPUT]:  Task submissions and transport callbacks
[OUTPUT]: Manager, router, delegates and task handles
[POS]:    Session layer - task orchestration
[UPDATE]: When adding session components
*/

pub mod credentials;
pub mod delegate;
pub mod handlers;
pub mod manager;
mod queue;
pub mod router;
pub mod task;

pub use credentials::CredentialStore;
pub use delegate::{ProgressSnapshot, TaskDelegate, TaskState};
pub use handlers::{DestinationResolver, TaskHandlers};
pub use manager::SessionManager;
pub use router::SessionEventRouter;
pub use task::NetworkTask;
