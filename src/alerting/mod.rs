//! Periodic alert scheduling.
//!
//! Each alert kind of a cluster runs its own loop. A loop ticks every
//! configured interval, evaluates the kind's predicate and counts problematic
//! ticks; reaching the trigger count emits one [`AlertRecord`] and starts the
//! count over. Settings are reloaded from an [`AlertConfigStore`] on a slower
//! timer without restarting loops.

mod context;
mod kind;
mod probe;
mod scheduler;
mod store;

pub use context::{AlertContext, AlertSettings, LoopState};
pub use kind::{AlertKind, AlertSeverity, ServiceKind};
pub use probe::{AlertEnv, ClusterCapacity, EndpointStatus, InMemoryServiceProbe, ServiceProbe};
pub use scheduler::{run_tick, AlertSupervisor, TickOutcome};
pub use store::{
    AlertConfigRecord, AlertConfigStore, AlertRecord, AlertSink, InMemoryAlertStore,
};
