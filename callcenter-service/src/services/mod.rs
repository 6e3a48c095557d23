pub mod catalog;
pub mod clock;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod sweeper;

pub use catalog::{AgentCatalog, CatalogError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{get_metrics, init_metrics};
pub use registry::{RegistryError, RegistrySettings, SessionRegistry};
pub use sweeper::SessionSweeper;
