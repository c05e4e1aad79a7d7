//! Infrastructure layer: Postgres Data Store, narrative HTTP client,
//! recurring Scheduler Trigger and demo seed data.

pub mod narrative;
pub mod scheduler;
pub mod seed;
pub mod store;

pub use narrative::{HttpNarrativeClient, NarrativeClientConfig};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerTrigger, TriggerRequest};
pub use seed::{SeedSummary, seed_demo_data};
pub use store::PostgresDataStore;
