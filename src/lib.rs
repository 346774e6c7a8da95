pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::BusConfig;
#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use core::context::{ExecutionContext, StaticServices};
pub use core::deferred::{Task, TaskEither};
pub use core::definition::{Event, Interface, Procedure, Scope};
pub use core::dispatcher::{Bus, Variant};
pub use core::lifecycle::{App, Exports, LifecycleManager, Module, Mount, SetupDeps};
pub use core::registry::{Registrar, Registry};
pub use core::schema::{Schema, SchemaFailure};
pub use utils::error::{BusError, Result};
