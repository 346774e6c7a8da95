pub mod context;
pub mod deferred;
pub mod definition;
pub mod dispatcher;
pub mod lifecycle;
pub mod registry;
pub mod schema;

pub use crate::domain::model::{EventKey, HandlerKey, SubscriberFailure};
pub use crate::domain::ports::{ConnectionPool, Storage, Transaction};
pub use crate::utils::error::Result;
