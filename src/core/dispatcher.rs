//! The bus handle bound to one execution context.
//!
//! Every call validates the payload against the procedure schema before the
//! handler runs, and the handler's result against the response schema before
//! the caller sees it. The handler receives a clone of the same handle, so
//! nested calls reuse the request's transaction and session.

use crate::core::context::ExecutionContext;
use crate::core::definition::{Event, Interface, Procedure, ProcedureDef};
use crate::core::registry::Registry;
use crate::domain::model::{HandlerKey, SubscriberFailure};
use crate::utils::error::{BusError, Direction, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Clone)]
pub struct Bus {
    registry: Arc<Registry>,
    context: Arc<ExecutionContext>,
}

impl Bus {
    pub fn new(registry: Arc<Registry>, context: Arc<ExecutionContext>) -> Self {
        Self { registry, context }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn exec<P, R>(&self, procedure: &Procedure<P, R>, payload: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let value = serde_json::to_value(payload).map_err(|e| {
            BusError::contract(procedure.def().qualified_name(), Direction::Payload, e.to_string())
        })?;
        self.exec_json(procedure, value).await
    }

    /// 由原始 JSON 開始派送（路由層把請求 body 直接交給 bus）
    pub async fn exec_json<P, R>(&self, procedure: &Procedure<P, R>, payload: Value) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self.dispatch(procedure.shared_def(), None, payload).await?;
        serde_json::from_value(response).map_err(|e| {
            BusError::contract(procedure.def().qualified_name(), Direction::Response, e.to_string())
        })
    }

    pub(crate) async fn dispatch(
        &self,
        def: &Arc<ProcedureDef>,
        tag: Option<&str>,
        payload: Value,
    ) -> Result<Value> {
        let key = HandlerKey::new(&def.scope, &def.name, tag);

        let payload = def
            .payload
            .decode(&payload)
            .map_err(|failure| BusError::contract(key.to_string(), Direction::Payload, failure.message))?;

        let entry = self
            .registry
            .handler(&key)
            .ok_or_else(|| BusError::NoSuchHandler {
                interface: key.interface.clone(),
                procedure: Some(key.procedure.clone()),
                tag: key.tag.clone(),
            })?;
        // handle 必須來自註冊時的同一份定義
        if !Arc::ptr_eq(&entry.def, def) {
            return Err(BusError::DuplicateDefinition {
                scope: def.scope.clone(),
                name: def.name.clone(),
            });
        }
        let handler = Arc::clone(&entry.call);

        let span = tracing::debug_span!(
            "exec",
            request_id = %self.context.request_id(),
            procedure = %key,
        );
        let response = handler(payload, Arc::clone(&self.context), self.clone())
            .instrument(span)
            .await
            .inspect_err(|e| tracing::debug!("{} failed: {}", key, e))?;

        def.response
            .decode(&response)
            .map_err(|failure| BusError::contract(key.to_string(), Direction::Response, failure.message))
    }

    /// Returns a proxy whose calls only reach the implementation registered
    /// under `tag`. There is no fallback to the untagged handler.
    pub fn get_interface<'i, T>(&self, interface: &'i Interface<T>, tag: &str) -> Result<Variant<'i, T>> {
        if !self.registry.has_variant(interface.name(), tag) {
            return Err(BusError::NoSuchHandler {
                interface: interface.name().to_string(),
                procedure: None,
                tag: Some(tag.to_string()),
            });
        }
        Ok(Variant {
            bus: self.clone(),
            interface,
            tag: tag.to_string(),
        })
    }

    pub fn variants<T>(&self, interface: &Interface<T>) -> Vec<String> {
        self.registry.variants(interface.name())
    }

    /// Validates once, then runs every subscriber in registration order on
    /// this context. Resolves after all of them have completed.
    pub async fn emit<P>(&self, event: &Event<P>, payload: P) -> Result<()>
    where
        P: Serialize,
    {
        let key = event.key();
        let value = serde_json::to_value(payload)
            .map_err(|e| BusError::contract(key.to_string(), Direction::Payload, e.to_string()))?;
        let value = event
            .def()
            .payload
            .decode(&value)
            .map_err(|failure| BusError::contract(key.to_string(), Direction::Payload, failure.message))?;

        let Some(entry) = self.registry.subscribers(key) else {
            tracing::debug!("No subscribers for {}", key);
            return Ok(());
        };
        if !Arc::ptr_eq(&entry.def, event.shared_def()) {
            return Err(BusError::DuplicateDefinition {
                scope: key.scope.clone(),
                name: key.name.clone(),
            });
        }
        let subscribers = &entry.list;

        let span = tracing::debug_span!(
            "emit",
            request_id = %self.context.request_id(),
            event = %key,
        );
        let policy = self.registry.subscriber_failure();

        async {
            let mut first_error = None;
            for (index, subscriber) in subscribers.iter().enumerate() {
                let outcome = subscriber(value.clone(), Arc::clone(&self.context), self.clone()).await;
                if let Err(e) = outcome {
                    tracing::debug!("Subscriber #{} of {} failed: {}", index, key, e);
                    match policy {
                        SubscriberFailure::FailFast => return Err(e),
                        SubscriberFailure::RunAll => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        .instrument(span)
        .await
    }
}

/// Proxy bound to one named variant of an interface.
pub struct Variant<'i, T> {
    bus: Bus,
    interface: &'i Interface<T>,
    tag: String,
}

impl<'i, T> Variant<'i, T> {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn procedures(&self) -> &'i T {
        &self.interface.procedures
    }

    pub async fn exec<P, R>(&self, procedure: &Procedure<P, R>, payload: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let value = serde_json::to_value(payload).map_err(|e| {
            BusError::contract(procedure.def().qualified_name(), Direction::Payload, e.to_string())
        })?;
        self.exec_json(procedure, value).await
    }

    pub async fn exec_json<P, R>(&self, procedure: &Procedure<P, R>, payload: Value) -> Result<R>
    where
        R: DeserializeOwned,
    {
        if !self.interface.owns(procedure) {
            return Err(BusError::ForeignProcedure {
                interface: self.interface.name().to_string(),
                procedure: procedure.def().qualified_name(),
            });
        }
        let response = self
            .bus
            .dispatch(procedure.shared_def(), Some(&self.tag), payload)
            .await?;
        serde_json::from_value(response).map_err(|e| {
            BusError::contract(procedure.def().qualified_name(), Direction::Response, e.to_string())
        })
    }
}
