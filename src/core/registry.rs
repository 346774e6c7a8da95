//! Handler/variant table and subscriber lists.
//!
//! `Registrar` is only reachable during module setup. `freeze` turns it into
//! an immutable `Registry` that every request shares through an `Arc`
//! without locking.

use crate::core::context::ExecutionContext;
use crate::core::definition::{Event, EventDef, Interface, Procedure, ProcedureDef};
use crate::core::dispatcher::Bus;
use crate::domain::model::{EventKey, HandlerKey, SubscriberFailure};
use crate::utils::error::{BusError, Direction, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type ErasedHandler =
    Arc<dyn Fn(Value, Arc<ExecutionContext>, Bus) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub(crate) type ErasedSubscriber =
    Arc<dyn Fn(Value, Arc<ExecutionContext>, Bus) -> BoxFuture<'static, Result<()>> + Send + Sync>;

fn erase_handler<P, R, F, Fut>(target: String, handler: F) -> ErasedHandler
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    F: Fn(P, Arc<ExecutionContext>, Bus) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let target: Arc<str> = Arc::from(target);
    Arc::new(
        move |value: Value, ctx: Arc<ExecutionContext>, bus: Bus| -> BoxFuture<'static, Result<Value>> {
            match serde_json::from_value::<P>(value) {
                Ok(payload) => {
                    let call = handler(payload, ctx, bus);
                    let target = Arc::clone(&target);
                    Box::pin(async move {
                        let response = call.await?;
                        serde_json::to_value(response).map_err(|e| {
                            BusError::contract(&*target, Direction::Response, e.to_string())
                        })
                    })
                }
                Err(e) => {
                    let err = BusError::contract(&*target, Direction::Payload, e.to_string());
                    Box::pin(std::future::ready(Err(err)))
                }
            }
        },
    )
}

fn erase_subscriber<P, F, Fut>(target: String, subscriber: F) -> ErasedSubscriber
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, Arc<ExecutionContext>, Bus) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(
        move |value: Value, ctx: Arc<ExecutionContext>, bus: Bus| -> BoxFuture<'static, Result<()>> {
            match serde_json::from_value::<P>(value) {
                Ok(payload) => Box::pin(subscriber(payload, ctx, bus)),
                Err(e) => {
                    let err = BusError::contract(target.as_str(), Direction::Payload, e.to_string());
                    Box::pin(std::future::ready(Err(err)))
                }
            }
        },
    )
}

/// A handler together with the definition it was registered against.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) def: Arc<ProcedureDef>,
    pub(crate) call: ErasedHandler,
}

pub(crate) struct EventSubscribers {
    pub(crate) def: Arc<EventDef>,
    pub(crate) list: Vec<ErasedSubscriber>,
}

#[derive(Default)]
pub struct Registrar {
    handlers: HashMap<HandlerKey, HandlerEntry>,
    /// `scope.name` -> 唯一的定義；不同 tag 的 handler 也必須共用它
    definitions: HashMap<String, Arc<ProcedureDef>>,
    variants: HashMap<String, BTreeSet<String>>,
    subscribers: HashMap<EventKey, EventSubscribers>,
    subscriber_failure: SubscriberFailure,
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriber_failure(mut self, policy: SubscriberFailure) -> Self {
        self.subscriber_failure = policy;
        self
    }

    fn insert(&mut self, key: HandlerKey, def: &Arc<ProcedureDef>, handler: ErasedHandler) -> Result<()> {
        if self.handlers.contains_key(&key) {
            return Err(BusError::DuplicateRegistration {
                interface: key.interface,
                procedure: key.procedure,
                tag: key.tag,
            });
        }
        let known = self
            .definitions
            .entry(def.qualified_name())
            .or_insert_with(|| Arc::clone(def));
        if !Arc::ptr_eq(known, def) {
            return Err(BusError::DuplicateDefinition {
                scope: def.scope.clone(),
                name: def.name.clone(),
            });
        }
        if let Some(tag) = &key.tag {
            self.variants
                .entry(key.interface.clone())
                .or_default()
                .insert(tag.clone());
        }
        tracing::debug!("Registered handler {}", key);
        self.handlers.insert(
            key,
            HandlerEntry {
                def: Arc::clone(def),
                call: handler,
            },
        );
        Ok(())
    }

    /// 註冊單一（無標籤）procedure handler
    pub fn register<P, R, F, Fut>(&mut self, procedure: &Procedure<P, R>, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(P, Arc<ExecutionContext>, Bus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let key = HandlerKey::new(procedure.scope(), procedure.name(), None);
        let erased = erase_handler(procedure.def().qualified_name(), handler);
        self.insert(key, procedure.shared_def(), erased)
    }

    pub fn provide<'r, 'i, T>(&'r mut self, interface: &'i Interface<T>) -> Provider<'r, 'i, T> {
        Provider {
            registrar: self,
            interface,
            tag: None,
        }
    }

    /// 以字串標籤註冊同一介面的多個實作（付款方式、排程執行器等）
    pub fn provide_named<'r, 'i, T>(
        &'r mut self,
        interface: &'i Interface<T>,
        tag: &str,
    ) -> Provider<'r, 'i, T> {
        Provider {
            registrar: self,
            interface,
            tag: Some(tag.to_string()),
        }
    }

    /// Subscribers of one event must all come from the same definition.
    pub fn on<P, F, Fut>(&mut self, event: &Event<P>, subscriber: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, Arc<ExecutionContext>, Bus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let key = event.key().clone();
        let erased = erase_subscriber(key.to_string(), subscriber);
        let entry = self
            .subscribers
            .entry(key)
            .or_insert_with(|| EventSubscribers {
                def: Arc::clone(event.shared_def()),
                list: Vec::new(),
            });
        if !Arc::ptr_eq(&entry.def, event.shared_def()) {
            return Err(BusError::DuplicateDefinition {
                scope: event.key().scope.clone(),
                name: event.key().name.clone(),
            });
        }
        entry.list.push(erased);
        tracing::debug!("Subscribed to {} ({} subscribers)", event.key(), entry.list.len());
        Ok(())
    }

    pub fn freeze(self) -> Registry {
        tracing::debug!(
            "Freezing registry: {} handlers, {} events with subscribers",
            self.handlers.len(),
            self.subscribers.len()
        );
        Registry {
            handlers: self.handlers,
            variants: self.variants,
            subscribers: self.subscribers,
            subscriber_failure: self.subscriber_failure,
        }
    }
}

/// Registers the implementation of one interface, optionally under a tag.
pub struct Provider<'r, 'i, T> {
    registrar: &'r mut Registrar,
    interface: &'i Interface<T>,
    tag: Option<String>,
}

impl<T> Provider<'_, '_, T> {
    pub fn handle<P, R, F, Fut>(&mut self, procedure: &Procedure<P, R>, handler: F) -> Result<&mut Self>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(P, Arc<ExecutionContext>, Bus) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        if !self.interface.owns(procedure) {
            return Err(BusError::ForeignProcedure {
                interface: self.interface.name().to_string(),
                procedure: procedure.def().qualified_name(),
            });
        }
        let key = HandlerKey::new(self.interface.name(), procedure.name(), self.tag.as_deref());
        let erased = erase_handler(key.to_string(), handler);
        self.registrar.insert(key, procedure.shared_def(), erased)?;
        Ok(self)
    }
}

/// Immutable after boot.
pub struct Registry {
    handlers: HashMap<HandlerKey, HandlerEntry>,
    variants: HashMap<String, BTreeSet<String>>,
    subscribers: HashMap<EventKey, EventSubscribers>,
    subscriber_failure: SubscriberFailure,
}

impl Registry {
    pub(crate) fn handler(&self, key: &HandlerKey) -> Option<&HandlerEntry> {
        self.handlers.get(key)
    }

    pub(crate) fn subscribers(&self, key: &EventKey) -> Option<&EventSubscribers> {
        self.subscribers.get(key)
    }

    pub fn subscriber_failure(&self) -> SubscriberFailure {
        self.subscriber_failure
    }

    pub fn has_variant(&self, interface: &str, tag: &str) -> bool {
        self.variants
            .get(interface)
            .is_some_and(|tags| tags.contains(tag))
    }

    /// 已註冊的標籤（依字母排序）
    pub fn variants(&self, interface: &str) -> Vec<String> {
        self.variants
            .get(interface)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn subscriber_count(&self, key: &EventKey) -> usize {
        self.subscribers(key).map_or(0, |entry| entry.list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Jobs {
        execute: Procedure<String, bool>,
    }

    fn jobs() -> Interface<Jobs> {
        Interface::create("jobs", |scope| {
            Ok(Jobs {
                execute: scope.procedure("execute")?,
            })
        })
        .unwrap()
    }

    #[test]
    fn test_duplicate_untagged_registration_fails_fast() {
        let iface = jobs();
        let mut registrar = Registrar::new();
        registrar
            .register(&iface.procedures.execute, |_, _, _| async { Ok(true) })
            .unwrap();

        let err = registrar
            .provide(&iface)
            .handle(&iface.procedures.execute, |_, _, _| async { Ok(false) })
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BusError::DuplicateRegistration { ref procedure, tag: None, .. } if procedure == "execute"
        ));
    }

    #[test]
    fn test_same_tag_twice_fails_distinct_tags_succeed() {
        let iface = jobs();
        let mut registrar = Registrar::new();
        registrar
            .provide_named(&iface, "send-email")
            .handle(&iface.procedures.execute, |_, _, _| async { Ok(true) })
            .unwrap();
        registrar
            .provide_named(&iface, "send-sms")
            .handle(&iface.procedures.execute, |_, _, _| async { Ok(true) })
            .unwrap();

        let err = registrar
            .provide_named(&iface, "send-email")
            .handle(&iface.procedures.execute, |_, _, _| async { Ok(true) })
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BusError::DuplicateRegistration { tag: Some(ref tag), .. } if tag == "send-email"
        ));

        let registry = registrar.freeze();
        assert_eq!(registry.variants("jobs"), vec!["send-email", "send-sms"]);
        assert!(registry.has_variant("jobs", "send-sms"));
        assert!(!registry.has_variant("jobs", "push"));
        assert_eq!(registry.handler_count(), 2);
    }

    #[test]
    fn test_foreign_procedure_is_rejected() {
        let iface = jobs();
        let redefined = jobs();
        let mut registrar = Registrar::new();
        // 同名同 scope 但另外定義的 procedure 不屬於這個介面
        let err = registrar
            .provide(&iface)
            .handle(&redefined.procedures.execute, |_, _, _| async { Ok(true) })
            .err()
            .unwrap();
        assert!(matches!(err, BusError::ForeignProcedure { .. }));

        let foreign = Interface::create("mail", |scope| scope.procedure::<String, bool>("execute")).unwrap();
        let err = registrar
            .provide(&iface)
            .handle(&foreign.procedures, |_, _, _| async { Ok(true) })
            .err()
            .unwrap();
        assert!(matches!(err, BusError::ForeignProcedure { .. }));
    }

    #[test]
    fn test_subscribers_keep_registration_order_count() {
        let event = crate::core::definition::Scope::new("debts")
            .event::<u32>("created")
            .unwrap();
        let mut registrar = Registrar::new().with_subscriber_failure(SubscriberFailure::RunAll);
        registrar.on(&event, |_, _, _| async { Ok(()) }).unwrap();
        registrar.on(&event, |_, _, _| async { Ok(()) }).unwrap();

        let registry = registrar.freeze();
        assert_eq!(registry.subscriber_count(event.key()), 2);
        assert_eq!(registry.subscriber_failure(), SubscriberFailure::RunAll);
    }

    #[test]
    fn test_second_definition_of_a_key_cannot_register() {
        let iface = jobs();
        let redefined = jobs();
        let mut registrar = Registrar::new();
        registrar
            .provide_named(&iface, "send-email")
            .handle(&iface.procedures.execute, |_, _, _| async { Ok(true) })
            .unwrap();

        // 不同 tag，但 `jobs.execute` 已綁定到第一次的定義
        let err = registrar
            .provide_named(&redefined, "send-sms")
            .handle(&redefined.procedures.execute, |_, _, _| async { Ok(true) })
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BusError::DuplicateDefinition { ref scope, ref name } if scope == "jobs" && name == "execute"
        ));

        let created = crate::core::definition::Scope::new("debts")
            .event::<u32>("created")
            .unwrap();
        let recreated = crate::core::definition::Scope::new("debts")
            .event::<u32>("created")
            .unwrap();
        registrar.on(&created, |_, _, _| async { Ok(()) }).unwrap();
        let err = registrar.on(&recreated, |_, _, _| async { Ok(()) }).unwrap_err();
        assert!(matches!(err, BusError::DuplicateDefinition { .. }));

        let registry = registrar.freeze();
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.subscriber_count(created.key()), 1);
    }
}
