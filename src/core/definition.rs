//! Scope-qualified procedure and event definitions.
//!
//! Definitions live in dependency-free units: a module that wants to call
//! `debts.create` only needs the `Interface` token, never the debts module
//! itself. Concrete handlers are wired together at boot through the registrar.

use crate::core::schema::{self, SchemaRef};
use crate::domain::model::EventKey;
use crate::utils::error::{BusError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug)]
pub struct ProcedureDef {
    pub scope: String,
    pub name: String,
    pub payload: SchemaRef,
    pub response: SchemaRef,
}

impl ProcedureDef {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.scope, self.name)
    }
}

#[derive(Debug)]
pub struct EventDef {
    pub key: EventKey,
    pub payload: SchemaRef,
}

/// Strongly typed, immutable handle to a procedure.
pub struct Procedure<P, R> {
    def: Arc<ProcedureDef>,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> Procedure<P, R> {
    pub fn def(&self) -> &ProcedureDef {
        &self.def
    }

    pub(crate) fn shared_def(&self) -> &Arc<ProcedureDef> {
        &self.def
    }

    pub fn scope(&self) -> &str {
        &self.def.scope
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl<P, R> Clone for Procedure<P, R> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<P, R> fmt::Debug for Procedure<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Procedure({})", self.def.qualified_name())
    }
}

/// Strongly typed, immutable handle to an event.
pub struct Event<P> {
    def: Arc<EventDef>,
    _marker: PhantomData<fn(P)>,
}

impl<P> Event<P> {
    pub fn def(&self) -> &EventDef {
        &self.def
    }

    pub(crate) fn shared_def(&self) -> &Arc<EventDef> {
        &self.def
    }

    pub fn key(&self) -> &EventKey {
        &self.def.key
    }
}

impl<P> Clone for Event<P> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Event<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.def.key)
    }
}

/// Builder for one scope. Names must be unique per scope across both
/// procedures and events.
#[derive(Debug)]
pub struct Scope {
    name: String,
    defined: HashSet<String>,
    procedures: Vec<Arc<ProcedureDef>>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defined: HashSet::new(),
            procedures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn claim(&mut self, name: &str) -> Result<()> {
        if !self.defined.insert(name.to_string()) {
            return Err(BusError::DuplicateDefinition {
                scope: self.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// 以 serde 型別推導 payload 與 response 的 schema
    pub fn procedure<P, R>(&mut self, name: &str) -> Result<Procedure<P, R>>
    where
        P: Serialize + DeserializeOwned + 'static,
        R: Serialize + DeserializeOwned + 'static,
    {
        self.procedure_with(name, schema::typed::<P>(), schema::typed::<R>())
    }

    pub fn procedure_with<P, R>(
        &mut self,
        name: &str,
        payload: SchemaRef,
        response: SchemaRef,
    ) -> Result<Procedure<P, R>> {
        self.claim(name)?;
        let def = Arc::new(ProcedureDef {
            scope: self.name.clone(),
            name: name.to_string(),
            payload,
            response,
        });
        self.procedures.push(Arc::clone(&def));
        Ok(Procedure {
            def,
            _marker: PhantomData,
        })
    }

    pub fn event<P>(&mut self, name: &str) -> Result<Event<P>>
    where
        P: Serialize + DeserializeOwned + 'static,
    {
        self.event_with(name, schema::typed::<P>())
    }

    pub fn event_with<P>(&mut self, name: &str, payload: SchemaRef) -> Result<Event<P>> {
        self.claim(name)?;
        Ok(Event {
            def: Arc::new(EventDef {
                key: EventKey {
                    scope: self.name.clone(),
                    name: name.to_string(),
                },
                payload,
            }),
            _marker: PhantomData,
        })
    }
}

/// A named bundle of procedures belonging to one scope.
#[derive(Debug)]
pub struct Interface<T> {
    name: String,
    procedure_names: Vec<String>,
    definitions: Vec<Arc<ProcedureDef>>,
    pub procedures: T,
}

impl<T> Interface<T> {
    pub fn create<F>(scope_name: &str, build: F) -> Result<Self>
    where
        F: FnOnce(&mut Scope) -> Result<T>,
    {
        let mut scope = Scope::new(scope_name);
        let procedures = build(&mut scope)?;
        Ok(Self {
            name: scope.name,
            procedure_names: scope.procedures.iter().map(|def| def.name.clone()).collect(),
            definitions: scope.procedures,
            procedures,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn procedure_names(&self) -> &[String] {
        &self.procedure_names
    }

    /// Identity check: a same-named procedure from another `create` call is
    /// not owned.
    pub fn owns<P, R>(&self, procedure: &Procedure<P, R>) -> bool {
        self.definitions
            .iter()
            .any(|def| Arc::ptr_eq(def, procedure.shared_def()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        increment: Procedure<i64, i64>,
        reset: Procedure<(), ()>,
    }

    #[test]
    fn test_create_interface_exposes_procedures() {
        let iface = Interface::create("counter", |scope| {
            Ok(Counter {
                increment: scope.procedure("increment")?,
                reset: scope.procedure("reset")?,
            })
        })
        .unwrap();

        assert_eq!(iface.name(), "counter");
        assert_eq!(iface.procedure_names(), &["increment", "reset"]);
        assert_eq!(iface.procedures.increment.def().qualified_name(), "counter.increment");
        assert!(iface.owns(&iface.procedures.reset));
    }

    #[test]
    fn test_duplicate_name_in_scope_is_rejected() {
        let result = Interface::create("counter", |scope| {
            let _first: Procedure<i64, i64> = scope.procedure("increment")?;
            let _event: Event<i64> = scope.event("increment")?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(BusError::DuplicateDefinition { ref scope, ref name }) if scope == "counter" && name == "increment"
        ));
    }

    #[test]
    fn test_foreign_procedure_is_not_owned() {
        let a = Interface::create("a", |scope| scope.procedure::<i64, i64>("run")).unwrap();
        let b = Interface::create("b", |scope| scope.procedure::<i64, i64>("run")).unwrap();
        assert!(!a.owns(&b.procedures));
    }

    #[test]
    fn test_redefined_scope_does_not_own_original_procedures() {
        let first = Interface::create("billing", |scope| scope.procedure::<i64, i64>("run")).unwrap();
        let second = Interface::create("billing", |scope| scope.procedure::<i64, i64>("run")).unwrap();

        assert!(first.owns(&first.procedures));
        assert!(!first.owns(&second.procedures));
        assert!(first.owns(&first.procedures.clone()));
    }
}
