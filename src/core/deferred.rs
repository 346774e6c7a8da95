//! Deferred calling conventions over the same dispatch.
//!
//! `exec_t` hands back a lazy [`Task`]; `exec_te` hands back a two-track
//! [`TaskEither`] that composes with `map`/`and_then`/`or_else`. Nothing is
//! dispatched until the value is awaited or `run`.

use crate::core::definition::Procedure;
use crate::core::dispatcher::Bus;
use crate::core::registry::BoxFuture;
use crate::utils::error::{BusError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::{Future, IntoFuture};

pub struct Task<T> {
    thunk: Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            thunk: Box::new(move || Box::pin(f())),
        }
    }

    pub fn of(value: T) -> Self {
        Self::new(move || std::future::ready(value))
    }

    pub async fn run(self) -> T {
        (self.thunk)().await
    }

    pub fn map<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Task::new(move || async move { f(self.run().await) })
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = T;
    type IntoFuture = BoxFuture<'static, T>;

    fn into_future(self) -> Self::IntoFuture {
        (self.thunk)()
    }
}

/// Lazy computation on the success/failure tracks.
pub struct TaskEither<R> {
    task: Task<Result<R>>,
}

impl<R: Send + 'static> TaskEither<R> {
    pub fn from_task(task: Task<Result<R>>) -> Self {
        Self { task }
    }

    pub fn right(value: R) -> Self {
        Self::from_task(Task::of(Ok(value)))
    }

    pub fn left(error: BusError) -> Self {
        Self::from_task(Task::of(Err(error)))
    }

    pub async fn run(self) -> Result<R> {
        self.task.run().await
    }

    pub fn map<U, F>(self, f: F) -> TaskEither<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
    {
        TaskEither::from_task(self.task.map(move |result| result.map(f)))
    }

    pub fn map_err<F>(self, f: F) -> Self
    where
        F: FnOnce(BusError) -> BusError + Send + 'static,
    {
        Self::from_task(self.task.map(move |result| result.map_err(f)))
    }

    pub fn and_then<U, F>(self, f: F) -> TaskEither<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> TaskEither<U> + Send + 'static,
    {
        TaskEither::from_task(Task::new(move || async move {
            match self.run().await {
                Ok(value) => f(value).run().await,
                Err(e) => Err(e),
            }
        }))
    }

    pub fn or_else<F>(self, f: F) -> Self
    where
        F: FnOnce(BusError) -> TaskEither<R> + Send + 'static,
    {
        Self::from_task(Task::new(move || async move {
            match self.run().await {
                Ok(value) => Ok(value),
                Err(e) => f(e).run().await,
            }
        }))
    }
}

impl<R: Send + 'static> IntoFuture for TaskEither<R> {
    type Output = Result<R>;
    type IntoFuture = BoxFuture<'static, Result<R>>;

    fn into_future(self) -> Self::IntoFuture {
        self.task.into_future()
    }
}

impl Bus {
    pub fn exec_t<P, R>(&self, procedure: &Procedure<P, R>, payload: P) -> Task<Result<R>>
    where
        P: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let bus = self.clone();
        let procedure = procedure.clone();
        Task::new(move || async move { bus.exec(&procedure, payload).await })
    }

    pub fn exec_te<P, R>(&self, procedure: &Procedure<P, R>, payload: P) -> TaskEither<R>
    where
        P: Serialize + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        TaskEither::from_task(self.exec_t(procedure, payload))
    }
}
