//! Schema adapters: every payload/response contract is reduced to
//! `decode(value) -> success | failure`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFailure {
    pub message: String,
}

impl SchemaFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type Decoded = std::result::Result<Value, SchemaFailure>;

pub trait Schema: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// 成功時回傳（可能已正規化的）值
    fn decode(&self, value: &Value) -> Decoded;
}

pub type SchemaRef = Arc<dyn Schema>;

impl fmt::Debug for dyn Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema({})", self.name())
    }
}

/// Shape check through serde: the value must deserialize into `T`.
pub struct Typed<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for Typed<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: &Value) -> Decoded {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| SchemaFailure::new(format!("expected {}: {}", self.name, e)))?;
        serde_json::to_value(typed).map_err(|e| SchemaFailure::new(e.to_string()))
    }
}

/// `Typed<T>` plus a domain predicate, e.g. "amount must be positive".
pub struct Refined<T> {
    inner: Typed<T>,
    check: Box<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>,
}

impl<T> Refined<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self {
            inner: Typed::new(),
            check: Box::new(check),
        }
    }
}

impl<T> Schema for Refined<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn decode(&self, value: &Value) -> Decoded {
        let normalized = self.inner.decode(value)?;
        let typed: T = serde_json::from_value(normalized.clone())
            .map_err(|e| SchemaFailure::new(e.to_string()))?;
        (self.check)(&typed).map_err(SchemaFailure::new)?;
        Ok(normalized)
    }
}

/// Accepts anything. Used for opaque pass-through payloads.
pub struct AnyValue;

impl Schema for AnyValue {
    fn name(&self) -> &str {
        "any"
    }

    fn decode(&self, value: &Value) -> Decoded {
        Ok(value.clone())
    }
}

struct FnSchema<F> {
    name: String,
    decode: F,
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Decoded + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: &Value) -> Decoded {
        (self.decode)(value)
    }
}

/// 用閉包包裝任意外部驗證器
pub fn from_fn<F>(name: impl Into<String>, decode: F) -> SchemaRef
where
    F: Fn(&Value) -> Decoded + Send + Sync + 'static,
{
    Arc::new(FnSchema {
        name: name.into(),
        decode,
    })
}

pub fn typed<T>() -> SchemaRef
where
    T: Serialize + DeserializeOwned + 'static,
{
    Arc::new(Typed::<T>::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct NewDebt {
        name: String,
        amount: i64,
    }

    #[test]
    fn test_typed_accepts_matching_shape() {
        let schema = Typed::<NewDebt>::new();
        let decoded = schema.decode(&json!({"name": "Membership", "amount": 1500})).unwrap();
        assert_eq!(decoded, json!({"name": "Membership", "amount": 1500}));
    }

    #[test]
    fn test_typed_rejects_wrong_shape() {
        let schema = Typed::<i64>::new();
        let failure = schema.decode(&json!("x")).unwrap_err();
        assert!(failure.message.contains("i64"));
    }

    #[test]
    fn test_refined_runs_predicate() {
        let schema = Refined::<NewDebt>::new(|debt| {
            if debt.amount > 0 {
                Ok(())
            } else {
                Err("amount must be positive".to_string())
            }
        });
        assert!(schema.decode(&json!({"name": "a", "amount": 1})).is_ok());
        let failure = schema.decode(&json!({"name": "a", "amount": -5})).unwrap_err();
        assert_eq!(failure.message, "amount must be positive");
    }

    #[test]
    fn test_from_fn_schema() {
        let schema = from_fn("non-empty string", |value| match value.as_str() {
            Some(s) if !s.is_empty() => Ok(value.clone()),
            _ => Err(SchemaFailure::new("expected non-empty string")),
        });
        assert_eq!(schema.name(), "non-empty string");
        assert!(schema.decode(&json!("ok")).is_ok());
        assert!(schema.decode(&json!("")).is_err());
        assert!(AnyValue.decode(&json!(null)).is_ok());
    }
}
