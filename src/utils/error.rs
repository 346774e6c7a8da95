use std::fmt;
use thiserror::Error;

/// 契約檢查的方向：呼叫端送入的 payload，或 handler 回傳的 response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Payload,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Payload => write!(f, "payload"),
            Direction::Response => write!(f, "response"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Contract,
    Wiring,
    Domain,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Contract violation on {target} ({direction}): {reason}")]
    ContractViolation {
        target: String,
        direction: Direction,
        reason: String,
    },

    #[error("No handler registered for {}", describe_key(.interface, .procedure.as_deref(), .tag.as_deref()))]
    NoSuchHandler {
        interface: String,
        procedure: Option<String>,
        tag: Option<String>,
    },

    #[error("Duplicate registration for {}", describe_key(.interface, Some(.procedure.as_str()), .tag.as_deref()))]
    DuplicateRegistration {
        interface: String,
        procedure: String,
        tag: Option<String>,
    },

    #[error("'{name}' is already defined in scope '{scope}'")]
    DuplicateDefinition { scope: String, name: String },

    #[error("Procedure '{procedure}' does not belong to interface '{interface}'")]
    ForeignProcedure { interface: String, procedure: String },

    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    #[error("Module '{module}' failed during setup: {source}")]
    SetupFailed {
        module: String,
        #[source]
        source: Box<BusError>,
    },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration value for '{field}': '{value}' ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

fn describe_key(interface: &str, procedure: Option<&str>, tag: Option<&str>) -> String {
    let mut key = interface.to_string();
    if let Some(procedure) = procedure {
        key.push('.');
        key.push_str(procedure);
    }
    if let Some(tag) = tag {
        key.push_str(&format!(" [tag '{}']", tag));
    }
    key
}

impl BusError {
    /// 將任意領域錯誤包成 handler 錯誤
    pub fn handler<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BusError::Handler(anyhow::Error::new(error))
    }

    pub fn handler_msg(message: impl fmt::Display) -> Self {
        BusError::Handler(anyhow::anyhow!("{}", message))
    }

    pub fn contract(target: impl Into<String>, direction: Direction, reason: impl Into<String>) -> Self {
        BusError::ContractViolation {
            target: target.into(),
            direction,
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BusError::ContractViolation { .. } => ErrorCategory::Contract,
            BusError::NoSuchHandler { .. }
            | BusError::DuplicateRegistration { .. }
            | BusError::DuplicateDefinition { .. }
            | BusError::ForeignProcedure { .. } => ErrorCategory::Wiring,
            BusError::Handler(_) => ErrorCategory::Domain,
            BusError::SetupFailed { source, .. } => source.category(),
            BusError::Transaction { .. }
            | BusError::Config { .. }
            | BusError::InvalidConfigValue { .. }
            | BusError::Io(_)
            | BusError::Serialization(_)
            | BusError::TomlParse(_) => ErrorCategory::Infrastructure,
        }
    }

    /// 啟動階段遇到就必須中止程序的錯誤
    pub fn is_boot_fatal(&self) -> bool {
        matches!(
            self,
            BusError::DuplicateRegistration { .. }
                | BusError::DuplicateDefinition { .. }
                | BusError::ForeignProcedure { .. }
                | BusError::SetupFailed { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Contract => "Check the payload/response shape against the procedure schema",
            ErrorCategory::Wiring => "Check module setup: every procedure needs exactly one registration per tag",
            ErrorCategory::Domain => "Inspect the handler error; the request transaction was rolled back",
            ErrorCategory::Infrastructure => "Check configuration, storage and database connectivity",
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_handler_message() {
        let err = BusError::NoSuchHandler {
            interface: "payments".to_string(),
            procedure: Some("pay".to_string()),
            tag: Some("stripe".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No handler registered for payments.pay [tag 'stripe']"
        );
        assert_eq!(err.category(), ErrorCategory::Wiring);
        assert!(!err.is_boot_fatal());
    }

    #[test]
    fn test_setup_failed_keeps_inner_category() {
        let err = BusError::SetupFailed {
            module: "debts".to_string(),
            source: Box::new(BusError::DuplicateRegistration {
                interface: "debts".to_string(),
                procedure: "create".to_string(),
                tag: None,
            }),
        };
        assert_eq!(err.category(), ErrorCategory::Wiring);
        assert!(err.is_boot_fatal());
        assert!(err.to_string().contains("Duplicate registration for debts.create"));
    }

    #[test]
    fn test_handler_error_is_domain() {
        let err = BusError::handler_msg("debt already paid");
        assert_eq!(err.category(), ErrorCategory::Domain);
        assert_eq!(err.to_string(), "debt already paid");
    }
}
