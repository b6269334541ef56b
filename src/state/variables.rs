// ABOUTME: Typed variables scoped to a stack or global.
// ABOUTME: Variables must be registered with a type before use; writes are re-validated.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::types::StackName;

pub const HEALTH_STATUS: &str = "HEALTH_STATUS";
pub const DEPLOYMENT_START_TIME: &str = "DEPLOYMENT_START_TIME";
pub const DEPLOYMENT_TIMEOUT: &str = "DEPLOYMENT_TIMEOUT";
pub const QUOTA_STATUS: &str = "QUOTA_STATUS";
pub const DEPLOYMENT_COST: &str = "DEPLOYMENT_COST";
pub const COST_LIMIT: &str = "COST_LIMIT";
pub const VALIDATION_STATUS: &str = "VALIDATION_STATUS";
pub const FAILED_COMPONENTS: &str = "FAILED_COMPONENTS";
pub const DEPLOYMENT_PHASES: &str = "DEPLOYMENT_PHASES";
pub const DEPLOYMENT_TYPE: &str = "DEPLOYMENT_TYPE";
pub const USER_ABORT: &str = "USER_ABORT";

/// Default deployment timeout in seconds.
pub const DEFAULT_DEPLOYMENT_TIMEOUT_SECS: i64 = 1800;

#[derive(Debug, Error, PartialEq)]
pub enum VariableError {
    #[error("variable {0} is not registered")]
    Unregistered(String),

    #[error("variable {name} expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: VarType,
        actual: VarType,
    },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("cannot parse '{input}' as {expected}")]
    Parse { input: String, expected: VarType },
}

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Integer,
    Boolean,
    Decimal,
    List,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarType::String => "string",
            VarType::Integer => "integer",
            VarType::Boolean => "boolean",
            VarType::Decimal => "decimal",
            VarType::List => "list",
        };
        f.write_str(s)
    }
}

impl VarType {
    /// Parse operator or monitor input into a value of this type.
    ///
    /// Lists accept comma-separated input; this is the only place a delimited
    /// form is accepted; stored lists are real arrays.
    pub fn parse_value(&self, input: &str) -> Result<VarValue, VariableError> {
        let trimmed = input.trim();
        let parse_err = || VariableError::Parse {
            input: input.to_string(),
            expected: *self,
        };
        match self {
            VarType::String => Ok(VarValue::String(trimmed.to_string())),
            VarType::Integer => trimmed
                .parse()
                .map(VarValue::Integer)
                .map_err(|_| parse_err()),
            VarType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(VarValue::Boolean(true)),
                "false" | "no" | "0" => Ok(VarValue::Boolean(false)),
                _ => Err(parse_err()),
            },
            VarType::Decimal => trimmed
                .parse()
                .map(VarValue::Decimal)
                .map_err(|_| parse_err()),
            VarType::List => Ok(VarValue::List(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }
}

/// A stored variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    List(Vec<String>),
}

impl VarValue {
    pub fn var_type(&self) -> VarType {
        match self {
            VarValue::Boolean(_) => VarType::Boolean,
            VarValue::Integer(_) => VarType::Integer,
            VarValue::Decimal(_) => VarType::Decimal,
            VarValue::String(_) => VarType::String,
            VarValue::List(_) => VarType::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VarValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VarValue::Decimal(n) => Some(*n),
            VarValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            VarValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Coerce into `target` where the conversion is lossless.
    fn coerce(self, target: VarType) -> Option<VarValue> {
        match (self, target) {
            (v, t) if v.var_type() == t => Some(v),
            (VarValue::Integer(n), VarType::Decimal) => Some(VarValue::Decimal(n as f64)),
            (VarValue::Decimal(n), VarType::Integer) if n.fract() == 0.0 => {
                Some(VarValue::Integer(n as i64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Boolean(b) => write!(f, "{b}"),
            VarValue::Integer(n) => write!(f, "{n}"),
            VarValue::Decimal(n) => write!(f, "{n}"),
            VarValue::String(s) => write!(f, "{s}"),
            VarValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        VarValue::Integer(n)
    }
}

impl From<f64> for VarValue {
    fn from(n: f64) -> Self {
        VarValue::Decimal(n)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Boolean(b)
    }
}

impl From<Vec<String>> for VarValue {
    fn from(items: Vec<String>) -> Self {
        VarValue::List(items)
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Stack(StackName),
}

impl Scope {
    pub fn stack(&self) -> Option<&StackName> {
        match self {
            Scope::Global => None,
            Scope::Stack(name) => Some(name),
        }
    }
}

impl From<&StackName> for Scope {
    fn from(name: &StackName) -> Self {
        Scope::Stack(name.clone())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Stack(name) => write!(f, "{name}"),
        }
    }
}

pub type Validator = Arc<dyn Fn(&VarValue) -> Result<(), String> + Send + Sync>;

/// Declaration of a variable: its type, default, and optional validator.
#[derive(Clone)]
pub struct VariableDef {
    pub name: String,
    pub var_type: VarType,
    pub default: Option<VarValue>,
    validator: Option<Validator>,
}

impl fmt::Debug for VariableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableDef")
            .field("name", &self.name)
            .field("var_type", &self.var_type)
            .field("default", &self.default)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl VariableDef {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            default: None,
            validator: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<VarValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&VarValue) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Restrict a string variable to a fixed set of values.
    pub fn one_of(self, allowed: &'static [&'static str]) -> Self {
        self.with_validator(move |value| match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            _ => Err(format!("expected one of {}", allowed.join(", "))),
        })
    }

    /// Type-check, coerce, and validate a value for this variable.
    pub fn check(&self, value: VarValue) -> Result<VarValue, VariableError> {
        let actual = value.var_type();
        let value = value
            .coerce(self.var_type)
            .ok_or_else(|| VariableError::TypeMismatch {
                name: self.name.clone(),
                expected: self.var_type,
                actual,
            })?;

        if let Some(ref validator) = self.validator {
            validator(&value).map_err(|reason| VariableError::Invalid {
                name: self.name.clone(),
                reason,
            })?;
        }

        Ok(value)
    }
}

/// Registry of variable declarations, shared by every component.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    defs: RwLock<HashMap<String, VariableDef>>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the signals and bookkeeping variables the
    /// orchestrator, trigger evaluator, and rollback engine exchange.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for def in builtin_definitions() {
            registry.register(def);
        }
        registry
    }

    /// Register or replace a declaration.
    pub fn register(&self, def: VariableDef) {
        self.defs.write().insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<VariableDef> {
        self.defs.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<VariableDef, VariableError> {
        self.get(name)
            .ok_or_else(|| VariableError::Unregistered(name.to_string()))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.defs.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.defs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn builtin_definitions() -> Vec<VariableDef> {
    vec![
        VariableDef::new(HEALTH_STATUS, VarType::String)
            .with_default("UNKNOWN")
            .one_of(&["HEALTHY", "DEGRADED", "UNHEALTHY", "CRITICAL", "UNKNOWN"]),
        VariableDef::new(DEPLOYMENT_START_TIME, VarType::Integer).with_validator(|v| {
            match v.as_i64() {
                Some(n) if n >= 0 => Ok(()),
                _ => Err("must be a non-negative unix timestamp".to_string()),
            }
        }),
        VariableDef::new(DEPLOYMENT_TIMEOUT, VarType::Integer)
            .with_default(DEFAULT_DEPLOYMENT_TIMEOUT_SECS)
            .with_validator(|v| match v.as_i64() {
                Some(n) if n > 0 => Ok(()),
                _ => Err("must be a positive number of seconds".to_string()),
            }),
        VariableDef::new(QUOTA_STATUS, VarType::String)
            .with_default("OK")
            .one_of(&["OK", "WARNING", "EXCEEDED"]),
        VariableDef::new(DEPLOYMENT_COST, VarType::Decimal)
            .with_default(0.0)
            .with_validator(non_negative),
        VariableDef::new(COST_LIMIT, VarType::Decimal).with_validator(non_negative),
        VariableDef::new(VALIDATION_STATUS, VarType::String)
            .with_default("PENDING")
            .one_of(&["PENDING", "PASSED", "FAILED"]),
        VariableDef::new(FAILED_COMPONENTS, VarType::List).with_default(Vec::<String>::new()),
        VariableDef::new(DEPLOYMENT_PHASES, VarType::List).with_default(Vec::<String>::new()),
        VariableDef::new(DEPLOYMENT_TYPE, VarType::String)
            .one_of(&["spot", "alb", "cdn", "full"]),
        VariableDef::new(USER_ABORT, VarType::Boolean).with_default(false),
    ]
}

fn non_negative(value: &VarValue) -> Result<(), String> {
    match value.as_f64() {
        Some(n) if n >= 0.0 && n.is_finite() => Ok(()),
        _ => Err("must be a non-negative amount".to_string()),
    }
}
