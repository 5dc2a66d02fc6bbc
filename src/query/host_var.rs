//! Host variables.
//!
//! A bind value enters as a [`BindInput`] (plain scalar, hinted value, or an
//! already normalized [`HostVariable`]) and is normalized exactly once.
//! Before it reaches the driver it is resolved: nested statements become
//! prepared ref cursors and structured values without an explicit type become
//! strings.

use crate::driver::{BindType, BindValue, Driver, StatementHandle};
use crate::error::StatementError;
use crate::query::statement::SharedStatement;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Value held by a host variable before resolution.
#[derive(Clone)]
pub enum HostValue {
    /// Plain value
    Scalar(BindValue),
    /// Nested statement, bound as a ref cursor
    Statement(SharedStatement),
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            HostValue::Statement(statement) => {
                f.debug_tuple("Statement").field(&statement.sql()).finish()
            }
        }
    }
}

impl From<BindValue> for HostValue {
    fn from(value: BindValue) -> Self {
        HostValue::Scalar(value)
    }
}

impl From<SharedStatement> for HostValue {
    fn from(statement: SharedStatement) -> Self {
        HostValue::Statement(statement)
    }
}

/// Raw bind input accepted by [`Statement::bind`](super::Statement::bind).
#[derive(Debug, Clone)]
pub enum BindInput {
    /// Bare value; length and type are left to the driver
    Scalar(HostValue),
    /// Value with explicit length and/or type hints
    Hinted {
        value: HostValue,
        length: Option<i64>,
        bind_type: Option<BindType>,
    },
    /// Already normalized
    Variable(HostVariable),
}

impl BindInput {
    /// Value with length and type hints.
    pub fn hinted(
        value: impl Into<HostValue>,
        length: Option<i64>,
        bind_type: Option<BindType>,
    ) -> Self {
        BindInput::Hinted {
            value: value.into(),
            length,
            bind_type,
        }
    }
}

/// A normalized host variable: `(value, length, type)`.
#[derive(Debug, Clone)]
pub struct HostVariable {
    value: HostValue,
    length: Option<i64>,
    bind_type: Option<BindType>,
    /// Set for collection binds
    max_table_length: Option<usize>,
    /// Keeps a nested cursor statement alive while its handle is bound
    cursor: Option<SharedStatement>,
}

impl HostVariable {
    /// Create a host variable from a value and optional hints.
    pub fn new(value: impl Into<HostValue>, length: Option<i64>, bind_type: Option<BindType>) -> Self {
        Self {
            value: value.into(),
            length,
            bind_type,
            max_table_length: None,
            cursor: None,
        }
    }

    /// Normalize any bind input. Normalizing a `HostVariable` returns it unchanged.
    pub fn normalize(input: impl Into<BindInput>) -> Self {
        match input.into() {
            BindInput::Variable(variable) => variable,
            BindInput::Scalar(value) => Self::new(value, None, None),
            BindInput::Hinted {
                value,
                length,
                bind_type,
            } => Self::new(value, length, bind_type),
        }
    }

    /// Collection bind, forwarded through `bind_array_by_name`.
    ///
    /// The maximum table length defaults to the number of items.
    pub fn array<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BindValue>,
    {
        let items: Vec<BindValue> = values.into_iter().map(Into::into).collect();
        let max_table_length = items.len();
        Self {
            value: HostValue::Scalar(BindValue::Array(items)),
            length: None,
            bind_type: None,
            max_table_length: Some(max_table_length),
            cursor: None,
        }
    }

    /// Parse a structured bind hint.
    ///
    /// Accepted forms are a scalar, a positional array `[value, length?, type?]`
    /// and an object `{"value": .., "length": .., "type": ..}` where only
    /// `value` is required. Anything else is rejected with
    /// `StatementError::InvalidBinding`.
    pub fn from_hint(name: &str, hint: Value) -> Result<Self, StatementError> {
        let invalid = |message: String| StatementError::InvalidBinding {
            name: name.to_string(),
            message,
        };

        match hint {
            Value::Array(mut items) => {
                if items.is_empty() || items.len() > 3 {
                    return Err(invalid(format!(
                        "expected [value, length?, type?], got {} positions",
                        items.len()
                    )));
                }
                let bind_type = match items.get(2) {
                    Some(v) => parse_type(v).map_err(&invalid)?,
                    None => None,
                };
                let length = match items.get(1) {
                    Some(v) => parse_length(v).map_err(&invalid)?,
                    None => None,
                };
                let value = items.swap_remove(0);
                Ok(Self::new(host_value_from_json(value), length, bind_type))
            }
            Value::Object(mut map) => {
                if let Some(key) = map
                    .keys()
                    .find(|k| !matches!(k.as_str(), "value" | "length" | "type"))
                {
                    return Err(invalid(format!("unknown hint key '{}'", key)));
                }
                let value = map
                    .remove("value")
                    .ok_or_else(|| invalid("missing 'value'".to_string()))?;
                let length = match map.get("length") {
                    Some(v) => parse_length(v).map_err(&invalid)?,
                    None => None,
                };
                let bind_type = match map.get("type") {
                    Some(v) => parse_type(v).map_err(&invalid)?,
                    None => None,
                };
                Ok(Self::new(host_value_from_json(value), length, bind_type))
            }
            scalar => Ok(Self::new(host_value_from_json(scalar), None, None)),
        }
    }

    /// Set the length hint.
    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the type hint.
    pub fn with_type(mut self, bind_type: BindType) -> Self {
        self.bind_type = Some(bind_type);
        self
    }

    /// Set the maximum table length of a collection bind.
    pub fn with_max_table_length(mut self, max_table_length: usize) -> Self {
        if self.max_table_length.is_some() {
            self.max_table_length = Some(max_table_length);
        }
        self
    }

    pub fn value(&self) -> &HostValue {
        &self.value
    }

    pub fn length(&self) -> Option<i64> {
        self.length
    }

    pub fn bind_type(&self) -> Option<BindType> {
        self.bind_type
    }

    pub fn is_array(&self) -> bool {
        self.max_table_length.is_some()
    }

    /// The nested statement this variable binds as a cursor, if any.
    pub fn cursor_statement(&self) -> Option<&SharedStatement> {
        self.cursor.as_ref()
    }

    /// Log-friendly rendering of the value.
    pub fn render(&self) -> String {
        match &self.value {
            HostValue::Scalar(value) => value.render(),
            HostValue::Statement(statement) => format!("CURSOR ({})", statement.sql()),
        }
    }

    /// Resolve the value into what the driver receives.
    ///
    /// A nested statement is prepared and replaced by its raw handle with type
    /// `Cursor` and no length. A structured value without an explicit type is
    /// replaced by its string form. Resolving twice is a no-op.
    pub async fn resolve_for_binding(self) -> Result<Self, StatementError> {
        match self.value {
            HostValue::Statement(statement) => {
                let handle: StatementHandle = {
                    let mut inner = statement.lock().await;
                    inner.prepare().await?;
                    inner.require_handle()?
                };
                Ok(Self {
                    value: HostValue::Scalar(BindValue::Cursor(handle)),
                    length: None,
                    bind_type: Some(BindType::Cursor),
                    max_table_length: None,
                    cursor: Some(statement),
                })
            }
            HostValue::Scalar(BindValue::Json(json)) if self.bind_type.is_none() => Ok(Self {
                value: HostValue::Scalar(BindValue::Text(json.to_string())),
                ..self
            }),
            value => Ok(Self { value, ..self }),
        }
    }

    /// A resolved variable ready to be bound on a new handle.
    ///
    /// Scalars are reused as they are. A nested cursor is resolved again, so
    /// a cursor statement freed in the meantime is prepared anew.
    pub(crate) fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<Self, StatementError>> + Send + '_>> {
        Box::pin(async move {
            match &self.cursor {
                Some(statement) => {
                    HostVariable::new(statement.clone(), None, None)
                        .resolve_for_binding()
                        .await
                }
                None => Ok(self.clone()),
            }
        })
    }

    /// Forward a resolved variable to the driver.
    pub(crate) async fn bind_to(
        &self,
        driver: &mut dyn Driver,
        handle: StatementHandle,
        name: &str,
    ) -> Result<(), StatementError> {
        let bind_type = self.bind_type.unwrap_or_default();
        match (&self.value, self.max_table_length) {
            (HostValue::Scalar(BindValue::Array(items)), Some(max_table_length)) => {
                driver
                    .bind_array_by_name(handle, name, items, max_table_length, self.length, bind_type)
                    .await?
            }
            (HostValue::Scalar(value), _) => {
                driver
                    .bind_by_name(handle, name, value, self.length, bind_type)
                    .await?
            }
            (HostValue::Statement(_), _) => {
                return Err(StatementError::InvalidBinding {
                    name: name.to_string(),
                    message: "nested statement must be resolved before binding".to_string(),
                })
            }
        }
        Ok(())
    }
}

fn parse_length(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("length must be an integer, got {}", n)),
        other => Err(format!("length must be an integer, got {}", other)),
    }
}

fn parse_type(value: &Value) -> Result<Option<BindType>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => s.parse::<BindType>().map(Some),
        other => Err(format!("type must be a type name, got {}", other)),
    }
}

fn host_value_from_json(value: Value) -> HostValue {
    HostValue::Scalar(BindValue::from(value))
}

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => BindValue::Int(i),
                None => BindValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => BindValue::Text(s),
            structured => BindValue::Json(structured),
        }
    }
}

macro_rules! bind_value_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for BindValue {
                fn from(value: $ty) -> Self {
                    BindValue::$variant(<$target>::from(value))
                }
            }

            impl From<$ty> for BindInput {
                fn from(value: $ty) -> Self {
                    BindInput::Scalar(HostValue::Scalar(BindValue::from(value)))
                }
            }
        )*
    };
}

bind_value_from! {
    bool => Bool as bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
    String => Text as String,
    &str => Text as String,
    Vec<u8> => Bytes as Vec<u8>,
}

impl From<Value> for BindInput {
    fn from(value: Value) -> Self {
        BindInput::Scalar(host_value_from_json(value))
    }
}

impl From<BindValue> for BindInput {
    fn from(value: BindValue) -> Self {
        BindInput::Scalar(HostValue::Scalar(value))
    }
}

impl From<SharedStatement> for BindInput {
    fn from(statement: SharedStatement) -> Self {
        BindInput::Scalar(HostValue::Statement(statement))
    }
}

impl From<HostVariable> for BindInput {
    fn from(variable: HostVariable) -> Self {
        BindInput::Variable(variable)
    }
}

impl<T: Into<BindInput>> From<Option<T>> for BindInput {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => BindInput::Scalar(HostValue::Scalar(BindValue::Null)),
        }
    }
}
