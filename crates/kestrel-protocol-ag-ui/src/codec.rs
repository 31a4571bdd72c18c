//! Tool-result codec with a pluggable type registry.
//!
//! Primitive result payloads encode directly. Structured (object/array)
//! payloads must belong to a registered type: encoding without a registry,
//! or with an unregistered type, is a configuration error raised at call
//! time — never a silent degradation to a generic string.

use crate::mapper::MappingError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type ShapeCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Registry of structured tool-result types known to the codec.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    checks: HashMap<String, ShapeCheck>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a result type under `name`.
    ///
    /// The registered deserializer is used to verify payload shape at
    /// encode time and to revive payloads at decode time.
    pub fn register<T: DeserializeOwned + 'static>(&mut self, name: impl Into<String>) {
        self.checks.insert(
            name.into(),
            Arc::new(|value: &Value| {
                serde_json::from_value::<T>(value.clone())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        );
    }

    /// Register a result type (builder form).
    #[must_use]
    pub fn with_type<T: DeserializeOwned + 'static>(mut self, name: impl Into<String>) -> Self {
        self.register::<T>(name);
        self
    }

    /// Check whether a type name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    fn check(&self, name: &str, value: &Value) -> Result<(), MappingError> {
        let check = self
            .checks
            .get(name)
            .ok_or_else(|| MappingError::UnregisteredType(name.to_string()))?;
        check(value).map_err(|reason| MappingError::InvalidPayload {
            type_name: name.to_string(),
            reason,
        })
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Encodes and decodes tool-result payloads for the wire.
#[derive(Debug, Clone, Default)]
pub struct ResultCodec {
    registry: Option<TypeRegistry>,
}

impl ResultCodec {
    /// Create a codec without a type registry.
    ///
    /// Such a codec handles primitive payloads only; structured payloads
    /// fail at call time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec backed by a type registry.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Encode a tool-result payload into wire content.
    ///
    /// `type_name` declares the structured type of object/array payloads;
    /// it is ignored for primitives. A null payload encodes as the explicit
    /// empty-string result.
    pub fn encode(&self, type_name: &str, value: &Value) -> Result<String, MappingError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
            Value::Object(_) | Value::Array(_) => {
                let registry = self
                    .registry
                    .as_ref()
                    .ok_or(MappingError::MissingTypeRegistry)?;
                registry.check(type_name, value)?;
                serde_json::to_string(value).map_err(|e| MappingError::InvalidField(e.to_string()))
            }
        }
    }

    /// Decode wire content into a result payload.
    ///
    /// Empty content decodes to the explicit empty string; JSON content is
    /// parsed; anything else is preserved as a string.
    pub fn decode(&self, content: &str) -> Value {
        if content.is_empty() {
            return Value::String(String::new());
        }
        serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.to_string()))
    }
}
