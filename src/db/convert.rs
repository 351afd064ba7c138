//! Per-type value conversion applied when rows are handed to a handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type ConvertFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A table from SQL type name to conversion function.
///
/// Keys are matched case-insensitively, first against the full type name
/// (`BIGINT UNSIGNED`) and then against its first word (`BIGINT`). `NULL`
/// cells are never converted.
///
/// ```rust
/// use serde_json::Value;
/// use tsu_mysql::db::Converters;
///
/// // Hand DECIMAL columns to handlers as numbers instead of strings.
/// let conv = Converters::new().with("decimal", |v| match v {
///     Value::String(s) => s.parse::<f64>().map(Value::from).unwrap_or(Value::String(s)),
///     other => other,
/// });
/// ```
#[derive(Clone, Default)]
pub struct Converters {
    by_type: HashMap<String, ConvertFn>,
}

impl Converters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `convert` for `type_name`, replacing any previous entry.
    pub fn with<F>(mut self, type_name: &str, convert: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.by_type.insert(type_name.to_ascii_uppercase(), Arc::new(convert));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    fn lookup(&self, type_name: &str) -> Option<&ConvertFn> {
        let upper = type_name.to_ascii_uppercase();
        self.by_type.get(&upper).or_else(|| {
            let base = upper.split_whitespace().next()?;
            self.by_type.get(base)
        })
    }

    pub(crate) fn apply(&self, type_name: &str, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        match self.lookup(type_name) {
            Some(convert) => convert(value),
            None => value,
        }
    }
}

impl fmt::Debug for Converters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("Converters").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn stringify(v: Value) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn matches_full_name_then_base_type() {
        let conv = Converters::new().with("bigint", stringify);
        assert_eq!(conv.apply("BIGINT UNSIGNED", json!(7)), json!("7"));
        assert_eq!(conv.apply("bigint", json!(7)), json!("7"));
        assert_eq!(conv.apply("INT", json!(7)), json!(7));
    }

    #[test]
    fn full_name_wins_over_base_type() {
        let conv = Converters::new()
            .with("BIGINT", stringify)
            .with("BIGINT UNSIGNED", |_| json!("unsigned"));
        assert_eq!(conv.apply("BIGINT UNSIGNED", json!(1)), json!("unsigned"));
    }

    #[test]
    fn null_is_left_alone() {
        let conv = Converters::new().with("VARCHAR", |_| json!("converted"));
        assert_eq!(conv.apply("VARCHAR", Value::Null), Value::Null);
    }

    #[test]
    fn debug_lists_registered_types() {
        let conv = Converters::new().with("json", |v| v).with("decimal", |v| v);
        assert_eq!(format!("{conv:?}"), r#"Converters { types: ["DECIMAL", "JSON"] }"#);
    }
}
