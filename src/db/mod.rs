use anyhow::Result;
use serde::Serialize;

#[cfg(feature = "odbc")]
pub mod odbc;

/// A single cell as returned by the remote database. The system pads CHAR
/// columns with spaces; callers trim when mapping into records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Trimmed text, empty string for NULL. Mirrors the fixed-width handling
    /// applied to every catalog text field.
    pub fn trimmed(&self) -> String {
        match self {
            Value::Text(text) => text.trim().to_string(),
            Value::Null => String::new(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            Value::Text(text) => text.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Text(text) => text.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn first_row(&self) -> Option<&[Value]> {
        self.rows.first().map(|row| row.as_slice())
    }
}

/// One open session against the remote system. Statements take positional `?`
/// parameters only; identifiers cannot be parameterized and are validated
/// before interpolation (see `policy::validate_identifier`).
pub trait Connection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    /// Writes to non-journaled source files need auto-commit; the direct
    /// insert path switches this on before touching member rows.
    fn set_autocommit(&mut self, enabled: bool) -> Result<()>;
}

/// Injected capability for opening connections. Each public operation opens
/// one connection, does its work, and drops it on every exit path.
pub trait ConnectionProvider: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Provider backed by the system ODBC driver manager. Only available when the
/// crate is built with the `odbc` feature.
pub fn odbc_provider(connection_string: &str) -> Result<Box<dyn ConnectionProvider>> {
    #[cfg(feature = "odbc")]
    {
        Ok(Box::new(odbc::OdbcProvider::new(connection_string)?))
    }
    #[cfg(not(feature = "odbc"))]
    {
        let _ = connection_string;
        anyhow::bail!(
            "this binary was built without the `odbc` feature; rebuild with `--features odbc` to connect"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmed_handles_padding_and_null() {
        assert_eq!(Value::Text("ORDMNT    ".into()).trimmed(), "ORDMNT");
        assert_eq!(Value::Null.trimmed(), "");
        assert_eq!(Value::Int(42).trimmed(), "42");
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::Text(" 5035 ".into()).as_i64(), Some(5035));
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Null.as_f64(), None);
    }
}
