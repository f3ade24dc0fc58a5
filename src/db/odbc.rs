//! ODBC-backed provider for real IBM i connectivity (feature `odbc`).
//!
//! Everything is fetched as text and coerced by `Value`; the catalog views
//! only carry names, descriptions, and small numerics, and the access driver
//! transcodes per the CCSID negotiated in the connection string.

use super::{Connection, ConnectionProvider, QueryResult, Value};
use anyhow::{Context, Result};
use odbc_api::{ConnectionOptions, Cursor, Environment, IntoParameter, parameter::InputParameter};
use std::sync::OnceLock;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    if ENVIRONMENT.get().is_none() {
        let env = Environment::new().context("create ODBC environment")?;
        let _ = ENVIRONMENT.set(env);
    }
    Ok(ENVIRONMENT.get().expect("odbc environment"))
}

pub struct OdbcProvider {
    connection_string: String,
}

impl OdbcProvider {
    pub fn new(connection_string: &str) -> Result<Self> {
        if connection_string.trim().is_empty() {
            anyhow::bail!(
                "connection string is empty; set the AS400_CONNECTION_STRING environment variable"
            );
        }
        Ok(Self {
            connection_string: connection_string.to_string(),
        })
    }
}

impl ConnectionProvider for OdbcProvider {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = environment()?
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .context("connect to IBM i over ODBC")?;
        Ok(Box::new(OdbcConnection { conn }))
    }
}

struct OdbcConnection {
    conn: odbc_api::Connection<'static>,
}

fn bind_params(params: &[Value]) -> Vec<Box<dyn InputParameter>> {
    params
        .iter()
        .map(|value| -> Box<dyn InputParameter> {
            match value {
                Value::Null => Box::new(Option::<String>::None.into_parameter()),
                Value::Int(n) => Box::new(*n),
                Value::Float(n) => Box::new(*n),
                Value::Text(text) => Box::new(text.clone().into_parameter()),
            }
        })
        .collect()
}

impl Connection for OdbcConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let bound = bind_params(params);
        let cursor = self
            .conn
            .execute(sql, &bound[..], None)
            .with_context(|| format!("execute query: {sql}"))?;
        let Some(mut cursor) = cursor else {
            return Ok(QueryResult::default());
        };

        let columns: Vec<String> = cursor
            .column_names()
            .context("read column names")?
            .collect::<Result<_, _>>()
            .context("decode column names")?;

        let mut rows = Vec::new();
        let mut buffer = Vec::new();
        while let Some(mut row) = cursor.next_row().context("fetch row")? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 1..=columns.len() {
                buffer.clear();
                let present = row
                    .get_text(index as u16, &mut buffer)
                    .with_context(|| format!("read column {index}"))?;
                if present {
                    values.push(Value::Text(String::from_utf8_lossy(&buffer).into_owned()));
                } else {
                    values.push(Value::Null);
                }
            }
            rows.push(values);
        }
        Ok(QueryResult { columns, rows })
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let bound = bind_params(params);
        self.conn
            .execute(sql, &bound[..], None)
            .with_context(|| format!("execute statement: {sql}"))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.commit().context("commit")
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.conn
            .set_autocommit(enabled)
            .context("toggle autocommit")
    }
}
