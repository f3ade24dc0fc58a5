//! Method dispatch shared by the JSONL server, the one-shot `request`
//! subcommand, and the MCP tool surface. Each call opens one connection,
//! does its work, and drops it on every exit path.
//!
//! Failures never escape the transport loop: read tools answer with an
//! `{error}` payload, mutating tools with `{success: false, error}`.

use crate::catalog;
use crate::config::Config;
use crate::db::{self, Connection, ConnectionProvider, Value as DbValue};
use crate::encoding::{IconvConverter, TextConverter};
use crate::error::Result as OpResult;
use crate::policy::ensure_library_allowed;
use crate::transfer::{FtpTransferFactory, TransferFactory};
use crate::upload::{self, UploadRequest};
use crate::xref;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};

pub const METHOD_LIST: &[&str] = &[
    "list_libraries",
    "list_tables",
    "get_columns",
    "get_table_info",
    "get_data",
    "execute_sql",
    "list_source_files",
    "list_sources",
    "get_source",
    "list_programs",
    "get_program_references",
    "list_data_areas",
    "get_system_info",
    "upload_source",
    "compile_source",
    "create_source_file",
];

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

fn default_pattern() -> String {
    "%".to_string()
}

fn default_type_all() -> String {
    "ALL".to_string()
}

fn default_limit() -> i64 {
    100
}

fn default_max_rows() -> usize {
    1000
}

fn default_record_length() -> i64 {
    112
}

fn default_source_type() -> String {
    "RPGLE".to_string()
}

fn default_compile_type() -> String {
    "AUTO".to_string()
}

#[derive(Deserialize, JsonSchema)]
pub struct ListLibrariesParams {
    /// SQL LIKE pattern for library names.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Include system (Q*) libraries.
    #[serde(default)]
    pub include_system: bool,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListTablesParams {
    pub library: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// P (physical), L (logical), V (view), or ALL.
    #[serde(default = "default_type_all")]
    pub table_type: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetColumnsParams {
    pub library: String,
    pub table: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetTableInfoParams {
    pub library: String,
    pub table: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetDataParams {
    pub library: String,
    pub table: String,
    /// Comma-separated column names; empty selects all columns.
    #[serde(default)]
    pub columns: String,
    /// SQL WHERE predicate without the WHERE keyword.
    #[serde(default, alias = "where")]
    pub where_clause: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Deserialize, JsonSchema)]
pub struct ExecuteSqlParams {
    /// SELECT statement; anything else is rejected.
    pub sql: String,
    /// Positional values for `?` markers.
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListSourceFilesParams {
    pub library: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListSourcesParams {
    pub library: String,
    pub source_file: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetSourceParams {
    pub library: String,
    pub source_file: String,
    pub member: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListProgramsParams {
    pub library: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Program attribute filter (RPGLE, CLLE, ...) or ALL.
    #[serde(default = "default_type_all")]
    pub program_type: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetProgramReferencesParams {
    pub library: String,
    pub program: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListDataAreasParams {
    pub library: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

#[derive(Deserialize, JsonSchema, Default)]
pub struct GetSystemInfoParams {}

#[derive(Deserialize, JsonSchema)]
pub struct UploadSourceParams {
    pub library: String,
    pub source_file: String,
    pub member: String,
    pub source_code: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct CompileSourceParams {
    pub library: String,
    pub source_file: String,
    pub member: String,
    /// Explicit CRT* command name, or AUTO to detect from the member's
    /// source type.
    #[serde(default = "default_compile_type")]
    pub compile_type: String,
    /// Library for the created object; defaults to the source library.
    #[serde(default)]
    pub target_library: String,
    /// Extra command parameters appended verbatim, e.g. DBGVIEW(*SOURCE).
    #[serde(default)]
    pub options: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct CreateSourceFileParams {
    pub library: String,
    pub name: String,
    #[serde(default = "default_record_length")]
    pub record_length: i64,
    #[serde(default)]
    pub description: String,
}

/// Service container: configuration plus the injected side-effect seams.
pub struct App {
    config: Config,
    provider: Box<dyn ConnectionProvider>,
    converter: Box<dyn TextConverter>,
    transfers: Box<dyn TransferFactory>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let provider = db::odbc_provider(&config.connection_string)?;
        let converter = Box::new(IconvConverter::discover(config.convert_timeout));
        Ok(Self::with_services(
            config,
            provider,
            converter,
            Box::new(FtpTransferFactory),
        ))
    }

    /// Test seam: substitute fake connections, converter, and transfers.
    pub fn with_services(
        config: Config,
        provider: Box<dyn ConnectionProvider>,
        converter: Box<dyn TextConverter>,
        transfers: Box<dyn TransferFactory>,
    ) -> Self {
        Self {
            config,
            provider,
            converter,
            transfers,
        }
    }

    fn connect(&self) -> OpResult<Box<dyn Connection>> {
        Ok(self.provider.connect()?)
    }

    fn handle_request(&self, req: RpcRequest) -> RpcResponse {
        let id = req.id.clone();
        match handle_method(self, &req.method, req.params) {
            Ok(value) => RpcResponse {
                id,
                result: Some(value),
                error: None,
            },
            Err(err) => error_response(id, &err.to_string()),
        }
    }
}

pub fn serve(app: App) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                eprintln!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => app.handle_request(request),
            Err(err) => error_response(Value::Null, &format!("invalid request: {err}")),
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

pub fn call(app: &App, method: String, params_raw: &str, id_raw: &str) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).context("parse params JSON")?;
    let id = parse_value(id_raw);
    let request = RpcRequest { id, method, params };
    let response = app.handle_request(request);
    Ok(serde_json::to_string(&response)?)
}

pub fn handle_method(app: &App, method: &str, params: Value) -> Result<Value> {
    match method {
        "list_libraries" => {
            let p: ListLibrariesParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::list_libraries(
                    conn.as_mut(),
                    &p.pattern,
                    p.include_system
                )?))
            }))
        }
        "list_tables" => {
            let p: ListTablesParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::list_tables(
                    conn.as_mut(),
                    &p.library,
                    &p.pattern,
                    &p.table_type
                )?))
            }))
        }
        "get_columns" => {
            let p: GetColumnsParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::get_columns(conn.as_mut(), &p.library, &p.table)?))
            }))
        }
        "get_table_info" => {
            let p: GetTableInfoParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::get_table_info(
                    conn.as_mut(),
                    &p.library,
                    &p.table
                )?))
            }))
        }
        "get_data" => {
            let p: GetDataParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::get_data(
                    conn.as_mut(),
                    &p.library,
                    &p.table,
                    &p.columns,
                    &p.where_clause,
                    p.limit,
                    p.offset
                )?))
            }))
        }
        "execute_sql" => {
            let p: ExecuteSqlParams = parse_params(params)?;
            Ok(read_payload(|| {
                let params = sql_params(&p.params)?;
                let mut conn = app.connect()?;
                Ok(json!(catalog::execute_sql(
                    conn.as_mut(),
                    &p.sql,
                    &params,
                    p.max_rows
                )?))
            }))
        }
        "list_source_files" => {
            let p: ListSourceFilesParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::list_source_files(
                    conn.as_mut(),
                    &p.library,
                    &p.pattern
                )?))
            }))
        }
        "list_sources" => {
            let p: ListSourcesParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(crate::source::list_members(
                    conn.as_mut(),
                    &p.library,
                    &p.source_file,
                    &p.pattern
                )?))
            }))
        }
        "get_source" => {
            let p: GetSourceParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(crate::source::get_source(
                    conn.as_mut(),
                    &p.library,
                    &p.source_file,
                    &p.member
                )?))
            }))
        }
        "list_programs" => {
            let p: ListProgramsParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::list_programs(
                    conn.as_mut(),
                    &p.library,
                    &p.pattern,
                    &p.program_type
                )?))
            }))
        }
        "get_program_references" => {
            let p: GetProgramReferencesParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(xref::program_references(
                    conn.as_mut(),
                    &p.library,
                    &p.program
                )?))
            }))
        }
        "list_data_areas" => {
            let p: ListDataAreasParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(json!(catalog::list_data_areas(
                    conn.as_mut(),
                    &p.library,
                    &p.pattern
                )?))
            }))
        }
        "get_system_info" => {
            let _: GetSystemInfoParams = parse_params(params)?;
            Ok(read_payload(|| {
                let mut conn = app.connect()?;
                Ok(catalog::get_system_info(conn.as_mut())?)
            }))
        }
        "upload_source" => {
            let p: UploadSourceParams = parse_params(params)?;
            Ok(mutation_payload(|| {
                // Guard before the connection opens: a protected library must
                // cause zero remote activity.
                ensure_library_allowed(&p.library)?;
                let mut conn = app.connect()?;
                let request = UploadRequest {
                    library: &p.library,
                    source_file: &p.source_file,
                    member: &p.member,
                    source_code: &p.source_code,
                    source_type: &p.source_type,
                    description: &p.description,
                };
                Ok(json!(upload::upload_source(
                    conn.as_mut(),
                    &app.config,
                    app.converter.as_ref(),
                    app.transfers.as_ref(),
                    &request
                )?))
            }))
        }
        "compile_source" => {
            let p: CompileSourceParams = parse_params(params)?;
            Ok(mutation_payload(|| {
                ensure_library_allowed(&p.library)?;
                if !p.target_library.trim().is_empty() {
                    ensure_library_allowed(&p.target_library)?;
                }
                let mut conn = app.connect()?;
                Ok(json!(upload::compile_source(
                    conn.as_mut(),
                    &p.library,
                    &p.source_file,
                    &p.member,
                    &p.compile_type,
                    &p.target_library,
                    &p.options
                )?))
            }))
        }
        "create_source_file" => {
            let p: CreateSourceFileParams = parse_params(params)?;
            Ok(mutation_payload(|| {
                ensure_library_allowed(&p.library)?;
                let mut conn = app.connect()?;
                Ok(json!(upload::create_source_file(
                    conn.as_mut(),
                    &p.library,
                    &p.name,
                    p.record_length,
                    &p.description
                )?))
            }))
        }
        other => anyhow::bail!(
            "unknown method: {other} (expected one of: {})",
            METHOD_LIST.join(", ")
        ),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).context("invalid params")
}

fn read_payload(run: impl FnOnce() -> OpResult<Value>) -> Value {
    run().unwrap_or_else(|err| json!({ "error": err.to_string() }))
}

fn mutation_payload(run: impl FnOnce() -> OpResult<Value>) -> Value {
    run().unwrap_or_else(|err| json!({ "success": false, "error": err.to_string() }))
}

fn sql_params(values: &[Value]) -> OpResult<Vec<DbValue>> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => Ok(DbValue::Null),
            Value::Bool(b) => Ok(DbValue::Text(b.to_string())),
            Value::Number(n) => Ok(n
                .as_i64()
                .map(DbValue::Int)
                .unwrap_or_else(|| DbValue::Float(n.as_f64().unwrap_or(0.0)))),
            Value::String(s) => Ok(DbValue::Text(s.clone())),
            other => Err(anyhow::anyhow!("unsupported SQL parameter: {other}").into()),
        })
        .collect()
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let p: ListLibrariesParams = parse_params(Value::Null).unwrap();
        assert_eq!(p.pattern, "%");
        assert!(!p.include_system);

        let p: GetDataParams =
            parse_params(json!({ "library": "DEV", "table": "ORDERS", "where": "QTY > 0" }))
                .unwrap();
        assert_eq!(p.where_clause, "QTY > 0");
        assert_eq!(p.limit, 100);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let result: Result<ListTablesParams> = parse_params(json!({ "pattern": "%" }));
        assert!(result.is_err());
    }

    #[test]
    fn sql_param_conversion() {
        let values = vec![json!(null), json!(42), json!(2.5), json!("text")];
        let converted = sql_params(&values).unwrap();
        assert_eq!(
            converted,
            vec![
                DbValue::Null,
                DbValue::Int(42),
                DbValue::Float(2.5),
                DbValue::Text("text".into()),
            ]
        );
        assert!(sql_params(&[json!([1, 2])]).is_err());
    }
}
