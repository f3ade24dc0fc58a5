//! MCP server over stdio: line-delimited JSON-RPC 2.0. Tool calls are thin
//! wrappers over `rpc::handle_method`; the four `as400://` resources and the
//! `analyze_source` prompt reuse the same dispatch.

use crate::rpc::{self, App};
use anyhow::Result;
use schemars::JsonSchema;
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};

const MAX_RESPONSE_BYTES: usize = 512_000; // 500KB hard cap

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

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(value) => handle_message(value, &app),
            Err(err) => Some(jsonrpc_error(
                Value::Null,
                -32700,
                &format!("parse error: {err}"),
            )),
        };

        if let Some(payload) = response {
            writeln!(stdout, "{}", serde_json::to_string(&payload)?)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn handle_message(message: Value, app: &App) -> Option<Value> {
    let id = message.get("id").cloned();
    let method = message.get("method").and_then(|value| value.as_str());

    let Some(method) = method else {
        return id.map(|id| jsonrpc_error(id, -32600, "invalid request"));
    };

    match method {
        "initialize" => {
            let id = id?;
            Some(jsonrpc_result(id, initialize_result(&message)))
        }
        "notifications/initialized" => None,
        "ping" => id.map(|id| jsonrpc_result(id, json!({}))),
        "tools/list" => {
            let id = id?;
            Some(jsonrpc_result(id, json!({ "tools": tool_specs() })))
        }
        "tools/call" => {
            let id = id?;
            Some(handle_tool_call(id, &message, app))
        }
        "resources/list" => id.map(|id| {
            jsonrpc_result(
                id,
                json!({
                    "resources": [
                        {
                            "uri": "as400://libraries",
                            "name": "Libraries",
                            "description": "All user libraries on the system.",
                            "mimeType": "application/json",
                        },
                        {
                            "uri": "as400://system/info",
                            "name": "System information",
                            "description": "OS version, locale, CCSID, and installed compilers.",
                            "mimeType": "application/json",
                        },
                    ]
                }),
            )
        }),
        "resources/templates/list" => id.map(|id| {
            jsonrpc_result(
                id,
                json!({
                    "resourceTemplates": [
                        {
                            "uriTemplate": "as400://{library}/tables",
                            "name": "Tables in a library",
                            "mimeType": "application/json",
                        },
                        {
                            "uriTemplate": "as400://{library}/{source_file}/{member}",
                            "name": "Source member content",
                            "mimeType": "application/json",
                        },
                    ]
                }),
            )
        }),
        "resources/read" => {
            let id = id?;
            Some(handle_resource_read(id, &message, app))
        }
        "prompts/list" => id.map(|id| {
            jsonrpc_result(
                id,
                json!({
                    "prompts": [{
                        "name": "analyze_source",
                        "description": "Fetch a source member and ask for an analysis of what it does.",
                        "arguments": [
                            { "name": "library", "required": true },
                            { "name": "source_file", "required": true },
                            { "name": "member", "required": true },
                        ],
                    }]
                }),
            )
        }),
        "prompts/get" => {
            let id = id?;
            Some(handle_prompt_get(id, &message, app))
        }
        "roots/list" => id.map(|id| jsonrpc_result(id, json!({ "roots": [] }))),
        _ => id.map(|id| jsonrpc_error(id, -32601, "method not found")),
    }
}

fn initialize_result(message: &Value) -> Value {
    let protocol = message
        .get("params")
        .and_then(|params| params.get("protocolVersion"))
        .cloned()
        .unwrap_or_else(|| Value::String("2024-11-05".to_string()));
    json!({
        "protocolVersion": protocol,
        "capabilities": {
            "tools": {},
            "resources": {},
            "prompts": {},
        },
        "serverInfo": {
            "name": "as400-mcp",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": "Tools for exploring and changing an IBM i (AS400) system. \
Read the catalog with list_libraries, list_tables, get_columns, get_table_info, get_data, \
and execute_sql (SELECT only). Browse source with list_source_files, list_sources, and \
get_source; find dependencies with get_program_references. Write source with upload_source \
(uploads to legacy DBCS source files are converted automatically), create UTF-8 source \
files with create_source_file, and compile with compile_source (compile_type AUTO detects \
the command from the member's source type). System libraries (names starting with Q) are \
protected from modification.",
    })
}

fn tool<T: JsonSchema>(name: &str, description: &str) -> Value {
    let schema = schemars::schema_for!(T);
    json!({
        "name": name,
        "description": description,
        "inputSchema": serde_json::to_value(&schema)
            .unwrap_or_else(|_| json!({ "type": "object" })),
    })
}

fn tool_specs() -> Vec<Value> {
    vec![
        tool::<rpc::ListLibrariesParams>(
            "list_libraries",
            "List libraries, optionally including system (Q*) libraries.",
        ),
        tool::<rpc::ListTablesParams>(
            "list_tables",
            "List tables, logical files, and views in a library.",
        ),
        tool::<rpc::GetColumnsParams>(
            "get_columns",
            "Column definitions of a table, with labels, types, and CCSIDs.",
        ),
        tool::<rpc::GetTableInfoParams>(
            "get_table_info",
            "Table description with columns, key fields, and indexes.",
        ),
        tool::<rpc::GetDataParams>(
            "get_data",
            "Read rows from a table with labeled columns and offset paging.",
        ),
        tool::<rpc::ExecuteSqlParams>(
            "execute_sql",
            "Run a read-only SELECT statement with positional parameters.",
        ),
        tool::<rpc::ListSourceFilesParams>(
            "list_source_files",
            "List source physical files in a library with member counts and CCSIDs.",
        ),
        tool::<rpc::ListSourcesParams>(
            "list_sources",
            "List members of a source file with their source types.",
        ),
        tool::<rpc::GetSourceParams>(
            "get_source",
            "Read a source member's lines and concatenated text.",
        ),
        tool::<rpc::ListProgramsParams>(
            "list_programs",
            "List compiled programs in a library with their source locations.",
        ),
        tool::<rpc::GetProgramReferencesParams>(
            "get_program_references",
            "Files used and programs called by a compiled program.",
        ),
        tool::<rpc::ListDataAreasParams>(
            "list_data_areas",
            "List data areas in a library with their current values.",
        ),
        tool::<rpc::GetSystemInfoParams>(
            "get_system_info",
            "System identity, locale, CCSID, and installed compiler products.",
        ),
        tool::<rpc::UploadSourceParams>(
            "upload_source",
            "Replace a source member's content, creating the member if needed.",
        ),
        tool::<rpc::CompileSourceParams>(
            "compile_source",
            "Compile a source member into a program, file, or command object.",
        ),
        tool::<rpc::CreateSourceFileParams>(
            "create_source_file",
            "Create a UTF-8 (CCSID 1208) source physical file.",
        ),
    ]
}

fn handle_tool_call(id: Value, message: &Value, app: &App) -> Value {
    let params = match message.get("params") {
        Some(value) => value,
        None => return jsonrpc_error(id, -32602, "missing params"),
    };
    let tool_name = params
        .get("name")
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match rpc::handle_method(app, tool_name, arguments) {
        Ok(result) => jsonrpc_result(id, call_result_ok(result)),
        Err(err) => jsonrpc_result(id, call_result_error(&err.to_string())),
    }
}

fn call_result_ok(result: Value) -> Value {
    let text = serde_json::to_string_pretty(&result).unwrap_or_default();
    let content = if text.len() > MAX_RESPONSE_BYTES {
        vec![json!({
            "type": "text",
            "text": format!(
                "Response too large ({} bytes). Narrow the pattern or lower the limit.",
                text.len()
            )
        })]
    } else {
        vec![json!({ "type": "text", "text": text })]
    };
    let is_error = result.get("error").is_some();
    json!({
        "content": content,
        "structuredContent": ensure_object_response(result),
        "isError": is_error,
    })
}

fn ensure_object_response(result: Value) -> Value {
    if result.is_array() {
        json!({ "items": result })
    } else {
        result
    }
}

fn call_result_error(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true
    })
}

fn handle_resource_read(id: Value, message: &Value, app: &App) -> Value {
    let uri = message
        .get("params")
        .and_then(|params| params.get("uri"))
        .and_then(|value| value.as_str())
        .unwrap_or("");

    match read_resource(app, uri) {
        Ok(payload) => jsonrpc_result(
            id,
            json!({
                "contents": [{
                    "uri": uri,
                    "mimeType": "application/json",
                    "text": serde_json::to_string_pretty(&payload).unwrap_or_default(),
                }]
            }),
        ),
        Err(err) => jsonrpc_error(id, -32602, &err.to_string()),
    }
}

fn read_resource(app: &App, uri: &str) -> Result<Value> {
    let Some(rest) = uri.strip_prefix("as400://") else {
        anyhow::bail!("unsupported resource URI: {uri}");
    };
    let parts: Vec<&str> = rest.split('/').collect();
    match parts.as_slice() {
        ["libraries"] => rpc::handle_method(app, "list_libraries", json!({})),
        ["system", "info"] => rpc::handle_method(app, "get_system_info", json!({})),
        [library, "tables"] => {
            rpc::handle_method(app, "list_tables", json!({ "library": library }))
        }
        [library, source_file, member] => rpc::handle_method(
            app,
            "get_source",
            json!({ "library": library, "source_file": source_file, "member": member }),
        ),
        _ => anyhow::bail!("unsupported resource URI: {uri}"),
    }
}

fn handle_prompt_get(id: Value, message: &Value, app: &App) -> Value {
    let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
    let name = params.get("name").and_then(|value| value.as_str());
    if name != Some("analyze_source") {
        return jsonrpc_error(id, -32602, "unknown prompt");
    }
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let payload = match rpc::handle_method(app, "get_source", arguments.clone()) {
        Ok(value) => value,
        Err(err) => return jsonrpc_error(id, -32602, &err.to_string()),
    };
    if let Some(err) = payload.get("error").and_then(|value| value.as_str()) {
        return jsonrpc_error(id, -32602, err);
    }

    let source_type = payload
        .pointer("/metadata/SOURCE_TYPE")
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let source_text = payload
        .get("source_text")
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let library = arguments
        .get("library")
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let source_file = arguments
        .get("source_file")
        .and_then(|value| value.as_str())
        .unwrap_or("");
    let member = arguments
        .get("member")
        .and_then(|value| value.as_str())
        .unwrap_or("");

    jsonrpc_result(
        id,
        json!({
            "description": format!("Analysis of {library}/{source_file}({member})"),
            "messages": [{
                "role": "user",
                "content": {
                    "type": "text",
                    "text": format!(
                        "Analyze this {source_type} source member {library}/{source_file}({member}). \
Explain what it does, the files it uses, the programs it calls, and any risks in changing it.\n\n{source_text}"
                    ),
                },
            }]
        }),
    )
}

fn jsonrpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn jsonrpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_list_is_complete() {
        let specs = tool_specs();
        assert_eq!(specs.len(), rpc::METHOD_LIST.len());
        for (spec, name) in specs.iter().zip(rpc::METHOD_LIST) {
            assert_eq!(spec["name"].as_str(), Some(*name));
            assert!(spec["inputSchema"].is_object());
        }
    }

    #[test]
    fn tool_schemas_carry_required_fields() {
        let specs = tool_specs();
        let upload = specs
            .iter()
            .find(|spec| spec["name"] == "upload_source")
            .unwrap();
        let required = upload["inputSchema"]["required"].as_array().unwrap();
        assert!(required.contains(&json!("library")));
        assert!(required.contains(&json!("source_code")));
        // Defaulted fields are optional.
        assert!(!required.contains(&json!("source_type")));
    }

    #[test]
    fn error_payloads_marked_as_errors() {
        let result = call_result_ok(json!({ "error": "Table not found: DEV/MISSING" }));
        assert_eq!(result["isError"], json!(true));
        let ok = call_result_ok(json!([{"LIBRARY_NAME": "DEV"}]));
        assert_eq!(ok["isError"], json!(false));
        assert!(ok["structuredContent"]["items"].is_array());
    }
}
