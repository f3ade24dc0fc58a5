use as400_mcp::config::Config;
use as400_mcp::db::{Connection, ConnectionProvider, QueryResult, Value};
use as400_mcp::encoding::TextConverter;
use as400_mcp::error::Error;
use as400_mcp::rpc::{self, App};
use as400_mcp::transfer::{FileTransfer, FtpCredentials, TransferFactory};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|name| name.to_string()).collect(),
        rows,
    }
}

/// Scripted remote system. `commands` collects the CL text passed through
/// the QCMDEXC gateway; `statements` collects everything else executed.
#[derive(Default)]
struct Remote {
    source_file_exists: bool,
    member_exists: bool,
    srcdta_ccsid: Option<i64>,
    member_source_type: String,
    statements: Vec<(String, Vec<Value>)>,
    commands: Vec<String>,
    commits: usize,
    autocommit_calls: Vec<bool>,
}

impl Remote {
    fn inserts(&self) -> Vec<&(String, Vec<Value>)> {
        self.statements
            .iter()
            .filter(|(sql, _)| sql.starts_with("INSERT INTO"))
            .collect()
    }
}

struct FakeProvider(Arc<Mutex<Remote>>);

impl ConnectionProvider for FakeProvider {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        Ok(Box::new(FakeConnection(self.0.clone())))
    }
}

struct FakeConnection(Arc<Mutex<Remote>>);

impl Connection for FakeConnection {
    fn query(&mut self, sql: &str, _params: &[Value]) -> anyhow::Result<QueryResult> {
        let remote = self.0.lock().unwrap();
        if sql.contains("FROM QSYS2.SYSTABLES") && sql.contains("FILE_TYPE = 'S'") {
            let rows = if remote.source_file_exists {
                vec![vec![Value::Int(1)]]
            } else {
                Vec::new()
            };
            return Ok(result(&["1"], rows));
        }
        if sql.contains("FROM QSYS2.SYSCOLUMNS") && sql.contains("SRCDTA") {
            let cell = remote.srcdta_ccsid.map(Value::Int).unwrap_or(Value::Null);
            return Ok(result(&["CCSID"], vec![vec![cell]]));
        }
        if sql.contains("FROM QSYS2.SYSPARTITIONSTAT") && sql.contains("SOURCE_TYPE") {
            let rows = if remote.member_exists {
                vec![vec![
                    Value::Text("ORD100".to_string()),
                    Value::Text(remote.member_source_type.clone()),
                    Value::Text(String::new()),
                ]]
            } else {
                Vec::new()
            };
            return Ok(result(&["MEMBER_NAME", "SOURCE_TYPE", "MEMBER_TEXT"], rows));
        }
        if sql.contains("FROM QSYS2.SYSPARTITIONSTAT") {
            let rows = if remote.member_exists {
                vec![vec![Value::Int(1)]]
            } else {
                Vec::new()
            };
            return Ok(result(&["1"], rows));
        }
        Ok(QueryResult::default())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> anyhow::Result<()> {
        let mut remote = self.0.lock().unwrap();
        if sql.contains("QCMDEXC") {
            let command = params
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            remote.commands.push(command);
        } else {
            remote.statements.push((sql.to_string(), params.to_vec()));
        }
        Ok(())
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.0.lock().unwrap().commits += 1;
        Ok(())
    }

    fn set_autocommit(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.0.lock().unwrap().autocommit_calls.push(enabled);
        Ok(())
    }
}

#[derive(Default)]
struct ConverterSpy {
    available: bool,
    calls: Mutex<Vec<i64>>,
}

struct ConverterHandle(Arc<ConverterSpy>);

impl TextConverter for ConverterHandle {
    fn is_available(&self) -> bool {
        self.0.available
    }

    fn convert(&self, text: &str, ccsid: i64) -> Result<Vec<u8>, Error> {
        self.0.calls.lock().unwrap().push(ccsid);
        // Stand-in for the real charset conversion.
        Ok(format!("EBCDIC:{text}").into_bytes())
    }
}

#[derive(Default)]
struct TransferLog {
    puts: Vec<(String, Vec<u8>)>,
    deletes: Vec<String>,
    opens: usize,
    fail_puts: bool,
}

struct TransferSpy(Arc<Mutex<TransferLog>>);

impl TransferFactory for TransferSpy {
    fn open(&self, _credentials: &FtpCredentials) -> Result<Box<dyn FileTransfer>, Error> {
        self.0.lock().unwrap().opens += 1;
        Ok(Box::new(SessionSpy(self.0.clone())))
    }
}

struct SessionSpy(Arc<Mutex<TransferLog>>);

impl FileTransfer for SessionSpy {
    fn put(&mut self, remote_path: &str, data: &[u8]) -> Result<(), Error> {
        let mut log = self.0.lock().unwrap();
        log.puts.push((remote_path.to_string(), data.to_vec()));
        if log.fail_puts {
            return Err(Error::Transfer(
                "426 Connection closed; transfer aborted.".to_string(),
            ));
        }
        Ok(())
    }

    fn delete(&mut self, remote_path: &str) -> Result<(), Error> {
        self.0.lock().unwrap().deletes.push(remote_path.to_string());
        Ok(())
    }
}

struct Harness {
    app: App,
    remote: Arc<Mutex<Remote>>,
    converter: Arc<ConverterSpy>,
    transfers: Arc<Mutex<TransferLog>>,
}

fn harness(remote: Remote, converter_available: bool) -> Harness {
    let remote = Arc::new(Mutex::new(remote));
    let converter = Arc::new(ConverterSpy {
        available: converter_available,
        calls: Mutex::new(Vec::new()),
    });
    let transfers = Arc::new(Mutex::new(TransferLog::default()));
    let config = Config {
        connection_string: "DRIVER={IBM i Access ODBC Driver};SYSTEM=MYAS400;UID=DEV;PWD=secret"
            .to_string(),
        convert_timeout: Duration::from_secs(1),
        ..Config::default()
    };
    let app = App::with_services(
        config,
        Box::new(FakeProvider(remote.clone())),
        Box::new(ConverterHandle(converter.clone())),
        Box::new(TransferSpy(transfers.clone())),
    );
    Harness {
        app,
        remote,
        converter,
        transfers,
    }
}

fn upload_params(member: &str, source_code: &str) -> serde_json::Value {
    json!({
        "library": "DEV",
        "source_file": "QRPGSRC",
        "member": member,
        "source_code": source_code,
        "source_type": "RPGLE",
        "description": "Order entry",
    })
}

#[test]
fn ascii_upload_replaces_rows_and_preserves_blank_lines() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            srcdta_ccsid: Some(1208),
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD100", "L1\nL2\n\nL4"),
    )
    .unwrap();

    assert_eq!(result["success"], json!(true));
    assert_eq!(result["method"], json!("sql_insert"));
    assert_eq!(result["line_count"], json!(4));
    assert_eq!(result["ccsid"], json!(1208));

    let remote = h.remote.lock().unwrap();
    assert_eq!(remote.autocommit_calls, vec![true]);

    let alias = remote
        .statements
        .iter()
        .find(|(sql, _)| sql.starts_with("CREATE OR REPLACE ALIAS"))
        .map(|(sql, _)| sql.clone())
        .unwrap();
    assert_eq!(
        alias,
        "CREATE OR REPLACE ALIAS QTEMP.UPL_ORD100 FOR DEV.QRPGSRC (ORD100)"
    );
    assert!(remote
        .statements
        .iter()
        .any(|(sql, _)| sql == "DELETE FROM QTEMP.UPL_ORD100"));

    let inserts = remote.inserts();
    assert_eq!(inserts.len(), 4);
    let expected_date = chrono::Local::now().format("%y%m%d").to_string();
    for (index, (_, params)) in inserts.iter().enumerate() {
        assert_eq!(params[0], Value::Float((index + 1) as f64));
        assert_eq!(params[1], Value::Text(expected_date.clone()));
    }
    assert_eq!(inserts[2].1[2], Value::Text(String::new()));
    assert_eq!(inserts[3].1[2], Value::Text("L4".to_string()));

    // ASCII never touches the conversion machinery.
    assert!(h.converter.calls.lock().unwrap().is_empty());
    assert_eq!(h.transfers.lock().unwrap().opens, 0);
    // No member was created, so nothing went through the command gateway.
    assert!(remote.commands.is_empty());
}

#[test]
fn new_member_is_created_before_content_is_written() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: false,
            srcdta_ccsid: Some(1208),
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD200", "DSPLY 'HI'"),
    )
    .unwrap();
    assert_eq!(result["success"], json!(true));

    let remote = h.remote.lock().unwrap();
    assert_eq!(
        remote.commands,
        vec!["ADDPFM FILE(DEV/QRPGSRC) MBR(ORD200) SRCTYPE(RPGLE) TEXT('Order entry')"]
    );
    assert!(remote.commits >= 1);
    // Fresh member, nothing to delete.
    assert!(!remote
        .statements
        .iter()
        .any(|(sql, _)| sql.starts_with("DELETE FROM")));
    assert_eq!(remote.inserts().len(), 1);
}

#[test]
fn missing_source_file_fails_before_any_write() {
    let h = harness(
        Remote {
            source_file_exists: false,
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(&h.app, "upload_source", upload_params("ORD100", "X"))
        .unwrap();
    assert_eq!(result["success"], json!(false));
    let message = result["error"].as_str().unwrap();
    assert!(message.contains("create_source_file"));

    let remote = h.remote.lock().unwrap();
    assert!(remote.statements.is_empty());
    assert!(remote.commands.is_empty());
}

#[test]
fn legacy_target_without_iconv_fails_with_no_side_effects() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            srcdta_ccsid: Some(5035),
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD300", "受注データ"),
    )
    .unwrap();

    assert_eq!(result["success"], json!(false));
    let message = result["error"].as_str().unwrap();
    assert!(message.contains("iconv"));
    assert!(message.contains("create_source_file"));

    let remote = h.remote.lock().unwrap();
    assert!(remote.statements.is_empty());
    assert!(remote.commands.is_empty());
    assert_eq!(h.transfers.lock().unwrap().opens, 0);
}

#[test]
fn legacy_target_with_non_ascii_goes_through_iconv_and_ftp() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            srcdta_ccsid: Some(5035),
            ..Remote::default()
        },
        true,
    );

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD300", "受注\nDSPLY"),
    )
    .unwrap();

    assert_eq!(result["success"], json!(true));
    assert_eq!(result["method"], json!("iconv+ftp"));
    assert_eq!(result["line_count"], json!(2));
    assert_eq!(result["ccsid"], json!(5035));

    assert_eq!(*h.converter.calls.lock().unwrap(), vec![5035]);

    let transfers = h.transfers.lock().unwrap();
    assert_eq!(transfers.opens, 1);
    assert_eq!(transfers.puts.len(), 1);
    let (path, data) = &transfers.puts[0];
    assert_eq!(path, "/tmp/as400_mcp_ord300.src");
    assert_eq!(data, "EBCDIC:受注\nDSPLY".as_bytes());
    // Temp file removed after the copy.
    assert_eq!(transfers.deletes, vec!["/tmp/as400_mcp_ord300.src".to_string()]);

    let remote = h.remote.lock().unwrap();
    assert_eq!(remote.commands.len(), 2);
    assert_eq!(
        remote.commands[0],
        "CHGATR OBJ('/tmp/as400_mcp_ord300.src') ATR(*CCSID) VALUE(939)"
    );
    assert!(remote.commands[1].starts_with("CPYFRMSTMF FROMSTMF('/tmp/as400_mcp_ord300.src')"));
    assert!(remote.commands[1].contains("TOMBR('/QSYS.LIB/DEV.LIB/QRPGSRC.FILE/ORD300.MBR')"));
    assert!(remote.commands[1].contains("MBROPT(*REPLACE) STMFCODPAG(*STMF)"));
    // The conversion path writes no rows directly.
    assert!(remote.inserts().is_empty());
}

#[test]
fn aborted_put_still_removes_the_temporary_stream_file() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            srcdta_ccsid: Some(5035),
            ..Remote::default()
        },
        true,
    );
    h.transfers.lock().unwrap().fail_puts = true;

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD300", "受注\nDSPLY"),
    )
    .unwrap();

    assert_eq!(result["success"], json!(false));
    assert!(result["error"].as_str().unwrap().contains("426"));

    let transfers = h.transfers.lock().unwrap();
    assert_eq!(transfers.puts.len(), 1);
    // Cleanup is attempted even when the transfer itself failed.
    assert_eq!(
        transfers.deletes,
        vec!["/tmp/as400_mcp_ord300.src".to_string()]
    );
    // The copy command never runs against a file that was not delivered.
    assert!(h.remote.lock().unwrap().commands.is_empty());
}

#[test]
fn non_ascii_to_utf8_file_still_uses_direct_inserts() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            srcdta_ccsid: Some(1208),
            ..Remote::default()
        },
        true,
    );

    let result = rpc::handle_method(
        &h.app,
        "upload_source",
        upload_params("ORD400", "受注データ"),
    )
    .unwrap();

    assert_eq!(result["method"], json!("sql_insert"));
    assert!(h.converter.calls.lock().unwrap().is_empty());
    assert_eq!(h.transfers.lock().unwrap().opens, 0);
}

#[test]
fn auto_compile_detects_the_command_from_the_source_type() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            member_source_type: "RPGLE".to_string(),
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(
        &h.app,
        "compile_source",
        json!({
            "library": "DEV",
            "source_file": "QRPGSRC",
            "member": "ORD100",
            "compile_type": "AUTO",
        }),
    )
    .unwrap();

    assert_eq!(result["success"], json!(true));
    assert_eq!(result["source_type"], json!("RPGLE"));
    assert_eq!(
        result["command"],
        json!("CRTBNDRPG PGM(DEV/ORD100) SRCFILE(DEV/QRPGSRC) SRCMBR(ORD100)")
    );

    let remote = h.remote.lock().unwrap();
    assert_eq!(remote.commands.len(), 1);
    assert!(remote.commits >= 1);
}

#[test]
fn auto_compile_with_unknown_source_type_asks_for_an_explicit_command() {
    let h = harness(
        Remote {
            source_file_exists: true,
            member_exists: true,
            member_source_type: "TXT".to_string(),
            ..Remote::default()
        },
        false,
    );

    let result = rpc::handle_method(
        &h.app,
        "compile_source",
        json!({ "library": "DEV", "source_file": "QRPGSRC", "member": "NOTES" }),
    )
    .unwrap();

    assert_eq!(result["success"], json!(false));
    assert!(result["error"].as_str().unwrap().contains("compile_type"));
    assert!(h.remote.lock().unwrap().commands.is_empty());
}

#[test]
fn create_source_file_issues_crtsrcpf_with_utf8_ccsid() {
    let h = harness(Remote::default(), false);

    let result = rpc::handle_method(
        &h.app,
        "create_source_file",
        json!({ "library": "DEV", "name": "QAIASRC", "description": "AI sources" }),
    )
    .unwrap();

    assert_eq!(result["success"], json!(true));
    let remote = h.remote.lock().unwrap();
    assert_eq!(
        remote.commands,
        vec!["CRTSRCPF FILE(DEV/QAIASRC) RCDLEN(112) CCSID(1208) TEXT('AI sources')"]
    );
}
