//! Member creation and source upload.
//!
//! Uploads replace a member's content wholesale. ASCII payloads (and any
//! payload targeting a non-legacy encoding) go through parameterized row
//! inserts; non-ASCII payloads bound for a legacy double-byte file are
//! converted with iconv and delivered over FTP plus a system copy command,
//! because the access driver cannot transcode those code pages reliably.

use crate::command::{self, execute_cl_command};
use crate::config::Config;
use crate::db::{Connection, Value};
use crate::encoding::{self, TextConverter};
use crate::error::{Error, Result};
use crate::model::{CommandResult, UploadResult};
use crate::policy::{ensure_library_allowed, validate_identifier};
use crate::source;
use crate::transfer::{TransferFactory, resolve_credentials};
use chrono::Local;
use tracing::{debug, info, warn};

/// Payload column width of a standard RCDLEN(112) source file.
pub const MAX_SOURCE_LINE: usize = 100;

pub const METHOD_SQL_INSERT: &str = "sql_insert";
pub const METHOD_ICONV_FTP: &str = "iconv+ftp";

pub struct UploadRequest<'a> {
    pub library: &'a str,
    pub source_file: &'a str,
    pub member: &'a str,
    pub source_code: &'a str,
    pub source_type: &'a str,
    pub description: &'a str,
}

pub fn upload_source(
    conn: &mut dyn Connection,
    config: &Config,
    converter: &dyn TextConverter,
    transfers: &dyn TransferFactory,
    request: &UploadRequest<'_>,
) -> Result<UploadResult> {
    ensure_library_allowed(request.library)?;
    let lib = validate_identifier(request.library)?;
    let file = validate_identifier(request.source_file)?;
    let mbr = validate_identifier(request.member)?;
    let source_type = validate_identifier(request.source_type)?;

    if !source::source_file_exists(conn, &lib, &file)? {
        return Err(Error::NotFound(format!(
            "Source file not found: {lib}/{file}. Create it first with create_source_file."
        )));
    }

    let ccsid = source_file_ccsid(conn, &lib, &file)?;
    let needs_conversion = encoding::contains_non_ascii(request.source_code)
        && ccsid.is_some_and(encoding::is_legacy_dbcs);

    // The converter must be resolvable before any remote state changes so a
    // missing tool rejects the request without side effects.
    if needs_conversion && !converter.is_available() {
        return Err(Error::EncodingToolUnavailable(
            ccsid.unwrap_or_default() as u32
        ));
    }

    let existed = source::member_exists(conn, &lib, &file, &mbr)?;
    if !existed {
        let add_cmd = command::build_add_member_command(
            &lib,
            &file,
            &mbr,
            &source_type,
            request.description,
        )?;
        let outcome = execute_cl_command(conn, &add_cmd);
        if !outcome.success {
            return Err(Error::CommandFailed(format!(
                "Failed to create member: {}",
                outcome.message
            )));
        }
        // Member creation is committed before content writes; a later write
        // failure leaves an empty member rather than rolling this back.
        conn.commit()?;
    }

    let line_count = if needs_conversion {
        let ccsid = ccsid.unwrap_or_default();
        write_via_stream_file(conn, config, converter, transfers, request, ccsid)?
    } else {
        write_via_insert(conn, &lib, &file, &mbr, request.source_code, existed)?
    };

    info!(
        library = %lib,
        source_file = %file,
        member = %mbr,
        line_count,
        method = if needs_conversion { METHOD_ICONV_FTP } else { METHOD_SQL_INSERT },
        "source uploaded"
    );
    Ok(UploadResult {
        success: true,
        message: format!("Source uploaded: {lib}/{file}({mbr})"),
        line_count,
        source_type,
        ccsid,
        method: if needs_conversion {
            METHOD_ICONV_FTP.to_string()
        } else {
            METHOD_SQL_INSERT.to_string()
        },
    })
}

/// CCSID of the file's SRCDTA payload column.
fn source_file_ccsid(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
) -> Result<Option<i64>> {
    let result = conn.query(
        "SELECT MAX(CCSID) FROM QSYS2.SYSCOLUMNS \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? AND COLUMN_NAME = 'SRCDTA'",
        &[library.into(), source_file.into()],
    )?;
    Ok(result
        .first_row()
        .and_then(|row| row.first())
        .and_then(Value::as_i64))
}

/// Direct path: delete-then-insert through a QTEMP alias, one parameterized
/// row per line. Auto-commit is required because source files are typically
/// not journaled and cannot participate in transactions.
fn write_via_insert(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
    source_code: &str,
    existed: bool,
) -> Result<usize> {
    conn.set_autocommit(true)?;
    let alias = source::create_member_alias(conn, library, source_file, member, "UPL")?;
    if existed {
        conn.execute(&format!("DELETE FROM {alias}"), &[])?;
    }

    let today = Local::now().format("%y%m%d").to_string();
    let insert = format!("INSERT INTO {alias} (SRCSEQ, SRCDAT, SRCDTA) VALUES (?, ?, ?)");
    let mut line_count = 0usize;
    // Blank lines are structurally significant and round-trip as empty rows.
    for (index, line) in source_code.split('\n').enumerate() {
        let truncated: String = line.chars().take(MAX_SOURCE_LINE).collect();
        conn.execute(
            &insert,
            &[
                Value::Float((index + 1) as f64),
                today.clone().into(),
                truncated.into(),
            ],
        )?;
        line_count += 1;
    }
    Ok(line_count)
}

/// Conversion path: iconv to the legacy code page, binary FTP to a temp
/// stream file, tag it, copy it over the member, then best-effort cleanup on
/// every exit.
fn write_via_stream_file(
    conn: &mut dyn Connection,
    config: &Config,
    converter: &dyn TextConverter,
    transfers: &dyn TransferFactory,
    request: &UploadRequest<'_>,
    ccsid: i64,
) -> Result<usize> {
    let payload = converter.convert(request.source_code, ccsid)?;
    let credentials = resolve_credentials(config)?;
    let mut session = transfers.open(&credentials)?;

    let lib = request.library.to_uppercase();
    let file = request.source_file.to_uppercase();
    let mbr = request.member.to_uppercase();
    let remote_path = format!("/tmp/as400_mcp_{}.src", mbr.to_lowercase());

    // An aborted put can still leave a partial file on the remote IFS, so
    // cleanup runs on every exit path and never masks the primary outcome.
    let result = session.put(&remote_path, &payload).and_then(|()| {
        debug!(path = %remote_path, bytes = payload.len(), "converted payload uploaded");
        copy_stream_file_to_member(conn, &remote_path, &lib, &file, &mbr, ccsid)
    });

    if let Err(err) = session.delete(&remote_path) {
        warn!(path = %remote_path, error = %err, "failed to remove temporary stream file");
    }

    result?;
    Ok(request.source_code.split('\n').count())
}

fn copy_stream_file_to_member(
    conn: &mut dyn Connection,
    remote_path: &str,
    library: &str,
    source_file: &str,
    member: &str,
    ccsid: i64,
) -> Result<()> {
    let tag = encoding::stream_file_ccsid(ccsid).unwrap_or(ccsid);
    let chgatr = format!("CHGATR OBJ('{remote_path}') ATR(*CCSID) VALUE({tag})");
    let outcome = execute_cl_command(conn, &chgatr);
    if !outcome.success {
        return Err(Error::CommandFailed(outcome.message));
    }

    let copy = format!(
        "CPYFRMSTMF FROMSTMF('{remote_path}') \
         TOMBR('/QSYS.LIB/{library}.LIB/{source_file}.FILE/{member}.MBR') \
         MBROPT(*REPLACE) STMFCODPAG(*STMF)"
    );
    let outcome = execute_cl_command(conn, &copy);
    if !outcome.success {
        return Err(Error::CommandFailed(outcome.message));
    }
    Ok(())
}

/// Create a Unicode-capable source file so uploads never need the legacy
/// conversion path.
pub fn create_source_file(
    conn: &mut dyn Connection,
    library: &str,
    name: &str,
    record_length: i64,
    description: &str,
) -> Result<CommandResult> {
    ensure_library_allowed(library)?;
    let cmd = command::build_create_source_file_command(library, name, record_length, description)?;
    let outcome = execute_cl_command(conn, &cmd);
    if outcome.success {
        Ok(CommandResult {
            success: true,
            message: format!(
                "Source file created: {}/{}",
                library.to_uppercase(),
                name.to_uppercase()
            ),
            command: cmd,
            source_type: None,
        })
    } else {
        Err(Error::CommandFailed(outcome.message))
    }
}

/// Compile a member into a program, file, or command object.
pub fn compile_source(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
    compile_type: &str,
    target_library: &str,
    options: &str,
) -> Result<CommandResult> {
    ensure_library_allowed(library)?;
    if !target_library.trim().is_empty() {
        ensure_library_allowed(target_library)?;
    }
    let lib = validate_identifier(library)?;
    let file = validate_identifier(source_file)?;
    let mbr = validate_identifier(member)?;
    let target = if target_library.trim().is_empty() {
        lib.clone()
    } else {
        validate_identifier(target_library)?
    };

    if !source::source_file_exists(conn, &lib, &file)? {
        return Err(Error::NotFound(format!("Source file not found: {lib}/{file}")));
    }
    if !source::member_exists(conn, &lib, &file, &mbr)? {
        return Err(Error::NotFound(format!("Member not found: {lib}/{file}({mbr})")));
    }

    let source_type = source::member_source_type(conn, &lib, &file, &mbr)?;
    let command_name = if compile_type.trim().eq_ignore_ascii_case("AUTO") {
        command::detect_compile_command(&source_type)?.to_string()
    } else {
        compile_type.trim().to_uppercase()
    };

    let compile_cmd =
        command::build_compile_command(&command_name, &target, &lib, &file, &mbr, options)?;
    let outcome = execute_cl_command(conn, &compile_cmd);
    conn.commit()?;

    if outcome.success {
        info!(command = %compile_cmd, "compile succeeded");
        Ok(CommandResult {
            success: true,
            message: format!("Compiled successfully: {target}/{mbr}"),
            command: compile_cmd,
            source_type: Some(source_type),
        })
    } else {
        Ok(CommandResult {
            success: false,
            message: format!("Compile failed: {}", outcome.message),
            command: compile_cmd,
            source_type: Some(source_type),
        })
    }
}
