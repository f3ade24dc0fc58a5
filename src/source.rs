//! Source member access. Members live inside source physical files as
//! row-per-line partitions (SRCSEQ, SRCDAT, SRCDTA); a session-scoped alias
//! in QTEMP binds a statement to one member, which also works on old
//! releases without partition-qualified table references.

use crate::db::{Connection, Value};
use crate::error::{Error, Result};
use crate::model::{MemberInfo, SourceLine, SourceMember};
use crate::policy::validate_identifier;

pub fn source_file_exists(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
) -> Result<bool> {
    let result = conn.query(
        "SELECT 1 FROM QSYS2.SYSTABLES \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? AND FILE_TYPE = 'S'",
        &[
            library.to_uppercase().into(),
            source_file.to_uppercase().into(),
        ],
    )?;
    Ok(!result.rows.is_empty())
}

pub fn member_exists(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
) -> Result<bool> {
    let result = conn.query(
        "SELECT 1 FROM QSYS2.SYSPARTITIONSTAT \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? AND SYSTEM_TABLE_MEMBER = ?",
        &[
            library.to_uppercase().into(),
            source_file.to_uppercase().into(),
            member.to_uppercase().into(),
        ],
    )?;
    Ok(!result.rows.is_empty())
}

pub fn member_metadata(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
) -> Result<Option<MemberInfo>> {
    let result = conn.query(
        "SELECT SYSTEM_TABLE_MEMBER AS MEMBER_NAME, \
                SOURCE_TYPE, \
                COALESCE(PARTITION_TEXT, '') AS MEMBER_TEXT \
         FROM QSYS2.SYSPARTITIONSTAT \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? AND SYSTEM_TABLE_MEMBER = ?",
        &[
            library.to_uppercase().into(),
            source_file.to_uppercase().into(),
            member.to_uppercase().into(),
        ],
    )?;
    Ok(result.first_row().map(|row| MemberInfo {
        name: row.first().map(Value::trimmed).unwrap_or_default(),
        source_type: row.get(1).map(Value::trimmed).unwrap_or_default(),
        text: row.get(2).map(Value::trimmed).unwrap_or_default(),
    }))
}

pub fn list_members(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    pattern: &str,
) -> Result<Vec<MemberInfo>> {
    let result = conn.query(
        "SELECT SYSTEM_TABLE_MEMBER AS MEMBER_NAME, \
                SOURCE_TYPE, \
                COALESCE(PARTITION_TEXT, '') AS MEMBER_TEXT \
         FROM QSYS2.SYSPARTITIONSTAT \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? AND SYSTEM_TABLE_MEMBER LIKE ? \
         ORDER BY SYSTEM_TABLE_MEMBER",
        &[
            library.to_uppercase().into(),
            source_file.to_uppercase().into(),
            pattern.into(),
        ],
    )?;
    Ok(result
        .rows
        .iter()
        .map(|row| MemberInfo {
            name: row.first().map(Value::trimmed).unwrap_or_default(),
            source_type: row.get(1).map(Value::trimmed).unwrap_or_default(),
            text: row.get(2).map(Value::trimmed).unwrap_or_default(),
        })
        .collect())
}

/// Bind `QTEMP.<prefix>_<member>` to the member and return the alias name.
/// All parts are validated identifiers before interpolation.
pub fn create_member_alias(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
    prefix: &str,
) -> Result<String> {
    let lib = validate_identifier(library)?;
    let file = validate_identifier(source_file)?;
    let mbr = validate_identifier(member)?;
    let alias = format!("QTEMP.{prefix}_{mbr}");
    conn.execute(
        &format!("CREATE OR REPLACE ALIAS {alias} FOR {lib}.{file} ({mbr})"),
        &[],
    )?;
    Ok(alias)
}

pub fn get_source(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
) -> Result<SourceMember> {
    let metadata = member_metadata(conn, library, source_file, member)?.ok_or_else(|| {
        Error::NotFound(format!(
            "Source member not found: {library}/{source_file}/{member}"
        ))
    })?;

    let alias = create_member_alias(conn, library, source_file, member, "SRC")?;
    let result = conn.query(
        &format!("SELECT SRCSEQ, SRCDAT, SRCDTA FROM {alias} ORDER BY SRCSEQ"),
        &[],
    )?;

    let lines: Vec<SourceLine> = result
        .rows
        .iter()
        .map(|row| SourceLine {
            seq: row.first().and_then(Value::as_f64).unwrap_or(0.0),
            date: row
                .get(1)
                .filter(|value| !value.is_null())
                .map(Value::trimmed)
                .unwrap_or_default(),
            text: row
                .get(2)
                .map(|value| value.trimmed())
                .unwrap_or_default(),
        })
        .collect();

    let source_text = lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(SourceMember {
        metadata,
        source_lines: lines,
        source_text,
    })
}

/// Stored source type of a member, used by AUTO compile detection and by the
/// reference-extractor fallback.
pub fn member_source_type(
    conn: &mut dyn Connection,
    library: &str,
    source_file: &str,
    member: &str,
) -> Result<String> {
    Ok(member_metadata(conn, library, source_file, member)?
        .map(|meta| meta.source_type)
        .unwrap_or_default())
}
