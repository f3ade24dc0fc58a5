//! Read-only queries against the QSYS2 catalog views. All text columns come
//! back space-padded and are trimmed here; object name parameters are
//! upper-cased before use.

use crate::db::{Connection, Value};
use crate::error::{Error, Result};
use crate::model::{
    ColumnInfo, DataAreaInfo, DataPage, IndexInfo, LabeledColumn, LibraryInfo, ProgramInfo,
    SourceFileInfo, SqlResult, TableDetail, TableInfo,
};
use crate::policy::validate_identifier;
use anyhow::Context;
use serde_json::{Map, Value as Json, json};

fn cell(row: &[Value], index: usize) -> Value {
    row.get(index).cloned().unwrap_or(Value::Null)
}

fn json_cell(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Int(n) => json!(n),
        Value::Float(n) => json!(n),
        Value::Text(text) => json!(text.trim()),
    }
}

pub fn list_libraries(
    conn: &mut dyn Connection,
    pattern: &str,
    include_system: bool,
) -> Result<Vec<LibraryInfo>> {
    let mut sql = String::from(
        "SELECT SYSTEM_SCHEMA_NAME AS LIBRARY_NAME, \
                COALESCE(SCHEMA_TEXT, '') AS LIBRARY_TEXT \
         FROM QSYS2.SYSSCHEMAS \
         WHERE SYSTEM_SCHEMA_NAME LIKE ?",
    );
    if !include_system {
        sql.push_str(" AND SYSTEM_SCHEMA_NAME NOT LIKE 'Q%'");
    }
    sql.push_str(" ORDER BY SYSTEM_SCHEMA_NAME");

    let result = conn.query(&sql, &[pattern.into()])?;
    Ok(result
        .rows
        .iter()
        .map(|row| LibraryInfo {
            name: cell(row, 0).trimmed(),
            text: cell(row, 1).trimmed(),
        })
        .collect())
}

pub fn list_tables(
    conn: &mut dyn Connection,
    library: &str,
    pattern: &str,
    table_type: &str,
) -> Result<Vec<TableInfo>> {
    let mut sql = String::from(
        "SELECT SYSTEM_TABLE_NAME AS TABLE_NAME, \
                COALESCE(TABLE_TEXT, '') AS TABLE_TEXT, \
                TABLE_TYPE \
         FROM QSYS2.SYSTABLES \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME LIKE ?",
    );
    let mut params: Vec<Value> = vec![library.to_uppercase().into(), pattern.into()];
    let type_filter = table_type.trim().to_uppercase();
    if !type_filter.is_empty() && type_filter != "ALL" {
        sql.push_str(" AND TABLE_TYPE = ?");
        params.push(type_filter.into());
    }
    sql.push_str(" ORDER BY SYSTEM_TABLE_NAME");

    let result = conn.query(&sql, &params)?;
    Ok(result
        .rows
        .iter()
        .map(|row| TableInfo {
            name: cell(row, 0).trimmed(),
            text: cell(row, 1).trimmed(),
            table_type: cell(row, 2).trimmed(),
        })
        .collect())
}

pub fn get_columns(
    conn: &mut dyn Connection,
    library: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>> {
    let sql = "SELECT c.SYSTEM_COLUMN_NAME AS COLUMN_NAME, \
                      COALESCE(c.COLUMN_TEXT, '') AS COLUMN_TEXT, \
                      c.DATA_TYPE, \
                      c.LENGTH, \
                      COALESCE(c.NUMERIC_SCALE, 0) AS DECIMAL_PLACES, \
                      c.IS_NULLABLE, \
                      c.ORDINAL_POSITION, \
                      COALESCE(c.COLUMN_DEFAULT, '') AS DEFAULT_VALUE, \
                      c.CCSID \
               FROM QSYS2.SYSCOLUMNS c \
               WHERE c.SYSTEM_TABLE_SCHEMA = ? AND c.SYSTEM_TABLE_NAME = ? \
               ORDER BY c.ORDINAL_POSITION";
    let result = conn.query(
        sql,
        &[library.to_uppercase().into(), table.to_uppercase().into()],
    )?;
    Ok(result
        .rows
        .iter()
        .map(|row| ColumnInfo {
            name: cell(row, 0).trimmed(),
            label: cell(row, 1).trimmed(),
            data_type: cell(row, 2).trimmed(),
            length: cell(row, 3).as_i64().unwrap_or(0),
            scale: cell(row, 4).as_i64().unwrap_or(0),
            nullable: cell(row, 5).trimmed(),
            ordinal: cell(row, 6).as_i64().unwrap_or(0),
            default: cell(row, 7).trimmed(),
            ccsid: cell(row, 8).as_i64(),
        })
        .collect())
}

pub fn list_source_files(
    conn: &mut dyn Connection,
    library: &str,
    pattern: &str,
) -> Result<Vec<SourceFileInfo>> {
    // FILE_TYPE = 'S' selects source physical files; the CCSID subquery reads
    // the SRCDTA payload column's encoding, which drives the upload path.
    let sql = "SELECT t.SYSTEM_TABLE_NAME AS SOURCE_FILE, \
                      COALESCE(t.TABLE_TEXT, '') AS DESCRIPTION, \
                      (SELECT COUNT(*) FROM QSYS2.SYSPARTITIONSTAT p \
                        WHERE p.SYSTEM_TABLE_SCHEMA = t.SYSTEM_TABLE_SCHEMA \
                          AND p.SYSTEM_TABLE_NAME = t.SYSTEM_TABLE_NAME) AS MEMBER_COUNT, \
                      (SELECT MAX(c.CCSID) FROM QSYS2.SYSCOLUMNS c \
                        WHERE c.SYSTEM_TABLE_SCHEMA = t.SYSTEM_TABLE_SCHEMA \
                          AND c.SYSTEM_TABLE_NAME = t.SYSTEM_TABLE_NAME \
                          AND c.COLUMN_NAME = 'SRCDTA') AS CCSID \
               FROM QSYS2.SYSTABLES t \
               WHERE t.SYSTEM_TABLE_SCHEMA = ? \
                 AND t.SYSTEM_TABLE_NAME LIKE ? \
                 AND t.FILE_TYPE = 'S' \
               ORDER BY t.SYSTEM_TABLE_NAME";
    let result = conn.query(sql, &[library.to_uppercase().into(), pattern.into()])?;
    Ok(result
        .rows
        .iter()
        .map(|row| SourceFileInfo {
            name: cell(row, 0).trimmed(),
            description: cell(row, 1).trimmed(),
            member_count: cell(row, 2).as_i64().unwrap_or(0),
            ccsid: cell(row, 3).as_i64(),
        })
        .collect())
}

pub fn get_table_info(
    conn: &mut dyn Connection,
    library: &str,
    table: &str,
) -> Result<TableDetail> {
    let lib = library.to_uppercase();
    let tbl = table.to_uppercase();

    let basic = conn.query(
        "SELECT SYSTEM_TABLE_NAME AS TABLE_NAME, \
                COALESCE(TABLE_TEXT, '') AS TABLE_TEXT, \
                TABLE_TYPE \
         FROM QSYS2.SYSTABLES \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ?",
        &[lib.clone().into(), tbl.clone().into()],
    )?;
    let Some(row) = basic.first_row() else {
        return Err(Error::NotFound(format!("Table not found: {library}/{table}")));
    };
    let table_info = TableInfo {
        name: cell(row, 0).trimmed(),
        text: cell(row, 1).trimmed(),
        table_type: cell(row, 2).trimmed(),
    };

    let columns = get_columns(conn, &lib, &tbl)?;

    // SQL key constraints first; DDS keys (QADBKFLD) as fallback, which some
    // profiles cannot read, so that lookup is best-effort.
    let keys_result = conn.query(
        "SELECT COLUMN_NAME, ORDINAL_POSITION \
         FROM QSYS2.SYSKEYCST \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ? \
         ORDER BY ORDINAL_POSITION",
        &[lib.clone().into(), tbl.clone().into()],
    )?;
    let mut primary_key: Vec<String> = keys_result
        .rows
        .iter()
        .map(|row| cell(row, 0).trimmed())
        .collect();
    if primary_key.is_empty() {
        if let Ok(dds) = conn.query(
            "SELECT DBKFLD FROM QSYS.QADBKFLD \
             WHERE DBKLIB = ? AND DBKFIL = ? \
             ORDER BY DBKORD",
            &[lib.clone().into(), tbl.clone().into()],
        ) {
            primary_key = dds.rows.iter().map(|row| cell(row, 0).trimmed()).collect();
        }
    }

    let index_result = conn.query(
        "SELECT SYSTEM_INDEX_NAME AS INDEX_NAME, \
                COALESCE(INDEX_TEXT, '') AS INDEX_TEXT, \
                IS_UNIQUE \
         FROM QSYS2.SYSINDEXES \
         WHERE SYSTEM_TABLE_SCHEMA = ? AND SYSTEM_TABLE_NAME = ?",
        &[lib.into(), tbl.into()],
    )?;
    let indexes = index_result
        .rows
        .iter()
        .map(|row| IndexInfo {
            name: cell(row, 0).trimmed(),
            text: cell(row, 1).trimmed(),
            unique: cell(row, 2).trimmed(),
        })
        .collect();

    Ok(TableDetail {
        table: table_info,
        columns,
        primary_key,
        indexes,
    })
}

pub fn list_programs(
    conn: &mut dyn Connection,
    library: &str,
    pattern: &str,
    program_type: &str,
) -> Result<Vec<ProgramInfo>> {
    let mut sql = String::from(
        "SELECT OBJNAME AS PROGRAM_NAME, \
                COALESCE(OBJATTRIBUTE, '') AS ATTRIBUTE, \
                COALESCE(OBJTEXT, '') AS PROGRAM_TEXT, \
                OBJCREATED AS CREATED, \
                CHANGE_TIMESTAMP AS CHANGED, \
                OBJSIZE AS PROGRAM_SIZE, \
                COALESCE(SOURCE_FILE, '') AS SOURCE_FILE, \
                COALESCE(SOURCE_LIBRARY, '') AS SOURCE_LIBRARY, \
                COALESCE(SOURCE_MEMBER, '') AS SOURCE_MEMBER \
         FROM TABLE(QSYS2.OBJECT_STATISTICS(?, '*PGM')) \
         WHERE OBJNAME LIKE ?",
    );
    let mut params: Vec<Value> = vec![library.to_uppercase().into(), pattern.into()];
    let type_filter = program_type.trim().to_uppercase();
    if !type_filter.is_empty() && type_filter != "ALL" {
        sql.push_str(" AND OBJATTRIBUTE = ?");
        params.push(type_filter.into());
    }
    sql.push_str(" ORDER BY OBJNAME");

    let result = conn.query(&sql, &params)?;
    Ok(result
        .rows
        .iter()
        .map(|row| ProgramInfo {
            name: cell(row, 0).trimmed(),
            attribute: cell(row, 1).trimmed(),
            text: cell(row, 2).trimmed(),
            created: cell(row, 3).trimmed(),
            changed: cell(row, 4).trimmed(),
            size: cell(row, 5).as_i64(),
            source_file: cell(row, 6).trimmed(),
            source_library: cell(row, 7).trimmed(),
            source_member: cell(row, 8).trimmed(),
        })
        .collect())
}

pub fn list_data_areas(
    conn: &mut dyn Connection,
    library: &str,
    pattern: &str,
) -> Result<Vec<DataAreaInfo>> {
    let sql = "SELECT DATA_AREA_NAME, \
                      DATA_AREA_TYPE, \
                      LENGTH, \
                      COALESCE(DECIMAL_POSITIONS, 0) AS DECIMAL_POSITIONS, \
                      COALESCE(DATA_AREA_VALUE, '') AS DATA_VALUE, \
                      COALESCE(TEXT_DESCRIPTION, '') AS DESCRIPTION \
               FROM QSYS2.DATA_AREA_INFO \
               WHERE DATA_AREA_LIBRARY = ? AND DATA_AREA_NAME LIKE ? \
               ORDER BY DATA_AREA_NAME";
    let result = conn.query(sql, &[library.to_uppercase().into(), pattern.into()])?;
    Ok(result
        .rows
        .iter()
        .map(|row| DataAreaInfo {
            name: cell(row, 0).trimmed(),
            area_type: cell(row, 1).trimmed(),
            length: cell(row, 2).as_i64(),
            decimal_positions: cell(row, 3).as_i64().unwrap_or(0),
            value: cell(row, 4).trimmed(),
            description: cell(row, 5).trimmed(),
        })
        .collect())
}

/// System identity and locale facts a code generator needs. Each step is
/// individually best-effort because the views involved appeared in different
/// OS releases.
pub fn get_system_info(conn: &mut dyn Connection) -> Result<Json> {
    let mut result = Map::new();

    let values_sql = "SELECT SYSTEM_VALUE_NAME, \
                             COALESCE(CURRENT_CHARACTER_VALUE, CAST(CURRENT_NUMERIC_VALUE AS VARCHAR(50))) \
                      FROM QSYS2.SYSTEM_VALUE_INFO \
                      WHERE SYSTEM_VALUE_NAME IN ( \
                          'QSRLNBR', 'QMODEL', 'QLANGID', 'QDATFMT', 'QDATSEP', \
                          'QTIMFMT', 'QTIMSEP', 'QDECFMT', 'QCURSYM', 'QSYSLIBL', 'QUSRLIBL')";
    match conn.query(values_sql, &[]) {
        Ok(rows) => {
            let mut info = Map::new();
            for row in &rows.rows {
                let name = cell(row, 0).trimmed();
                let value = cell(row, 1).trimmed();
                let key = match name.as_str() {
                    "QSRLNBR" => "serial_number",
                    "QMODEL" => "model",
                    "QLANGID" => "language_id",
                    "QDATFMT" => "date_format",
                    "QDATSEP" => "date_separator",
                    "QTIMFMT" => "time_format",
                    "QTIMSEP" => "time_separator",
                    "QDECFMT" => "decimal_format",
                    "QCURSYM" => "currency_symbol",
                    "QSYSLIBL" => "system_library_list",
                    "QUSRLIBL" => "user_library_list",
                    _ => continue,
                };
                if key.ends_with("library_list") {
                    let libs: Vec<&str> = value.split_whitespace().collect();
                    info.insert(key.to_string(), json!(libs));
                } else {
                    info.insert(key.to_string(), json!(value));
                }
            }
            if !info.is_empty() {
                result.insert("system_info".to_string(), Json::Object(info));
            }
        }
        Err(err) => {
            result.insert("system_info_error".to_string(), json!(err.to_string()));
        }
    }

    if let Ok(rows) = conn.query(
        "SELECT OS_NAME, OS_VERSION, OS_RELEASE \
         FROM SYSIBMADM.ENV_SYS_INFO FETCH FIRST 1 ROW ONLY",
        &[],
    ) && let Some(row) = rows.first_row()
    {
        result.insert(
            "version".to_string(),
            json!({
                "os_name": cell(row, 0).trimmed(),
                "os_version": cell(row, 1).trimmed(),
                "os_release": cell(row, 2).trimmed(),
            }),
        );
    }

    if let Ok(rows) = conn.query(
        "SELECT SQL_STANDARD_VERSION, SQL_PATH \
         FROM QSYS2.SQL_SIZING FETCH FIRST 1 ROW ONLY",
        &[],
    ) && let Some(row) = rows.first_row()
    {
        result.insert(
            "sql_info".to_string(),
            json!({
                "sql_standard": cell(row, 0).trimmed(),
                "sql_path": cell(row, 1).trimmed(),
            }),
        );
    }

    let mut ccsid_info = Map::new();
    if let Ok(rows) = conn.query(
        "SELECT CURRENT_NUMERIC_VALUE FROM QSYS2.SYSTEM_VALUE_INFO \
         WHERE SYSTEM_VALUE_NAME = 'QCCSID'",
        &[],
    ) && let Some(row) = rows.first_row()
    {
        ccsid_info.insert("default_ccsid".to_string(), json_cell(&cell(row, 0)));
    }
    if let Ok(rows) = conn.query(
        "SELECT JOB_CCSID FROM QSYS2.JOB_INFO WHERE JOB_NAME = '*'",
        &[],
    ) && let Some(row) = rows.first_row()
    {
        ccsid_info.insert("job_ccsid".to_string(), json_cell(&cell(row, 0)));
    }
    if !ccsid_info.is_empty() {
        result.insert("ccsid_info".to_string(), Json::Object(ccsid_info));
    }

    if let Ok(rows) = conn.query(
        "SELECT CURRENT_USER, USER, CURRENT_SCHEMA FROM SYSIBM.SYSDUMMY1",
        &[],
    ) && let Some(row) = rows.first_row()
    {
        result.insert(
            "connection_info".to_string(),
            json!({
                "current_user": cell(row, 0).trimmed(),
                "user": cell(row, 1).trimmed(),
                "current_schema": cell(row, 2).trimmed(),
            }),
        );
    }

    // 5770WDS = Rational Development Studio (ILE compilers), 5770SS1 = the OS.
    if let Ok(rows) = conn.query(
        "SELECT PRODUCT_ID, PRODUCT_OPTION, PRODUCT_DESCRIPTION_TEXT \
         FROM QSYS2.SOFTWARE_PRODUCT_INFO \
         WHERE PRODUCT_ID IN ('5770WDS', '5770SS1') \
           AND SYMBOLIC_LOAD_STATE = '*INSTALLED' \
         ORDER BY PRODUCT_ID, PRODUCT_OPTION",
        &[],
    ) {
        let compilers: Vec<Json> = rows
            .rows
            .iter()
            .map(|row| {
                json!({
                    "product_id": cell(row, 0).trimmed(),
                    "option": cell(row, 1).trimmed(),
                    "description": cell(row, 2).trimmed(),
                })
            })
            .collect();
        if !compilers.is_empty() {
            result.insert("installed_compilers".to_string(), json!(compilers));
        }
    }

    Ok(Json::Object(result))
}

/// Labeled row retrieval with ROW_NUMBER paging (works on old releases).
/// Table and column identifiers are allow-listed before interpolation; the
/// WHERE predicate is a trusted caller boundary inside a read-only SELECT.
pub fn get_data(
    conn: &mut dyn Connection,
    library: &str,
    table: &str,
    columns: &str,
    where_clause: &str,
    limit: i64,
    offset: i64,
) -> Result<DataPage> {
    let lib = validate_identifier(library)?;
    let tbl = validate_identifier(table)?;

    let column_info = get_columns(conn, &lib, &tbl)?;
    let labels: std::collections::HashMap<&str, &str> = column_info
        .iter()
        .map(|col| (col.name.as_str(), col.label.as_str()))
        .collect();

    let select_cols: Vec<String> = if columns.trim().is_empty() {
        column_info.iter().map(|col| col.name.clone()).collect()
    } else {
        columns
            .split(',')
            .map(validate_identifier)
            .collect::<Result<_>>()?
    };
    if select_cols.is_empty() {
        return Err(Error::NotFound(format!("Table has no columns: {lib}/{tbl}")));
    }

    let limit = limit.clamp(1, 10_000);
    let offset = offset.max(0);
    let mut inner = format!(
        "SELECT {}, ROW_NUMBER() OVER() AS RN__ FROM {lib}.{tbl}",
        select_cols.join(", ")
    );
    if !where_clause.trim().is_empty() {
        inner.push_str(&format!(" WHERE {}", where_clause.trim()));
    }
    let sql = format!(
        "SELECT * FROM ({inner}) AS T WHERE RN__ > {offset} FETCH FIRST {limit} ROWS ONLY"
    );

    let result = conn.query(&sql, &[])?;
    let keep: Vec<(usize, String)> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != "RN__")
        .map(|(index, name)| (index, name.clone()))
        .collect();

    let out_columns = keep
        .iter()
        .map(|(_, name)| LabeledColumn {
            name: name.clone(),
            label: labels.get(name.as_str()).unwrap_or(&"").to_string(),
        })
        .collect();

    let rows: Vec<Map<String, Json>> = result
        .rows
        .iter()
        .map(|row| {
            keep.iter()
                .map(|(index, name)| (name.clone(), json_cell(&cell(row, *index))))
                .collect()
        })
        .collect();

    let row_count = rows.len();
    Ok(DataPage {
        columns: out_columns,
        rows,
        row_count,
    })
}

/// True when the statement's leading keyword is the read-only query keyword.
/// Only leading/trailing whitespace is stripped; a statement that opens with
/// a comment is rejected even if a SELECT follows.
pub fn is_read_only_statement(sql: &str) -> bool {
    let upper = sql.trim().to_uppercase();
    upper.starts_with("SELECT")
        && upper
            .chars()
            .nth(6)
            .is_none_or(|ch| !ch.is_ascii_alphanumeric())
}

pub fn execute_sql(
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
    max_rows: usize,
) -> Result<SqlResult> {
    if !is_read_only_statement(sql) {
        return Err(Error::CommandFailed(
            "Only SELECT statements are allowed".to_string(),
        ));
    }
    let result = conn.query(sql, params).context("execute SELECT")?;
    let rows: Vec<Map<String, Json>> = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| {
            result
                .columns
                .iter()
                .enumerate()
                .map(|(index, name)| (name.clone(), json_cell(&cell(row, index))))
                .collect()
        })
        .collect();
    let row_count = rows.len();
    Ok(SqlResult {
        columns: result.columns,
        rows,
        row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_guard() {
        assert!(is_read_only_statement("SELECT * FROM LIB.T"));
        assert!(is_read_only_statement("  select 1 from sysibm.sysdummy1  "));
        assert!(!is_read_only_statement("DELETE FROM LIB.T"));
        assert!(!is_read_only_statement("UPDATE LIB.T SET A = 1"));
        assert!(!is_read_only_statement("INSERT INTO LIB.T VALUES (1)"));
        assert!(!is_read_only_statement("-- note\nSELECT 1 FROM SYSIBM.SYSDUMMY1"));
        assert!(!is_read_only_statement("SELECTX"));
        assert!(!is_read_only_statement(""));
    }
}
