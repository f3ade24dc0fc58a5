//! Best-effort extraction of file usages and program-call targets from raw
//! source text. Used as a fallback on releases without the catalog's
//! dependency views; results are labeled as source analysis and are not
//! authoritative (dynamic call targets and bound references are invisible).

use crate::db::Connection;
use crate::error::Result;
use crate::model::{BoundModule, FileReference, ProgramCall, ProgramReferences, SourceAnalysisNote};
use crate::policy::validate_identifier;
use crate::source;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Placeholder meaning "resolved through the caller's library list".
pub const LIBRARY_LIST: &str = "*LIBL";

static CL_FILE_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DCL[PF]*\s+FILE\(([^)]+)\)").expect("cl file decl pattern"));
static CL_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CALL\s+PGM\(([^)]+)\)").expect("cl call pattern"));
static RPG_CSPEC_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CALL\s+'?([A-Z0-9#@$]+)'?").expect("rpg call pattern"));
static RPG_FREE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DCL-F\s+(\w+)").expect("dcl-f pattern"));
static RPG_EXTPGM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EXTPGM\s*\(\s*'([^']+)'\s*\)").expect("extpgm pattern"));

#[derive(Debug, Default, PartialEq)]
pub struct SourceReferences {
    pub files: Vec<FileReference>,
    pub programs: Vec<ProgramCall>,
}

/// Split `LIB/NAME` into (library, name); a bare name resolves through the
/// library list.
fn split_qualified(reference: &str) -> (String, String) {
    match reference.split_once('/') {
        Some((library, name)) => (library.trim().to_string(), name.trim().to_string()),
        None => (LIBRARY_LIST.to_string(), reference.trim().to_string()),
    }
}

pub fn parse_source_references(source_text: &str, source_type: &str) -> SourceReferences {
    let mut refs = SourceReferences::default();
    let upper = source_text.to_uppercase();
    let source_type = source_type.trim().to_uppercase();

    match source_type.as_str() {
        "CLP" | "CLLE" => {
            for line in upper.lines() {
                if let Some(captures) = CL_FILE_DECL.captures(line) {
                    let (library, file) = split_qualified(&captures[1]);
                    refs.files.push(FileReference {
                        file,
                        library,
                        usage: "DCLF".to_string(),
                        description: None,
                    });
                }
                if let Some(captures) = CL_CALL.captures(line) {
                    let (library, program) = split_qualified(&captures[1]);
                    refs.programs.push(ProgramCall { program, library });
                }
            }
        }
        "RPG" | "RPGLE" | "SQLRPGLE" => {
            for line in upper.lines() {
                extract_rpg_line(line, &mut refs);
            }
        }
        _ => {}
    }

    refs
}

fn extract_rpg_line(line: &str, refs: &mut SourceReferences) {
    // Fixed-format specifications carry their kind marker in column 6.
    // Short or malformed lines simply yield no match.
    let spec = line.as_bytes().get(5).copied();

    if spec == Some(b'F') {
        let file_name = fixed_columns(line, 6, 16).trim().to_string();
        if !file_name.is_empty() && !file_name.starts_with('*') {
            let usage = match fixed_columns(line, 16, 17) {
                "I" => "INPUT",
                "O" => "OUTPUT",
                "U" => "UPDATE",
                _ => "UNKNOWN",
            };
            refs.files.push(FileReference {
                file: file_name,
                library: LIBRARY_LIST.to_string(),
                usage: usage.to_string(),
                description: None,
            });
        }
    }

    if spec == Some(b'C')
        && let Some(captures) = RPG_CSPEC_CALL.captures(line)
    {
        refs.programs.push(ProgramCall {
            program: captures[1].to_string(),
            library: LIBRARY_LIST.to_string(),
        });
    }

    if let Some(captures) = RPG_FREE_FILE.captures(line) {
        refs.files.push(FileReference {
            file: captures[1].to_string(),
            library: LIBRARY_LIST.to_string(),
            usage: "DCL-F".to_string(),
            description: None,
        });
    }

    if let Some(captures) = RPG_EXTPGM.captures(line) {
        refs.programs.push(ProgramCall {
            program: captures[1].to_string(),
            library: LIBRARY_LIST.to_string(),
        });
    }
}

/// Source files scanned for a program's source when the object metadata does
/// not record where it was compiled from.
const SOURCE_FILE_CANDIDATES: &[&str] =
    &["QRPGLESRC", "QRPGSRC", "QCLSRC", "QCLLESRC", "QSQLSRC"];

/// File and program references for a compiled program. The catalog's
/// reference view is authoritative; on releases without it (SQL0204) the
/// result is derived by parsing the program's source instead.
pub fn program_references(
    conn: &mut dyn Connection,
    library: &str,
    program: &str,
) -> Result<ProgramReferences> {
    let lib = validate_identifier(library)?;
    let pgm = validate_identifier(program)?;

    match conn.query(
        "SELECT OBJECT_NAME, OBJECT_LIBRARY, OBJECT_TYPE, OBJECT_USAGE \
         FROM QSYS2.PROGRAM_FILE_REFERENCES \
         WHERE PROGRAM_LIBRARY = ? AND PROGRAM_NAME = ?",
        &[lib.clone().into(), pgm.clone().into()],
    ) {
        Ok(result) => {
            let mut refs = ProgramReferences {
                program: format!("{lib}/{pgm}"),
                referenced_files: Vec::new(),
                called_programs: Vec::new(),
                bound_modules: Vec::new(),
                source: None,
                error: None,
            };
            for row in &result.rows {
                let name = row.first().map(crate::db::Value::trimmed).unwrap_or_default();
                let object_library = row.get(1).map(crate::db::Value::trimmed).unwrap_or_default();
                let object_type = row.get(2).map(crate::db::Value::trimmed).unwrap_or_default();
                let usage = row.get(3).map(crate::db::Value::trimmed).unwrap_or_default();
                match object_type.as_str() {
                    "*FILE" => refs.referenced_files.push(FileReference {
                        file: name,
                        library: object_library,
                        usage: file_usage_label(&usage),
                        description: None,
                    }),
                    "*PGM" => refs.called_programs.push(ProgramCall {
                        program: name,
                        library: object_library,
                    }),
                    _ => {}
                }
            }
            refs.bound_modules = bound_modules(conn, &lib, &pgm);
            Ok(refs)
        }
        Err(err) if err.to_string().contains("SQL0204") => {
            debug!(library = %lib, program = %pgm, "reference view unavailable, falling back to source analysis");
            source_analysis_references(conn, &lib, &pgm)
        }
        Err(err) => Err(err.into()),
    }
}

/// Modules bound into an ILE program. Best effort; OPM-only releases lack
/// the view and the list stays empty.
fn bound_modules(conn: &mut dyn Connection, library: &str, program: &str) -> Vec<BoundModule> {
    let result = conn.query(
        "SELECT BOUND_MODULE, BOUND_MODULE_LIBRARY \
         FROM QSYS2.PROGRAM_BOUND_MODULE_INFO \
         WHERE PROGRAM_LIBRARY = ? AND PROGRAM_NAME = ?",
        &[library.into(), program.into()],
    );
    match result {
        Ok(result) => result
            .rows
            .iter()
            .map(|row| BoundModule {
                module: row.first().map(crate::db::Value::trimmed).unwrap_or_default(),
                library: row.get(1).map(crate::db::Value::trimmed).unwrap_or_default(),
            })
            .collect(),
        Err(err) => {
            debug!(library, program, error = %err, "bound module lookup unavailable");
            Vec::new()
        }
    }
}

/// DSPPGMREF-style numeric usage codes.
fn file_usage_label(code: &str) -> String {
    match code {
        "1" => "INPUT".to_string(),
        "2" => "OUTPUT".to_string(),
        "3" => "INPUT/OUTPUT".to_string(),
        "4" => "UPDATE".to_string(),
        "" => "UNKNOWN".to_string(),
        other => other.to_string(),
    }
}

fn source_analysis_references(
    conn: &mut dyn Connection,
    library: &str,
    program: &str,
) -> Result<ProgramReferences> {
    let mut refs = ProgramReferences {
        program: format!("{library}/{program}"),
        referenced_files: Vec::new(),
        called_programs: Vec::new(),
        bound_modules: Vec::new(),
        source: None,
        error: None,
    };

    let Some((source_library, source_file)) = locate_program_source(conn, library, program)?
    else {
        refs.error = Some(format!(
            "Program source not found for {library}/{program}; references unavailable on this release"
        ));
        return Ok(refs);
    };

    let member = source::get_source(conn, &source_library, &source_file, program)?;
    let parsed = parse_source_references(&member.source_text, &member.metadata.source_type);
    refs.referenced_files = parsed.files;
    refs.called_programs = parsed.programs;
    refs.source = Some(SourceAnalysisNote {
        method: "source_analysis".to_string(),
        source_file: format!("{source_library}/{source_file}({program})"),
        source_type: member.metadata.source_type,
        note: "Derived by parsing source text; dynamic and bound calls may be missing".to_string(),
    });
    Ok(refs)
}

/// Where the program was compiled from: the object's recorded source location
/// when present, otherwise the first conventional source file containing a
/// member with the program's name.
fn locate_program_source(
    conn: &mut dyn Connection,
    library: &str,
    program: &str,
) -> Result<Option<(String, String)>> {
    if let Ok(result) = conn.query(
        "SELECT COALESCE(SOURCE_LIBRARY, ''), COALESCE(SOURCE_FILE, '') \
         FROM TABLE(QSYS2.OBJECT_STATISTICS(?, '*PGM')) \
         WHERE OBJNAME = ?",
        &[library.into(), program.into()],
    ) && let Some(row) = result.first_row()
    {
        let src_lib = row.first().map(crate::db::Value::trimmed).unwrap_or_default();
        let src_file = row.get(1).map(crate::db::Value::trimmed).unwrap_or_default();
        if !src_lib.is_empty() && !src_file.is_empty() {
            return Ok(Some((src_lib, src_file)));
        }
    }

    for candidate in SOURCE_FILE_CANDIDATES {
        if source::member_exists(conn, library, candidate, program)? {
            return Ok(Some((library.to_string(), (*candidate).to_string())));
        }
    }
    Ok(None)
}

fn fixed_columns(line: &str, start: usize, end: usize) -> &str {
    let bytes = line.as_bytes();
    let end = end.min(bytes.len());
    if start >= end {
        return "";
    }
    std::str::from_utf8(&bytes[start..end]).unwrap_or("")
}
