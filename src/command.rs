//! CL command synthesis and the generic execution gateway.
//!
//! Every mutating operation funnels through `QSYS2.QCMDEXC`; the synthesis
//! side maps source types to creator commands and knows the three parameter
//! shapes those commands take.

use crate::db::Connection;
use crate::error::{Error, Result};
use crate::model::CommandResult;
use crate::policy::validate_identifier;
use tracing::debug;

/// Source-type tag → creator command. Closed set; anything else must be
/// compiled with an explicit command name.
pub const COMPILE_COMMANDS: &[(&str, &str)] = &[
    ("CLP", "CRTCLPGM"),
    ("CLLE", "CRTBNDCL"),
    ("RPG", "CRTRPGPGM"),
    ("RPGLE", "CRTBNDRPG"),
    ("SQLRPG", "CRTSQLRPG"),
    ("SQLRPGLE", "CRTSQLRPGI"),
    ("CBL", "CRTCBLPGM"),
    ("CBLLE", "CRTBNDCBL"),
    ("SQLCBL", "CRTSQLCBL"),
    ("SQLCBLLE", "CRTSQLCBLI"),
    ("PF", "CRTPF"),
    ("LF", "CRTLF"),
    ("DSPF", "CRTDSPF"),
    ("PRTF", "CRTPRTF"),
    ("CMD", "CRTCMD"),
];

/// Commands that produce *FILE objects and take FILE(...) instead of PGM(...).
const FILE_COMMANDS: &[&str] = &["CRTPF", "CRTLF", "CRTDSPF", "CRTPRTF"];

pub fn detect_compile_command(source_type: &str) -> Result<&'static str> {
    let tag = source_type.trim().to_uppercase();
    COMPILE_COMMANDS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, command)| *command)
        .ok_or(Error::UnknownSourceType(tag))
}

/// Assemble the full compile command text. `options` is appended verbatim,
/// the one place arbitrary caller text reaches the command string.
pub fn build_compile_command(
    command: &str,
    target_library: &str,
    source_library: &str,
    source_file: &str,
    member: &str,
    options: &str,
) -> Result<String> {
    let target = validate_identifier(target_library)?;
    let lib = validate_identifier(source_library)?;
    let file = validate_identifier(source_file)?;
    let mbr = validate_identifier(member)?;
    let command = command.trim().to_uppercase();

    let mut text = if FILE_COMMANDS.contains(&command.as_str()) {
        format!("{command} FILE({target}/{mbr}) SRCFILE({lib}/{file}) SRCMBR({mbr})")
    } else if command == "CRTCMD" {
        format!("{command} CMD({target}/{mbr}) PGM(*LIBL/{mbr}) SRCFILE({lib}/{file}) SRCMBR({mbr})")
    } else {
        format!("{command} PGM({target}/{mbr}) SRCFILE({lib}/{file}) SRCMBR({mbr})")
    };

    let options = options.trim();
    if !options.is_empty() {
        text.push(' ');
        text.push_str(options);
    }
    Ok(text)
}

/// ADDPFM with the member description quoted and embedded quotes doubled.
pub fn build_add_member_command(
    library: &str,
    source_file: &str,
    member: &str,
    source_type: &str,
    description: &str,
) -> Result<String> {
    let lib = validate_identifier(library)?;
    let file = validate_identifier(source_file)?;
    let mbr = validate_identifier(member)?;
    let tag = validate_identifier(source_type)?;
    let text = description.replace('\'', "''");
    Ok(format!(
        "ADDPFM FILE({lib}/{file}) MBR({mbr}) SRCTYPE({tag}) TEXT('{text}')"
    ))
}

/// CRTSRCPF for a Unicode-capable source file. CCSID 1208 keeps the direct
/// insert path usable for any payload.
pub fn build_create_source_file_command(
    library: &str,
    name: &str,
    record_length: i64,
    description: &str,
) -> Result<String> {
    let lib = validate_identifier(library)?;
    let file = validate_identifier(name)?;
    let record_length = record_length.clamp(92, 240);
    let text = description.replace('\'', "''");
    Ok(format!(
        "CRTSRCPF FILE({lib}/{file}) RCDLEN({record_length}) CCSID(1208) TEXT('{text}')"
    ))
}

/// Execute one CL command through the generic gateway. Failure carries the
/// raw driver diagnostic; callers surface it verbatim.
pub fn execute_cl_command(conn: &mut dyn Connection, command: &str) -> CommandResult {
    debug!(command, "executing CL command");
    match conn.execute("CALL QSYS2.QCMDEXC(?)", &[command.into()]) {
        Ok(()) => CommandResult {
            success: true,
            message: format!("Command executed: {command}"),
            command: command.to_string(),
            source_type: None,
        },
        Err(err) => CommandResult {
            success: false,
            message: err.to_string(),
            command: command.to_string(),
            source_type: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_map_is_total_over_known_tags() {
        for (tag, expected) in COMPILE_COMMANDS {
            assert_eq!(detect_compile_command(tag).unwrap(), *expected);
        }
        assert_eq!(COMPILE_COMMANDS.len(), 15);
    }

    #[test]
    fn unknown_tag_fails_detection() {
        assert!(matches!(
            detect_compile_command("TXT"),
            Err(Error::UnknownSourceType(tag)) if tag == "TXT"
        ));
        assert!(detect_compile_command("").is_err());
    }

    #[test]
    fn program_command_shape() {
        let cmd =
            build_compile_command("CRTBNDRPG", "DEV", "DEV", "QRPGSRC", "ORD100", "").unwrap();
        assert_eq!(
            cmd,
            "CRTBNDRPG PGM(DEV/ORD100) SRCFILE(DEV/QRPGSRC) SRCMBR(ORD100)"
        );
    }

    #[test]
    fn file_command_shape() {
        let cmd = build_compile_command("CRTDSPF", "DEV", "DEV", "QDDSSRC", "ORDDSP", "").unwrap();
        assert_eq!(
            cmd,
            "CRTDSPF FILE(DEV/ORDDSP) SRCFILE(DEV/QDDSSRC) SRCMBR(ORDDSP)"
        );
    }

    #[test]
    fn command_definition_shape() {
        let cmd = build_compile_command("CRTCMD", "DEV", "DEV", "QCMDSRC", "RUNORD", "").unwrap();
        assert_eq!(
            cmd,
            "CRTCMD CMD(DEV/RUNORD) PGM(*LIBL/RUNORD) SRCFILE(DEV/QCMDSRC) SRCMBR(RUNORD)"
        );
    }

    #[test]
    fn options_appended_verbatim() {
        let cmd = build_compile_command(
            "CRTBNDRPG",
            "DEV",
            "DEV",
            "QRPGSRC",
            "ORD100",
            "DBGVIEW(*SOURCE) OPTION(*EVENTF)",
        )
        .unwrap();
        assert!(cmd.ends_with("SRCMBR(ORD100) DBGVIEW(*SOURCE) OPTION(*EVENTF)"));
    }

    #[test]
    fn add_member_escapes_quotes() {
        let cmd =
            build_add_member_command("DEV", "QRPGSRC", "ORD100", "RPGLE", "Bob's order entry")
                .unwrap();
        assert_eq!(
            cmd,
            "ADDPFM FILE(DEV/QRPGSRC) MBR(ORD100) SRCTYPE(RPGLE) TEXT('Bob''s order entry')"
        );
    }

    #[test]
    fn create_source_file_defaults() {
        let cmd = build_create_source_file_command("DEV", "QAIASRC", 112, "AI sources").unwrap();
        assert_eq!(
            cmd,
            "CRTSRCPF FILE(DEV/QAIASRC) RCDLEN(112) CCSID(1208) TEXT('AI sources')"
        );
    }

    #[test]
    fn bad_identifiers_rejected_before_synthesis() {
        assert!(build_compile_command("CRTBNDRPG", "DEV;X", "DEV", "F", "M", "").is_err());
        assert!(build_add_member_command("DEV", "Q/SRC", "M", "RPGLE", "").is_err());
    }
}
