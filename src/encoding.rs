//! The encoding bridge. The access driver transcodes reliably for ASCII and
//! Unicode source files, but not for the two legacy double-byte CCSIDs; for
//! those the upload path converts out of band with iconv and delivers the
//! bytes over FTP instead of parameterized inserts.

use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// Legacy double-byte member CCSIDs that the driver cannot transcode.
pub const LEGACY_DBCS_CCSIDS: &[i64] = &[5026, 5035];

pub fn is_legacy_dbcs(ccsid: i64) -> bool {
    LEGACY_DBCS_CCSIDS.contains(&ccsid)
}

pub fn contains_non_ascii(text: &str) -> bool {
    !text.is_ascii()
}

/// iconv charset for a legacy member CCSID.
pub fn iconv_charset(ccsid: i64) -> Option<&'static str> {
    match ccsid {
        5026 => Some("IBM-930"),
        5035 => Some("IBM-939"),
        _ => None,
    }
}

/// Stream-file CCSID tag the system recognizes for the converted bytes.
/// 5026/5035 members read stream files tagged with their 930/939 equivalents.
pub fn stream_file_ccsid(ccsid: i64) -> Option<i64> {
    match ccsid {
        5026 => Some(930),
        5035 => Some(939),
        _ => None,
    }
}

/// Side-effecting conversion capability, injected into the upload path so
/// tests can substitute a stub.
pub trait TextConverter {
    fn is_available(&self) -> bool;
    /// Convert UTF-8 `text` to the charset for `ccsid`, returning raw bytes.
    fn convert(&self, text: &str, ccsid: i64) -> Result<Vec<u8>>;
}

/// External iconv process, discovered once at construction. On Windows the
/// converter lives inside the WSL subsystem; elsewhere it is a native binary.
pub struct IconvConverter {
    invocation: Option<IconvInvocation>,
    timeout: Duration,
}

#[derive(Debug, Clone)]
struct IconvInvocation {
    program: String,
    prefix_args: Vec<String>,
}

impl IconvConverter {
    pub fn discover(timeout: Duration) -> Self {
        Self {
            invocation: discover_iconv(timeout),
            timeout,
        }
    }
}

impl TextConverter for IconvConverter {
    fn is_available(&self) -> bool {
        self.invocation.is_some()
    }

    fn convert(&self, text: &str, ccsid: i64) -> Result<Vec<u8>> {
        let invocation = self
            .invocation
            .as_ref()
            .ok_or(Error::EncodingToolUnavailable(ccsid as u32))?;
        let charset =
            iconv_charset(ccsid).ok_or(Error::EncodingToolUnavailable(ccsid as u32))?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.prefix_args)
            .arg("-f")
            .arg("UTF-8")
            .arg("-t")
            .arg(charset);
        debug!(charset, "converting payload via iconv");

        let output = run_with_input(command, text.as_bytes(), self.timeout)
            .map_err(|err| Error::Conversion(err.to_string()))?;
        if !output.status.success() {
            return Err(Error::Conversion(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

#[cfg(windows)]
fn iconv_candidates() -> Vec<IconvInvocation> {
    vec![IconvInvocation {
        program: "wsl".to_string(),
        prefix_args: vec!["iconv".to_string()],
    }]
}

#[cfg(not(windows))]
fn iconv_candidates() -> Vec<IconvInvocation> {
    vec![
        IconvInvocation {
            program: "iconv".to_string(),
            prefix_args: Vec::new(),
        },
        IconvInvocation {
            program: "/usr/bin/iconv".to_string(),
            prefix_args: Vec::new(),
        },
    ]
}

fn discover_iconv(timeout: Duration) -> Option<IconvInvocation> {
    for candidate in iconv_candidates() {
        let mut command = Command::new(&candidate.program);
        command.args(&candidate.prefix_args).arg("--version");
        if let Ok(output) = run_with_input(command, b"", timeout)
            && output.status.success()
        {
            debug!(program = %candidate.program, "found iconv");
            return Some(candidate);
        }
    }
    None
}

/// Run a child process with stdin supplied and a hard deadline. The child is
/// killed when the deadline passes.
fn run_with_input(
    mut command: Command,
    input: &[u8],
    timeout: Duration,
) -> anyhow::Result<std::process::Output> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input)?;
    }

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("process timed out after {}s", timeout.as_secs());
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_classification() {
        assert!(!contains_non_ascii("     C                   CALL      'ORDPRT'"));
        assert!(contains_non_ascii("受注データ印刷"));
        assert!(contains_non_ascii("caf\u{e9}"));
        assert!(!contains_non_ascii(""));
    }

    #[test]
    fn legacy_ccsid_set() {
        assert!(is_legacy_dbcs(5035));
        assert!(is_legacy_dbcs(5026));
        assert!(!is_legacy_dbcs(1208));
        assert!(!is_legacy_dbcs(1399));
    }

    #[test]
    fn charset_and_stream_tags() {
        assert_eq!(iconv_charset(5035), Some("IBM-939"));
        assert_eq!(iconv_charset(5026), Some("IBM-930"));
        assert_eq!(iconv_charset(37), None);
        assert_eq!(stream_file_ccsid(5035), Some(939));
        assert_eq!(stream_file_ccsid(5026), Some(930));
    }

    #[test]
    fn unavailable_converter_reports_both_remediations() {
        let converter = IconvConverter {
            invocation: None,
            timeout: Duration::from_secs(1),
        };
        let err = converter.convert("受注", 5035).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("iconv"));
        assert!(message.contains("create_source_file"));
    }
}
