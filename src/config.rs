// Configuration for the AS400 connection and its FTP side channel.
// Read once at startup and threaded through service construction.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONNECTION_STRING_VAR: &str = "AS400_CONNECTION_STRING";
pub const FTP_HOST_VAR: &str = "AS400_FTP_HOST";
pub const FTP_USER_VAR: &str = "AS400_FTP_USER";
pub const FTP_PASSWORD_VAR: &str = "AS400_FTP_PASSWORD";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// ODBC connection descriptor, e.g.
    /// `DRIVER={IBM i Access ODBC Driver};SYSTEM=HOST;UID=USER;PWD=PASS;CCSID=1208;EXTCOLINFO=1`.
    pub connection_string: String,
    /// Explicit FTP overrides; when absent the SYSTEM/UID/PWD fields of the
    /// connection string are used instead.
    pub ftp_host: Option<String>,
    pub ftp_user: Option<String>,
    pub ftp_password: Option<String>,
    /// Bound on the external iconv invocation (discovery and conversion).
    pub convert_timeout: Duration,
}

impl Config {
    /// Load from the process environment, with an optional `.env` file in the
    /// working directory. Real environment variables win over file entries.
    pub fn from_env() -> Self {
        let file_vars = read_env_file(Path::new(".env"));
        let lookup = |name: &str| -> Option<String> {
            std::env::var(name)
                .ok()
                .or_else(|| file_vars.get(name).cloned())
                .filter(|value| !value.trim().is_empty())
        };

        Self {
            connection_string: lookup(CONNECTION_STRING_VAR).unwrap_or_default(),
            ftp_host: lookup(FTP_HOST_VAR),
            ftp_user: lookup(FTP_USER_VAR),
            ftp_password: lookup(FTP_PASSWORD_VAR),
            convert_timeout: Duration::from_secs(30),
        }
    }

    /// Look up a semicolon-delimited field of the connection string, e.g.
    /// `SYSTEM`, `UID`, `PWD`. Field names are case-insensitive.
    pub fn connection_field(&self, name: &str) -> Option<String> {
        connection_field(&self.connection_string, name)
    }
}

pub fn connection_field(connection_string: &str, name: &str) -> Option<String> {
    for part in connection_string.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(name) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn read_env_file(path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let Ok(content) = std::fs::read_to_string(path) else {
        return vars;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn connection_fields_parsed_case_insensitively() {
        let cs = "DRIVER={IBM i Access ODBC Driver};SYSTEM=MYAS400;UID=DEV;PWD=secret;CCSID=1208";
        assert_eq!(connection_field(cs, "system").as_deref(), Some("MYAS400"));
        assert_eq!(connection_field(cs, "UID").as_deref(), Some("DEV"));
        assert_eq!(connection_field(cs, "PWD").as_deref(), Some("secret"));
        assert_eq!(connection_field(cs, "DSN"), None);
    }

    #[test]
    fn empty_fields_are_none() {
        assert_eq!(connection_field("SYSTEM=;UID=U", "SYSTEM"), None);
    }

    #[test]
    fn env_file_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "AS400_FTP_HOST=\"myhost\"").unwrap();
        writeln!(file, "not-a-pair").unwrap();
        writeln!(file, "AS400_FTP_USER=dev ").unwrap();
        drop(file);

        let vars = read_env_file(&path);
        assert_eq!(vars.get("AS400_FTP_HOST").map(String::as_str), Some("myhost"));
        assert_eq!(vars.get("AS400_FTP_USER").map(String::as_str), Some("dev"));
        assert!(!vars.contains_key("not-a-pair"));
    }
}
