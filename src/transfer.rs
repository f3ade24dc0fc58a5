//! Binary-safe file delivery to the remote IFS over FTP, used by the upload
//! path when the converted payload must bypass the access driver entirely.

use crate::config::Config;
use crate::error::{Error, Result};
use std::io::Cursor;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FtpCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

/// Environment overrides win; otherwise fall back to the SYSTEM/UID/PWD
/// fields of the connection descriptor. All three must resolve.
pub fn resolve_credentials(config: &Config) -> Result<FtpCredentials> {
    let host = config
        .ftp_host
        .clone()
        .or_else(|| config.connection_field("SYSTEM"));
    let user = config
        .ftp_user
        .clone()
        .or_else(|| config.connection_field("UID"));
    let password = config
        .ftp_password
        .clone()
        .or_else(|| config.connection_field("PWD"));
    match (host, user, password) {
        (Some(host), Some(user), Some(password)) => Ok(FtpCredentials {
            host,
            user,
            password,
        }),
        _ => Err(Error::CredentialsUnavailable),
    }
}

/// One open transfer session. Failures are terminal for the invocation;
/// nothing here retries.
pub trait FileTransfer {
    fn put(&mut self, remote_path: &str, data: &[u8]) -> Result<()>;
    fn delete(&mut self, remote_path: &str) -> Result<()>;
}

pub trait TransferFactory {
    fn open(&self, credentials: &FtpCredentials) -> Result<Box<dyn FileTransfer>>;
}

pub struct FtpTransferFactory;

impl TransferFactory for FtpTransferFactory {
    fn open(&self, credentials: &FtpCredentials) -> Result<Box<dyn FileTransfer>> {
        let address = if credentials.host.contains(':') {
            credentials.host.clone()
        } else {
            format!("{}:21", credentials.host)
        };
        debug!(host = %address, "opening FTP session");
        let mut stream = FtpStream::connect(&address).map_err(classify_ftp_error)?;
        stream
            .login(&credentials.user, &credentials.password)
            .map_err(classify_ftp_error)?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(classify_ftp_error)?;
        Ok(Box::new(FtpTransfer { stream }))
    }
}

struct FtpTransfer {
    stream: FtpStream,
}

impl FileTransfer for FtpTransfer {
    fn put(&mut self, remote_path: &str, data: &[u8]) -> Result<()> {
        self.stream
            .put_file(remote_path, &mut Cursor::new(data))
            .map_err(classify_ftp_error)?;
        Ok(())
    }

    fn delete(&mut self, remote_path: &str) -> Result<()> {
        self.stream.rm(remote_path).map_err(classify_ftp_error)?;
        Ok(())
    }
}

fn classify_ftp_error(err: suppaftp::FtpError) -> Error {
    classify_ftp_message(err.to_string())
}

/// 550/553 replies mean the server refused the path or the profile lacks
/// authority; everything else is a generic transfer failure.
fn classify_ftp_message(message: String) -> Error {
    if message.contains("550") || message.contains("553") {
        Error::TransferDenied(message)
    } else {
        Error::Transfer(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(connection_string: &str) -> Config {
        Config {
            connection_string: connection_string.to_string(),
            ftp_host: None,
            ftp_user: None,
            ftp_password: None,
            convert_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn credentials_from_connection_string() {
        let config = config("DRIVER={X};SYSTEM=MYAS400;UID=DEV;PWD=secret");
        let creds = resolve_credentials(&config).unwrap();
        assert_eq!(
            creds,
            FtpCredentials {
                host: "MYAS400".into(),
                user: "DEV".into(),
                password: "secret".into(),
            }
        );
    }

    #[test]
    fn overrides_win_over_connection_string() {
        let mut config = config("SYSTEM=A;UID=B;PWD=C");
        config.ftp_host = Some("other-host".into());
        let creds = resolve_credentials(&config).unwrap();
        assert_eq!(creds.host, "other-host");
        assert_eq!(creds.user, "B");
    }

    #[test]
    fn missing_fields_fail() {
        let config = config("DRIVER={X};SYSTEM=HOST;UID=DEV");
        assert!(matches!(
            resolve_credentials(&config),
            Err(Error::CredentialsUnavailable)
        ));
    }

    #[test]
    fn permission_replies_distinguished() {
        assert!(matches!(
            classify_ftp_message("550 /tmp/x.src: no authority".into()),
            Error::TransferDenied(_)
        ));
        assert!(matches!(
            classify_ftp_message("553 name not allowed".into()),
            Error::TransferDenied(_)
        ));
        assert!(matches!(
            classify_ftp_message("connection reset".into()),
            Error::Transfer(_)
        ));
    }
}
