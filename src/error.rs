use thiserror::Error;

/// Failure taxonomy for remote operations. Every public tool converts these
/// into a structured error payload at the dispatch boundary; nothing reaches
/// the transport loop unhandled.
#[derive(Debug, Error)]
pub enum Error {
    #[error("System libraries (Q*) are protected: {0}")]
    ProtectedLibrary(String),

    #[error("{0}")]
    NotFound(String),

    #[error(
        "Cannot detect compile command for source type: {0}. Please specify compile_type explicitly."
    )]
    UnknownSourceType(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error(
        "No iconv executable found; cannot convert to CCSID {0}. \
         Install iconv on this host, or upload to a UTF-8 (CCSID 1208) source file \
         created with create_source_file."
    )]
    EncodingToolUnavailable(u32),

    #[error("Encoding conversion failed: {0}")]
    Conversion(String),

    #[error(
        "FTP credentials unavailable: set AS400_FTP_HOST/AS400_FTP_USER/AS400_FTP_PASSWORD \
         or provide SYSTEM/UID/PWD in the connection string"
    )]
    CredentialsUnavailable,

    #[error("FTP permission denied: {0}")]
    TransferDenied(String),

    #[error("FTP transfer failed: {0}")]
    Transfer(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
