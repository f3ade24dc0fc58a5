use crate::error::{Error, Result};

/// Libraries whose upper-cased name starts with `Q` belong to the operating
/// system. Mutating operations must never target them; read operations are
/// not gated.
pub fn ensure_library_allowed(library: &str) -> Result<()> {
    let upper = library.trim().to_uppercase();
    if upper.starts_with('Q') {
        return Err(Error::ProtectedLibrary(upper));
    }
    Ok(())
}

/// The access layer cannot parameterize identifiers, so library, file, member,
/// and column names are interpolated into SQL and CL text. Restrict them to
/// alphanumerics and underscore before any interpolation happens.
pub fn validate_identifier(name: &str) -> Result<String> {
    let upper = name.trim().to_uppercase();
    if upper.is_empty()
        || !upper
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(Error::InvalidIdentifier(name.trim().to_string()));
    }
    Ok(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_libraries_rejected() {
        assert!(matches!(
            ensure_library_allowed("QSYS"),
            Err(Error::ProtectedLibrary(_))
        ));
        assert!(matches!(
            ensure_library_allowed("qgpl"),
            Err(Error::ProtectedLibrary(_))
        ));
        assert!(ensure_library_allowed("DEVLIB").is_ok());
    }

    #[test]
    fn identifiers_upper_cased_and_filtered() {
        assert_eq!(validate_identifier("ordmnt").unwrap(), "ORDMNT");
        assert_eq!(validate_identifier(" ORD_100 ").unwrap(), "ORD_100");
        assert!(validate_identifier("BAD;DROP").is_err());
        assert!(validate_identifier("A/B").is_err());
        assert!(validate_identifier("").is_err());
    }
}
