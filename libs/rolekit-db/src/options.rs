//! DSN helpers.

/// Mask the password of a DSN so it can be logged.
///
/// DSNs without credentials are returned unchanged; DSNs that carry an `@` but
/// cannot be parsed as URLs are replaced entirely.
#[must_use]
pub fn redact_credentials_in_dsn(dsn: Option<&str>) -> String {
    match dsn {
        Some(dsn) if dsn.contains('@') => {
            match url::Url::parse(dsn.trim()) {
                Ok(mut parsed) if !parsed.cannot_be_a_base() => {
                    if parsed.password().is_some() {
                        let _ = parsed.set_password(Some("***"));
                    }
                    parsed.to_string()
                }
                _ => "***".to_owned(),
            }
        }
        Some(dsn) => dsn.to_owned(),
        None => "none".to_owned(),
    }
}
