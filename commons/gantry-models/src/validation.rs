#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("App code cannot be empty")]
    EmptyAppCode,

    #[error("Invalid app code: {0}")]
    InvalidAppCode(String),

    #[error("Tenant ID must be empty in global tenant mode, got {0}")]
    TenantIdNotAllowed(String),

    #[error("Tenant ID is required in single tenant mode")]
    TenantIdRequired,

    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("Invalid path prefix: {0}")]
    InvalidPathPrefix(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Invalid build signature: {0}")]
    InvalidSignature(String),

    #[error("Validator error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

/// App codes end up in hostnames and resource names, so they follow DNS
/// label rules: lowercase alphanumeric plus hyphen, starting with a letter.
pub fn validate_app_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::EmptyAppCode);
    }
    if code.len() > 63
        || !code.starts_with(|c: char| c.is_ascii_lowercase())
        || !code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || code.ends_with('-')
    {
        return Err(ValidationError::InvalidAppCode(code.to_string()));
    }
    Ok(())
}

pub fn validate_hostname(host: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidHostname(host.to_string());
    if host.is_empty() || host.len() > 253 || !host.contains('.') {
        return Err(invalid());
    }
    for label in host.split('.') {
        if label.is_empty()
            || label.len() > 63
            || label.starts_with('-')
            || label.ends_with('-')
            || !label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Normalises a user-supplied path prefix: always a leading slash, never a
/// trailing slash except for the root path itself.
pub fn normalize_path_prefix(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.trim_matches('/').is_empty() {
        return Ok("/".to_string());
    }
    if trimmed.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidPathPrefix(raw.to_string()));
    }
    let mut path = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        path.push('/');
    }
    path.push_str(trimmed.trim_end_matches('/'));
    if path.split('/').skip(1).any(|segment| segment.is_empty()) {
        return Err(ValidationError::InvalidPathPrefix(raw.to_string()));
    }
    Ok(path)
}

/// A build signature is the SHA-256 of the source archive, lowercase hex.
pub fn validate_signature(signature: &str) -> Result<(), ValidationError> {
    if signature.len() != 64
        || !signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(ValidationError::InvalidSignature(signature.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_code_rules() {
        assert!(validate_app_code("demo-app1").is_ok());
        assert!(validate_app_code("").is_err());
        assert!(validate_app_code("1demo").is_err());
        assert!(validate_app_code("Demo").is_err());
        assert!(validate_app_code("demo-").is_err());
    }

    #[test]
    fn hostname_rules() {
        assert!(validate_hostname("api.example.com").is_ok());
        assert!(validate_hostname("example").is_err());
        assert!(validate_hostname("-bad.example.com").is_err());
        assert!(validate_hostname("a..example.com").is_err());
        assert!(validate_hostname("UPPER.example.com").is_err());
    }

    #[test]
    fn path_prefix_normalisation() {
        assert_eq!(normalize_path_prefix("/").unwrap(), "/");
        assert_eq!(normalize_path_prefix("").unwrap(), "/");
        assert_eq!(normalize_path_prefix("foo").unwrap(), "/foo");
        assert_eq!(normalize_path_prefix("/foo/bar/").unwrap(), "/foo/bar");
        assert!(normalize_path_prefix("/foo//bar").is_err());
        assert!(normalize_path_prefix("/foo bar").is_err());
    }

    #[test]
    fn signature_shape() {
        assert!(validate_signature(&"ab12".repeat(16)).is_ok());
        assert!(validate_signature("short").is_err());
        assert!(validate_signature(&"AB12".repeat(16)).is_err());
    }
}
