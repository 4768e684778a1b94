//! Input validation at the RPC boundary.
//!
//! Service ids become path components (`svc/<id>`) and event names
//! (`stats:<id>`); sources are joined under the root when cleaning up.

/// Validate a service id: 1-64 chars, `[a-zA-Z0-9._-]` only, and not `.` or `..`.
pub fn validate_service_id(id: &str) -> Result<(), String> {
    if id.is_empty() || id.len() > 64 {
        return Err(format!(
            "Service id must be 1-64 characters, got {}",
            id.len()
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(
            "Service id may only contain alphanumeric characters, dots, hyphens, and underscores"
                .to_string(),
        );
    }
    if id == "." || id == ".." {
        return Err(format!("Service id must not be '{}'", id));
    }
    Ok(())
}

/// Validate a source locator such as `github.com/acme/echo`.
///
/// Must be relative, max 512 chars, and every `/`-separated component must be
/// a real name: no empty, `.` or `..` components.
pub fn validate_source(source: &str) -> Result<(), String> {
    if source.is_empty() || source.len() > 512 {
        return Err(format!(
            "Source must be 1-512 characters, got {}",
            source.len()
        ));
    }
    if source.starts_with('/') {
        return Err("Source must not be an absolute path".to_string());
    }
    if source
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err("Source must not contain empty, '.' or '..' components".to_string());
    }
    if !source
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/.-_~@:+".contains(c))
    {
        return Err("Source contains invalid characters".to_string());
    }
    Ok(())
}
