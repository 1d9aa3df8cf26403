use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.len();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Pipeline display names: any printable text, no control characters.
pub fn check_pipeline_name(value: &str) -> Result<(), ApiError> {
    check_length("name", value.trim(), 1, 255)?;
    if value.chars().any(char::is_control) {
        return Err(ApiError::BadRequest(
            "name must not contain control characters".into(),
        ));
    }
    Ok(())
}

/// Secret names end up as vault keys: alphanumerics plus `-`, `_`, `.`.
pub fn check_secret_name(value: &str) -> Result<(), ApiError> {
    check_length("name", value, 1, 255)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ApiError::BadRequest(
            "name must contain only alphanumeric characters, hyphens, underscores, or dots".into(),
        ));
    }
    Ok(())
}

const REPO_SCHEMES: &[&str] = &["http://", "https://", "ssh://", "git://", "file://"];

/// Repository clone URLs: a known scheme or scp-like `user@host:path`.
pub fn check_repo_url(value: &str) -> Result<(), ApiError> {
    check_length("repository url", value, 1, 2048)?;
    if value.starts_with('-') || value.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("invalid repository url".into()));
    }
    let scp_like = value
        .split_once(':')
        .is_some_and(|(host, path)| host.contains('@') && !host.contains('/') && !path.is_empty());
    if !scp_like && !REPO_SCHEMES.iter().any(|s| value.starts_with(s)) {
        return Err(ApiError::BadRequest(format!(
            "repository url must use one of {REPO_SCHEMES:?} or user@host:path"
        )));
    }
    Ok(())
}

pub fn check_branch_name(value: &str) -> Result<(), ApiError> {
    check_length("branch name", value, 1, 255)?;
    if value.contains("..") || value.contains('\0') || value.starts_with('-') {
        return Err(ApiError::BadRequest(
            "branch name must not contain '..' or null bytes, or start with '-'".into(),
        ));
    }
    Ok(())
}
