use super::translate::ServerError;

/// `None` for missing or whitespace-only form values.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Blank means "use the configured default"; anything else must be a finite
/// number. The value is not clamped.
pub(crate) fn parse_threshold(value: Option<&str>) -> Result<Option<f32>, ServerError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match value.parse::<f32>() {
        Ok(threshold) if threshold.is_finite() => Ok(Some(threshold)),
        _ => Err(ServerError::bad_request(format!(
            "bbox_conf_threshold must be a number, got {:?}",
            value
        ))),
    }
}

/// Compares origins ignoring a trailing slash on either side.
pub(crate) fn origin_matches(allowed: &str, origin: &str) -> bool {
    allowed.trim_end_matches('/') == origin.trim_end_matches('/')
}
