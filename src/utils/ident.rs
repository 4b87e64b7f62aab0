// Trace identity: generation, validation, and request correlation

/// HTTP header the monitored request must carry so the gateway tags its
/// notifications with the same trace id
pub const TRACE_HEADER: &str = "X-Trace-ID";

/// Generate a fresh trace id: 128 random bits, lowercase hex
pub fn generate_trace_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Validate a caller-supplied trace id
///
/// The id becomes a URL path segment and a header value, so only
/// `[A-Za-z0-9_-]` is accepted.
pub fn validate_trace_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("Trace ID cannot be empty".to_string());
    }
    if id.len() > 128 {
        return Err(format!("Trace ID is too long ({} characters, max 128)", id.len()));
    }
    if id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(format!(
            "Invalid trace ID: '{}'. Trace IDs can only contain letters, numbers, hyphens, and underscores.",
            id
        ))
    }
}

/// Header line to attach to the monitored request
pub fn correlation_header(trace_id: &str) -> String {
    format!("{}: {}", TRACE_HEADER, trace_id)
}
