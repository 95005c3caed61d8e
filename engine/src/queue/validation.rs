//! Input validation and size limits for submissions.

use serde_json::Value;

use super::error::QueueError;

pub const MAX_JOB_TYPE_LENGTH: usize = 128;

/// Validate a job type name.
#[inline]
pub fn validate_job_type(job_type: &str) -> Result<(), QueueError> {
    if job_type.is_empty() {
        return Err(QueueError::InvalidPayload(
            "job type must not be empty".to_string(),
        ));
    }
    if job_type.len() > MAX_JOB_TYPE_LENGTH {
        return Err(QueueError::InvalidPayload(format!(
            "job type too long ({} > {} chars)",
            job_type.len(),
            MAX_JOB_TYPE_LENGTH
        )));
    }
    if !job_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(QueueError::InvalidPayload(format!(
            "job type '{}' may only contain letters, digits, '_', '-', '.' and ':'",
            job_type
        )));
    }
    Ok(())
}

/// Validate a payload: must be a JSON object no larger than `max_bytes`.
#[inline]
pub fn validate_payload(payload: &Value, max_bytes: usize) -> Result<(), QueueError> {
    if !payload.is_object() {
        return Err(QueueError::InvalidPayload(
            "payload must be a JSON object".to_string(),
        ));
    }
    let size = serde_json::to_vec(payload)
        .map_err(|e| QueueError::InvalidPayload(e.to_string()))?
        .len();
    if size > max_bytes {
        return Err(QueueError::InvalidPayload(format!(
            "payload too large ({} > {} bytes)",
            size, max_bytes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_type_rules() {
        assert!(validate_job_type("process_document").is_ok());
        assert!(validate_job_type("batch.v2:ingest-dir").is_ok());
        assert!(validate_job_type("").is_err());
        assert!(validate_job_type("has space").is_err());
        assert!(validate_job_type(&"x".repeat(MAX_JOB_TYPE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_payload_must_be_object() {
        assert!(validate_payload(&json!({"file_path": "a.pdf"}), 1024).is_ok());
        assert!(validate_payload(&json!([1, 2]), 1024).is_err());
        assert!(validate_payload(&json!("a.pdf"), 1024).is_err());
        assert!(validate_payload(&Value::Null, 1024).is_err());
    }

    #[test]
    fn test_payload_size_limit() {
        let big = json!({"blob": "x".repeat(200)});
        assert!(validate_payload(&big, 100).is_err());
        assert!(validate_payload(&big, 1024).is_ok());
    }
}
