//! Request validation
//!
//! Turns a raw HTTP body into a [`CalculationRequest`]. Checks run in a fixed
//! order: content type, body presence, then decoding.

use crate::error::ValidationError;
use calc_protocol::{CalculationRequest, Mode};
use serde_json::Value;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Validate a submission
///
/// A JSON string body is used as the expression verbatim. Any other JSON value
/// is coerced to its JSON text (`5` becomes `"5"`).
pub fn validate(
    raw_body: &[u8],
    content_type: Option<&str>,
    float_requested: bool,
) -> Result<CalculationRequest, ValidationError> {
    check_content_type(content_type)?;

    if raw_body.is_empty() {
        return Err(ValidationError::EmptyBody);
    }

    let value: Value = serde_json::from_slice(raw_body)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

    let expression = match value {
        Value::String(s) => s,
        other => other.to_string(),
    };

    if expression.is_empty() {
        return Err(ValidationError::MalformedPayload("expression is empty".to_string()));
    }

    Ok(CalculationRequest::new(expression, Mode::from_float_flag(float_requested)))
}

fn check_content_type(content_type: Option<&str>) -> Result<(), ValidationError> {
    let Some(header) = content_type else {
        return Err(ValidationError::UnsupportedContentType("missing".to_string()));
    };

    // Parameters such as charset are ignored
    let media_type = header.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case(JSON_MEDIA_TYPE) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedContentType(header.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Option<&str> = Some("application/json");

    #[test]
    fn test_string_body() {
        let request = validate(br#""3 + 2""#, JSON, false).unwrap();
        assert_eq!(request, CalculationRequest::new("3 + 2", Mode::Integer));
    }

    #[test]
    fn test_float_flag_selects_mode() {
        assert_eq!(validate(br#""3 / 2""#, JSON, true).unwrap().mode, Mode::Float);
        assert_eq!(validate(br#""3 / 2""#, JSON, false).unwrap().mode, Mode::Integer);
    }

    #[test]
    fn test_non_string_values_coerced() {
        assert_eq!(validate(b"5", JSON, false).unwrap().expression, "5");
        assert_eq!(validate(b"true", JSON, false).unwrap().expression, "true");
        assert_eq!(validate(b"[1,2]", JSON, false).unwrap().expression, "[1,2]");
    }

    #[test]
    fn test_content_type_variants() {
        assert!(validate(b"\"1\"", Some("application/json; charset=utf-8"), false).is_ok());
        assert!(validate(b"\"1\"", Some("Application/JSON"), false).is_ok());

        assert!(matches!(
            validate(b"\"1\"", Some("text/plain"), false),
            Err(ValidationError::UnsupportedContentType(_))
        ));
        assert!(matches!(
            validate(b"\"1\"", None, false),
            Err(ValidationError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(validate(b"", JSON, false), Err(ValidationError::EmptyBody));
    }

    #[test]
    fn test_content_type_checked_before_body() {
        assert!(matches!(
            validate(b"", Some("text/plain"), false),
            Err(ValidationError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            validate(b"3 + 2", JSON, false),
            Err(ValidationError::MalformedPayload(_))
        ));
        assert!(matches!(validate(b"\"\"", JSON, false), Err(ValidationError::MalformedPayload(_))));
    }
}
