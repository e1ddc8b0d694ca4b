//! Turning raw model output into a [`FinancialRecord`].

use serde::{Deserialize, Serialize};

use crate::prompt::EXPECTED_FIELDS;
use crate::{FallbackRecord, FinancialRecord};

pub const INVALID_JSON_ERROR: &str = "Invalid JSON from model";
pub const SCHEMA_MISMATCH_ERROR: &str = "Model output does not match expected schema";

/// Whether parsed model output must carry the expected fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMode {
    /// Every expected field must be present with a string value.
    #[default]
    Strict,
    /// Any valid JSON is accepted as-is.
    Lenient,
}

/// Parse the generated string as JSON.
///
/// Valid JSON of any shape is returned unchanged. Anything else becomes a
/// fallback record carrying the original string.
///
/// An object with exactly the string keys `error` and `raw_response` is
/// classified as a fallback, matching how the output file reads it back.
pub fn parse_response(raw: &str) -> FinancialRecord {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match serde_json::from_value::<FallbackRecord>(value.clone()) {
            Ok(fallback) => FinancialRecord::Fallback(fallback),
            Err(_) => FinancialRecord::Parsed(value),
        },
        Err(e) => {
            tracing::debug!(error = %e, len = raw.len(), "model output is not valid JSON");
            FinancialRecord::fallback(INVALID_JSON_ERROR, raw)
        }
    }
}

/// Names of expected fields that are absent or not strings.
pub fn missing_fields(value: &serde_json::Value) -> Vec<&'static str> {
    let Some(obj) = value.as_object() else {
        return EXPECTED_FIELDS.to_vec();
    };
    EXPECTED_FIELDS
        .iter()
        .copied()
        .filter(|field| !matches!(obj.get(*field), Some(serde_json::Value::String(_))))
        .collect()
}

/// Route parsed output that lacks the expected fields to a fallback record.
///
/// Extra keys are tolerated. Fallback records pass through untouched.
pub fn validate_schema(record: FinancialRecord, raw: &str) -> FinancialRecord {
    match record {
        FinancialRecord::Parsed(value) => {
            let missing = missing_fields(&value);
            if missing.is_empty() {
                FinancialRecord::Parsed(value)
            } else {
                tracing::debug!(?missing, "model output failed schema check");
                FinancialRecord::fallback(SCHEMA_MISMATCH_ERROR, raw)
            }
        }
        fallback => fallback,
    }
}

/// Parse and, in strict mode, schema-check one model response.
pub fn interpret_response(raw: &str, mode: SchemaMode) -> FinancialRecord {
    let record = parse_response(raw);
    match mode {
        SchemaMode::Strict => validate_schema(record, raw),
        SchemaMode::Lenient => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FULL: &str = r#"{"Company Name": "Acme", "Report Date": "2025-01-01", "Profit Before Tax": "100", "Revenue": "500", "Net Profit": "80"}"#;

    #[test]
    fn not_json_yields_exact_fallback() {
        let record = parse_response("not json");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"error": "Invalid JSON from model", "raw_response": "not json"})
        );
    }

    #[test]
    fn valid_json_returned_unchanged() {
        let record = parse_response(FULL);
        let expected: serde_json::Value = serde_json::from_str(FULL).unwrap();
        assert_eq!(record, FinancialRecord::Parsed(expected));
    }

    #[test]
    fn missing_key_still_passes_parse() {
        let raw = r#"{"Company Name": "Acme", "Revenue": "500"}"#;
        let record = parse_response(raw);
        assert_eq!(
            record,
            FinancialRecord::Parsed(json!({"Company Name": "Acme", "Revenue": "500"}))
        );
    }

    #[test]
    fn parse_is_idempotent() {
        for raw in [FULL, "not json", "", "[1, 2]", "Company Name: Acme"] {
            assert_eq!(parse_response(raw), parse_response(raw));
        }
    }

    #[test]
    fn parse_preserves_key_order() {
        let raw = r#"{"Net Profit": "1", "Company Name": "A"}"#;
        let FinancialRecord::Parsed(value) = parse_response(raw) else {
            panic!("expected parsed record");
        };
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Net Profit", "Company Name"]);
    }

    #[test]
    fn error_shaped_object_classified_as_fallback() {
        let raw = r#"{"error": "n/a", "raw_response": "model said so"}"#;
        assert_eq!(
            parse_response(raw),
            FinancialRecord::fallback("n/a", "model said so")
        );
        // A third key, or a non-string value, keeps it a parsed record.
        assert!(!parse_response(r#"{"error": "n/a", "raw_response": "x", "Revenue": "5"}"#).is_fallback());
        assert!(!parse_response(r#"{"error": 1, "raw_response": "x"}"#).is_fallback());
    }

    #[test]
    fn empty_output_is_invalid_json() {
        assert!(parse_response("").is_fallback());
    }

    #[test]
    fn strict_accepts_full_record_with_extra_keys() {
        let raw = r#"{"Company Name": "Acme", "Report Date": "2025-01-01", "Profit Before Tax": "100", "Revenue": "500", "Net Profit": "80", "Currency": "INR"}"#;
        let record = interpret_response(raw, SchemaMode::Strict);
        assert!(!record.is_fallback());
    }

    #[test]
    fn strict_rejects_missing_key() {
        let raw = r#"{"Company Name": "Acme"}"#;
        let record = interpret_response(raw, SchemaMode::Strict);
        assert_eq!(record, FinancialRecord::fallback(SCHEMA_MISMATCH_ERROR, raw));
    }

    #[test]
    fn strict_rejects_non_string_values() {
        let raw = r#"{"Company Name": "Acme", "Report Date": "2025", "Profit Before Tax": 100, "Revenue": "500", "Net Profit": "80"}"#;
        let FinancialRecord::Parsed(value) = parse_response(raw) else {
            panic!("expected parsed record");
        };
        assert_eq!(missing_fields(&value), vec!["Profit Before Tax"]);
        assert!(interpret_response(raw, SchemaMode::Strict).is_fallback());
    }

    #[test]
    fn strict_rejects_non_object() {
        let record = interpret_response("[\"Acme\"]", SchemaMode::Strict);
        assert_eq!(record.error(), Some(SCHEMA_MISMATCH_ERROR));
    }

    #[test]
    fn strict_keeps_invalid_json_message() {
        let record = interpret_response("nope", SchemaMode::Strict);
        assert_eq!(record.error(), Some(INVALID_JSON_ERROR));
    }

    #[test]
    fn lenient_passes_partial_record() {
        let raw = r#"{"Revenue": "500"}"#;
        assert!(!interpret_response(raw, SchemaMode::Lenient).is_fallback());
    }
}
