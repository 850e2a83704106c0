use crate::AbacusError;

/// Parse a raw Redis payload as a counter value.
///
/// Counters are stored as integer strings (`SET key 42`); anything else at a
/// counter key is external interference and is surfaced, never coerced to 0.
pub(crate) fn parse_counter(key: &str, raw: Option<String>) -> Result<Option<i64>, AbacusError> {
    match raw {
        None => Ok(None),
        Some(payload) => match payload.parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(AbacusError::MalformedCounter {
                key: key.to_string(),
                value: payload,
            }),
        },
    }
}
