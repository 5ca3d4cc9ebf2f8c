use sqlx::PgPool;

const MAX_JSON_LOG_LEN: usize = 200;

/// Parse a JSON column into the target type, logging a warning on failure.
///
/// SQL NULL is a valid empty state and returns the default without logging;
/// warnings fire only for actual corruption or type mismatches.
pub fn parse_json_with_fallback<T: serde::de::DeserializeOwned + Default>(
    json: &serde_json::Value,
    field_name: &str,
    entity_type: &str,
    entity_id: &str,
) -> T {
    if json.is_null() {
        return T::default();
    }

    serde_json::from_value(json.clone()).unwrap_or_else(|err| {
        let raw_str = json.to_string();
        let truncated = if raw_str.len() > MAX_JSON_LOG_LEN {
            format!("{}...", &raw_str[..MAX_JSON_LOG_LEN])
        } else {
            raw_str
        };

        tracing::warn!(
            field = field_name,
            entity_type = entity_type,
            entity_id = entity_id,
            raw_json = %truncated,
            error = %err,
            "Failed to parse JSON field, using default value"
        );
        T::default()
    })
}

pub mod billing_method;
pub mod coupon;
pub mod goods;
pub mod renewal;
pub mod subscription;
pub mod transaction;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_valid_array() {
        let json = serde_json::json!(["6e5a8f58-95a6-4af7-9f3e-2f2f2a0c3a01"]);
        let result: Vec<uuid::Uuid> = parse_json_with_fallback(&json, "test", "entity", "123");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn parse_json_null_returns_default() {
        let json = serde_json::Value::Null;
        let result: Vec<uuid::Uuid> = parse_json_with_fallback(&json, "test", "entity", "123");
        assert!(result.is_empty());
    }

    #[test]
    fn parse_json_corrupt_returns_default() {
        let json = serde_json::json!({"not": "an array"});
        let result: Vec<uuid::Uuid> = parse_json_with_fallback(&json, "test", "entity", "123");
        assert!(result.is_empty());
    }
}
