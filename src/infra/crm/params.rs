//! Form encoding of nested CRM method parameters.
//!
//! The CRM REST endpoints read nested parameters in bracket notation
//! (`filter[id]=42`, `select[0]=*`). Null values are omitted and booleans are
//! sent as `1`/`0`.

use serde_json::Value;

/// Flatten a JSON object into form pairs using bracket notation
pub fn encode_params(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            flatten_into(key.clone(), value, &mut pairs);
        }
    }
    pairs
}

fn flatten_into(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push((key, if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => pairs.push((key, n.to_string())),
        Value::String(s) => pairs.push((key, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(format!("{}[{}]", key, index), item, pairs);
            }
        }
        Value::Object(map) => {
            for (sub_key, item) in map {
                flatten_into(format!("{}[{}]", key, sub_key), item, pairs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_nested_filter_and_select() {
        let pairs = encode_params(&json!({
            "filter": {
                "id": "42",
                "paid": "Y",
                "!datePaid": false,
                ">=datePaid": "2024-05-01T09:30:00+00:00"
            },
            "select": ["*"]
        }));

        assert_eq!(lookup(&pairs, "filter[id]"), Some("42"));
        assert_eq!(lookup(&pairs, "filter[paid]"), Some("Y"));
        assert_eq!(lookup(&pairs, "filter[!datePaid]"), Some("0"));
        assert_eq!(
            lookup(&pairs, "filter[>=datePaid]"),
            Some("2024-05-01T09:30:00+00:00")
        );
        assert_eq!(lookup(&pairs, "select[0]"), Some("*"));
        assert_eq!(pairs.len(), 5);
    }

    #[test]
    fn test_deep_nesting_and_numbers() {
        let pairs = encode_params(&json!({
            "entityTypeId": 1128,
            "fields": {"contactIds": [7, 8], "taxIncluded": true}
        }));

        assert_eq!(lookup(&pairs, "entityTypeId"), Some("1128"));
        assert_eq!(lookup(&pairs, "fields[contactIds][0]"), Some("7"));
        assert_eq!(lookup(&pairs, "fields[contactIds][1]"), Some("8"));
        assert_eq!(lookup(&pairs, "fields[taxIncluded]"), Some("1"));
    }

    #[test]
    fn test_null_values_are_omitted() {
        let pairs = encode_params(&json!({"id": 5, "fields": {"contactIds": null}}));
        assert_eq!(pairs, vec![("id".to_string(), "5".to_string())]);
    }

    #[test]
    fn test_non_object_yields_nothing() {
        assert!(encode_params(&json!(["a"])).is_empty());
        assert!(encode_params(&Value::Null).is_empty());
    }
}
