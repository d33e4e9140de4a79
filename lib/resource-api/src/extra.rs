//! Open-ended key/value payloads
//!
//! Values are the closed JSON sum type (string, number, bool, null, list,
//! map), so encoding is total. An absent payload always means "no extras".

pub use serde_json::Value;

/// Untyped options map carried alongside structured calls
pub type Extra = serde_json::Map<String, Value>;

/// Decode an optional wire payload, treating absence as an empty map
pub fn from_wire(extra: Option<Extra>) -> Extra {
    extra.unwrap_or_default()
}

/// Encode an options map for the wire, leaving empty maps out
pub fn to_wire(extra: Extra) -> Option<Extra> {
    if extra.is_empty() {
        None
    } else {
        Some(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_decodes_to_empty() {
        assert!(from_wire(None).is_empty());
    }

    #[test]
    fn test_empty_is_left_out() {
        assert_eq!(to_wire(Extra::new()), None);
    }

    #[test]
    fn test_nested_values_survive() {
        let mut extra = Extra::new();
        extra.insert("speed".into(), json!(1.5));
        extra.insert("tags".into(), json!(["a", "b"]));
        extra.insert("nested".into(), json!({"on": true, "none": null}));
        let wire = to_wire(extra.clone());
        assert_eq!(from_wire(wire), extra);
    }
}
