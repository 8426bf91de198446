// SPDX-License-Identifier: BUSL-1.1
//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by [`crate::sha256_digest()`].
//! Registry-side digests (status list keys, audit chain links) are therefore
//! always computed over RFC 8785 (JCS) output: sorted keys, compact
//! separators, no floats.
//!
//! ## Invariant
//!
//! The inner buffer is private and `CanonicalBytes::new()` is the sole
//! constructor, so no caller can hash bytes that skipped canonicalization.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization of a float-free JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if serde cannot represent it as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Walk the value tree and fail on the first float.
///
/// Registry records only carry integers (versions, sizes, counters) and
/// strings; a float reaching this point means a caller put one in an audit
/// detail payload.
fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_str(value: &impl Serialize) -> String {
        let cb = CanonicalBytes::new(value).unwrap();
        String::from_utf8(cb.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn keys_are_sorted_and_compact() {
        let data = serde_json::json!({"version": 2, "list_id": "L1", "uri": "https://x"});
        assert_eq!(
            canonical_str(&data),
            r#"{"list_id":"L1","uri":"https://x","version":2}"#
        );
    }

    #[test]
    fn nested_objects_sorted() {
        let data = serde_json::json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1]});
        assert_eq!(
            canonical_str(&data),
            r#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#
        );
    }

    #[test]
    fn plain_string_is_json_quoted() {
        assert_eq!(canonical_str(&"revocation-2024"), "\"revocation-2024\"");
    }

    #[test]
    fn float_rejected_at_any_depth() {
        let data = serde_json::json!({"details": {"ratios": [1, 2.5]}});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 2.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn large_unsigned_integers_accepted() {
        let data = serde_json::json!({"size": u64::MAX});
        assert!(CanonicalBytes::new(&data).is_ok());
    }

    #[test]
    fn empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_value_no_floats() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9_ ]{0,40}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn float_free_values_canonicalize(value in json_value_no_floats()) {
            prop_assert!(CanonicalBytes::new(&value).is_ok());
        }

        #[test]
        fn canonicalization_is_deterministic(value in json_value_no_floats()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn output_parses_back_to_the_same_value(value in json_value_no_floats()) {
            let cb = CanonicalBytes::new(&value).unwrap();
            let parsed: Value = serde_json::from_slice(cb.as_bytes()).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
