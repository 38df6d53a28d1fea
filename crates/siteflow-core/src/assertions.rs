//! テンプレートアサーション
//!
//! 合成結果に対するスモークテスト用の述語。
//! `has_resource_properties` は期待値をオブジェクトの部分集合として比較する。

use crate::synth::Template;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssertionError {
    #[error("{resource_type} に一致するリソースがありません（候補 {candidates} 件）: {expected}")]
    NoMatchingResource {
        resource_type: String,
        candidates: usize,
        expected: String,
    },

    #[error("{resource_type} は {expected} 件の想定ですが {actual} 件でした")]
    CountMismatch {
        resource_type: String,
        expected: usize,
        actual: usize,
    },

    #[error("出力 {0} がありません")]
    MissingOutput(String),
}

impl Template {
    /// 指定した型で、期待するプロパティを含むリソースが存在するか
    pub fn has_resource_properties(
        &self,
        resource_type: &str,
        expected: &Value,
    ) -> Result<(), AssertionError> {
        let candidates = self.find_resources(resource_type);
        if candidates
            .iter()
            .any(|(_, r)| object_like(&r.properties, expected))
        {
            return Ok(());
        }

        Err(AssertionError::NoMatchingResource {
            resource_type: resource_type.to_string(),
            candidates: candidates.len(),
            expected: expected.to_string(),
        })
    }

    /// 指定した型のリソースがちょうど `count` 件あるか
    pub fn resource_count_is(&self, resource_type: &str, count: usize) -> Result<(), AssertionError> {
        let actual = self.find_resources(resource_type).len();
        if actual == count {
            Ok(())
        } else {
            Err(AssertionError::CountMismatch {
                resource_type: resource_type.to_string(),
                expected: count,
                actual,
            })
        }
    }

    /// 出力が定義されているか
    pub fn has_output(&self, name: &str) -> Result<(), AssertionError> {
        if self.outputs.contains_key(name) {
            Ok(())
        } else {
            Err(AssertionError::MissingOutput(name.to_string()))
        }
    }
}

/// `expected` が `actual` の部分構造になっているか
///
/// オブジェクトはキーの部分集合、配列は同じ長さで要素ごとに比較する。
pub fn object_like(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|candidate| object_like(candidate, value))
        }),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(expected)
                    .all(|(candidate, value)| object_like(candidate, value))
        }
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_like_subset() {
        let actual = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [{"f": 1, "g": 2}]});
        assert!(object_like(&actual, &json!({"b": {"c": 2}})));
        assert!(object_like(&actual, &json!({"e": [{"g": 2}]})));
        assert!(!object_like(&actual, &json!({"b": {"c": 3}})));
        assert!(!object_like(&actual, &json!({"x": 1})));
        assert!(!object_like(&actual, &json!({"e": []})));
    }

    #[test]
    fn test_scalars_compare_exactly() {
        assert!(object_like(&json!(200), &json!(200)));
        assert!(!object_like(&json!("200"), &json!(200)));
    }
}
