//! Intrinsic function evaluation
//!
//! Resolves `Ref`, `Fn::GetAtt`, `Fn::Join`, `Fn::Select` and `Fn::Split`
//! against the resources already applied in this provider's state.

use crate::error::{LocalError, Result};
use serde_json::{Map, Value};
use siteflow_cloud::ProviderState;

/// Resolve every intrinsic in `value`, recursively.
pub fn resolve(value: &Value, state: &ProviderState) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut entries = map.iter();
            if let (Some((name, args)), None) = (entries.next(), entries.next()) {
                match name.as_str() {
                    "Ref" => return resolve_ref(args, state),
                    "Fn::GetAtt" => return resolve_get_att(args, state),
                    "Fn::Join" => return resolve_join(args, state),
                    "Fn::Select" => return resolve_select(args, state),
                    "Fn::Split" => return resolve_split(args, state),
                    _ => {}
                }
            }
            resolve_object(map, state)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, state))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Resolve and require a string result.
pub fn resolve_string(value: &Value, state: &ProviderState) -> Result<String> {
    match resolve(value, state)? {
        Value::String(s) => Ok(s),
        other => Err(LocalError::InvalidIntrinsic(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

fn resolve_object(map: &Map<String, Value>, state: &ProviderState) -> Result<Value> {
    let mut resolved = Map::with_capacity(map.len());
    for (key, value) in map {
        resolved.insert(key.clone(), resolve(value, state)?);
    }
    Ok(Value::Object(resolved))
}

fn resolve_ref(args: &Value, state: &ProviderState) -> Result<Value> {
    let id = args
        .as_str()
        .ok_or_else(|| LocalError::InvalidIntrinsic(format!("Ref {}", args)))?;
    let resource = state
        .get(id)
        .ok_or_else(|| LocalError::UnresolvedReference(id.to_string()))?;
    Ok(Value::String(resource.id.clone()))
}

fn resolve_get_att(args: &Value, state: &ProviderState) -> Result<Value> {
    let (id, attribute) = match args.as_array().map(Vec::as_slice) {
        Some([Value::String(id), Value::String(attribute)]) => (id, attribute),
        _ => return Err(LocalError::InvalidIntrinsic(format!("Fn::GetAtt {}", args))),
    };
    let resource = state
        .get(id)
        .ok_or_else(|| LocalError::UnresolvedReference(id.clone()))?;
    resource
        .attributes
        .get(attribute)
        .cloned()
        .ok_or_else(|| LocalError::UnresolvedReference(format!("{}.{}", id, attribute)))
}

fn resolve_join(args: &Value, state: &ProviderState) -> Result<Value> {
    let (separator, parts) = match args.as_array().map(Vec::as_slice) {
        Some([Value::String(separator), Value::Array(parts)]) => (separator, parts),
        _ => return Err(LocalError::InvalidIntrinsic(format!("Fn::Join {}", args))),
    };
    let parts = parts
        .iter()
        .map(|part| resolve_string(part, state))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::String(parts.join(separator)))
}

fn resolve_select(args: &Value, state: &ProviderState) -> Result<Value> {
    let (index, list) = match args.as_array().map(Vec::as_slice) {
        Some([index, list]) => (index, list),
        _ => return Err(LocalError::InvalidIntrinsic(format!("Fn::Select {}", args))),
    };
    let index = index
        .as_u64()
        .or_else(|| index.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| LocalError::InvalidIntrinsic(format!("Fn::Select index {}", index)))?;

    match resolve(list, state)? {
        Value::Array(items) => items.into_iter().nth(index as usize).ok_or_else(|| {
            LocalError::InvalidIntrinsic(format!("Fn::Select index {} out of range", index))
        }),
        other => Err(LocalError::InvalidIntrinsic(format!(
            "Fn::Select expects a list, got {}",
            other
        ))),
    }
}

fn resolve_split(args: &Value, state: &ProviderState) -> Result<Value> {
    let (delimiter, source) = match args.as_array().map(Vec::as_slice) {
        Some([Value::String(delimiter), source]) => (delimiter, source),
        _ => return Err(LocalError::InvalidIntrinsic(format!("Fn::Split {}", args))),
    };
    let source = resolve_string(source, state)?;
    Ok(Value::Array(
        source
            .split(delimiter.as_str())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use siteflow_cloud::ResourceState;

    fn state() -> ProviderState {
        let mut state = ProviderState::new();
        state.add(
            "WebsiteBucket".to_string(),
            ResourceState::new("demo-websitebucket-0a1b2c3d", "AWS::S3::Bucket")
                .with_attribute("Arn", json!("arn:aws:s3:::demo-websitebucket-0a1b2c3d"))
                .with_attribute(
                    "WebsiteURL",
                    json!("http://demo-websitebucket-0a1b2c3d.s3-website-us-east-1.amazonaws.com"),
                ),
        );
        state
    }

    #[test]
    fn test_ref_and_get_att() {
        let state = state();
        assert_eq!(
            resolve(&json!({ "Ref": "WebsiteBucket" }), &state).unwrap(),
            json!("demo-websitebucket-0a1b2c3d")
        );
        assert_eq!(
            resolve(&json!({ "Fn::GetAtt": ["WebsiteBucket", "Arn"] }), &state).unwrap(),
            json!("arn:aws:s3:::demo-websitebucket-0a1b2c3d")
        );
    }

    #[test]
    fn test_origin_domain_expression() {
        let expr = json!({
            "Fn::Select": [2, { "Fn::Split": ["/", { "Fn::GetAtt": ["WebsiteBucket", "WebsiteURL"] }] }]
        });
        assert_eq!(
            resolve(&expr, &state()).unwrap(),
            json!("demo-websitebucket-0a1b2c3d.s3-website-us-east-1.amazonaws.com")
        );
    }

    #[test]
    fn test_nested_join_inside_properties() {
        let props = json!({
            "Statement": [{
                "Resource": { "Fn::Join": ["", [{ "Fn::GetAtt": ["WebsiteBucket", "Arn"] }, "/*"]] },
                "Effect": "Allow",
            }]
        });
        let resolved = resolve(&props, &state()).unwrap();
        assert_eq!(
            resolved["Statement"][0]["Resource"],
            json!("arn:aws:s3:::demo-websitebucket-0a1b2c3d/*")
        );
        assert_eq!(resolved["Statement"][0]["Effect"], json!("Allow"));
    }

    #[test]
    fn test_unresolved_reference() {
        let err = resolve(&json!({ "Ref": "Missing" }), &state()).unwrap_err();
        assert!(matches!(err, LocalError::UnresolvedReference(id) if id == "Missing"));
    }
}
