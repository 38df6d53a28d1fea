//! Request emulation for the distribution and the bucket website endpoint
//!
//! Mirrors the request path a browser takes: viewer protocol check, default
//! root object, origin fetch from the website endpoint, then custom error
//! responses.

use crate::error::Result;
use crate::store::ObjectStore;
use serde::Deserialize;
use siteflow_cloud::ProviderState;
use siteflow_cloud::types::{BUCKET_POLICY_TYPE, BUCKET_TYPE, DISTRIBUTION_TYPE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 301,
            location: Some(location),
            body: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorMapping {
    error_code: u16,
    response_code: u16,
    response_page_path: String,
}

struct Url<'a> {
    https: bool,
    host: &'a str,
    path: &'a str,
}

fn parse_url(url: &str) -> Option<Url<'_>> {
    let (https, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else {
        (false, url.strip_prefix("http://")?)
    };
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    Some(Url { https, host, path })
}

pub async fn fetch(state: &ProviderState, store: &ObjectStore, url: &str) -> Result<Response> {
    let Some(url) = parse_url(url) else {
        return Ok(Response::new(400, "BadRequest"));
    };

    let distribution = state.iter().map(|(_, r)| r).find(|r| {
        r.resource_type == DISTRIBUTION_TYPE
            && r.get_attribute::<String>("DomainName").as_deref() == Some(url.host)
    });
    if let Some(distribution) = distribution {
        if !url.https
            && distribution.get_attribute::<String>("ViewerProtocolPolicy").as_deref()
                == Some("redirect-to-https")
        {
            return Ok(Response::redirect(format!("https://{}{}", url.host, url.path)));
        }

        let origin = distribution
            .get_attribute::<String>("OriginDomain")
            .unwrap_or_default();
        let path = match (url.path, distribution.get_attribute::<String>("DefaultRootObject")) {
            ("/", Some(root)) if !root.is_empty() => format!("/{}", root),
            (path, _) => path.to_string(),
        };

        let response = website_get(state, store, &origin, &path).await?;
        let mappings: Vec<ErrorMapping> = distribution
            .get_attribute("CustomErrorResponses")
            .unwrap_or_default();
        if let Some(mapping) = mappings.iter().find(|m| m.error_code == response.status) {
            let page = website_get(state, store, &origin, &mapping.response_page_path).await?;
            return Ok(Response::new(mapping.response_code, page.body));
        }
        return Ok(response);
    }

    website_get(state, store, url.host, url.path).await
}

/// S3 website endpoint semantics: index document for directories, error
/// document with a 404 for missing keys, 403 without a public-read policy.
async fn website_get(
    state: &ProviderState,
    store: &ObjectStore,
    host: &str,
    path: &str,
) -> Result<Response> {
    let bucket = state.iter().map(|(_, r)| r).find(|r| {
        r.resource_type == BUCKET_TYPE
            && r.get_attribute::<String>("WebsiteHost").as_deref() == Some(host)
    });
    let Some(bucket) = bucket else {
        return Ok(Response::new(404, "NoSuchBucket"));
    };
    if !store.bucket_exists(&bucket.id) {
        return Ok(Response::new(404, "NoSuchBucket"));
    }

    let public = state.iter().map(|(_, r)| r).any(|r| {
        r.resource_type == BUCKET_POLICY_TYPE
            && r.get_attribute::<String>("Bucket").as_deref() == Some(bucket.id.as_str())
            && r.get_attribute::<bool>("PublicRead").unwrap_or(false)
    });
    if !public {
        return Ok(Response::new(403, "AccessDenied"));
    }

    let index = bucket
        .get_attribute::<String>("IndexDocument")
        .unwrap_or_default();
    let mut key = path.trim_start_matches('/').to_string();
    if key.is_empty() || key.ends_with('/') {
        key.push_str(&index);
    }

    if let Some(body) = store.get_object(&bucket.id, &key).await? {
        return Ok(Response::new(200, body));
    }

    if let Some(error_document) = bucket.get_attribute::<String>("ErrorDocument") {
        if let Some(body) = store.get_object(&bucket.id, &error_document).await? {
            return Ok(Response::new(404, body));
        }
    }
    Ok(Response::new(404, "NoSuchKey"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let url = parse_url("https://d123.cloudfront.net/assets/app.js?v=1").unwrap();
        assert!(url.https);
        assert_eq!(url.host, "d123.cloudfront.net");
        assert_eq!(url.path, "/assets/app.js");

        let url = parse_url("http://d123.cloudfront.net").unwrap();
        assert!(!url.https);
        assert_eq!(url.path, "/");

        assert!(parse_url("ftp://d123.cloudfront.net").is_none());
    }
}
