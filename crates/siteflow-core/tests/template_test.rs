use serde_json::json;
use siteflow_core::{
    AssertionError, BUCKET_POLICY_TYPE, BUCKET_TYPE, BUCKET_URL_OUTPUT, CLOUDFRONT_URL_OUTPUT,
    DISTRIBUTION_TYPE, Template, load_site,
};
use std::fs;
use tempfile::TempDir;

const SITE_KDL: &str = r#"
site "electron-orbital-viewer" {
    bucket "ElectronOrbitalViewerBucket" {
        index-document "index.html"
        error-document "index.html"
        removal-policy "destroy"
        auto-delete-objects #true
    }
    distribution "ElectronOrbitalViewerDistribution" {
        error-response 404 status=200 page="/index.html"
    }
    deploy "DeployElectronOrbitalViewer" {
        source "dist"
    }
}
"#;

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("dist/assets")).unwrap();
    fs::write(dir.path().join("dist/index.html"), "<html></html>").unwrap();
    fs::write(dir.path().join("dist/assets/app.js"), "console.log(1)").unwrap();
    fs::write(dir.path().join("site.kdl"), SITE_KDL).unwrap();
    dir
}

fn synth(dir: &TempDir) -> Template {
    load_site(dir.path().join("site.kdl"))
        .unwrap()
        .synthesize()
        .unwrap()
}

/// バケットのインデックス・エラードキュメントが index.html
#[test]
fn test_bucket_documents_are_index_html() {
    let dir = project();
    let template = synth(&dir);

    template
        .has_resource_properties(
            BUCKET_TYPE,
            &json!({
                "WebsiteConfiguration": {
                    "IndexDocument": "index.html",
                    "ErrorDocument": "index.html",
                }
            }),
        )
        .unwrap();
}

/// ディストリビューションはちょうど1つ
#[test]
fn test_exactly_one_distribution() {
    let dir = project();
    let template = synth(&dir);

    template.resource_count_is(DISTRIBUTION_TYPE, 1).unwrap();
    template.resource_count_is(BUCKET_TYPE, 1).unwrap();
}

#[test]
fn test_viewer_protocol_and_error_mapping() {
    let dir = project();
    let template = synth(&dir);

    template
        .has_resource_properties(
            DISTRIBUTION_TYPE,
            &json!({
                "DistributionConfig": {
                    "DefaultRootObject": "index.html",
                    "DefaultCacheBehavior": {
                        "ViewerProtocolPolicy": "redirect-to-https",
                        "CachePolicyId": "658327ea-f89d-4fab-a63d-7e88639e58f6",
                    },
                    "CustomErrorResponses": [{
                        "ErrorCode": 404,
                        "ResponseCode": 200,
                        "ResponsePagePath": "/index.html",
                    }],
                }
            }),
        )
        .unwrap();
}

#[test]
fn test_public_read_policy() {
    let dir = project();
    let template = synth(&dir);

    template
        .has_resource_properties(
            BUCKET_POLICY_TYPE,
            &json!({
                "Bucket": { "Ref": "ElectronOrbitalViewerBucket" },
                "PolicyDocument": {
                    "Statement": [{ "Action": "s3:GetObject", "Effect": "Allow" }],
                }
            }),
        )
        .unwrap();
}

#[test]
fn test_outputs_and_content_sync() {
    let dir = project();
    let template = synth(&dir);

    template.has_output(CLOUDFRONT_URL_OUTPUT).unwrap();
    template.has_output(BUCKET_URL_OUTPUT).unwrap();

    let actions = template.actions();
    let sync = &actions["DeployElectronOrbitalViewer"];
    assert_eq!(sync.properties["DistributionPaths"], json!(["/*"]));
    assert_eq!(
        sync.properties["Distribution"],
        json!({ "Ref": "ElectronOrbitalViewerDistribution" })
    );
    assert!(sync.properties["Manifest"].get("assets/app.js").is_some());
}

#[test]
fn test_failed_assertions_report_details() {
    let dir = project();
    let template = synth(&dir);

    let err = template
        .has_resource_properties(
            BUCKET_TYPE,
            &json!({ "WebsiteConfiguration": { "IndexDocument": "home.html" } }),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AssertionError::NoMatchingResource { candidates: 1, .. }
    ));

    assert_eq!(
        template.resource_count_is(DISTRIBUTION_TYPE, 2),
        Err(AssertionError::CountMismatch {
            resource_type: DISTRIBUTION_TYPE.to_string(),
            expected: 2,
            actual: 1,
        })
    );
}

#[test]
fn test_missing_asset_dir_fails_before_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("site.kdl"), SITE_KDL).unwrap();

    let loaded = load_site(dir.path().join("site.kdl")).unwrap();
    let err = loaded.synthesize().unwrap_err();
    assert!(err.to_string().contains("npm run build"));
}
