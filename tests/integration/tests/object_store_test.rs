//! Object-store end-to-end tests.
//!
//! These run against a live S3-compatible endpoint (MinIO, LocalStack) and
//! are skipped unless `PELICAN_E2E_S3_ENDPOINT` is set, e.g.
//! `PELICAN_E2E_S3_ENDPOINT=http://localhost:9000`. Credentials default to
//! `minioadmin`/`minioadmin`, overridable with `PELICAN_E2E_S3_ACCESS_KEY`
//! and `PELICAN_E2E_S3_SECRET_KEY`.

use std::sync::Arc;

use pl_integration_tests::write_file;
use pl_storage::{AwsObjectStoreClient, ObjectStoreTarget};
use pl_traits::{ObjectStoreClient, PutTarget};
use pl_types::config::BucketConfig;
use pl_types::BackendKind;
use tokio_util::sync::CancellationToken;

fn e2e_bucket_config() -> Option<BucketConfig> {
    let endpoint = std::env::var("PELICAN_E2E_S3_ENDPOINT").ok()?;
    let mut config = BucketConfig {
        enabled: true,
        bucket: "pelican-e2e".to_string(),
        region: "us-east-1".to_string(),
        prefix: "e2e".to_string(),
        endpoint,
        access_key: std::env::var("PELICAN_E2E_S3_ACCESS_KEY")
            .unwrap_or_else(|_| "minioadmin".to_string()),
        secret_key: std::env::var("PELICAN_E2E_S3_SECRET_KEY")
            .unwrap_or_else(|_| "minioadmin".to_string()),
        use_ssl: false,
    };
    if let Some(stripped) = config.endpoint.strip_prefix("https://") {
        config.endpoint = stripped.to_string();
        config.use_ssl = true;
    } else if let Some(stripped) = config.endpoint.strip_prefix("http://") {
        config.endpoint = stripped.to_string();
    }
    Some(config)
}

#[tokio::test]
async fn upload_skip_and_verify_against_live_endpoint() {
    let Some(config) = e2e_bucket_config() else {
        eprintln!("PELICAN_E2E_S3_ENDPOINT not set, skipping object-store e2e test");
        return;
    };

    let client = Arc::new(
        AwsObjectStoreClient::connect(&config, 3)
            .await
            .expect("client must connect"),
    );
    let target = ObjectStoreTarget::new(
        "s3-e2e",
        BackendKind::S3,
        client.clone(),
        &config.bucket,
        &config.region,
    );

    let cancel = CancellationToken::new();
    target.bootstrap(&cancel).await.expect("bucket bootstrap");

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("payload.bin");
    write_file(&src, b"pelican end to end payload");

    let key = format!("e2e/{}/payload.bin", std::process::id());
    let outcome = target.put_file(&cancel, &src, &key).await.expect("upload");
    assert_eq!(outcome.size, 26);

    // The stored entity tag equals the local MD5.
    let stat = client
        .stat_object(&config.bucket, &key)
        .await
        .expect("stat")
        .expect("object must exist");
    assert_eq!(stat.etag, outcome.checksum);

    // A second put short-circuits on the matching tag and reports the same
    // checksum.
    let again = target.put_file(&cancel, &src, &key).await.expect("re-put");
    assert_eq!(again.checksum, outcome.checksum);
}
