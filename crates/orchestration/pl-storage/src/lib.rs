//! Storage backends for pelican.
//!
//! The fan-out/aggregation semantics of a backend live in one generic
//! driver, [`ParallelPutDriver`], which consumes a single-file
//! [`PutTarget`](pl_traits::PutTarget) capability. Two targets exist:
//!
//! - [`ObjectStoreTarget`]: S3 and S3-compatible stores (GCS runs through
//!   its interoperability endpoint), content-addressed by MD5 entity tags
//! - [`LocalDirTarget`]: a directory tree on the local filesystem
//!
//! [`build_backends`] assembles the enabled backends for one pipeline from
//! its configuration.

mod client;
mod driver;
mod local;
mod object_store;

pub use client::AwsObjectStoreClient;
pub use driver::ParallelPutDriver;
pub use local::LocalDirTarget;
pub use object_store::ObjectStoreTarget;

use std::path::PathBuf;
use std::sync::Arc;

use pl_error::Result;
use pl_traits::StorageBackend;
use pl_types::config::PipelineConfig;
use pl_types::BackendKind;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Stable backend identifier used in logs and results.
pub fn backend_id(kind: BackendKind, pipeline: &str) -> String {
    format!("{kind}-{pipeline}")
}

/// Build the enabled storage backends for one pipeline.
///
/// Backend instances are shared by all of the pipeline's workers. Object
/// store backends are bootstrapped here: bucket existence is verified (and
/// the bucket created if needed) before the pipeline starts, waiting out
/// cluster cold starts.
pub async fn build_backends(
    pipeline: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Arc<dyn StorageBackend>>> {
    let mut backends: Vec<Arc<dyn StorageBackend>> = Vec::new();
    let storage = &pipeline.processor.storage;
    let retry_limit = pipeline.processor.retry.limit;
    let root = PathBuf::from(&pipeline.scanner.directory);

    if storage.local_dir.enabled {
        let id = backend_id(BackendKind::Local, &pipeline.name);
        info!(backend = %id, path = %storage.local_dir.path, "local directory backend enabled");
        let target = LocalDirTarget::new(id, &storage.local_dir);
        backends.push(Arc::new(ParallelPutDriver::new(
            target,
            root.clone(),
            String::new(),
        )));
    }

    if storage.s3.enabled {
        let id = backend_id(BackendKind::S3, &pipeline.name);
        info!(backend = %id, bucket = %storage.s3.bucket, endpoint = %storage.s3.endpoint, "s3 backend enabled");
        let client = AwsObjectStoreClient::connect(&storage.s3, retry_limit).await?;
        let target = ObjectStoreTarget::new(
            id,
            BackendKind::S3,
            Arc::new(client),
            &storage.s3.bucket,
            &storage.s3.region,
        );
        target.bootstrap(cancel).await?;
        backends.push(Arc::new(ParallelPutDriver::new(
            target,
            root.clone(),
            storage.s3.prefix.clone(),
        )));
    }

    if storage.gcs.enabled {
        let id = backend_id(BackendKind::Gcs, &pipeline.name);
        info!(backend = %id, bucket = %storage.gcs.bucket, endpoint = %storage.gcs.endpoint, "gcs backend enabled");
        let client = AwsObjectStoreClient::connect(&storage.gcs, retry_limit).await?;
        let target = ObjectStoreTarget::new(
            id,
            BackendKind::Gcs,
            Arc::new(client),
            &storage.gcs.bucket,
            &storage.gcs.region,
        );
        target.bootstrap(cancel).await?;
        backends.push(Arc::new(ParallelPutDriver::new(
            target,
            root,
            storage.gcs.prefix.clone(),
        )));
    }

    Ok(backends)
}
