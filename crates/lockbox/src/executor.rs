//! Applies validated requests.
//!
//! The executor trusts that [`validate`](lockbox_perms::validate) already
//! passed and never re-checks authorization. Storage runs first; the
//! registry is only touched once storage succeeded, so a failed write never
//! leaves a record without bytes.

use lockbox_core::{Identity, Request, Response};
use lockbox_perms::AccessRegistry;
use lockbox_store::{BlobStore, StoreError};

/// Apply `request` on behalf of `sender`.
///
/// Storage failures are reported as a failure response, never as an error:
/// the connection and the registry are unaffected.
pub async fn execute(
    sender: &Identity,
    request: Request,
    registry: &mut AccessRegistry,
    blobs: &dyn BlobStore,
) -> Response {
    let header = request.header().to_string();
    match apply(sender, request, registry, blobs).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(%sender, operation = %header, error = %e, "storage failed");
            Response::failure(format!("{header} failed: {e}"))
        }
    }
}

async fn apply(
    sender: &Identity,
    request: Request,
    registry: &mut AccessRegistry,
    blobs: &dyn BlobStore,
) -> Result<Response, StoreError> {
    match request {
        Request::AddUser => {
            registry.add_user(sender.clone());
            tracing::info!(user = %sender, "added user");
            Ok(Response::success())
        }

        Request::UploadFile { filename, data } => {
            let size = data.len();
            blobs.write_file(&filename, data).await?;
            registry.record_upload(sender.clone(), filename.clone());
            tracing::info!(user = %sender, file = %filename, bytes = size, "uploaded file");
            Ok(Response::success())
        }

        Request::DownloadFile { filename } => {
            let data = blobs.read_file(&filename).await?;
            tracing::info!(user = %sender, file = %filename, bytes = data.len(), "downloaded file");
            Ok(Response::file(filename, data))
        }

        Request::DeleteFile { filename } => {
            match blobs.delete_file(&filename).await {
                Ok(()) => {}
                // Bytes already gone: still drop the record so it cannot dangle.
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(file = %filename, "deleting record whose bytes were missing");
                }
                Err(e) => return Err(e),
            }
            registry.record_delete(&filename);
            tracing::info!(user = %sender, file = %filename, "deleted file");
            Ok(Response::success())
        }

        Request::ShareFile { filename, target } => {
            tracing::info!(user = %sender, file = %filename, %target, "shared file");
            registry.record_share(&filename, target);
            Ok(Response::success())
        }

        Request::Unrecognized { header } => {
            Ok(Response::failure(format!("unrecognized operation: {header}")))
        }
    }
}
