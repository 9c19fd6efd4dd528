//! Convenience wrappers for the contract's RPCs, each routed through the guard.

use crate::channel::ImageGenerationClient;
use crate::error::CallError;
use crate::guard::guard;
use crate::proto::{EchoRequest, FilesExistRequest, UploadFileRequest, UploadFileResponse};

/// Chunk size for streamed uploads (1 MiB).
pub const UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// One entry of a `FilesExist` answer, zipped from the parallel arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub file: String,
    pub exists: bool,
    pub error: Option<String>,
}

/// Health check; returns the server's greeting.
pub async fn echo(client: &mut ImageGenerationClient) -> Result<String, CallError> {
    guard(client.echo(EchoRequest {}))
        .await
        .map(|response| response.message)
}

/// Ask which of `files` (paths relative to the model directory) exist.
pub async fn files_exist(
    client: &mut ImageGenerationClient,
    files: Vec<String>,
) -> Result<Vec<FileStatus>, CallError> {
    let response = guard(client.files_exist(FilesExistRequest { files })).await?;

    Ok(response
        .files
        .into_iter()
        .enumerate()
        .map(|(i, file)| FileStatus {
            file,
            exists: response.exists.get(i).copied().unwrap_or(false),
            error: response.errors.get(i).filter(|e| !e.is_empty()).cloned(),
        })
        .collect())
}

/// Stream `data` to the server under `filename` in [`UPLOAD_CHUNK_SIZE`] pieces.
///
/// An empty payload still sends one message so the filename reaches the server.
pub async fn upload_file(
    client: &mut ImageGenerationClient,
    filename: &str,
    data: &[u8],
) -> Result<UploadFileResponse, CallError> {
    let requests = upload_requests(filename, data);
    tracing::debug!(filename, chunks = requests.len(), bytes = data.len(), "uploading file");
    guard(client.upload_file(tokio_stream::iter(requests))).await
}

fn upload_requests(filename: &str, data: &[u8]) -> Vec<UploadFileRequest> {
    if data.is_empty() {
        return vec![UploadFileRequest {
            filename: filename.to_string(),
            chunk: Vec::new(),
        }];
    }

    data.chunks(UPLOAD_CHUNK_SIZE)
        .map(|chunk| UploadFileRequest {
            filename: filename.to_string(),
            chunk: chunk.to_vec(),
        })
        .collect()
}
