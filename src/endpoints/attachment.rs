//! File download and upload endpoints rooted at one directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{self, Error, Result};
use crate::pipeline::{BodyMode, FileResponse, Handler, HandlerParameters, HandlerRequest};
use crate::validation::{FieldRule, Validate};

/// Multipart field holding the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// `name` is read from the URL param of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub name: String,
}

impl Validate for DownloadRequest {
    fn rules() -> Vec<FieldRule> {
        vec![FieldRule::new("name", "required")]
    }
}

/// Single plain file name under the base directory.
#[track_caller]
fn resolve(base_dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) if !name.contains('\\') => Ok(base_dir.join(file)),
        _ => Err(Error::bad_request(errors::INVALID_FILE_NAME, name)),
    }
}

/// Streams `base_dir/<name>` as an attachment.
pub struct DownloadHandler {
    params: HandlerParameters,
    base_dir: PathBuf,
}

impl DownloadHandler {
    pub fn new(params: HandlerParameters, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            params: params.body_mode(BodyMode::Uri).file_response(true),
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl Handler for DownloadHandler {
    type Request = DownloadRequest;
    type Response = FileResponse;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn handler(&self, trx: &mut HandlerRequest<DownloadRequest, FileResponse>) -> Result<FileResponse> {
        let name = trx.request()?.name.clone();
        let path = resolve(&self.base_dir, &name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(FileResponse { path, name }),
            _ => Err(Error::new(404, errors::FILE_NOT_FOUND, name)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {}

impl Validate for UploadRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Stored file name under the base directory.
    pub id: String,
    /// Name the client sent.
    pub file_name: String,
}

/// Saves the multipart `file` field under a generated name.
pub struct UploadHandler {
    params: HandlerParameters,
    base_dir: PathBuf,
}

impl UploadHandler {
    pub fn new(params: HandlerParameters, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            params: params.body_mode(BodyMode::Query),
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl Handler for UploadHandler {
    type Request = UploadRequest;
    type Response = UploadResponse;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn handler(&self, trx: &mut HandlerRequest<UploadRequest, UploadResponse>) -> Result<UploadResponse> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Error::internal(errors::FILE_SAVE_ERROR, e.to_string()))?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = self.base_dir.join(&id);
        let file_name = trx.parser_mut().save_file(UPLOAD_FIELD, &path).await?;
        tracing::info!(id = %id, file_name = %file_name, "File uploaded");
        Ok(UploadResponse { id, file_name })
    }
}
