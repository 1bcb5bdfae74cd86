//! Object storage for project documents
//!
//! Two backends sit behind [`ObjectStore`]: a directory on local disk (served
//! by the API under `/files`) and a Backblaze B2 bucket. The store is built
//! once at startup and shared through application state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{B2Section, StorageConfig};
use crate::constants::{B2_API_PATH, B2_AUTHORIZE_URL};

/// Where an uploaded object ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Backend file id, when the backend has one
    pub id: Option<String>,
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredObject>;

    /// Remove an object; removing something already gone is not an error
    async fn delete(&self, object: &StoredObject) -> Result<()>;
}

/// Build the configured backend
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Local { dir, public_path } => {
            Arc::new(LocalStore::new(dir.clone(), public_path.clone())?)
        }
        StorageConfig::B2(credentials) => Arc::new(B2Store::new(credentials.clone())),
    };

    info!(backend = store.name(), "Document storage ready");
    Ok(store)
}

/// Storage key for a document: `projects/{id}/{uuid}-{file name}`
pub fn build_key(project_id: i64, file_name: &str) -> String {
    format!(
        "projects/{}/{}-{}",
        project_id,
        uuid::Uuid::new_v4().simple(),
        sanitize_file_name(file_name)
    )
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`
pub fn sanitize_file_name(name: &str) -> String {
    // Browsers may send a full path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

// =============================================================================
// Local disk
// =============================================================================

pub struct LocalStore {
    root: PathBuf,
    public_path: String,
}

impl LocalStore {
    pub fn new(root: PathBuf, public_path: String) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;

        Ok(Self { root, public_path })
    }

    #[cfg(test)]
    fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key under the root, refusing anything that could escape it
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if key.is_empty() || !safe {
            anyhow::bail!("Invalid storage key: {key}");
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(key, size = bytes.len(), "Stored document on disk");

        Ok(StoredObject {
            key: key.to_string(),
            id: None,
            url: format!("{}/{}", self.public_path, key),
        })
    }

    async fn delete(&self, object: &StoredObject) -> Result<()> {
        let path = self.path_for(&object.key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

// =============================================================================
// Backblaze B2
// =============================================================================

/// b2_authorize_account response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

/// Backblaze B2 client using the native v2 API
pub struct B2Store {
    client: reqwest::Client,
    authorize_url: String,
    credentials: B2Section,
    /// Filled by the first successful authorization
    session: OnceCell<AuthorizeResponse>,
    authorizations: AtomicUsize,
}

impl B2Store {
    pub fn new(credentials: B2Section) -> Self {
        Self::with_authorize_url(credentials, B2_AUTHORIZE_URL.to_string())
    }

    /// Point authorization at a different endpoint
    pub fn with_authorize_url(credentials: B2Section, authorize_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            authorize_url,
            credentials,
            session: OnceCell::new(),
            authorizations: AtomicUsize::new(0),
        }
    }

    /// Authorize the account once. Concurrent first callers wait on the same
    /// request; a failed attempt leaves the cell empty so the next call
    /// retries.
    async fn authorize(&self) -> Result<&AuthorizeResponse> {
        self.session
            .get_or_try_init(|| async {
                let attempt = self.authorizations.fetch_add(1, Ordering::SeqCst) + 1;

                let response = self
                    .client
                    .get(&self.authorize_url)
                    .basic_auth(&self.credentials.key_id, Some(&self.credentials.application_key))
                    .send()
                    .await
                    .context("Failed to reach B2 authorization endpoint")?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("B2 authorization failed ({}): {}", status, body);
                }

                let session: AuthorizeResponse = response
                    .json()
                    .await
                    .context("Failed to parse B2 authorization response")?;

                info!(api_url = %session.api_url, attempt, "Authorized with B2");
                Ok::<_, anyhow::Error>(session)
            })
            .await
    }

    #[cfg(test)]
    fn authorization_count(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }

    fn api_url(session: &AuthorizeResponse, call: &str) -> String {
        format!("{}{}/{}", session.api_url, B2_API_PATH, call)
    }

    fn download_url(&self, session: &AuthorizeResponse, key: &str) -> String {
        format!(
            "{}/file/{}/{}",
            session.download_url, self.credentials.bucket_name, key
        )
    }

    async fn upload_target(&self, session: &AuthorizeResponse) -> Result<GetUploadUrlResponse> {
        let response = self
            .client
            .post(Self::api_url(session, "b2_get_upload_url"))
            .header("Authorization", &session.authorization_token)
            .json(&GetUploadUrlRequest {
                bucket_id: &self.credentials.bucket_id,
            })
            .send()
            .await
            .context("Failed to request B2 upload URL")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("b2_get_upload_url failed ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse B2 upload URL response")
    }
}

#[async_trait]
impl ObjectStore for B2Store {
    fn name(&self) -> &'static str {
        "b2"
    }

    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<StoredObject> {
        let session = self.authorize().await?;
        let target = self.upload_target(session).await?;
        let size = bytes.len();

        // Keys are already restricted to URL-safe characters
        let response = self
            .client
            .post(&target.upload_url)
            .header("Authorization", &target.authorization_token)
            .header("X-Bz-File-Name", key)
            .header("Content-Type", content_type)
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .body(bytes)
            .send()
            .await
            .context("Failed to upload to B2")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("B2 upload failed ({}): {}", status, body);
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("Failed to parse B2 upload response")?;

        debug!(key, size, file_id = %uploaded.file_id, "Uploaded document to B2");

        Ok(StoredObject {
            key: key.to_string(),
            url: self.download_url(session, key),
            id: Some(uploaded.file_id),
        })
    }

    async fn delete(&self, object: &StoredObject) -> Result<()> {
        // Stored by another backend, so there is nothing in the bucket
        let Some(file_id) = object.id.as_deref() else {
            warn!(key = %object.key, "No B2 file id, skipping remote delete");
            return Ok(());
        };
        let session = self.authorize().await?;

        let response = self
            .client
            .post(Self::api_url(session, "b2_delete_file_version"))
            .header("Authorization", &session.authorization_token)
            .json(&DeleteFileRequest {
                file_name: &object.key,
                file_id,
            })
            .send()
            .await
            .context("Failed to delete from B2")?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("B2 delete failed ({}): {}", status, body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use serde_json::json;
    use std::time::Duration;

    fn credentials() -> B2Section {
        B2Section {
            key_id: "key".to_string(),
            application_key: "secret".to_string(),
            bucket_id: "bucket".to_string(),
            bucket_name: "studio-docs".to_string(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Site Plan (v2).pdf"), "Site_Plan__v2_.pdf");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\plan.dwg"), "plan.dwg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_build_key_layout() {
        let key = build_key(42, "elevation.png");
        let rest = key.strip_prefix("projects/42/").unwrap();
        let (id, name) = rest.split_once('-').unwrap();

        assert_eq!(id.len(), 32);
        assert_eq!(name, "elevation.png");
    }

    #[tokio::test]
    async fn test_local_put_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("docs"), "/files".to_string()).unwrap();

        let object = store
            .put("projects/1/abc-plan.pdf", "application/pdf", b"%PDF".to_vec())
            .await
            .unwrap();

        assert_eq!(object.url, "/files/projects/1/abc-plan.pdf");
        let on_disk = store.root().join("projects/1/abc-plan.pdf");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"%PDF");

        store.delete(&object).await.unwrap();
        assert!(!on_disk.exists());

        // Second delete is a no-op
        store.delete(&object).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf(), "/files".to_string()).unwrap();

        assert!(store.put("../outside.txt", "text/plain", vec![1]).await.is_err());
        assert!(store.put("/abs.txt", "text/plain", vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn test_b2_authorizes_once() {
        let app = Router::new().route(
            "/authorize",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Json(json!({
                    "accountId": "acct",
                    "authorizationToken": "token",
                    "apiUrl": "https://api.example",
                    "downloadUrl": "https://download.example"
                }))
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = B2Store::with_authorize_url(credentials(), format!("http://{addr}/authorize"));

        let (a, b, c) = tokio::join!(store.authorize(), store.authorize(), store.authorize());
        assert_eq!(a.unwrap().authorization_token, "token");
        assert!(b.is_ok() && c.is_ok());
        store.authorize().await.unwrap();

        assert_eq!(store.authorization_count(), 1);
        assert_eq!(
            store.download_url(store.authorize().await.unwrap(), "projects/1/x.pdf"),
            "https://download.example/file/studio-docs/projects/1/x.pdf"
        );
    }

    #[tokio::test]
    async fn test_b2_delete_without_file_id_is_a_no_op() {
        let store =
            B2Store::with_authorize_url(credentials(), "http://127.0.0.1:9/nope".to_string());
        let object = StoredObject {
            key: "projects/1/abc-plan.pdf".to_string(),
            id: None,
            url: "/files/projects/1/abc-plan.pdf".to_string(),
        };

        store.delete(&object).await.unwrap();
        assert_eq!(store.authorization_count(), 0);
    }

    #[tokio::test]
    async fn test_b2_failed_authorization_is_retried() {
        let store =
            B2Store::with_authorize_url(credentials(), "http://127.0.0.1:9/nope".to_string());

        assert!(store.authorize().await.is_err());
        assert!(store.authorize().await.is_err());
        assert_eq!(store.authorization_count(), 2);
    }
}
