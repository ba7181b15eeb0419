//! Mesh resource loading
//!
//! Mesh files are fetched as raw bytes, either over HTTP(S) or from the local
//! filesystem. Decoding the file formats is left to the renderer.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Failed to read mesh {uri}: {source}")]
    IoError {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Mesh fetch {uri} returned HTTP {status}")]
    HttpStatus { uri: String, status: u16 },
    #[error("Mesh request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Unsupported mesh format: {0}")]
    Unsupported(String),
}

/// Mesh file format, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Collada,
    Stl,
    Obj,
    Gltf,
    Glb,
    Unknown,
}

impl MeshFormat {
    pub fn from_uri(uri: &str) -> Self {
        // Ignore query strings and fragments on remote URIs
        let path = uri.split(|c: char| c == '?' || c == '#').next().unwrap_or(uri);
        let file = path.rsplit('/').next().unwrap_or(path);
        let Some((_, ext)) = file.rsplit_once('.') else {
            return MeshFormat::Unknown;
        };
        match ext.to_ascii_lowercase().as_str() {
            "dae" => MeshFormat::Collada,
            "stl" => MeshFormat::Stl,
            "obj" => MeshFormat::Obj,
            "gltf" => MeshFormat::Gltf,
            "glb" => MeshFormat::Glb,
            _ => MeshFormat::Unknown,
        }
    }
}

/// Raw mesh file contents
#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub uri: String,
    pub format: MeshFormat,
    pub data: Vec<u8>,
}

/// Loads mesh resources referenced by a robot description
pub trait MeshLoader: Send + Sync {
    /// Whether this loader can handle the format at all
    fn supports(&self, format: MeshFormat) -> bool;

    /// Start loading `uri`. The returned future owns everything it needs.
    fn load(&self, uri: &str) -> BoxFuture<'static, Result<MeshAsset, MeshError>>;
}

/// Default loader: `http(s)://` URIs over HTTP, everything else from disk
#[derive(Debug, Clone, Default)]
pub struct StandardMeshLoader {
    client: reqwest::Client,
}

impl StandardMeshLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader whose HTTP requests time out after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, MeshError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl MeshLoader for StandardMeshLoader {
    fn supports(&self, format: MeshFormat) -> bool {
        format != MeshFormat::Unknown
    }

    fn load(&self, uri: &str) -> BoxFuture<'static, Result<MeshAsset, MeshError>> {
        let client = self.client.clone();
        let uri = uri.to_string();
        async move {
            let format = MeshFormat::from_uri(&uri);
            if format == MeshFormat::Unknown {
                return Err(MeshError::Unsupported(uri));
            }

            let data = if is_remote(&uri) {
                info!(uri = %uri, "Fetching remote mesh");
                let response = client.get(&uri).send().await?;
                if !response.status().is_success() {
                    return Err(MeshError::HttpStatus {
                        uri,
                        status: response.status().as_u16(),
                    });
                }
                response.bytes().await?.to_vec()
            } else {
                let path = uri.strip_prefix("file://").unwrap_or(&uri);
                match tokio::fs::read(path).await {
                    Ok(data) => data,
                    Err(source) => return Err(MeshError::IoError { uri, source }),
                }
            };

            debug!(uri = %uri, format = ?format, bytes = data.len(), "Loaded mesh");
            Ok(MeshAsset { uri, format, data })
        }
        .boxed()
    }
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Resolve a URDF mesh `filename` against the base path.
///
/// `package://` references are made relative to `base`, `file://` references
/// become plain paths, absolute URLs and absolute paths are kept as they are.
pub fn resolve_mesh_uri(base: &str, filename: &str) -> String {
    if is_remote(filename) {
        return filename.to_string();
    }
    if let Some(path) = filename.strip_prefix("file://") {
        return path.to_string();
    }

    let relative = match filename.strip_prefix("package://") {
        Some(rest) => rest,
        None if filename.starts_with('/') => return filename.to_string(),
        None => filename.trim_start_matches("./"),
    };

    if base.is_empty() {
        return relative.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single HTTP request on loopback with a canned response.
    /// Returns the base URL of the listener.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_format_from_uri() {
        assert_eq!(MeshFormat::from_uri("meshes/base.DAE"), MeshFormat::Collada);
        assert_eq!(MeshFormat::from_uri("/a/b/wheel.stl"), MeshFormat::Stl);
        assert_eq!(
            MeshFormat::from_uri("https://host/m/arm.glb?rev=2"),
            MeshFormat::Glb
        );
        assert_eq!(MeshFormat::from_uri("meshes.d/noext"), MeshFormat::Unknown);
        assert_eq!(MeshFormat::from_uri("part.3ds"), MeshFormat::Unknown);
    }

    #[test]
    fn test_resolve_package_uri() {
        assert_eq!(
            resolve_mesh_uri("/", "package://pr2_description/meshes/base.dae"),
            "/pr2_description/meshes/base.dae"
        );
        assert_eq!(
            resolve_mesh_uri("http://localhost:8000/resources/", "package://pr2/base.dae"),
            "http://localhost:8000/resources/pr2/base.dae"
        );
        assert_eq!(resolve_mesh_uri("", "package://pr2/base.dae"), "pr2/base.dae");
    }

    #[test]
    fn test_resolve_other_schemes() {
        assert_eq!(
            resolve_mesh_uri("/models", "https://cdn.example.com/arm.stl"),
            "https://cdn.example.com/arm.stl"
        );
        assert_eq!(
            resolve_mesh_uri("/models", "file:///opt/meshes/arm.stl"),
            "/opt/meshes/arm.stl"
        );
        assert_eq!(resolve_mesh_uri("/models", "/abs/arm.stl"), "/abs/arm.stl");
        assert_eq!(resolve_mesh_uri("/models", "./meshes/arm.stl"), "/models/meshes/arm.stl");
    }

    #[tokio::test]
    async fn test_standard_loader_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("wheel.stl");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"solid wheel")
            .unwrap();

        let loader = StandardMeshLoader::new();
        let uri = path.to_string_lossy().to_string();
        let asset = loader.load(&uri).await.unwrap();
        assert_eq!(asset.format, MeshFormat::Stl);
        assert_eq!(asset.data, b"solid wheel");

        let file_uri = format!("file://{}", uri);
        assert!(loader.load(&file_uri).await.is_ok());
    }

    #[tokio::test]
    async fn test_standard_loader_errors() {
        let loader = StandardMeshLoader::new();
        assert!(matches!(
            loader.load("/definitely/not/here.dae").await,
            Err(MeshError::IoError { .. })
        ));
        assert!(matches!(
            loader.load("/some/file.xyz").await,
            Err(MeshError::Unsupported(_))
        ));
        assert!(!loader.supports(MeshFormat::Unknown));
        assert!(loader.supports(MeshFormat::Collada));
    }

    #[tokio::test]
    async fn test_standard_loader_fetches_remote_mesh() {
        let base = serve_once("200 OK", "solid remote").await;
        let uri = resolve_mesh_uri(&base, "package://rover/meshes/body.stl");
        let asset = StandardMeshLoader::with_timeout(Duration::from_secs(2))
            .unwrap()
            .load(&uri)
            .await
            .unwrap();
        assert_eq!(asset.uri, uri);
        assert_eq!(asset.format, MeshFormat::Stl);
        assert_eq!(asset.data, b"solid remote");
    }

    #[tokio::test]
    async fn test_standard_loader_remote_status() {
        let base = serve_once("404 Not Found", "").await;
        let uri = format!("{}/meshes/missing.dae", base);
        match StandardMeshLoader::new().load(&uri).await {
            Err(MeshError::HttpStatus { uri: failed, status }) => {
                assert_eq!(status, 404);
                assert_eq!(failed, uri);
            }
            other => panic!("expected HTTP status error, got {:?}", other),
        }
    }
}
