use std::future::Future;

use base64::Engine as _;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported source map url scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode source map payload: {0}")]
    Decode(String),
}

/// Retrieves the text of a source map.
///
/// Implementations must be cheap to share; the driver clones an `Arc` of the
/// fetcher into every spawned load.
pub trait SourceMapFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches inline `data:` maps and `file:` maps from local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl SourceMapFetcher for LocalFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        match url.scheme() {
            "data" => decode_data_url(url.as_str()),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| FetchError::Decode(format!("not a local path: {url}")))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| FetchError::Io {
                        path: path.display().to_string(),
                        source,
                    })
            }
            other => Err(FetchError::UnsupportedScheme(other.to_owned())),
        }
    }
}

fn decode_data_url(url: &str) -> Result<String, FetchError> {
    let rest = url.strip_prefix("data:").unwrap_or(url);
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(FetchError::Decode("data url has no payload".to_owned()));
    };
    if !header.ends_with(";base64") {
        return Err(FetchError::Decode(
            "only base64 data urls are supported".to_owned(),
        ));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| FetchError::Decode(err.to_string()))
}
