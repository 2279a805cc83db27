use crate::config::BoundaryConfig;
use geojson::{FeatureCollection, GeoJson};
use reqwest::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read pinned boundary file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write pinned boundary file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse GeoJSON from {0}")]
    Parse(String, #[source] geojson::Error),

    #[error("GeoJSON from {0} must be a FeatureCollection")]
    NotFeatureCollection(String),
}

/// Returns the region boundaries, reading the pinned copy when present and
/// downloading (then pinning) it otherwise.
pub async fn load_boundaries(config: &BoundaryConfig) -> Result<FeatureCollection, BoundaryError> {
    if config.cache.exists() {
        return read_pinned(&config.cache).await;
    }
    info!("Pinned boundary file {:?} not found, fetching {}", config.cache, config.url);
    fetch_and_pin(config).await
}

/// Downloads the boundary document once and overwrites the pinned copy.
pub async fn fetch_and_pin(config: &BoundaryConfig) -> Result<FeatureCollection, BoundaryError> {
    let body = fetch_body(&config.url).await?;
    let collection = parse_collection(&body, &config.url)?;

    if let Some(parent) = config.cache.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BoundaryError::CacheWrite(config.cache.clone(), e))?;
        }
    }
    // Readers only ever see a complete file
    let partial = partial_path(&config.cache);
    tokio::fs::write(&partial, body.as_bytes())
        .await
        .map_err(|e| BoundaryError::CacheWrite(partial.clone(), e))?;
    if let Err(e) = tokio::fs::rename(&partial, &config.cache).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(BoundaryError::CacheWrite(config.cache.clone(), e));
    }

    info!(
        "Pinned {} boundary features ({} bytes) to {:?}",
        collection.features.len(),
        body.len(),
        config.cache
    );
    Ok(collection)
}

fn partial_path(cache: &Path) -> PathBuf {
    let mut name = cache.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn read_pinned(path: &Path) -> Result<FeatureCollection, BoundaryError> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BoundaryError::CacheRead(path.to_path_buf(), e))?;
    let collection = parse_collection(&body, &path.display().to_string())?;
    info!("Read {} boundary features from {:?}", collection.features.len(), path);
    Ok(collection)
}

async fn fetch_body(url: &str) -> Result<String, BoundaryError> {
    let client = Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| BoundaryError::NetworkRequest(url.to_string(), e))?;
    let response = match response.error_for_status() {
        Ok(resp) => resp,
        Err(e) => {
            if let Some(status) = e.status() {
                return Err(BoundaryError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                });
            } else {
                return Err(BoundaryError::NetworkRequest(url.to_string(), e));
            }
        }
    };
    response
        .text()
        .await
        .map_err(|e| BoundaryError::NetworkRequest(url.to_string(), e))
}

pub(crate) fn parse_collection(
    body: &str,
    origin: &str,
) -> Result<FeatureCollection, BoundaryError> {
    let geojson = body
        .parse::<GeoJson>()
        .map_err(|e| BoundaryError::Parse(origin.to_string(), e))?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(BoundaryError::NotFeatureCollection(origin.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::{routing::get, Router};

    fn config_with_cache(cache: PathBuf) -> BoundaryConfig {
        BoundaryConfig {
            // Unroutable, so any attempt to touch the network fails the test
            url: "http://127.0.0.1:9/regions.json".to_string(),
            cache,
            join_key: "REGION".to_string(),
        }
    }

    #[tokio::test]
    async fn pinned_file_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("regions.geojson");
        std::fs::write(&cache, test_support::regions_json()).unwrap();

        let collection = load_boundaries(&config_with_cache(cache)).await.unwrap();
        assert_eq!(collection.features.len(), 3);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_nothing_is_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nested").join("regions.geojson");

        let err = load_boundaries(&config_with_cache(cache.clone())).await.unwrap_err();
        assert!(matches!(err, BoundaryError::NetworkRequest(..)));
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn malformed_pinned_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("regions.geojson");
        std::fs::write(&cache, "{ not json").unwrap();

        let err = load_boundaries(&config_with_cache(cache)).await.unwrap_err();
        assert!(matches!(err, BoundaryError::Parse(..)));
    }

    #[tokio::test]
    async fn fetched_boundaries_are_pinned_and_reused() {
        let app = Router::new()
            .route("/regions.json", get(|| async { test_support::regions_json() }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nested").join("regions.geojson");
        let live = BoundaryConfig {
            url: format!("http://{}/regions.json", addr),
            ..config_with_cache(cache.clone())
        };

        let collection = load_boundaries(&live).await.unwrap();
        assert_eq!(collection.features.len(), 3);
        assert!(cache.exists());
        assert!(!partial_path(&cache).exists());
        server.abort();

        // Source is gone; the pinned copy must carry the next start
        let collection = load_boundaries(&config_with_cache(cache)).await.unwrap();
        assert_eq!(collection.features.len(), 3);
    }

    #[test]
    fn partial_file_sits_next_to_the_cache() {
        let cache = Path::new("data").join("regions.geojson");
        assert_eq!(partial_path(&cache), Path::new("data").join("regions.geojson.tmp"));
    }

    #[test]
    fn single_feature_is_not_a_collection() {
        let body = r#"{"type":"Feature","geometry":null,"properties":{"REGION":"NCR"}}"#;
        let err = parse_collection(body, "inline").unwrap_err();
        assert!(matches!(err, BoundaryError::NotFeatureCollection(_)));
    }
}
