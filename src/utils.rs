use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

use crate::config::Settings;
use crate::error::ConfigError;

async fn download_file(url: &str, path: &Path, token: Option<&str>) -> Result<(), ConfigError> {
    tracing::info!("Downloading {} from {}", path.display(), url);

    let download_err = |reason: String| ConfigError::Download {
        url: url.to_string(),
        reason,
    };

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| download_err("invalid GITHUB_TOKEN format".into()))?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    if !response.status().is_success() {
        return Err(download_err(format!("status {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Downloads the model graph and label file when they are not on disk yet.
pub async fn ensure_files_exist(settings: &Settings) -> Result<(), ConfigError> {
    tracing::info!("Checking model...");
    let token = settings.github_token.as_deref();

    if !settings.model_path.exists() {
        let model_url = settings
            .model_url
            .as_deref()
            .ok_or(ConfigError::Missing("MODEL_URL"))?;
        download_file(model_url, &settings.model_path, token).await?;
    }

    if !settings.class_list_path.exists() {
        let class_url = settings
            .class_list_url
            .as_deref()
            .ok_or(ConfigError::Missing("CLASS_LIST_URL"))?;
        download_file(class_url, &settings.class_list_path, token).await?;
    }

    Ok(())
}
