//! Daily build CI service client
//!
//! Queries are JSON POSTs; artifacts and tag files are plain GETs. `ureq` is
//! blocking, so every request runs on the blocking pool.

use crate::error::{FirmloopError, FirmloopResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Status of a daily build that has finished, successfully or not
pub const TERMINAL_STATUS: &str = "end";

/// Fail reason reported for builds that did not compile
pub const COMPILE_FAILED: &str = "compile_failed";

/// Daily build query body
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBuildsQuery {
    pub project_name: String,
    pub branch: String,
    pub component: String,
    /// `"success"` to only see successful builds, empty for any
    pub build_status: String,
    pub start_time: String,
    pub end_time: String,
    pub page_num: u32,
    pub page_size: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DailyBuildsResult {
    daily_build_vos: Vec<DailyBuild>,
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyBuildsResponse {
    result: DailyBuildsResult,
}

/// One daily build record
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DailyBuild {
    pub current_status: String,
    pub build_start_time: String,
    pub build_fail_reason: String,
    pub id: String,
    pub obs_path: String,
    pub img_obs_path: String,
}

impl DailyBuild {
    /// Artifact URL, preferring the image archive
    pub fn artifact(&self) -> &str {
        if self.img_obs_path.is_empty() {
            &self.obs_path
        } else {
            &self.img_obs_path
        }
    }

    /// Whether the build has finished
    pub fn is_terminal(&self) -> bool {
        self.current_status == TERMINAL_STATUS
    }
}

/// Manifest tag history query body
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagQuery {
    pub project_name: String,
    pub branch: String,
    pub start_time: String,
    pub end_time: String,
    pub page_num: u32,
    pub page_size: u32,
}

/// One manifest tag snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagRecord {
    pub tag_file_url: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TagsResult {
    tag_list: Vec<TagRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagsResponse {
    result: TagsResult,
}

/// Source of daily build records, manifest tags and artifacts
#[async_trait]
pub trait DailyBuildSource: Send + Sync {
    /// Query daily build records, newest first
    async fn daily_builds(&self, query: &DailyBuildsQuery) -> FirmloopResult<Vec<DailyBuild>>;

    /// Query manifest tags recorded in a time window
    async fn tags(&self, query: &TagQuery) -> FirmloopResult<Vec<TagRecord>>;

    /// Fetch a small document into memory
    async fn fetch(&self, url: &str) -> FirmloopResult<Vec<u8>>;

    /// Download `url` to `dest`; `dest` only appears once complete
    async fn download(&self, url: &str, dest: &Path) -> FirmloopResult<()>;
}

/// HTTP client for the CI portal
#[derive(Clone)]
pub struct CiClient {
    agent: ureq::Agent,
    daily_builds_url: String,
    tags_url: String,
}

impl CiClient {
    /// Create a client for the given endpoints
    pub fn new(daily_builds_url: impl Into<String>, tags_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            daily_builds_url: daily_builds_url.into(),
            tags_url: tags_url.into(),
        }
    }

    async fn post_json<Q, R>(&self, url: &str, query: &Q) -> FirmloopResult<R>
    where
        Q: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let body = serde_json::to_vec(query)?;
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let mut resp = agent
                .post(&url)
                .header("Content-Type", JSON_CONTENT_TYPE)
                .send(body)
                .map_err(|e| FirmloopError::http(&url, e))?;
            let data = resp
                .body_mut()
                .read_to_vec()
                .map_err(|e| FirmloopError::http(&url, e))?;
            serde_json::from_slice(&data).map_err(|e| {
                FirmloopError::http(
                    &url,
                    format!("can not unmarshal [{}]: {}", String::from_utf8_lossy(&data), e),
                )
            })
        })
        .await
        .map_err(|e| FirmloopError::Internal(format!("HTTP task failed: {}", e)))?
    }
}

#[async_trait]
impl DailyBuildSource for CiClient {
    async fn daily_builds(&self, query: &DailyBuildsQuery) -> FirmloopResult<Vec<DailyBuild>> {
        let resp: DailyBuildsResponse = self.post_json(&self.daily_builds_url, query).await?;
        debug!(
            "Daily builds query returned {} of {} records",
            resp.result.daily_build_vos.len(),
            resp.result.total
        );
        Ok(resp.result.daily_build_vos)
    }

    async fn tags(&self, query: &TagQuery) -> FirmloopResult<Vec<TagRecord>> {
        let resp: TagsResponse = self.post_json(&self.tags_url, query).await?;
        Ok(resp.result.tag_list)
    }

    async fn fetch(&self, url: &str) -> FirmloopResult<Vec<u8>> {
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let mut resp = agent
                .get(&url)
                .call()
                .map_err(|e| FirmloopError::http(&url, e))?;
            resp.body_mut()
                .read_to_vec()
                .map_err(|e| FirmloopError::http(&url, e))
        })
        .await
        .map_err(|e| FirmloopError::Internal(format!("HTTP task failed: {}", e)))?
    }

    async fn download(&self, url: &str, dest: &Path) -> FirmloopResult<()> {
        info!("Downloading {}", url);
        let agent = self.agent.clone();
        let target = url.to_string();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || download_blocking(&agent, &target, &dest))
            .await
            .map_err(|e| FirmloopError::Internal(format!("HTTP task failed: {}", e)))??;

        info!("{} downloaded successfully", url);
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn download_blocking(agent: &ureq::Agent, url: &str, dest: &Path) -> FirmloopResult<()> {
    let resp = agent.get(url).call().map_err(|e| FirmloopError::http(url, e))?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| FirmloopError::io(format!("creating {}", parent.display()), e))?;
    }

    let partial = partial_path(dest);
    let mut file = std::fs::File::create(&partial)
        .map_err(|e| FirmloopError::io(format!("creating {}", partial.display()), e))?;
    let mut reader = resp.into_body().into_reader();
    std::io::copy(&mut reader, &mut file).map_err(|e| FirmloopError::http(url, e))?;
    file.flush()
        .map_err(|e| FirmloopError::io(format!("writing {}", partial.display()), e))?;

    std::fs::rename(&partial, dest)
        .map_err(|e| FirmloopError::io(format!("renaming to {}", dest.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tempfile::TempDir;

    const RESPONSE: &str = r#"{
        "result": {
            "dailyBuildVos": [{
                "currentStatus": "end",
                "buildStartTime": "20230101_120000",
                "buildFailReason": "",
                "id": "42",
                "obsPath": "https://obs.example.com/v2_obs.tar.gz",
                "imgObsPath": "https://obs.example.com/v2.tar.gz",
                "extra": "ignored"
            }],
            "total": 1
        }
    }"#;

    #[test]
    fn artifact_prefers_image_archive() {
        let mut record = DailyBuild {
            obs_path: "a/full.tar.gz".to_string(),
            img_obs_path: "a/img.tar.gz".to_string(),
            ..Default::default()
        };
        assert_eq!(record.artifact(), "a/img.tar.gz");
        record.img_obs_path.clear();
        assert_eq!(record.artifact(), "a/full.tar.gz");
    }

    #[test]
    fn query_serializes_camel_case() {
        let query = DailyBuildsQuery {
            project_name: "openharmony".to_string(),
            page_num: 1,
            page_size: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["projectName"], "openharmony");
        assert_eq!(json["pageSize"], 1);
        assert!(json.get("buildStatus").is_some());
    }

    #[tokio::test]
    async fn daily_builds_parses_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/dailybuilds")
            .match_header("content-type", JSON_CONTENT_TYPE)
            .match_body(Matcher::PartialJsonString(
                r#"{"component": "dayu200", "pageNum": 1}"#.to_string(),
            ))
            .with_status(200)
            .with_body(RESPONSE)
            .create_async()
            .await;

        let client = CiClient::new(
            format!("{}/dailybuilds", server.url()),
            format!("{}/tags", server.url()),
        );
        let query = DailyBuildsQuery {
            component: "dayu200".to_string(),
            page_num: 1,
            page_size: 1,
            ..Default::default()
        };
        let records = client.daily_builds(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].is_terminal());
        assert_eq!(records[0].artifact(), "https://obs.example.com/v2.tar.gz");
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/dailybuilds")
            .with_status(500)
            .create_async()
            .await;

        let client = CiClient::new(format!("{}/dailybuilds", server.url()), "unused");
        let err = client
            .daily_builds(&DailyBuildsQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FirmloopError::Http { .. }));
    }

    #[tokio::test]
    async fn tags_parses_tag_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/tags")
            .with_status(200)
            .with_body(
                r#"{"result":{"tagList":[{"tagFileUrl":"http://x/tag.xml","timestamp":"20230101_110000"}]}}"#,
            )
            .create_async()
            .await;

        let client = CiClient::new("unused", format!("{}/tags", server.url()));
        let tags = client.tags(&TagQuery::default()).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].timestamp, "20230101_110000");
    }

    #[tokio::test]
    async fn download_writes_destination() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2.tar.gz")
            .with_status(200)
            .with_body("archive-bytes")
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("archive").join("v2.tar.gz");
        let client = CiClient::new("unused", "unused");
        client
            .download(&format!("{}/v2.tar.gz", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "archive-bytes");
        assert!(!partial_path(&dest).exists());
    }
}
