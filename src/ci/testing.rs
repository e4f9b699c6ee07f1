//! In-memory daily build source for unit tests

use crate::ci::client::{DailyBuild, DailyBuildSource, DailyBuildsQuery, TagQuery, TagRecord};
use crate::error::{FirmloopError, FirmloopResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeCi {
    pub builds: Mutex<Vec<DailyBuild>>,
    pub tags: Mutex<Vec<TagRecord>>,
    pub documents: Mutex<HashMap<String, Vec<u8>>>,
    pub queries: Mutex<Vec<DailyBuildsQuery>>,
    pub tag_queries: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeCi {
    pub fn with_builds(builds: Vec<DailyBuild>) -> Self {
        let fake = Self::default();
        *fake.builds.lock().unwrap() = builds;
        fake
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DailyBuildSource for FakeCi {
    async fn daily_builds(&self, query: &DailyBuildsQuery) -> FirmloopResult<Vec<DailyBuild>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.builds.lock().unwrap().clone())
    }

    async fn tags(&self, _: &TagQuery) -> FirmloopResult<Vec<TagRecord>> {
        self.tag_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags.lock().unwrap().clone())
    }

    async fn fetch(&self, url: &str) -> FirmloopResult<Vec<u8>> {
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FirmloopError::http(url, "404 Not Found"))
    }

    async fn download(&self, url: &str, dest: &Path) -> FirmloopResult<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let body = self.fetch(url).await?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, body).unwrap();
        Ok(())
    }
}
