//! Wiring shared by manager unit tests

use crate::ci::testing::FakeCi;
use crate::ci::CiPoller;
use crate::device::testing::{FakeLink, FakeTool};
use crate::device::{Flasher, LocationCache};
use crate::manager::BuildRecipe;
use crate::package::{
    DailyBuildSteps, NewerSource, PackageResolver, StepsPlanner, TagHistorySteps, TarGzArchiver,
    TrackedSource, Workspace,
};
use crate::remote::testing::FakeTransport;
use crate::remote::{BuildServer, BuildServerPool, ManifestSource, RemoteBuilder};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const IMAGES: &str = "out/rk3568/packages/phone/images";

pub(crate) struct Harness {
    _temp: TempDir,
    pub workspace: Workspace,
    pub ci: Arc<FakeCi>,
    pub transport: Arc<FakeTransport>,
}

impl Harness {
    /// Fresh workspace; the first `compile_failures` compiles fail
    pub fn new(compile_failures: u32) -> Self {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::new(temp.path().join("ws"), temp.path().join("archive"));
        Self {
            _temp: temp,
            workspace,
            ci: Arc::new(FakeCi::default()),
            transport: FakeTransport::failing_compiles(compile_failures),
        }
    }

    pub fn recipe() -> BuildRecipe {
        BuildRecipe {
            pre_compile_cmd: "bash build/prebuilts_download.sh".to_string(),
            compile_cmd: "./build.sh --product-name rk3568".to_string(),
            image_list: ["MiniLoaderAll.bin", "parameter.txt", "uboot.img", "system.img"]
                .iter()
                .map(|img| format!("{}/{}", IMAGES, img))
                .collect(),
        }
    }

    pub fn pkg_dir(&self, pkg: &str) -> PathBuf {
        self.workspace.pkg_dir(pkg)
    }

    /// Put every recipe image into the package directory
    pub fn stage(&self, pkg: &str) {
        let dir = self.pkg_dir(pkg);
        std::fs::create_dir_all(&dir).unwrap();
        for image in Self::recipe().image_list {
            let name = image.rsplit('/').next().unwrap().to_string();
            std::fs::write(dir.join(name), b"img").unwrap();
        }
    }

    pub fn resolver(&self) -> PackageResolver {
        let tracked = TrackedSource {
            project_name: "openharmony".to_string(),
            branch: "master".to_string(),
            component: "dayu200".to_string(),
        };
        let steps = StepsPlanner::new(
            "dayu200",
            Arc::new(TagHistorySteps::new(
                self.ci.clone(),
                self.workspace.clone(),
                "openharmony",
                "master",
                "dayu200",
            )),
            Arc::new(DailyBuildSteps::new(
                self.ci.clone(),
                "openharmony",
                "master",
                "dayu200",
            )),
        );
        PackageResolver::new(
            self.workspace.clone(),
            Arc::new(TarGzArchiver),
            CiPoller::new(self.ci.clone(), Duration::from_secs(600)),
            NewerSource::Ci,
            tracked,
            steps,
        )
    }

    pub fn builder(&self) -> RemoteBuilder {
        let pool = BuildServerPool::new(vec![BuildServer {
            addr: "10.0.0.5".to_string(),
            user: "builder".to_string(),
            password: String::new(),
            workspace: "/data/ws".to_string(),
        }]);
        RemoteBuilder::new(
            self.workspace.clone(),
            Arc::new(pool),
            self.transport.clone(),
            ManifestSource {
                url: "https://gitee.com/openharmony/manifest.git".to_string(),
                branch: "master".to_string(),
            },
        )
    }

    pub fn flasher(&self, tool: Arc<FakeTool>, link: Arc<FakeLink>) -> Flasher {
        let locations = HashMap::from([("dev".to_string(), "1".to_string())]);
        Flasher::new(tool, link, Arc::new(LocationCache::new(locations)))
    }
}
