//! Configuration schema for firmloop
//!
//! Configuration is stored at `~/.config/firmloop/config.toml`

use crate::error::{FirmloopError, FirmloopResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local package workspace and archive
    pub workspace: WorkspaceConfig,

    /// CI daily-build service
    pub ci: CiConfig,

    /// Source tree the packages are built from
    pub source: SourceConfig,

    /// Which package manager backend to use
    pub manager: ManagerConfig,

    /// Flashable board settings
    pub board: BoardConfig,

    /// Build-only backend settings
    pub build: BuildOnlyConfig,

    /// Managed devices
    pub devices: DevicesConfig,

    /// Remote build farm
    pub build_servers: Vec<BuildServerConfig>,

    /// SSH transport settings
    pub ssh: SshConfig,

    /// Test runner settings
    pub tester: TesterConfig,
}

impl Config {
    /// Check cross-section invariants that serde cannot express
    pub fn validate(&self) -> FirmloopResult<()> {
        let devices = self.devices.list.len();
        let locations = self.board.location_ids.len();
        if locations != 0 && devices != locations {
            return Err(FirmloopError::ConfigMismatch { devices, locations });
        }

        if self.ci.poll_interval_secs == 0 {
            return Err(invalid("ci.poll_interval_secs", "must be at least 1"));
        }
        if self.ci.dir_scan_interval_secs == 0 {
            return Err(invalid("ci.dir_scan_interval_secs", "must be at least 1"));
        }

        let (section, pre_compile_cmd, compile_cmd, image_list) = match self.manager.kind {
            ManagerKind::Board => (
                "board",
                &self.board.pre_compile_cmd,
                &self.board.compile_cmd,
                &self.board.image_list,
            ),
            ManagerKind::BuildOnly => (
                "build",
                &self.build.pre_compile_cmd,
                &self.build.compile_cmd,
                &self.build.image_list,
            ),
        };
        if pre_compile_cmd.trim().is_empty() {
            return Err(invalid(format!("{}.pre_compile_cmd", section), "must not be empty"));
        }
        if compile_cmd.trim().is_empty() {
            return Err(invalid(format!("{}.compile_cmd", section), "must not be empty"));
        }
        if image_list.is_empty() {
            return Err(invalid(format!("{}.image_list", section), "must list at least one image"));
        }
        Ok(())
    }
}

fn invalid(key: impl Into<String>, reason: &str) -> FirmloopError {
    FirmloopError::ConfigValue {
        key: key.into(),
        reason: reason.to_string(),
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Workspace layout and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one subdirectory per package
    pub root: PathBuf,

    /// Directory holding `<package>.tar.gz` archives
    pub archive_dir: PathBuf,

    /// Package contents older than this are pruned (0 = never)
    pub retention_days: u32,

    /// Hours between retention sweeps
    pub sweep_interval_hours: u32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspace"),
            archive_dir: PathBuf::from("archive"),
            retention_days: 7,
            sweep_interval_hours: 24,
        }
    }
}

/// CI service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    /// Poll the CI service instead of scanning the archive directory
    pub watch: bool,

    /// Daily builds query endpoint
    pub daily_builds_url: String,

    /// Manifest tag query endpoint
    pub tags_url: String,

    /// Project name sent with every query
    pub project_name: String,

    /// Seconds between CI polls
    pub poll_interval_secs: u64,

    /// Seconds between archive directory scans
    pub dir_scan_interval_secs: u64,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            watch: false,
            daily_builds_url: "http://ci.openharmony.cn/api/ci-backend/ci-portal/v1/dailybuilds"
                .to_string(),
            tags_url: "http://ci.openharmony.cn/api/ci-backend/ci-portal/v1/build/tag".to_string(),
            project_name: "openharmony".to_string(),
            poll_interval_secs: 600,
            dir_scan_interval_secs: 10,
        }
    }
}

/// Source tree settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Component name, also the package name prefix
    pub component: String,

    /// Branch queried on the CI service
    pub branch: String,

    /// Upstream manifest repository
    pub manifest_url: String,

    /// Manifest branch passed to `repo init`
    pub manifest_branch: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            component: "dayu200".to_string(),
            branch: "master".to_string(),
            manifest_url: "https://gitee.com/openharmony/manifest.git".to_string(),
            manifest_branch: "master".to_string(),
        }
    }
}

/// Package manager backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    /// Build when missing, then flash onto a board
    #[default]
    Board,
    /// Only verify that packages build
    BuildOnly,
}

/// Manager selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub kind: ManagerKind,
}

/// Board flashing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Flashing tool executable
    pub flash_tool: String,

    /// Device connector executable (defaults to `hdc`, then `hdc_std`)
    pub hdc: Option<String>,

    /// Location ids matching `devices.list` one to one (empty = probe)
    pub location_ids: Vec<String>,

    /// Command run on the build server before compiling
    pub pre_compile_cmd: String,

    /// Compile command
    pub compile_cmd: String,

    /// Images collected from the build server, relative to its workspace
    pub image_list: Vec<String>,
}

const RK3568_IMAGES: &str = "out/rk3568/packages/phone/images";

impl Default for BoardConfig {
    fn default() -> Self {
        let image_list = [
            "MiniLoaderAll.bin",
            "boot_linux.img",
            "parameter.txt",
            "system.img",
            "uboot.img",
            "userdata.img",
            "vendor.img",
            "resource.img",
            "config.cfg",
            "ramdisk.img",
            "sys_prod.img",
            "chip_prod.img",
            "updater.img",
        ]
        .iter()
        .map(|img| format!("{}/{}", RK3568_IMAGES, img))
        .collect();

        Self {
            flash_tool: "upgrade_tool".to_string(),
            hdc: None,
            location_ids: vec![],
            pre_compile_cmd: [
                "rm -rf prebuilts/clang/ohos/darwin-x86_64/clang-480513",
                "rm -rf prebuilts/clang/ohos/windows-x86_64/clang-480513",
                "rm -rf prebuilts/clang/ohos/linux-x86_64/clang-480513",
                "bash build/prebuilts_download.sh",
            ]
            .join(";"),
            compile_cmd: [
                "echo 'start'",
                "export NO_DEVTOOL=1",
                "export CCACHE_LOG_SUFFIX=\"dayu200-arm32\"",
                "export CCACHE_NOHASHDIR=\"true\"",
                "export CCACHE_SLOPPINESS=\"include_file_ctime\"",
                "./build.sh --product-name rk3568 --ccache --build-target make_all --gn-args enable_notice_collection=false",
            ]
            .join(" && "),
            image_list,
        }
    }
}

/// Build-only backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOnlyConfig {
    /// Command run on the build server before compiling
    pub pre_compile_cmd: String,

    /// Compile command
    pub compile_cmd: String,

    /// Images collected from the build server, relative to its workspace
    pub image_list: Vec<String>,
}

/// Managed devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Device serial numbers
    pub list: Vec<String>,
}

/// One pooled build server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildServerConfig {
    /// Host or host:port
    pub addr: String,

    /// Login user
    pub user: String,

    /// Password (empty = key based login)
    pub password: String,

    /// Remote directory the source tree is synced into
    pub workspace: String,
}

/// SSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Attempts per retried remote command or transfer
    pub attempts: u32,

    /// Seconds between attempts
    pub retry_delay_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

/// Test runner backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TesterKind {
    /// External test tool writing a JSON result file
    Command,
    /// Operator types the verdict
    Manual,
    /// Passes when the package holds any image
    #[default]
    PkgAvailable,
}

/// Test runner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub kind: TesterKind,

    /// Settings for the command runner
    pub command: CommandTesterConfig,
}

/// Command runner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTesterConfig {
    /// Test tool executable
    pub tool: String,

    /// Space separated arguments passed before the generated ones
    pub param: String,

    /// Directory the tool writes its result file into
    pub result_path: PathBuf,

    /// Result file name
    pub result_file: String,
}
