//! Package naming conventions
//!
//! Package and archive names embed a `YYYYMMDD_HHMMSS` timestamp, e.g.
//! `dayu200_20230101_120000_build_fail`. The timestamp orders archives in
//! directory scans and bounds the manifest tag window for failed builds.

use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Suffix of package archives
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Suffix of placeholder packages for builds that failed upstream
pub const BUILD_FAIL_SUFFIX: &str = "_build_fail";

/// Manifest snapshot kept in every package directory
pub const MANIFEST_TAG_FILE: &str = "manifest_tag.xml";

/// Defect marker kept in every package directory
pub const LAST_ISSUE_FILE: &str = "__last_issue__";

/// chrono format of the embedded timestamp
pub const TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{8}_\d{6}").expect("valid timestamp regex"))
}

/// Parse the first embedded timestamp of a package or archive name.
pub fn parse_time(name: &str) -> Option<NaiveDateTime> {
    time_pattern()
        .find_iter(name)
        .find_map(|m| NaiveDateTime::parse_from_str(m.as_str(), TIME_FORMAT).ok())
}

/// Format a timestamp the way package names embed it.
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Name of the placeholder package for a failed build of `component`.
pub fn failed_package_name(component: &str, fail_time: &NaiveDateTime) -> String {
    format!("{}_{}{}", component, format_time(fail_time), BUILD_FAIL_SUFFIX)
}

/// Name of the package built from the manifest snapshot taken at `time`.
pub fn snapshot_package_name(component: &str, time: &NaiveDateTime) -> String {
    format!("{}_{}", component, format_time(time))
}

/// Whether `package` is a known build failure placeholder.
pub fn is_build_fail(package: &str) -> bool {
    package.contains(BUILD_FAIL_SUFFIX)
}

/// Archive file name of `package`.
pub fn archive_name(package: &str) -> String {
    format!("{}{}", package, ARCHIVE_SUFFIX)
}

/// Package name of an archive file name (suffix stripped if present).
pub fn package_name(archive: &str) -> &str {
    archive.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(archive)
}

/// Last path segment of a URL or remote path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// File name of an image path as stored in the package directory.
pub fn image_basename(image: &str) -> &str {
    Path::new(image)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(image)
}
