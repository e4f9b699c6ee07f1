//! Firmware packages: naming, workspace storage, resolution and retention

pub mod archive;
pub mod naming;
pub mod resolver;
pub mod retention;
pub mod steps;
pub mod workspace;

pub use archive::{Archiver, TarGzArchiver};
pub use resolver::{NewerSource, PackageResolver, TrackedSource};
pub use retention::{RetentionHandle, RetentionSweeper};
pub use steps::{DailyBuildSteps, StepsPlanner, StepsSource, TagHistorySteps};
pub use workspace::{PackageLease, SweepMark, Workspace};
