//! CI daily build integration

pub mod client;
pub mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{CiClient, DailyBuild, DailyBuildSource, DailyBuildsQuery, TagQuery, TagRecord};
pub use poller::CiPoller;
