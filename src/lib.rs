//! firmloop - continuous firmware build, flash and test loop
//!
//! Follows a CI stream of firmware packages, rebuilds missing packages on a
//! pool of SSH build servers, flashes them onto development boards and
//! reports a pass/fail verdict from a pluggable tester.

pub mod ci;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod exec;
pub mod flow;
pub mod manager;
pub mod package;
pub mod remote;
pub mod tester;
pub mod ui;

pub use error::{FirmloopError, FirmloopResult};
