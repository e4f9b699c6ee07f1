//! Tester factory

use crate::config::schema::{TesterConfig, TesterKind};
use crate::error::{FirmloopError, FirmloopResult};
use crate::tester::{CommandTester, ManualTester, PkgAvailableTester, Tester};
use crate::ui::UiContext;
use std::sync::Arc;

/// Create the tester selected by `tester.kind`
pub fn create_tester(config: &TesterConfig, ui: UiContext) -> FirmloopResult<Arc<dyn Tester>> {
    Ok(match config.kind {
        TesterKind::Command => {
            if config.command.tool.is_empty() {
                return Err(FirmloopError::User(
                    "tester.command.tool must be set for the command tester".to_string(),
                ));
            }
            Arc::new(CommandTester::new(&config.command))
        }
        TesterKind::Manual => Arc::new(ManualTester::new(ui)),
        TesterKind::PkgAvailable => Arc::new(PkgAvailableTester::new()),
    })
}
