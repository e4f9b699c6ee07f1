//! Newer command - wait for the next package

use crate::cli::args::NewerArgs;
use crate::cli::commands::interrupt_token;
use crate::config::Config;
use crate::error::FirmloopResult;
use crate::manager::ManagerRuntime;
use crate::ui::{TaskSpinner, UiContext};

/// Execute the newer command
pub async fn execute(args: NewerArgs, config: &Config) -> FirmloopResult<()> {
    let runtime = ManagerRuntime::start(config)?;
    let cancel = interrupt_token();

    // Piped output is the package name only
    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    if ctx.use_fancy_output() {
        spinner.start("Waiting for a newer package");
    }

    let newer = runtime.manager().get_newer(&args.current, &cancel).await;
    runtime.shutdown().await;

    match newer {
        Ok(pkg) => {
            if ctx.use_fancy_output() {
                spinner.stop("Found a newer package");
            }
            println!("{}", pkg);
            Ok(())
        }
        Err(e) => {
            if ctx.use_fancy_output() {
                spinner.stop_error("No newer package");
            }
            Err(e)
        }
    }
}
