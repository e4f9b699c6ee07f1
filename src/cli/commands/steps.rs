//! Steps command - list packages between two packages

use crate::cli::args::StepsArgs;
use crate::config::Config;
use crate::error::FirmloopResult;
use crate::manager::create_manager;

/// Execute the steps command
pub async fn execute(args: StepsArgs, config: &Config) -> FirmloopResult<()> {
    let manager = create_manager(config)?;
    for pkg in manager.steps(&args.from, &args.to).await? {
        println!("{}", pkg);
    }
    Ok(())
}
