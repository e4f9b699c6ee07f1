//! Run command - flash one package and test it

use crate::cli::args::RunArgs;
use crate::cli::commands::{interrupt_token, select_device};
use crate::config::Config;
use crate::error::{FirmloopError, FirmloopResult};
use crate::flow::{flash_and_test, FlashAndTest};
use crate::manager::ManagerRuntime;
use crate::tester::{create_tester, ResultStatus};
use crate::ui::{self, UiContext};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> FirmloopResult<()> {
    let ctx = UiContext::detect();
    let device = select_device(config, args.target.device.as_deref())?;
    let tester = create_tester(&config.tester, ctx.clone())?;
    let runtime = ManagerRuntime::start(config)?;
    let manager = runtime.manager();
    let cancel = interrupt_token();

    ui::intro(&ctx, &format!("firmloop run {}", args.package));
    ui::key_value(&ctx, "Manager", manager.name());
    ui::key_value(&ctx, "Tester", tester.task_name());
    if device.is_empty() {
        ui::remark(&ctx, "No device configured, using whichever board is attached");
    } else {
        ui::key_value(&ctx, "Device", &device);
    }

    let opt = FlashAndTest {
        version: &args.package,
        device: &device,
        test_case: args.target.test_case.as_deref(),
    };
    let outcome = flash_and_test(manager.as_ref(), tester.as_ref(), opt, &cancel).await;
    runtime.shutdown().await;

    let verdict = outcome.inspect_err(|e| {
        ui::step_error_detail(&ctx, &format!("{} did not complete", args.package), &e.to_string())
    })?;
    for result in &verdict.results {
        ui::verdict(&ctx, &result.test_case_name, result.status == ResultStatus::Pass);
    }

    if verdict.passed() {
        ui::outro_success(&ctx, &format!("{} passed", args.package));
        Ok(())
    } else {
        ui::outro_error(&ctx, &format!("{} failed", args.package));
        Err(FirmloopError::User(format!("{} failed testing", args.package)))
    }
}
