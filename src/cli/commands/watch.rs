//! Watch command - flash and test every newer package

use crate::cli::args::WatchArgs;
use crate::cli::commands::{interrupt_token, select_device};
use crate::config::Config;
use crate::error::FirmloopResult;
use crate::flow::{flash_and_test, FlashAndTest};
use crate::manager::ManagerRuntime;
use crate::tester::create_tester;
use crate::ui::{self, UiContext};
use tracing::info;

/// Execute the watch command
pub async fn execute(args: WatchArgs, config: &Config) -> FirmloopResult<()> {
    let ctx = UiContext::detect();
    let device = select_device(config, args.target.device.as_deref())?;
    let tester = create_tester(&config.tester, ctx.clone())?;
    let runtime = ManagerRuntime::start(config)?;
    let manager = runtime.manager();
    let cancel = interrupt_token();

    ui::intro(&ctx, "firmloop watch");
    ui::key_value(&ctx, "Manager", manager.name());
    ui::key_value(&ctx, "Tester", tester.task_name());

    let test_case = args.target.test_case;
    let once = args.once;
    let mut current = args.from;
    let outcome: FirmloopResult<()> = async {
        loop {
            let next = manager.get_newer(&current, &cancel).await?;
            ui::step_info(&ctx, &format!("New package {}", next));

            let opt = FlashAndTest {
                version: &next,
                device: &device,
                test_case: test_case.as_deref(),
            };
            match flash_and_test(manager.as_ref(), tester.as_ref(), opt, &cancel).await {
                Ok(verdict) if verdict.passed() => ui::step_ok(&ctx, &format!("{} passed", next)),
                Ok(_) => {
                    let issue = manager.last_issue(&next).await.unwrap_or_default();
                    let detail = if issue.is_empty() { "test failed" } else { issue.as_str() };
                    ui::step_error_detail(&ctx, &next, detail);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => ui::step_error_detail(&ctx, &next, &e.to_string()),
            }

            current = next;
            if once {
                return Ok(());
            }
        }
    }
    .await;
    runtime.shutdown().await;

    match outcome {
        Err(e) if e.is_cancelled() => {
            info!("Watch stopped at {}", current);
            ui::outro_success(&ctx, "Stopped");
            Ok(())
        }
        Err(e) => Err(e),
        Ok(()) => {
            ui::outro_success(&ctx, "Done");
            Ok(())
        }
    }
}
