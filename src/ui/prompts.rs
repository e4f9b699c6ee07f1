//! Operator prompts with a line-based fallback

use super::context::UiContext;
use crate::error::{FirmloopError, FirmloopResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Pick one of `options` (value, label, hint)
pub async fn select<T: Clone + Send + Eq + 'static>(
    message: &str,
    options: &[(T, &str, &str)],
) -> FirmloopResult<T> {
    let message = message.to_string();
    let items: Vec<(T, String, String)> = options
        .iter()
        .map(|(v, l, h)| (v.clone(), l.to_string(), h.to_string()))
        .collect();

    tokio::task::spawn_blocking(move || {
        let mut select = cliclack::select(&message);
        for (value, label, hint) in items {
            select = select.item(value, label, hint);
        }
        select.interact()
    })
    .await
    .map_err(|e| FirmloopError::User(format!("Select task failed: {}", e)))?
    .map_err(|e| FirmloopError::User(format!("Select failed: {}", e)))
}

/// Ask on stdout and read answers from stdin until `parse` accepts one
pub async fn ask_line<T>(
    ctx: &UiContext,
    message: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> FirmloopResult<T> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let prompt = if ctx.use_fancy_output() {
            format!("{}\n", console::style(message).bold())
        } else {
            format!("{}\n", message)
        };
        stdout
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| FirmloopError::io("writing prompt", e))?;
        stdout
            .flush()
            .await
            .map_err(|e| FirmloopError::io("writing prompt", e))?;

        let line = lines
            .next_line()
            .await
            .map_err(|e| FirmloopError::io("reading answer", e))?
            .ok_or_else(|| FirmloopError::User("stdin closed before an answer".to_string()))?;
        if let Some(answer) = parse(&line) {
            return Ok(answer);
        }
    }
}
