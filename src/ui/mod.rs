//! Terminal output and operator prompts
//!
//! Uses `cliclack` in a terminal and falls back to plain lines in CI or when
//! output is piped.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_error, outro_success, remark, step_error_detail, step_info, step_ok,
    verdict,
};
pub use progress::TaskSpinner;
pub use prompts::{ask_line, select};
pub use theme::{init_theme, FirmloopTheme};
