//! Line-oriented shell over [`crate::core::LedgerManager`]. Set
//! `MONEY_LEDGER_CLI_SCRIPT` to read commands from stdin without prompts.

pub mod commands;
pub mod core;
pub mod help;
pub mod output;
mod shell;

pub use self::core::{CliError, CliMode, CommandError, ShellContext};
pub use shell::{run_cli, run_lines};
