use std::{
    fmt,
    io::{self, BufRead, Write},
};

use shell_words::split;

use super::core::{CliError, CliMode, CommandError, LoopControl, ShellContext};
use super::output;

pub fn run_cli() -> Result<(), CliError> {
    let mode = if std::env::var_os("MONEY_LEDGER_CLI_SCRIPT").is_some() {
        CliMode::Script
    } else {
        CliMode::Interactive
    };
    if mode == CliMode::Script {
        colored::control::set_override(false);
    }

    let mut context = ShellContext::new(mode)?;
    run_lines(&mut context, io::stdin().lock())
}

/// Feeds every line of `input` to the shell until `exit` or end of input.
pub fn run_lines(context: &mut ShellContext, input: impl BufRead) -> Result<(), CliError> {
    let interactive = context.mode == CliMode::Interactive;
    let mut lines = input.lines();
    while context.running {
        if interactive {
            print!("{}", context.prompt());
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            if interactive {
                output::info("Exiting shell.");
            }
            break;
        };
        match handle_line(context, &line?) {
            Ok(LoopControl::Continue) => {}
            Ok(LoopControl::Exit) => break,
            Err(err) => context.report_error(err),
        }
    }
    Ok(())
}

fn handle_line(context: &mut ShellContext, line: &str) -> Result<LoopControl, CommandError> {
    let tokens = match parse_command_line(line) {
        Ok(tokens) => tokens,
        Err(err) => {
            output::warning(err);
            return Ok(LoopControl::Continue);
        }
    };
    let Some(raw) = tokens.first() else {
        return Ok(LoopControl::Continue);
    };
    if raw.starts_with('#') {
        return Ok(LoopControl::Continue);
    }

    let command = raw.to_lowercase();
    let args: Vec<&str> = tokens.iter().skip(1).map(String::as_str).collect();
    context.last_command = Some(line.trim().to_string());

    match context.dispatch(&command, raw, &args) {
        Ok(LoopControl::Exit) => {
            context.running = false;
            Ok(LoopControl::Exit)
        }
        other => other,
    }
}

pub(crate) fn parse_command_line(input: &str) -> Result<Vec<String>, ParseError> {
    split(input).map_err(|err| ParseError {
        message: err.to_string(),
    })
}

#[derive(Debug)]
pub(crate) struct ParseError {
    message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::LedgerManager;

    #[test]
    fn quoted_arguments_stay_together() {
        let tokens = parse_command_line(r#"record Checking -4.50 2025-01-02 "Corner cafe""#).unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[4], "Corner cafe");
        assert!(parse_command_line("record \"unterminated").is_err());
    }

    #[test]
    fn script_stops_at_exit() {
        let manager = LedgerManager::in_memory(LedgerConfig::default()).unwrap();
        let mut context = ShellContext::with_manager(CliMode::Script, manager);
        let script = "account-add Cash cash 5\n# comment\nexit\naccount-add Late cash 1\n";
        run_lines(&mut context, script.as_bytes()).unwrap();
        assert!(!context.running);
        assert_eq!(context.manager.accounts().len(), 1);
    }
}
