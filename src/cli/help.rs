use super::commands::{CommandDefinition, CommandRegistry};
use super::output;

pub fn print_overview(registry: &CommandRegistry) {
    output::section("Available commands");
    for entry in registry.iter() {
        output::row(format!("{:<14} {}", entry.name, entry.description));
    }
    output::info("Use `help <command>` for details.");
}

pub fn print_command(entry: &CommandDefinition) {
    output::section(format!("Help: {}", entry.name));
    output::row(format!("Description: {}", entry.description));
    output::row(format!("Usage: {}", entry.usage));
}
