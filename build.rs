use std::env;
use std::process::Command;

/// Embeds the commit the crate was built from. Builds outside a git checkout
/// fall back to `unknown`.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let commit = command_stdout("git", &["rev-parse", "--short=10", "HEAD"]);
    let dirty = command_stdout("git", &["status", "--porcelain", "--untracked-files=no"])
        .map(|changes| !changes.is_empty());
    let revision = match (commit, dirty) {
        (Some(commit), Some(true)) => format!("{commit}+modified"),
        (Some(commit), _) => commit,
        (None, _) => "unknown".to_string(),
    };

    emit("MONEY_LEDGER_REVISION", &revision);
    emit("MONEY_LEDGER_TARGET", &env::var("TARGET").unwrap_or_default());
    emit("MONEY_LEDGER_PROFILE", &env::var("PROFILE").unwrap_or_default());
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env={key}={value}");
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string())
}
