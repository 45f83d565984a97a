/// What `build.rs` recorded about the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMetadata {
    pub version: &'static str,
    /// Short commit hash, suffixed with `+modified` for a dirty checkout.
    pub revision: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
}

pub fn current() -> BuildMetadata {
    BuildMetadata {
        version: env!("CARGO_PKG_VERSION"),
        revision: known(option_env!("MONEY_LEDGER_REVISION")),
        target: known(option_env!("MONEY_LEDGER_TARGET")),
        profile: known(option_env!("MONEY_LEDGER_PROFILE")),
    }
}

fn known(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => "unknown",
    }
}

impl BuildMetadata {
    pub fn summary(&self) -> String {
        format!(
            "money_ledger {} ({}, {} {})",
            self.version, self.revision, self.target, self.profile
        )
    }
}
