//! Launch flags shared by every host binary.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::config::{ConfigError, ConfigFormat, ConfigStore};
use crate::runtime::RoleSelection;

/// Where the catalog lives and which roles to run.
pub trait LaunchFlags {
    fn config_path(&self) -> &Path;
    fn config_format(&self) -> Option<ConfigFormat>;
    fn roles(&self) -> RoleSelection;
}

/// Common flags, flattened into a binary's own `clap` parser.
#[derive(Debug, Clone, Args)]
pub struct LaunchArgs {
    /// Path to the service catalog
    #[arg(short, long, default_value = "config/rolehost.json")]
    pub config: PathBuf,

    /// Catalog format; inferred from the extension when omitted
    #[arg(long = "config-type", value_enum)]
    pub config_type: Option<ConfigFormat>,

    /// Roles to run, separated by ';' or ','. "all" runs every registered service
    #[arg(short, long, default_value = "all")]
    pub roles: String,
}

impl LaunchFlags for LaunchArgs {
    fn config_path(&self) -> &Path {
        &self.config
    }

    fn config_format(&self) -> Option<ConfigFormat> {
        self.config_type
    }

    fn roles(&self) -> RoleSelection {
        RoleSelection::parse(&self.roles)
    }
}

/// Load the catalog named by the flags.
///
/// # Errors
/// Propagates [`ConfigError`] from [`ConfigStore::load`].
pub fn load_config(flags: &impl LaunchFlags) -> Result<ConfigStore, ConfigError> {
    ConfigStore::load(flags.config_path(), flags.config_format())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        launch: LaunchArgs,
    }

    #[test]
    fn defaults_select_all_roles() {
        let cli = Cli::parse_from(["host"]);
        assert_eq!(cli.launch.config_path(), Path::new("config/rolehost.json"));
        assert_eq!(cli.launch.config_format(), None);
        assert_eq!(cli.launch.roles(), RoleSelection::All);
    }

    #[test]
    fn explicit_flags_are_parsed() {
        let cli = Cli::parse_from([
            "host",
            "--config",
            "/etc/rolehost/catalog.conf",
            "--config-type",
            "yaml",
            "--roles",
            "chat;login",
        ]);
        assert_eq!(cli.launch.config_format(), Some(ConfigFormat::Yaml));
        assert_eq!(
            cli.launch.roles(),
            RoleSelection::Named(vec!["chat".into(), "login".into()])
        );
    }
}
