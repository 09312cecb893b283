//! Type-safe `keystone-manage` invocations.
//!
//! Each subcommand the graph declares is a struct implementing [`ManageArgs`],
//! so flag names are fixed in one place instead of assembled from strings at
//! every call site.

use crate::host::CommandSpec;

/// Binary every subcommand is run through.
pub const KEYSTONE_MANAGE: &str = "keystone-manage";

/// Trait for typed `keystone-manage` arguments.
///
/// # Contract
///
/// - `subcommand()`: the subcommand name (e.g. `db_sync`).
/// - `to_cli_args()`: flags after the subcommand, exactly as the tool expects.
pub trait ManageArgs {
    fn subcommand(&self) -> &'static str;

    fn to_cli_args(&self) -> Vec<String>;

    /// Full command line, not yet bound to a user.
    fn to_command(&self) -> CommandSpec {
        let mut argv = vec![KEYSTONE_MANAGE.to_string(), self.subcommand().to_string()];
        argv.extend(self.to_cli_args());
        CommandSpec::new(argv)
    }
}

/// `keystone-manage db_sync`
#[derive(Debug, Clone, Default)]
pub struct DbSync;

impl ManageArgs for DbSync {
    fn subcommand(&self) -> &'static str {
        "db_sync"
    }

    fn to_cli_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// `keystone-manage pki_setup --keystone-user U --keystone-group G`
#[derive(Debug, Clone)]
pub struct PkiSetup {
    pub user: String,
    pub group: String,
}

impl ManageArgs for PkiSetup {
    fn subcommand(&self) -> &'static str {
        "pki_setup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--keystone-user".to_string(),
            self.user.clone(),
            "--keystone-group".to_string(),
            self.group.clone(),
        ]
    }
}
