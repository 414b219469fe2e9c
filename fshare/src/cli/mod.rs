pub mod admin;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the server";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const ADMIN_SUBCOMMAND: &str = "admin";
pub const ADMIN_DESCRIPTION: &str = "Manage accounts directly in the local store";

pub const CREATE_SUBCOMMAND: &str = "create";
pub const CREATE_DESCRIPTION: &str = "Create an account with an empty private area";

pub const BOOTSTRAP_SUBCOMMAND: &str = "bootstrap";
pub const BOOTSTRAP_DESCRIPTION: &str = "Create the configured admin accounts that are missing";

pub const LIST_SUBCOMMAND: &str = "list";
pub const LIST_DESCRIPTION: &str = "List all accounts";

pub const REMOVE_SUBCOMMAND: &str = "remove";
pub const REMOVE_DESCRIPTION: &str = "Remove an account together with its private files";

pub const PASSWD_SUBCOMMAND: &str = "passwd";
pub const PASSWD_DESCRIPTION: &str = "Change the password of an account";
