use anyhow::anyhow;
use clap::ArgMatches;
use kernel::Role;
use server::config::Config;
use server::policy::Actor;
use server::service::FileShare;

use super::{
    BOOTSTRAP_SUBCOMMAND, CREATE_SUBCOMMAND, LIST_SUBCOMMAND, PASSWD_SUBCOMMAND,
    REMOVE_SUBCOMMAND,
};

/// Identity used for account management from the command line.
const LOCAL_ADMIN: &str = "local-admin";

pub fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let share = FileShare::open(&config)?;
    let actor = Actor::User {
        username: LOCAL_ADMIN.to_owned(),
        role: Role::Admin,
    };

    if let Some(m) = matches.subcommand_matches(CREATE_SUBCOMMAND) {
        let role = if m.get_flag("admin") {
            Role::Admin
        } else {
            Role::Standard
        };
        let account =
            share.create_account(&actor, value(m, "username")?, value(m, "password")?, role)?;
        println!("created {} ({})", account.username, account.role);
    } else if let Some(m) = matches.subcommand_matches(BOOTSTRAP_SUBCOMMAND) {
        let created = share.bootstrap(value(m, "password")?)?;
        if created.is_empty() {
            println!("all admins already exist");
        }
        for username in created {
            println!("created {username} (admin)");
        }
    } else if matches.subcommand_matches(LIST_SUBCOMMAND).is_some() {
        for account in share.accounts(&actor)? {
            let protected = if config.admins.contains(&account.username) {
                " protected"
            } else {
                ""
            };
            println!("{:<32} {}{protected}", account.username, account.role);
        }
    } else if let Some(m) = matches.subcommand_matches(REMOVE_SUBCOMMAND) {
        let username = value(m, "username")?;
        let result = share.delete_account(&actor, username)?;
        println!("removed {username} and {} file(s)", result.files);
    } else if let Some(m) = matches.subcommand_matches(PASSWD_SUBCOMMAND) {
        let old = value(m, "old")?;
        let owner = share.login(value(m, "username")?, old)?;
        share.change_password(&owner, old, value(m, "new")?)?;
        println!("password changed");
    }
    Ok(())
}

fn value<'a>(matches: &'a ArgMatches, id: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing --{id}"))
}
