use clap::{arg, command, crate_name, Command};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(
            Command::new(cli::VERSION_SUBCOMMAND)
                .about(cli::VERSION_DESCRIPTION)
                .arg(arg!(--json "Print version information as JSON")),
        )
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::ADMIN_SUBCOMMAND)
                .about(cli::ADMIN_DESCRIPTION)
                .subcommand_required(true)
                .subcommand(
                    Command::new(cli::CREATE_SUBCOMMAND)
                        .about(cli::CREATE_DESCRIPTION)
                        .arg(
                            arg!(-u --username <USERNAME>)
                                .required(true)
                                .help("Login name of the new account"),
                        )
                        .arg(
                            arg!(-p --password <PASSWORD>)
                                .required(true)
                                .help("Initial password"),
                        )
                        .arg(arg!(--admin "Grant the admin role")),
                )
                .subcommand(
                    Command::new(cli::BOOTSTRAP_SUBCOMMAND)
                        .about(cli::BOOTSTRAP_DESCRIPTION)
                        .arg(
                            arg!(-p --password <PASSWORD>)
                                .required(true)
                                .help("Password of the created admins"),
                        ),
                )
                .subcommand(Command::new(cli::LIST_SUBCOMMAND).about(cli::LIST_DESCRIPTION))
                .subcommand(
                    Command::new(cli::REMOVE_SUBCOMMAND)
                        .about(cli::REMOVE_DESCRIPTION)
                        .arg(
                            arg!(-u --username <USERNAME>)
                                .required(true)
                                .help("Account to remove"),
                        ),
                )
                .subcommand(
                    Command::new(cli::PASSWD_SUBCOMMAND)
                        .about(cli::PASSWD_DESCRIPTION)
                        .arg(
                            arg!(-u --username <USERNAME>)
                                .required(true)
                                .help("Account to change"),
                        )
                        .arg(arg!(--old <OLD>).required(true).help("Current password"))
                        .arg(arg!(--new <NEW>).required(true).help("New password")),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .get_matches();

    server::init_tracing();

    if let Some(version_matches) = cli.subcommand_matches(cli::VERSION_SUBCOMMAND) {
        cli::version::run(version_matches.get_flag("json"))
    } else if cli.subcommand_matches(cli::SERVER_SUBCOMMAND).is_some() {
        cli::server::run().await
    } else if let Some(admin_matches) = cli.subcommand_matches(cli::ADMIN_SUBCOMMAND) {
        cli::admin::run(admin_matches)
    } else {
        Ok(())
    }
}
