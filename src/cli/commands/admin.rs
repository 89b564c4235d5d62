use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("admin-email")
                .long("admin-email")
                .help("Administrator account ensured at every start")
                .env("SSO_ADMIN_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new("admin-password")
                .long("admin-password")
                .help("Administrator password, only used when the account is created")
                .env("SSO_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .help("Role catalog (JSON), replaces the built-in roles and permissions")
                .env("SSO_CATALOG"),
        )
        .arg(
            Arg::new("allowed-redirects")
                .long("allowed-redirects")
                .help("Comma separated origins accepted as login redirect_url (default: any)")
                .env("SSO_ALLOWED_REDIRECTS")
                .value_delimiter(','),
        )
}
