use crate::sso::config::DEFAULT_DB_SCHEMA;
use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("db-host")
                .long("db-host")
                .help("PostgreSQL host")
                .env("SSO_DB_HOST")
                .required(true),
        )
        .arg(
            Arg::new("db-port")
                .long("db-port")
                .help("PostgreSQL port")
                .env("SSO_DB_PORT")
                .default_value("5432")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("db-user")
                .long("db-user")
                .help("PostgreSQL user")
                .env("SSO_DB_USER")
                .required(true),
        )
        .arg(
            Arg::new("db-password")
                .long("db-password")
                .help("PostgreSQL password")
                .env("SSO_DB_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("db-name")
                .long("db-name")
                .help("PostgreSQL database name")
                .env("SSO_DB_NAME")
                .required(true),
        )
        .arg(
            Arg::new("db-schema")
                .long("db-schema")
                .help("Schema used as search_path")
                .env("SSO_DB_SCHEMA")
                .default_value(DEFAULT_DB_SCHEMA),
        )
}
