use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("redis-url")
                .long("redis-url")
                .help("Code store address, `host:port` or `redis://host:port/db`")
                .env("SSO_REDIS_URL")
                .default_value("localhost:6379"),
        )
        .arg(
            Arg::new("redis-password")
                .long("redis-password")
                .help("Code store password")
                .env("SSO_REDIS_PASSWORD")
                .hide_env_values(true),
        )
}
