use crate::{
    cli::actions::{server::Args, Action},
    sso::{
        catalog::AdminSeed,
        config::{DatabaseConfig, ServerConfig, DEFAULT_PORT},
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

fn required(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn database(matches: &clap::ArgMatches) -> Result<DatabaseConfig> {
    let mut database = DatabaseConfig::new(
        required(matches, "db-host")?,
        required(matches, "db-user")?,
        SecretString::from(required(matches, "db-password")?),
        required(matches, "db-name")?,
    );

    if let Some(port) = matches.get_one::<u16>("db-port") {
        database = database.with_port(*port);
    }

    if let Some(schema) = matches.get_one::<String>("db-schema") {
        database = database.with_schema(schema.clone());
    }

    Ok(database)
}

fn admin(matches: &clap::ArgMatches) -> Result<AdminSeed> {
    Ok(AdminSeed {
        email: required(matches, "admin-email")?,
        password: SecretString::from(required(matches, "admin-password")?),
    })
}

fn allowed_redirects(matches: &clap::ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("allowed-redirects")
        .map(|values| {
            values
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(DEFAULT_PORT);

    let config = ServerConfig::new(
        database(matches)?,
        required(matches, "redis-url")?,
        PathBuf::from(required(matches, "rsa-private-key")?),
        PathBuf::from(required(matches, "rsa-public-key")?),
        admin(matches)?,
    )
    .with_port(port)
    .with_redis_password(
        matches
            .get_one::<String>("redis-password")
            .filter(|p| !p.is_empty())
            .map(|p| SecretString::from(p.clone())),
    )
    .with_catalog_path(matches.get_one::<String>("catalog").map(PathBuf::from))
    .with_allowed_redirects(allowed_redirects(matches));

    Ok(Action::Server(Args { config }))
}
