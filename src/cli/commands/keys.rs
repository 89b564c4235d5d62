use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("rsa-private-key")
                .long("rsa-private-key")
                .help("Path to the RSA private key used to sign tokens (PEM)")
                .env("SSO_RSA_PRIVATE_KEY_PATH")
                .required(true),
        )
        .arg(
            Arg::new("rsa-public-key")
                .long("rsa-public-key")
                .help("Path to the matching RSA public key (PEM)")
                .env("SSO_RSA_PUBLIC_KEY_PATH")
                .required(true),
        )
}
