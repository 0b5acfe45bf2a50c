use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tokenkeeper", about = "Access/refresh token service")]
pub struct Cli {
    /// Path to a settings file, without or with the .toml extension.
    #[arg(long)]
    pub settings: Option<String>,

    /// Print the Argon2 PHC hash of this password (for `identity.users`) and exit.
    #[arg(long, value_name = "PASSWORD")]
    pub hash_password: Option<String>,
}
