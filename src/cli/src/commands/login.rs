//! `tedge-oscar login` command - Store registry credentials.

use std::path::Path;

use clap::Args;
use oscar_runtime::oci::CredentialStore;

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (e.g. ghcr.io)
    pub server: String,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn execute(args: LoginArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let username = match args.username {
        Some(u) => u,
        None => {
            eprint!("Username: ");
            read_line()?
        }
    };

    let password = if args.password_stdin {
        read_line()?
    } else {
        match args.password {
            Some(p) => p,
            None => {
                eprint!("Password: ");
                read_line()?
            }
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    let path = config
        .credential_store_path()
        .ok_or("No location available for the credential store")?;
    let store = CredentialStore::new(path);
    store.store(&args.server, &username, &password)?;
    tracing::info!(registry = %args.server, path = %store.path().display(), "Credentials stored");

    println!("Login Succeeded");
    Ok(())
}

fn read_line() -> std::io::Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
