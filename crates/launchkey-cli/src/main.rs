use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use launchkey_core::config::ENV_KEYPAIR_PASSPHRASE;
use launchkey_core::{Client, Config, DeorbitVerdict, HttpTransport, Keypair, DEFAULT_KEY_BITS};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const GENERATED_PASSPHRASE_LEN: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "launchkey", author, version, about = "LaunchKey application toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an application keypair
    Keygen {
        /// Where to write the PEM file
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
        /// Prompt for the passphrase instead of generating one
        #[arg(long)]
        prompt: bool,
    },
    /// Print the fingerprint of a keypair file
    Fingerprint {
        #[arg(long)]
        keypair: PathBuf,
    },
    /// Resync with the service and report the clock skew
    Ping,
    /// Start an authorization for a user
    Authorize { username: String },
    /// Poll an outstanding auth request
    Poll { auth_request: String },
    /// Decrypt an auth response and log the decision
    Authorized { auth_response: String },
    /// Log the end of a user session
    Deauthorize { auth_request: String },
    /// Verify a deorbit webhook delivery
    Deorbit {
        #[arg(long)]
        signature: String,
        #[arg(long)]
        payload: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen { out, bits, prompt } => keygen_command(&out, bits, prompt),
        Commands::Fingerprint { keypair } => fingerprint_command(&keypair),
        Commands::Ping => {
            let snapshot = connect()?.ping()?;
            println!("peer key: {}", snapshot.peer_key.fingerprint());
            println!("skew: {}s", snapshot.sync.skew().num_seconds());
            Ok(())
        }
        Commands::Authorize { username } => {
            let auth_request = connect()?.authorize(&username)?;
            println!("{auth_request}");
            Ok(())
        }
        Commands::Poll { auth_request } => {
            match connect()?.poll_request(&auth_request)? {
                Some(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                None => println!("pending"),
            }
            Ok(())
        }
        Commands::Authorized { auth_response } => {
            let accepted = connect()?.authorized(&auth_response)?;
            println!("{}", if accepted { "accepted" } else { "denied" });
            Ok(())
        }
        Commands::Deauthorize { auth_request } => {
            let logged = connect()?.deauthorize(&auth_request)?;
            println!("{}", if logged { "revoked" } else { "not acknowledged" });
            Ok(())
        }
        Commands::Deorbit { signature, payload } => {
            match connect()?.deorbit(&signature, &payload)? {
                DeorbitVerdict::Authentic { user_hash, stamped } => {
                    println!("authentic: user {user_hash} at {stamped}");
                    Ok(())
                }
                DeorbitVerdict::Rejected(reason) => Err(anyhow!("deorbit rejected: {reason:?}")),
            }
        }
    }
}

fn connect() -> Result<Client<HttpTransport>> {
    let config = Config::from_env().context("loading configuration from environment")?;
    let credentials = config.validate()?;
    let transport = HttpTransport::new(&config)?;
    info!(app_id = credentials.app_id, endpoint = %config.endpoint, "client ready");
    Ok(Client::new(credentials, transport))
}

fn keygen_command(out: &Path, bits: usize, prompt: bool) -> Result<()> {
    if out.exists() {
        return Err(anyhow!("refusing to overwrite {}", out.display()));
    }
    let passphrase = if prompt {
        prompt_passphrase_twice()?
    } else {
        generate_passphrase(GENERATED_PASSPHRASE_LEN)
    };
    info!(bits, "generating keypair");
    let keypair = Keypair::generate(bits)?;
    let pem = keypair.export(Some(passphrase.as_str()))?;
    std::fs::write(out, pem.as_bytes())
        .with_context(|| format!("writing {}", out.display()))?;

    println!("Keypair written to {}", out.display());
    println!("Fingerprint: {}", keypair.fingerprint());
    if !prompt {
        println!("Passphrase: {}", passphrase.as_str());
    }
    Ok(())
}

fn fingerprint_command(path: &Path) -> Result<()> {
    let raw = Zeroizing::new(
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
    );
    let passphrase = std::env::var(ENV_KEYPAIR_PASSPHRASE)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new);
    let keypair = Keypair::load(raw.as_slice(), passphrase.as_deref().map(String::as_str))?;
    println!("{}", keypair.fingerprint());
    Ok(())
}

fn generate_passphrase(len: usize) -> Zeroizing<String> {
    Zeroizing::new(
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect(),
    )
}

fn prompt_passphrase_twice() -> Result<Zeroizing<String>> {
    let first = Zeroizing::new(
        rpassword::prompt_password("Keypair passphrase: ")
            .map_err(|e| anyhow!("passphrase prompt: {e}"))?,
    );
    if first.is_empty() {
        return Err(anyhow!("passphrase cannot be empty"));
    }
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm passphrase: ")
            .map_err(|e| anyhow!("passphrase prompt: {e}"))?,
    );
    if *first != *second {
        return Err(anyhow!("passphrases do not match"));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passphrase_is_alphanumeric() {
        let pw = generate_passphrase(GENERATED_PASSPHRASE_LEN);
        assert_eq!(pw.len(), GENERATED_PASSPHRASE_LEN);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(*pw, *generate_passphrase(GENERATED_PASSPHRASE_LEN));
    }

    #[test]
    fn keygen_writes_loadable_file_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("app.pem");
        keygen_command(&out, 1024, false).unwrap();

        let pem = std::fs::read_to_string(&out).unwrap();
        assert!(pem.contains("ENCRYPTED PRIVATE KEY"));
        assert!(keygen_command(&out, 1024, false).is_err());
    }

    #[test]
    fn cli_parses_deorbit() {
        let cli = Cli::try_parse_from([
            "launchkey",
            "deorbit",
            "--signature",
            "c2ln",
            "--payload",
            "{}",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Deorbit { .. }));
    }
}
