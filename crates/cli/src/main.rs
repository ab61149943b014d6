//! Pensiun CLI for signed API requests and signing key management.
//!
//! This tool provides commands for:
//! - Calling the pengecekan endpoint and the pengajuan, users and unit APIs
//! - Signing and verifying payloads offline
//! - Generating, rotating and publishing signing keys
//! - Validating configuration files and computing their hashes

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pensiun_common::logging::init_logger;
use pensiun_common::models::{Method, Resource};
use pensiun_common::request_signing::Algorithm;
use pensiun_common::settings::Settings;

mod api;
mod config;
mod error;
mod hash;
mod keys;
mod sign;

use api::ResourceCall;
use error::CliError;

#[derive(Parser)]
#[command(name = "pensiun")]
#[command(about = "Signed request client for the pensiun APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(long, short, global = true, env = "PENSIUN_CONFIG", default_value = "pensiun.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Signing key management
    Keys {
        /// Key store directory (defaults to signing.key_store_dir)
        #[arg(long, global = true, env = "PENSIUN_KEY_STORE")]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: KeysAction,
    },

    /// Sign a JSON payload and print the token
    Sign {
        /// Payload file, `-` for stdin
        #[arg(long, short)]
        payload: PathBuf,
    },

    /// Verify a token against a JSON payload
    Verify {
        /// Payload file, `-` for stdin
        #[arg(long, short)]
        payload: PathBuf,

        /// Compact token to verify
        #[arg(long, short)]
        token: String,

        /// Also check the signed HTTP method
        #[arg(long, value_parser = parse_method, requires = "path")]
        method: Option<Method>,

        /// Also check the signed path and query
        #[arg(long, requires = "method")]
        path: Option<String>,
    },

    /// Submit a payload to the pengecekan endpoint
    Pengecekan {
        /// Payload file, `-` for stdin
        #[arg(long, short)]
        payload: PathBuf,

        /// Print the signed request without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Call the pengajuan, users or unit APIs
    Resource {
        #[command(subcommand)]
        action: ResourceAction,

        /// Print the signed request without sending it
        #[arg(long, global = true)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config against settings validation
    Validate,

    /// Compute and display config hash (SHA-256)
    Hash {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Hash the raw file without applying environment overrides
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Generate a standalone key file
    Generate {
        #[arg(long, value_parser = parse_algorithm, default_value = "EdDSA")]
        algorithm: Algorithm,

        /// Key id for the printed JWK
        #[arg(long, default_value = "pensiun")]
        kid: String,

        /// Output key file
        #[arg(long, short)]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a new Ed25519 key in the store and make it current
    Rotate {
        /// Key id (defaults to pk-YYYY-MM-DD)
        #[arg(long)]
        kid: Option<String>,
    },

    /// List active key ids
    List,

    /// Remove a key from the published set
    Deactivate { kid: String },

    /// Deactivate a key and delete its material
    Delete { kid: String },

    /// Store an HS256 shared secret read from a file
    AddSecret {
        kid: String,

        #[arg(long)]
        secret_file: PathBuf,
    },

    /// Print the JWKS of active keys
    Jwks {
        /// Print the full discovery document instead
        #[arg(long)]
        discovery: bool,
    },
}

#[derive(Subcommand)]
enum ResourceAction {
    /// List a collection
    List {
        #[arg(value_parser = parse_resource)]
        resource: Resource,

        /// Query parameter as key=value, repeatable
        #[arg(long = "query", short, value_parser = api::parse_query_pair)]
        query: Vec<(String, String)>,
    },

    /// Fetch one record
    Get {
        #[arg(value_parser = parse_resource)]
        resource: Resource,
        id: String,
    },

    /// Create a record from a payload file
    Create {
        #[arg(value_parser = parse_resource)]
        resource: Resource,

        #[arg(long, short)]
        payload: PathBuf,
    },

    /// Replace a record from a payload file
    Update {
        #[arg(value_parser = parse_resource)]
        resource: Resource,
        id: String,

        #[arg(long, short)]
        payload: PathBuf,
    },

    /// Delete a record
    Delete {
        #[arg(value_parser = parse_resource)]
        resource: Resource,
        id: String,
    },
}

#[derive(Clone, ValueEnum, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}

fn parse_method(s: &str) -> Result<Method, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_resource(s: &str) -> Result<Resource, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, settings: Option<&Settings>) -> Result<(), CliError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        settings.map_or(LevelFilter::Info, |s| s.logging.level_filter())
    };
    init_logger(level)?;
    Ok(())
}

/// Loads settings and starts logging at their configured level.
fn settings_with_logging(path: &Path, verbose: bool) -> Result<Settings, CliError> {
    let settings = config::load_settings(path)?;
    init_logging(verbose, Some(&settings))?;
    Ok(settings)
}

fn key_store_dir(store: Option<PathBuf>, config: &Path) -> Result<PathBuf, CliError> {
    if let Some(store) = store {
        return Ok(store);
    }
    config::load_settings(config)?
        .signing
        .key_store_dir
        .ok_or_else(|| CliError::Input("pass --store or set signing.key_store_dir".into()))
}

fn run(cli: Cli) -> Result<(), CliError> {
    let verbose = cli.verbose;

    match cli.command {
        Commands::Config { action } => {
            init_logging(verbose, None)?;
            match action {
                ConfigAction::Validate => config::validate(&cli.config, verbose),
                ConfigAction::Hash { format, raw } => {
                    hash::compute_and_display(&cli.config, &format, raw, verbose)
                }
            }
        }
        Commands::Keys { store, action } => {
            init_logging(verbose, None)?;
            match action {
                KeysAction::Generate {
                    algorithm,
                    kid,
                    out,
                    force,
                } => keys::generate(algorithm, &kid, &out, force),
                KeysAction::Rotate { kid } => {
                    keys::rotate(&key_store_dir(store, &cli.config)?, kid)
                }
                KeysAction::List => keys::list(&key_store_dir(store, &cli.config)?),
                KeysAction::Deactivate { kid } => {
                    keys::deactivate(&key_store_dir(store, &cli.config)?, &kid)
                }
                KeysAction::Delete { kid } => {
                    keys::delete(&key_store_dir(store, &cli.config)?, &kid)
                }
                KeysAction::AddSecret { kid, secret_file } => {
                    keys::add_secret(&key_store_dir(store, &cli.config)?, &kid, &secret_file)
                }
                KeysAction::Jwks { discovery } => {
                    let dir = key_store_dir(store, &cli.config)?;
                    if discovery {
                        let settings = config::load_settings(&cli.config)?;
                        keys::jwks(&dir, Some(&settings.signing))
                    } else {
                        keys::jwks(&dir, None)
                    }
                }
            }
        }
        Commands::Sign { payload } => {
            let settings = settings_with_logging(&cli.config, verbose)?;
            sign::sign(&settings, &payload)
        }
        Commands::Verify {
            payload,
            token,
            method,
            path,
        } => {
            let settings = settings_with_logging(&cli.config, verbose)?;
            let target = match (method, path.as_deref()) {
                (Some(method), Some(path_and_query)) => Some(sign::RequestTarget {
                    method,
                    path_and_query,
                }),
                _ => None,
            };
            sign::verify(&settings, &payload, &token, target)
        }
        Commands::Pengecekan { payload, dry_run } => {
            let settings = settings_with_logging(&cli.config, verbose)?;
            api::pengecekan(settings, &payload, dry_run)
        }
        Commands::Resource { action, dry_run } => {
            let settings = settings_with_logging(&cli.config, verbose)?;
            let (resource, call) = match action {
                ResourceAction::List { resource, query } => {
                    (resource, ResourceCall::List { query })
                }
                ResourceAction::Get { resource, id } => (resource, ResourceCall::Get { id }),
                ResourceAction::Create { resource, payload } => (
                    resource,
                    ResourceCall::Create {
                        payload: api::load_call_payload(&payload)?,
                    },
                ),
                ResourceAction::Update {
                    resource,
                    id,
                    payload,
                } => (
                    resource,
                    ResourceCall::Update {
                        id,
                        payload: api::load_call_payload(&payload)?,
                    },
                ),
                ResourceAction::Delete { resource, id } => {
                    (resource, ResourceCall::Delete { id })
                }
            };
            api::resource(settings, resource, &call, dry_run)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resource_list_with_query() {
        let cli = Cli::try_parse_from([
            "pensiun",
            "resource",
            "list",
            "pengajuan",
            "--query",
            "status=aktif",
            "--dry-run",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Resource {
                action: ResourceAction::List { resource, query },
                dry_run,
            } => {
                assert_eq!(resource, Resource::Pengajuan);
                assert_eq!(query, vec![("status".to_string(), "aktif".to_string())]);
                assert!(dry_run);
            }
            _ => panic!("Expected resource list"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_resource() {
        assert!(Cli::try_parse_from(["pensiun", "resource", "get", "gaji", "1"]).is_err());
    }

    #[test]
    fn test_verify_method_requires_path() {
        assert!(Cli::try_parse_from([
            "pensiun", "verify", "-p", "payload.json", "-t", "token", "--method", "POST",
        ])
        .is_err());
    }
}
