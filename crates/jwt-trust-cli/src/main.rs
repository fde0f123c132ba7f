use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use jwt_trust::{
    Claims, FsKeyStore, JwtConfig, KeyStore, ProcessEnv, TokenEngine, VerificationMaterial,
};
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jwt-trust", about = "Sign and verify JWTs against a keys directory")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// TOML config file. Without it JWT_SECRET and JWT_KEYS_DIRECTORY are read.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs as JSON (level is taken from RUST_LOG, default warn)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign a token
    Encode {
        /// Claim as KEY=VALUE; VALUE is read as JSON when it parses, else as text
        #[arg(long = "claim", value_parser = parse_key_val)]
        claims: Vec<(String, String)>,
    },
    /// Verify a token and print its claims
    Decode { token: String },
    /// Show the signing key and the verification pool
    Keys,
    /// Print the environment variable that holds an issuer's trusted key
    IssuerVar { issuer: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref())?;
    let engine = TokenEngine::new(FsKeyStore::new(config));

    match cli.command {
        Commands::Encode { claims } => {
            let token = engine.encode(&build_payload(claims))?;
            pout(cli.json, json!({"token": token}), &token)?;
        }
        Commands::Decode { token } => {
            let claims = engine.decode(&token)?;
            let value = serde_json::to_value(&claims)?;
            let text = serde_json::to_string_pretty(&value)?;
            pout(cli.json, value, &text)?;
        }
        Commands::Keys => {
            let store = engine.key_store();
            let (signing, signing_text) = match store.resolve_private_key() {
                Ok(material) => {
                    let alg = format!("{:?}", material.algorithm());
                    let source = describe_source(material.path());
                    (
                        json!({"algorithm": &alg, "path": material.path().map(|p| p.display().to_string())}),
                        format!("sign:   {alg} ({source})"),
                    )
                }
                Err(e) => (json!({"error": e.to_string()}), format!("sign:   unavailable ({e})")),
            };

            let pool = store.resolve_verification_materials();
            let mut lines = vec![signing_text];
            lines.extend(pool.iter().map(|m| {
                format!("verify: {:?} ({})", m.algorithm(), describe_source(m.path()))
            }));
            let pool_json: Vec<Value> = pool.iter().map(material_json).collect();

            pout(
                cli.json,
                json!({"signing": signing, "verification": pool_json}),
                &lines.join("\n"),
            )?;
        }
        Commands::IssuerVar { issuer } => {
            let variable = engine
                .key_store()
                .issuer_variable(&issuer)
                .context("issuer normalizes to an empty name")?;
            pout(cli.json, json!({"issuer": issuer, "variable": variable}), &variable)?;
        }
    }

    Ok(())
}

fn init_tracing(json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_output {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<JwtConfig> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            JwtConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => {
            debug!("loading config from environment");
            JwtConfig::from_env(&ProcessEnv).context("failed to read config from environment")?
        }
    };
    debug!(keys_directory = %config.keys_directory.display(), "config loaded");
    Ok(config)
}

fn build_payload(pairs: Vec<(String, String)>) -> Claims {
    pairs
        .into_iter()
        .map(|(name, raw)| (name, claim_value(&raw)))
        .collect()
}

fn claim_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn material_json(material: &VerificationMaterial) -> Value {
    json!({
        "algorithm": format!("{:?}", material.algorithm()),
        "path": material.path().map(|p| p.display().to_string()),
    })
}

fn describe_source(path: Option<&Path>) -> String {
    path.map_or_else(|| "shared secret".to_string(), |p| p.display().to_string())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| "must be KEY=VALUE".to_string())?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

pub fn pout(json_mode: bool, value: Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
