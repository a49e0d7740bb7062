//! Inspect and produce contracts.
//!
//! Usage:
//!   contract-tool parse '<MT>beacon</MT><MA>A</MA><MK>cpid</MK><MV>...</MV><MS>...</MS>'
//!   contract-tool legacy <hex-encoded envelope>
//!   contract-tool sign --type protocol --action A --key TEAM_WHITELIST --value 'Team A'

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::ed25519::PrivateKey;
use commonware_utils::{from_hex_formatted, hex};
use covenant_node::{Config, ValidatedConfig};
use covenant_types::{make_legacy_contract, Contract, ContractAction, ContractType};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "contract-tool")]
#[command(about = "Inspect, convert and sign covenant contracts")]
struct Args {
    /// YAML configuration (network, keys, log level)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a legacy contract from transaction message text
    Parse { message: String },
    /// Decode a binary envelope and print its legacy text form
    Legacy { hex: String },
    /// Build and sign a legacy contract
    Sign {
        /// Legacy type name (beacon, poll, project, protocol, scraper, vote)
        #[arg(long = "type")]
        contract_type: String,
        /// A (add) or D (delete)
        #[arg(long)]
        action: String,
        #[arg(long)]
        key: String,
        #[arg(long, default_value = "")]
        value: String,
        /// Hex-encoded signing key (defaults to the network message key)
        #[arg(long)]
        private_key: Option<String>,
        /// Also print the binary envelope
        #[arg(long)]
        encode: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("contract-tool failed: {err:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ValidatedConfig> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {}", path.display()))?;
            Config::from_yaml(&contents).context("Could not parse config file")?
        }
        None => Config::default(),
    };
    config.validate().context("Invalid config")
}

fn describe(contract: &Contract, config: &ValidatedConfig) {
    let payload = contract.body.payload();
    println!("version:   {}", contract.version);
    println!("type:      {}", contract.contract_type);
    println!("action:    {}", contract.action);
    println!("key:       {}", payload.legacy_key());
    println!("value:     {}", payload.legacy_value());
    println!("hash:      {}", hex(contract.hash().as_ref()));
    println!("burn:      {}", contract.required_burn_amount());
    println!("formed:    {}", contract.well_formed());
    println!("valid:     {}", contract.validate(&config.keys));
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();
    info!(network = ?config.network, "loaded config");

    match args.command {
        Command::Parse { message } => {
            if !Contract::detect(&message) {
                bail!("message does not contain a contract");
            }
            describe(&Contract::parse(&message), &config);
        }
        Command::Legacy { hex: encoded } => {
            let bytes = from_hex_formatted(&encoded).context("envelope must be hex")?;
            let contract = Contract::decode(bytes.as_ref()).map_err(|e| anyhow!(e))?;
            describe(&contract, &config);
            println!("{}", contract.to_legacy());
        }
        Command::Sign {
            contract_type,
            action,
            key,
            value,
            private_key,
            encode,
        } => {
            let parsed_type = ContractType::parse_legacy(&contract_type);
            if parsed_type == ContractType::Unknown {
                bail!("unknown contract type: {contract_type}");
            }
            let parsed_action = ContractAction::parse_legacy(&action);
            if parsed_action == ContractAction::Unknown {
                bail!("unknown contract action: {action}");
            }

            let mut contract =
                make_legacy_contract(parsed_type, parsed_action, key, value).to_legacy();
            match private_key {
                Some(private_key) => {
                    let bytes =
                        from_hex_formatted(&private_key).context("private key must be hex")?;
                    let private_key =
                        PrivateKey::decode(bytes.as_ref()).map_err(|e| anyhow!(e))?;
                    contract.sign(&private_key, &config.keys)?;
                }
                None => contract.sign_with_message_key(&config.keys)?,
            }

            describe(&contract, &config);
            println!("{contract}");
            if encode {
                println!("{}", hex(&contract.encode()));
            }
        }
    }
    Ok(())
}
