use clap::{Parser, Subcommand};
use serde_json::Value;

use request_core::crypto::{decrypt_params, encrypt_params, generate_pvv};

#[derive(Parser)]
#[command(name = "crypto-cli")]
#[command(about = "PIN verification values and parameter encryption", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the PVV of a PIN
    Pvv {
        #[arg(long)]
        pan: String,
        /// Two-key 3DES PVK as hex
        #[arg(long)]
        pvk: String,
        #[arg(long, default_value = "1")]
        pvki: String,
        #[arg(long)]
        pin: String,
    },
    /// Encrypt a JSON parameter group
    Encrypt {
        /// AES-128 or AES-256 key as hex
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        iv: String,
        /// JSON document
        params: String,
    },
    /// Decrypt a parameter group back to JSON
    Decrypt {
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        iv: String,
        /// Hex ciphertext
        cipher: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pvv { pan, pvk, pvki, pin } => {
            println!("{}", generate_pvv(&pan, &pvk, &pvki, &pin)?);
        }
        Commands::Encrypt { key, iv, params } => {
            let params: Value = serde_json::from_str(&params)?;
            println!("{}", encrypt_params(&params, &key, &iv)?);
        }
        Commands::Decrypt { key, iv, cipher } => {
            let params: Value = decrypt_params(&cipher, &key, &iv)?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }

    Ok(())
}
