//! Keystore Generation Utility
//!
//! Run with: cargo run --bin generate-keystore -- --dir keys [--import]
//!
//! Writes an encrypted JSON keystore for the compounding wallet. The
//! password is read from `WALLET_KEYSTORE_PASSWORD`, the same variable the
//! compounder uses to decrypt it. With `--import`, the key in
//! `WALLET_PRIVATE_KEY` is encrypted instead of a fresh random one.

use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::path::PathBuf;
use std::str::FromStr;

const KEYSTORE_PASSWORD_ENV: &str = "WALLET_KEYSTORE_PASSWORD";
const PRIVATE_KEY_ENV: &str = "WALLET_PRIVATE_KEY";

#[derive(Parser, Debug)]
#[command(name = "generate-keystore", about = "Create an encrypted wallet keystore")]
struct Args {
    /// Directory the keystore file is written to
    #[arg(short, long, default_value = "keys")]
    dir: PathBuf,

    /// File name of the keystore (defaults to a random UUID)
    #[arg(short, long)]
    name: Option<String>,

    /// Encrypt the key from WALLET_PRIVATE_KEY instead of generating one
    #[arg(long)]
    import: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          LP COMPOUNDER KEYSTORE GENERATOR                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let password = std::env::var(KEYSTORE_PASSWORD_ENV)
        .map_err(|_| eyre!("{} must be set to encrypt the keystore", KEYSTORE_PASSWORD_ENV))?;
    if password.len() < 8 {
        return Err(eyre!("keystore password must be at least 8 characters"));
    }

    std::fs::create_dir_all(&args.dir)
        .wrap_err_with(|| format!("cannot create {}", args.dir.display()))?;

    let mut rng = rand::thread_rng();
    let (signer, file_name) = if args.import {
        let raw = std::env::var(PRIVATE_KEY_ENV)
            .map_err(|_| eyre!("--import needs {} to be set", PRIVATE_KEY_ENV))?;
        let imported = PrivateKeySigner::from_str(raw.trim_start_matches("0x"))
            .map_err(|e| eyre!("invalid private key: {}", e))?;
        let key_bytes = imported.credential().to_bytes();
        PrivateKeySigner::encrypt_keystore(&args.dir, &mut rng, key_bytes, &password, args.name.as_deref())
            .map_err(|e| eyre!("cannot write keystore: {}", e))?
    } else {
        PrivateKeySigner::new_keystore(&args.dir, &mut rng, &password, args.name.as_deref())
            .map_err(|e| eyre!("cannot write keystore: {}", e))?
    };

    let path = args.dir.join(&file_name);
    println!("🔑 KEYSTORE WRITTEN");
    println!();
    println!("   Address:  {:?}", signer.address());
    println!("   Keystore: {}", path.display());
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("📝 TO USE THIS WALLET (instance config):");
    println!();
    println!("   [wallet]");
    println!("   address = \"{:?}\"", signer.address());
    println!("   keystore = \"{}\"", path.display());
    println!();
    println!("⚠️  Keep {} out of version control.", KEYSTORE_PASSWORD_ENV);
    println!();

    Ok(())
}
