use anyhow::Result;
use clap::{Parser, Subcommand};
mod auth;
use keyhold::{default_keys_dir, Address, KdfStrength, KeyStore, PassphraseKeyStore};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "keyhold")]
#[command(
    version,
    about = "Local, passphrase-protected keystore for signing keys."
)]
struct Cli {
    /// Directory holding the encrypted key files
    #[arg(long, global = true, value_name = "DIR", env = "KEYHOLD_DIR")]
    keys_dir: Option<PathBuf>,

    /// Encrypt new keys with the light scrypt profile (~100 ms, ~4 MiB)
    /// instead of the standard one (~1 s, ~256 MiB)
    #[arg(long, global = true, default_value_t = false)]
    light: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generates a new key and stores it encrypted
    Generate,

    /// Lists addresses of all stored keys
    List,

    /// Decrypts a key and prints its id and address
    #[command(arg_required_else_help = true)]
    Show {
        address: Address,

        /// Also print the private key as hex
        #[arg(long, default_value_t = false)]
        reveal: bool,
    },

    /// Deletes a key after verifying the passphrase
    #[command(arg_required_else_help = true)]
    Delete { address: Address },

    /// Removes a key file without any passphrase check
    #[command(arg_required_else_help = true)]
    Cleanup { address: Address },
}

fn resolve_store(keys_dir: Option<PathBuf>, light: bool) -> Result<PassphraseKeyStore> {
    let dir = match keys_dir {
        Some(dir) => dir,
        None => default_keys_dir()?,
    };
    let strength = if light {
        KdfStrength::Light
    } else {
        KdfStrength::Standard
    };
    Ok(PassphraseKeyStore::new(dir, strength))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let store = resolve_store(args.keys_dir, args.light)?;

    match args.command {
        Commands::Generate => {
            let passphrase = auth::read_new_passphrase()?;
            let key = store.generate_new_key(&passphrase)?;
            println!("stored new key {}", key.address);
        }
        Commands::List => {
            for address in store.key_addresses()? {
                println!("{address}");
            }
        }
        Commands::Show { address, reveal } => {
            let passphrase = auth::read_passphrase()?;
            let key = store.get_key(&address, &passphrase)?;
            println!("address: {}", key.address);
            println!("id:      {}", key.id);
            if reveal {
                println!("private: {}", hex::encode(&*key.private_key));
            }
        }
        Commands::Delete { address } => {
            let passphrase = auth::read_passphrase()?;
            store.delete_key(&address, &passphrase)?;
            println!("key {address} deleted");
        }
        Commands::Cleanup { address } => {
            store.cleanup(&address)?;
            println!("key file {address} removed");
        }
    }

    Ok(())
}
