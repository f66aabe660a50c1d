use anyhow::{Context, Result};
use clap::Parser;
use preconf::types::{Bid, Signer, U256};

/// Sign a bid and print it in wire format.
#[derive(Parser, Debug)]
struct Cli {
    /// Hex encoded secp256k1 private key of the bidder.
    #[clap(long, env = "PRECONF_BIDDER_KEY", hide_env_values = true)]
    key: String,

    /// Bid amount in wei, as a decimal integer.
    #[clap(long)]
    amount: String,

    /// The block the bid is for.
    #[clap(long)]
    block: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let signer: Signer = cli.key.parse().context("invalid private key")?;
    let amount = U256::from_str_radix(&cli.amount, 10)
        .with_context(|| format!("invalid amount {:?}", cli.amount))?;

    let bid = Bid::sign(amount, U256::from(cli.block), &signer)?;

    eprintln!("bidder {}", signer.address());
    println!("{}", bid.encode());
    Ok(())
}
