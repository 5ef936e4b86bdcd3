use bitcoin::{Address, Network, OutPoint};
use clap::{Parser, Subcommand};

/// Barque — Ark layer-2 wallet with unilateral exit support.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Esplora-style chain explorer URL.
    #[arg(
        long,
        default_value = "http://127.0.0.1:3000",
        env = "BARQUE_ESPLORA_URL"
    )]
    pub esplora_url: String,

    /// Ark indexer URL.
    #[arg(
        long,
        default_value = "http://127.0.0.1:7070",
        env = "BARQUE_INDEXER_URL"
    )]
    pub indexer_url: String,

    /// Bitcoin network.
    #[arg(long, default_value = "regtest", env = "BARQUE_NETWORK")]
    pub network: Network,

    /// Wallet secret key, hex-encoded. Prefer the environment variable
    /// over the flag so the key stays out of shell history.
    #[arg(long, env = "BARQUE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Cap on explorer requests per second (unset = unlimited).
    #[arg(long, env = "BARQUE_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the wallet's on-chain address.
    Address,

    /// List the wallet's confirmed on-chain coins.
    Coins,

    /// Send an on-chain payment.
    Send {
        /// Recipient address.
        #[arg(long)]
        to: String,

        /// Amount in satoshis.
        #[arg(long)]
        amount: u64,

        /// Fee rate in sat/vB. Defaults to the explorer's next-block
        /// estimate.
        #[arg(long)]
        fee_rate: Option<u64>,
    },

    /// Unilaterally publish a VTXO's off-chain ancestry chain on-chain.
    Unroll {
        /// The VTXO outpoint, as `txid:vout`.
        outpoint: OutPoint,
    },
}

/// Parse and network-check an address argument.
pub fn parse_address(s: &str, network: Network) -> eyre::Result<Address> {
    Ok(s.parse::<Address<_>>()?.require_network(network)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn address_parsing_enforces_network() {
        // A mainnet address must be rejected when the wallet runs regtest.
        let mainnet = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        assert!(parse_address(mainnet, Network::Regtest).is_err());
        assert!(parse_address(mainnet, Network::Bitcoin).is_ok());
    }
}
