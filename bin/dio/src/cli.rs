use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dio_deposit::{AccountMode, Address, CONFIG_FILENAME, U256, parse_address};
use tracing::level_filters::LevelFilter;

/// The network used when none is given: a local fork.
const DEFAULT_NETWORK: &str = "localhost";

#[derive(Parser)]
#[command(name = "dio")]
#[command(
    author,
    version,
    about = "Approve and deposit funding tokens into a yield strategy"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DIO_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to the network configuration file.
    ///
    /// A missing file is fine: the built-in `localhost` profile and `DIO_*`
    /// environment variables still apply.
    #[arg(long, alias = "conf", env = "DIO_CONFIG", default_value = CONFIG_FILENAME, global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Approve the strategy, deposit, and read back its total deposits.
    Deposit(DepositArgs),
    /// Transfer funding tokens from an impersonated holder (fork only).
    Fund(FundArgs),
    /// Show balance, allowance and strategy total for an account.
    Status(StatusArgs),
    /// Print the resolved network registry with credentials redacted.
    Networks,
}

#[derive(Debug, Args)]
pub struct DepositArgs {
    /// The network identifier from the configuration.
    #[arg(short, long, env = "DIO_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// How to obtain the funding account: `live` signs with the configured
    /// key, `rehearsal` impersonates on a fork.
    #[arg(long, env = "DIO_MODE", default_value_t = AccountMode::Rehearsal)]
    pub mode: AccountMode,

    /// The funding account. In rehearsal mode this account is impersonated;
    /// if omitted, the node's first unlocked account is used.
    #[arg(long, env = "DIO_FROM", value_parser = address_arg)]
    pub from: Option<Address>,

    /// Address of the funding token.
    #[arg(long, env = "DIO_TOKEN", value_parser = address_arg)]
    pub token: Address,

    /// Address of the strategy contract.
    #[arg(long, env = "DIO_STRATEGY", value_parser = address_arg)]
    pub strategy: Address,

    /// Amount in the token's smallest unit (e.g. `1000000000000000000` or `1e18`).
    #[arg(long, env = "DIO_AMOUNT", value_parser = amount_arg)]
    pub amount: U256,

    /// Ask the strategy to compound rewards automatically.
    #[arg(long, env = "DIO_AUTO_COMPOUND")]
    pub auto_compound: bool,

    /// Seconds to wait for each transaction to be included.
    #[arg(long, env = "DIO_INCLUSION_TIMEOUT", default_value_t = 120)]
    pub inclusion_timeout: u64,

    /// Seconds between receipt polls.
    #[arg(long, env = "DIO_POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,
}

#[derive(Debug, Args)]
pub struct FundArgs {
    /// The network identifier from the configuration. Must be a rehearsal network.
    #[arg(short, long, env = "DIO_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Address of the funding token.
    #[arg(long, env = "DIO_TOKEN", value_parser = address_arg)]
    pub token: Address,

    /// Account holding the tokens; impersonated for the transfer.
    #[arg(long, value_parser = address_arg)]
    pub holder: Address,

    /// Account receiving the tokens.
    #[arg(long, value_parser = address_arg)]
    pub to: Address,

    /// Amount in the token's smallest unit.
    #[arg(long, value_parser = amount_arg)]
    pub amount: U256,

    /// Native balance (wei) to give the holder first so it can pay for gas.
    #[arg(long, value_parser = amount_arg)]
    pub gas_stipend: Option<U256>,

    /// Seconds to wait for the transfer to be included.
    #[arg(long, default_value_t = 120)]
    pub inclusion_timeout: u64,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// The network identifier from the configuration.
    #[arg(short, long, env = "DIO_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Address of the funding token.
    #[arg(long, env = "DIO_TOKEN", value_parser = address_arg)]
    pub token: Address,

    /// Address of the strategy contract.
    #[arg(long, env = "DIO_STRATEGY", value_parser = address_arg)]
    pub strategy: Address,

    /// The account to inspect.
    #[arg(long, env = "DIO_ACCOUNT", value_parser = address_arg)]
    pub account: Address,
}

fn address_arg(s: &str) -> Result<Address, String> {
    parse_address(s).map_err(|e| e.to_string())
}

/// Parse a non-negative integer amount, accepting `<mantissa>e<exponent>`.
fn amount_arg(s: &str) -> Result<U256, String> {
    let s = s.trim().replace('_', "");

    if let Some((mantissa, exponent)) = s.split_once(['e', 'E']) {
        let mantissa: U256 = mantissa
            .parse()
            .map_err(|e| format!("invalid amount '{s}': {e}"))?;
        let exponent: u32 = exponent
            .parse()
            .map_err(|e| format!("invalid exponent in '{s}': {e}"))?;
        return U256::from(10u64)
            .checked_pow(U256::from(exponent))
            .and_then(|scale| mantissa.checked_mul(scale))
            .ok_or_else(|| format!("amount '{s}' overflows 256 bits"));
    }

    s.parse().map_err(|e| format!("invalid amount '{s}': {e}"))
}
