//! dio is a CLI tool to approve and deposit funding tokens into a yield
//! strategy, either rehearsed on a local fork or for real on a live network.

mod cli;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, DepositArgs, FundArgs, StatusArgs};
use dio_deposit::{
    AccountMode, DepositOrchestrator, DepositReport, DepositRequest, FundingRequest,
    HttpTransport, InclusionPolicy, NetworkRegistry, SigningRequirement, TxHash, TxReceipt,
    account_status, acquire, fund,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger. Reports go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let registry = NetworkRegistry::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Deposit(args) => deposit(&registry, args).await,
        Command::Fund(args) => faucet(&registry, args).await,
        Command::Status(args) => status(&registry, args).await,
        Command::Networks => {
            print!("{}", registry.to_redacted_toml()?);
            Ok(())
        }
    }
}

async fn deposit(registry: &NetworkRegistry, args: DepositArgs) -> Result<()> {
    let signing = match args.mode {
        AccountMode::Live => SigningRequirement::Required,
        AccountMode::Rehearsal => SigningRequirement::NotRequired,
    };
    let profile = registry.resolve(&args.network, signing)?;

    tracing::info!(
        network = %profile.identifier,
        kind = %profile.kind,
        rpc_url = %profile.rpc_url,
        mode = %args.mode,
        "Resolved network profile"
    );

    let transport = Arc::new(HttpTransport::new(profile.rpc_url.clone())?);
    let signer = acquire(&profile, transport, args.mode, args.from).await?;

    let orchestrator = DepositOrchestrator::new(signer).with_inclusion_policy(InclusionPolicy {
        timeout: Duration::from_secs(args.inclusion_timeout),
        poll_interval: Duration::from_secs(args.poll_interval),
    });

    let request = DepositRequest {
        amount: args.amount,
        auto_compound: args.auto_compound,
        funding_token: args.token,
        strategy: args.strategy,
    };
    let report = orchestrator.start(&request).await?;

    println!("{}", report_table(&request, &report));

    if !report.is_completed() {
        bail!(
            "deposit ended in {}{}",
            report.state,
            report
                .detail
                .as_deref()
                .map(|detail| format!(": {detail}"))
                .unwrap_or_default()
        );
    }

    Ok(())
}

async fn faucet(registry: &NetworkRegistry, args: FundArgs) -> Result<()> {
    let profile = registry.resolve(&args.network, SigningRequirement::NotRequired)?;
    let transport = Arc::new(HttpTransport::new(profile.rpc_url.clone())?);

    let result = fund(
        &profile,
        transport,
        &FundingRequest {
            token: args.token,
            holder: args.holder,
            recipient: args.to,
            amount: args.amount,
            gas_stipend: args.gas_stipend,
        },
        InclusionPolicy {
            timeout: Duration::from_secs(args.inclusion_timeout),
            ..Default::default()
        },
    )
    .await?;

    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Token".to_string(), args.token.to_string()]);
    table.add_row(vec!["Holder".to_string(), args.holder.to_string()]);
    table.add_row(vec!["Recipient".to_string(), args.to.to_string()]);
    table.add_row(vec!["Transfer".to_string(), result.tx_hash.to_string()]);
    table.add_row(vec!["Block".to_string(), result.block_number.to_string()]);
    table.add_row(vec![
        "Recipient balance".to_string(),
        result.recipient_balance.to_string(),
    ]);
    println!("{table}");

    Ok(())
}

async fn status(registry: &NetworkRegistry, args: StatusArgs) -> Result<()> {
    let profile = registry.resolve(&args.network, SigningRequirement::NotRequired)?;
    let transport = HttpTransport::new(profile.rpc_url.clone())?;

    let report = account_status(&transport, args.token, args.strategy, args.account).await?;

    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Account".to_string(), report.account.to_string()]);
    table.add_row(vec!["Token".to_string(), report.token.to_string()]);
    table.add_row(vec!["Strategy".to_string(), report.strategy.to_string()]);
    table.add_row(vec!["Balance".to_string(), report.token_balance.to_string()]);
    table.add_row(vec!["Allowance".to_string(), report.allowance.to_string()]);
    table.add_row(vec![
        "Depositable".to_string(),
        report.depositable().to_string(),
    ]);
    table.add_row(vec![
        "Strategy total deposits".to_string(),
        report.total_deposits.to_string(),
    ]);
    println!("{table}");

    Ok(())
}

fn report_table(request: &DepositRequest, report: &DepositReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["State".to_string(), report.state.to_string()]);
    table.add_row(vec!["Token".to_string(), request.funding_token.to_string()]);
    table.add_row(vec!["Strategy".to_string(), request.strategy.to_string()]);
    table.add_row(vec!["Amount".to_string(), request.amount.to_string()]);
    table.add_row(vec![
        "Auto-compound".to_string(),
        request.auto_compound.to_string(),
    ]);
    table.add_row(vec![
        "Approval".to_string(),
        receipt_cell(report.approval_tx, report.approval.as_ref()),
    ]);
    table.add_row(vec![
        "Deposit".to_string(),
        receipt_cell(report.deposit_tx, report.deposit.as_ref()),
    ]);
    table.add_row(vec![
        "Total deposits".to_string(),
        report
            .total_deposits
            .map(|total| total.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    if report.has_residual_allowance() {
        table.add_row(vec![
            "Residual allowance".to_string(),
            request.amount.to_string(),
        ]);
    }
    if let Some(detail) = &report.detail {
        table.add_row(vec!["Detail".to_string(), detail.clone()]);
    }
    table
}

fn receipt_cell(submitted: Option<TxHash>, receipt: Option<&TxReceipt>) -> String {
    match (submitted, receipt) {
        (_, Some(receipt)) => format!(
            "{} (block {}, {})",
            receipt.transaction_hash,
            receipt.block_number,
            if receipt.succeeded() { "ok" } else { "reverted" }
        ),
        (Some(tx_hash), None) => format!("{tx_hash} (submitted, inclusion not observed)"),
        (None, None) => "-".to_string(),
    }
}
