//! Triangular arbitrage bot — CLI entry point.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use triarb_bot::backtest::Backtester;
use triarb_bot::binance::BinanceClient;
use triarb_bot::config::{Config, Credentials};
use triarb_bot::cycles::CycleFinder;
use triarb_bot::executor::DryRunExecutor;
use triarb_bot::monitor::ProfitMonitor;
use triarb_bot::universe::{
    self, BlacklistGenerator, UniverseStrategy, WhitelistGenerator,
};

#[derive(Parser)]
#[command(name = "triarb-bot", about = "Triangular arbitrage monitor for Binance spot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Rank whitelist candidates by 24h quote volume.
    Liquidity,
    /// Rank whitelist candidates by absolute 24h price change.
    Volatility,
}

impl From<StrategyArg> for UniverseStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Liquidity => UniverseStrategy::Liquidity,
            StrategyArg::Volatility => UniverseStrategy::Volatility,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Regenerate the whitelist and enumerate arbitrage cycles.
    FindCycles {
        #[arg(long, value_enum, default_value = "liquidity")]
        strategy: StrategyArg,
    },
    /// Run the streaming profit monitor (no execution).
    RunMonitor,
    /// Replay historical klines through the profit kernel.
    Backtest {
        /// Start date (YYYY-MM-DD).
        start_date: String,
        /// End date (YYYY-MM-DD), inclusive.
        end_date: String,
    },
    /// Generate the liquidity whitelist.
    GenerateWhitelist,
    /// Generate the illiquidity blacklist.
    GenerateBlacklist,
    /// Full pipeline: universe, cycles, then monitor + dry-run executor.
    StartBot,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load_default()?;
    let client = BinanceClient::new(Credentials::from_env());

    match cli.command {
        Command::FindCycles { strategy } => {
            let generator =
                WhitelistGenerator::new(config.whitelist.clone(), strategy.into());
            universe::run_generator(&client, &generator).await?;
            let cycles = CycleFinder::new(client, config).run().await?;
            info!("enumerated {} cycles", cycles.len());
        }
        Command::RunMonitor => {
            let (tx, mut rx) = ProfitMonitor::opportunity_channel();
            // No executor in this mode; drain the queue so detection keeps
            // its normal emission path.
            tokio::spawn(async move { while rx.recv().await.is_some() {} });

            let monitor = ProfitMonitor::new(client, config);
            let mut monitor_task = tokio::spawn(async move { monitor.run(tx).await });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("monitoring stopped by user"),
                result = &mut monitor_task => flatten_monitor_exit(result)?,
            }
            monitor_task.abort();
        }
        Command::Backtest { start_date, end_date } => {
            Backtester::new(client, config).run(&start_date, &end_date).await?;
        }
        Command::GenerateWhitelist => {
            let generator =
                WhitelistGenerator::new(config.whitelist.clone(), UniverseStrategy::Liquidity);
            universe::run_generator(&client, &generator).await?;
        }
        Command::GenerateBlacklist => {
            let generator = BlacklistGenerator::new(config.blacklist.clone());
            universe::run_generator(&client, &generator).await?;
        }
        Command::StartBot => {
            info!("setup: generating universe and cycles...");
            let whitelist =
                WhitelistGenerator::new(config.whitelist.clone(), UniverseStrategy::Liquidity);
            universe::run_generator(&client, &whitelist).await?;
            let blacklist = BlacklistGenerator::new(config.blacklist.clone());
            universe::run_generator(&client, &blacklist).await?;
            CycleFinder::new(client.clone(), config.clone()).run().await?;
            info!("setup complete");

            let (tx, rx) = ProfitMonitor::opportunity_channel();
            let monitor = ProfitMonitor::new(client.clone(), config.clone());
            let executor = DryRunExecutor::new(client, &config).await?;

            let mut monitor_task = tokio::spawn(async move { monitor.run(tx).await });
            let executor_task = tokio::spawn(async move { executor.run(rx).await });

            info!("profit monitor started; waiting for profitable cycles...");
            let monitor_result = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received; stopping");
                    Ok(())
                }
                result = &mut monitor_task => flatten_monitor_exit(result),
            };
            // Tearing down the monitor drops the queue's sender; the
            // executor then drains what it already accepted and exits on
            // its own — never cut off mid-simulation.
            monitor_task.abort();
            let _ = executor_task.await;
            monitor_result?;
        }
    }

    Ok(())
}

/// A monitor that stops on its own either finished cleanly or hit a
/// configuration/validation failure that should fail the process.
fn flatten_monitor_exit(
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(Ok(())) => {
            info!("monitor exited");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("monitor failed: {e:#}");
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("monitor task aborted: {e}")),
    }
}
