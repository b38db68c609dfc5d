//! earnctl - operate a referral earning platform from a snapshot directory

mod config;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use referral_core::{
    ClaimBlocked, Clock, CoreError, EntryKind, ManualClock, Platform, RewardKind, RunBlocked,
    SystemClock, Tier, TierBenefits, WindowState,
};
use referral_storage::SnapshotStore;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{load_config, CliConfig};

/// Ten years
const MAX_REPORT_HOURS: i64 = 24 * 3650;

#[derive(Parser)]
#[command(name = "earnctl")]
#[command(about = "Referral earning platform operator tool", version)]
struct Cli {
    /// Snapshot directory (overrides the config file)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretend the current time is this RFC 3339 timestamp
    #[arg(long, value_name = "TIME")]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account
    Register {
        /// Referrer account id
        #[arg(short, long)]
        upline: Option<String>,
    },

    /// Credit a deposit
    Deposit { account: String, amount: Decimal },

    /// Start a profit run
    Run { account: String },

    /// Request a withdrawal to a wallet address
    Withdraw {
        account: String,
        amount: Decimal,
        address: String,
    },

    /// Pay out withdrawals that are due
    Settle,

    /// Claim the daily or lucky reward
    Claim {
        account: String,

        /// daily or lucky
        #[arg(default_value = "daily")]
        kind: RewardKind,
    },

    /// Show balance, tier and run allowance
    Status { account: String },

    /// Show downline generations and commission earned
    Network {
        account: String,

        /// Reporting interval in hours, ending now
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(1..=MAX_REPORT_HOURS))]
        hours: i64,
    },

    /// Show progress towards a tier
    Progress { account: String, tier: Tier },

    /// List an account's ledger entries
    Ledger { account: String },

    /// Check every cached balance against its ledger
    Audit,
}

impl Commands {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Commands::Register { .. }
                | Commands::Deposit { .. }
                | Commands::Run { .. }
                | Commands::Withdraw { .. }
                | Commands::Settle
                | Commands::Claim { .. }
        )
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir());
    let store = SnapshotStore::open(&data_dir)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;

    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };

    let platform = match store.load_if_present().context("cannot load snapshot")? {
        Some(snapshot) => Platform::restore(snapshot, config.rules.clone(), clock)
            .context("snapshot failed its consistency check")?,
        None => {
            log::info!("no snapshot in {}, starting empty", store.data_dir().display());
            Platform::with_clock(config.rules.clone(), clock).context("invalid rules")?
        }
    };

    let mutates = cli.command.mutates();
    let outcome = execute(&platform, cli.command);

    // Partially applied operations are persisted too
    if mutates {
        let snapshot = platform.snapshot()?;
        store.save(&snapshot).context("cannot save snapshot")?;
    }

    outcome
}

fn execute(platform: &Platform, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Register { upline } => {
            let account = platform.register(upline.as_deref())?;

            println!("\n👤 Account Registered");
            println!("═══════════════════════════════════");
            println!("ID:       {}", account.id.bright_blue());
            println!("Upline:   {}", account.upline_id.as_deref().unwrap_or("-"));
            println!("Balance:  {}", account.balance.green());
            println!();
        }

        Commands::Deposit { account, amount } => {
            let entry = platform.deposit(&account, amount)?;
            let updated = platform.account(&account)?;

            println!("\n💰 Deposit Credited");
            println!("═══════════════════════════════════");
            println!("Amount:   {}", entry.amount.green());
            println!("Balance:  {}", updated.balance);
            println!("Tier:     {}", updated.tier.yellow());
            println!();
        }

        Commands::Run { account } => match platform.attempt_run(&account) {
            Ok(outcome) => {
                println!("\n⚡ Profit Run Complete");
                println!("═══════════════════════════════════");
                println!("Profit:          {}", outcome.profit.amount.green());
                println!("Runs remaining:  {}", outcome.runs_remaining);
                for leg in &outcome.commissions {
                    println!(
                        "  G{} → {}  {}",
                        leg.generation.unwrap_or_default(),
                        leg.account_id,
                        leg.amount.green()
                    );
                }
                println!();
            }
            Err(CoreError::RunBlocked(RunBlocked::Cooldown { retry_at })) => {
                println!("\n⏳ Run allowance used up");
                println!("   Next window opens at {}", retry_at.yellow());
                println!();
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Withdraw {
            account,
            amount,
            address,
        } => {
            let record = platform.withdraw(&account, amount, &address)?;

            println!("\n🏦 Withdrawal Requested");
            println!("═══════════════════════════════════");
            println!("Amount:     {}", record.amount);
            println!("Fee:        {}", record.fee.red());
            println!("Receives:   {}", record.received.green());
            println!("Address:    {}", record.address);
            println!("Payable at: {}", record.available_at.yellow());
            println!();
        }

        Commands::Settle => {
            let paid = platform.settle_withdrawals();

            println!("\n📤 Withdrawals Settled: {}", paid.len());
            println!("═══════════════════════════════════");
            for record in &paid {
                println!("  {}  {}  {}", record.account_id, record.received.green(), record.address);
            }
            println!();
        }

        Commands::Claim { account, kind } => match platform.claim_reward(&account, kind) {
            Ok(claim) => {
                println!("\n🎁 {} Reward Claimed", kind.to_string().to_uppercase());
                println!("═══════════════════════════════════");
                println!("Amount:      {}", claim.amount.green());
                println!("Next claim:  {}", claim.next_claim_at().yellow());
                println!();
            }
            Err(CoreError::ClaimBlocked(ClaimBlocked::AlreadyClaimed { retry_at, .. })) => {
                println!("\n⏳ {} reward already claimed", kind);
                println!("   Next claim at {}", retry_at.yellow());
                println!();
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Status { account } => {
            let acct = platform.account(&account)?;
            let status = platform.run_status(&account)?;
            let benefits = TierBenefits::for_tier(acct.tier);

            println!("\n📊 Account Status");
            println!("═══════════════════════════════════");
            println!("ID:          {}", acct.id.bright_blue());
            println!("Balance:     {}", acct.balance.green());
            if acct.frozen {
                println!("Tier:        {} {}", acct.tier.yellow(), "(frozen for review)".red());
            } else {
                println!("Tier:        {}", acct.tier.yellow());
            }
            println!(
                "Withdrawals: {} - {}",
                benefits.min_withdrawal, benefits.max_withdrawal
            );
            match status.state {
                WindowState::NoWindow => println!("Runs:        no active window"),
                _ => println!(
                    "Runs:        {}/{} used, {}% of window elapsed, resets {}",
                    status.runs_used,
                    status.runs_allowed,
                    status.progress_pct,
                    status
                        .resets_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default()
                ),
            }
            println!();
        }

        Commands::Network { account, hours } => {
            let since = Duration::try_hours(hours)
                .and_then(|span| platform.now().checked_sub_signed(span))
                .with_context(|| format!("reporting interval of {} hours is out of range", hours))?;
            let report = platform.network_report(&account, since)?;

            println!("\n🌐 Network ({}h)", hours);
            println!("═══════════════════════════════════");
            println!("{:<4} {:>10} {:>8} {:>14} {:>6} {:>14}", "Gen", "Members", "Active", "Team profit", "Rate", "Commission");
            for g in &report.generations {
                println!(
                    "{:<4} {:>10} {:>8} {:>14} {:>5}% {:>14}",
                    format!("G{}", g.generation),
                    g.registered,
                    g.active,
                    g.team_profit.round_dp(4),
                    (g.rate * Decimal::ONE_HUNDRED).normalize(),
                    g.commission.round_dp(4)
                );
            }
            println!(
                "Total: {} members ({} inactive), commission {}",
                report.total_registered(),
                report.total_inactive(),
                report.total_commission().round_dp(4).green()
            );
            println!();
        }

        Commands::Progress { account, tier } => {
            let progress = platform.level_progress(&account, tier)?;

            println!("\n🎯 Progress to {}", tier.yellow());
            println!("═══════════════════════════════════");
            if !tier.is_open() {
                println!("{}", "This tier is locked".red());
            }
            println!(
                "Balance:  {}% of {}",
                (progress.balance_ratio * Decimal::ONE_HUNDRED).round_dp(1),
                progress.requirement.min_balance
            );
            println!(
                "Referrals: {}% of {} active",
                (progress.users_ratio * Decimal::ONE_HUNDRED).round_dp(1),
                progress.requirement.min_active_gen1
            );
            println!("Overall:  {}%", progress.percent);
            if progress.achieved {
                println!("{}", "Requirements met".green().bold());
            }
            println!();
        }

        Commands::Ledger { account } => {
            let entries = platform.entries(&account)?;

            println!("\n📒 Ledger ({} entries)", entries.len());
            println!("═══════════════════════════════════");
            for entry in &entries {
                let amount = if entry.kind.is_credit() {
                    entry.amount.green().to_string()
                } else {
                    entry.amount.red().to_string()
                };
                let detail = match (entry.kind, entry.generation) {
                    (EntryKind::Commission, Some(g)) => format!(" G{}", g),
                    _ => String::new(),
                };
                println!(
                    "{}  {:<15} {}{}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    amount,
                    detail
                );
            }
            println!();
        }

        Commands::Audit => {
            let report = platform.audit()?;
            let broken = report.iter().filter(|r| !r.is_consistent()).count();

            println!("\n🔍 Ledger Audit");
            println!("═══════════════════════════════════");
            for r in report.iter().filter(|r| !r.is_consistent()) {
                println!(
                    "{} {}: cached {} vs ledger {}",
                    "✗".red(),
                    r.account_id,
                    r.cached_balance,
                    r.ledger_sum
                );
            }
            if broken == 0 {
                println!("{} {} accounts consistent", "✓".green(), report.len());
            } else {
                println!();
                anyhow::bail!("{} of {} accounts inconsistent", broken, report.len());
            }
            println!();
        }
    }

    Ok(())
}
