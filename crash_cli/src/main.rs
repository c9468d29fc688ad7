use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crash_core::{
    AutoplayOutcome, AutoplayScheduler, AutoplaySession, BetRequest, EngineParams,
    FairnessVerifier, HistoryLedger, HttpOutcomeClient, OutcomeClient, OutcomeKind,
    RoundController, RoundError, Settlement, VerificationRecord, VerificationStatus,
};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crash-cli", about = "Play provably fair crash rounds against an outcome service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Outcome service base URL
    #[arg(long, env = "CRASH_SERVICE_URL", default_value = "http://127.0.0.1:8080")]
    service_url: String,
    /// Balance the session starts with
    #[arg(long, env = "CRASH_BALANCE", default_value_t = 1000.0)]
    balance: f64,
    /// Export this session's round history to a CSV file on exit
    #[arg(long)]
    history_csv: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one round; press Enter to cash out
    Play {
        #[arg(long)]
        stake: f64,
        #[arg(long)]
        auto_cashout: Option<f64>,
        /// Check the round against its seed commitment after settlement
        #[arg(long)]
        verify: bool,
    },
    /// Play rounds unattended; press Enter to cash out and stop
    Autoplay {
        #[arg(long)]
        stake: f64,
        #[arg(long)]
        auto_cashout: f64,
        #[arg(long, default_value_t = 10)]
        rounds: u32,
    },
    /// Check a past round against its seed commitment
    Verify {
        #[arg(long)]
        round_id: String,
        #[arg(long)]
        commit_hash: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long, default_value_t = crash_core::ROUND_NONCE)]
        nonce: u64,
        /// Crash point observed while playing the round
        #[arg(long)]
        observed: f64,
    },
}

enum PlayEvent {
    Settled(Result<Settlement, RoundError>),
    CashOut,
    Redraw,
}

/// Forwards every line typed on stdin as a cashout request. Blocking reads
/// live on their own thread so they never hold up the runtime.
fn spawn_enter_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if line.is_err() || tx.blocking_send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Discards requests queued before they could mean anything, such as Enter
/// presses made while the round was still being set up.
fn drain_requests(rx: &mut mpsc::Receiver<()>) -> usize {
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

async fn play<C: OutcomeClient>(
    ctl: &mut RoundController<C>,
    bet: BetRequest,
    verify: bool,
) -> anyhow::Result<()> {
    let mut manual = spawn_enter_listener();
    let view = ctl.place_bet(bet).await?;
    let early = drain_requests(&mut manual);
    if early > 0 {
        debug!(early, "ignored cashout requests made before the round started");
    }
    println!(
        "round {} committed to {} (client seed {}, nonce {})",
        view.round_id, view.commit_hash, view.client_seed, view.nonce
    );
    println!("press Enter to cash out");

    let display = ctl
        .subscribe_multiplier()
        .context("round stopped before it started")?;
    let mut redraw = time::interval(Duration::from_millis(100));
    let settlement = loop {
        let event = tokio::select! {
            settled = ctl.wait_for_settlement() => PlayEvent::Settled(settled),
            Some(()) = manual.recv() => PlayEvent::CashOut,
            _ = redraw.tick() => PlayEvent::Redraw,
        };
        match event {
            PlayEvent::Settled(settled) => break settled?,
            PlayEvent::CashOut => break ctl.cash_out().await?,
            PlayEvent::Redraw => {
                print!("\r{:>8.2}x", *display.borrow());
                std::io::stdout().flush()?;
            }
        }
    };
    println!();
    print_settlement(&settlement);

    if verify {
        let record = ctl.verify_last_round().await?;
        report_verification(&record)?;
    }
    Ok(())
}

fn print_settlement(s: &Settlement) {
    match s.kind {
        OutcomeKind::CashedOut => println!(
            "cashed out at {:.2}x{}: +{:.2} (crash point {:.2}x)",
            s.multiplier,
            if s.auto_cashout_fired { " (auto)" } else { "" },
            s.payout,
            s.crash_point
        ),
        OutcomeKind::Crashed => println!("crashed at {:.2}x: lost {:.2}", s.crash_point, s.stake),
    }
    println!("balance {:.2}", s.balance_after);
}

fn print_summary(session: &AutoplaySession) {
    println!(
        "{}/{} rounds, {} won, {} lost, staked {:.2}, returned {:.2}, net {:+.2}",
        session.rounds_played,
        session.rounds_requested,
        session.wins,
        session.losses,
        session.total_staked,
        session.total_returned,
        session.net()
    );
}

fn print_history(history: &HistoryLedger) {
    for entry in history.iter() {
        println!(
            "{:>8} {:>5} stake={:.2} {:?} at {:.2}x payout={:.2}{}",
            entry.short_id,
            entry.autoplay_label.as_deref().unwrap_or("-"),
            entry.stake,
            entry.kind,
            entry.multiplier,
            entry.payout,
            if entry.auto_cashout_fired { " auto" } else { "" }
        );
    }
}

fn report_verification(record: &VerificationRecord) -> anyhow::Result<()> {
    println!("server seed {}", record.revealed_seed);
    println!("sha256 {}", record.recomputed_hash);
    println!("{}", record.message);
    if record.status == VerificationStatus::HashMismatch {
        bail!("round {} failed its seed commitment", record.round_id);
    }
    Ok(())
}

fn export_history(path: &str, history: &HistoryLedger) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let entries: Vec<_> = history.iter().collect();
    for entry in entries.iter().rev() {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    println!("Exported {} rounds to {}", entries.len(), path);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpOutcomeClient::new(&cli.service_url);
    info!(service_url = %client.base_url(), balance = cli.balance, "session started");

    if let Commands::Verify {
        round_id,
        commit_hash,
        client_seed,
        nonce,
        observed,
    } = &cli.command
    {
        let record = FairnessVerifier::check_with_service(
            &client,
            round_id,
            commit_hash,
            client_seed,
            *nonce,
            *observed,
        )
        .await?;
        return report_verification(&record);
    }

    let mut ctl = RoundController::new(client, cli.balance, EngineParams::default());
    let result = match cli.command {
        Commands::Play {
            stake,
            auto_cashout,
            verify,
        } => {
            let bet = BetRequest { stake, auto_cashout };
            play(&mut ctl, bet, verify).await
        }
        Commands::Autoplay {
            stake,
            auto_cashout,
            rounds,
        } => {
            let mut manual = spawn_enter_listener();
            println!("autoplay: {rounds} rounds, press Enter to stop");
            let mut scheduler = AutoplayScheduler::new();
            let bet = BetRequest::with_auto_cashout(stake, auto_cashout);
            match scheduler.run(&mut ctl, bet, rounds, &mut manual).await {
                Ok(AutoplayOutcome::Completed(session)) => {
                    print_summary(&session);
                    Ok(())
                }
                Ok(AutoplayOutcome::Interrupted(session)) => {
                    println!("autoplay stopped by manual cashout");
                    print_summary(&session);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Verify { .. } => Ok(()),
    };

    print_history(ctl.history());
    println!("final balance {:.2}", ctl.balance());
    if let Some(path) = &cli.history_csv {
        export_history(path, ctl.history())?;
    }
    result
}
