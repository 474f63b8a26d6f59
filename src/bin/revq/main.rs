mod display;

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use display::{render_profile_list, render_results};
use revq::{
    FetchError, GhCli, Invocation, Preferences, Profile, ProfileCommand, ProfileStore, Refresher,
    effective_profile, fetch_review_requests, parse_args,
};

const PREF_INTERVAL: &str = "refresh-interval-secs";
const PREF_ACTIVE_PROFILE: &str = "active-profile";
const PREF_LAST_REFRESH: &str = "last-refresh";

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Picks the profile this run is based on: the one named with -p, or the
/// store's active profile.
fn select_profile<'a>(invocation: &Invocation, store: &'a ProfileStore) -> Result<&'a Profile> {
    match &invocation.profile {
        Some(name) => store
            .get(name)
            .with_context(|| format!("no profile named '{name}'")),
        None => Ok(store.active()),
    }
}

fn run_profile_command(
    command: &ProfileCommand,
    invocation: &Invocation,
    store: &mut ProfileStore,
    prefs: &mut Preferences,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    match command {
        ProfileCommand::List => {
            render_profile_list(store.profiles(), store.active_name(), &mut stdout)?;
        }
        ProfileCommand::Save(name) => {
            let base = select_profile(invocation, store)?.clone();
            let mut profile = effective_profile(invocation, &base);
            profile.name = name.clone();
            store.upsert(profile)?;
            store.set_active(name)?;
            store.save()?;
            prefs.set(PREF_ACTIVE_PROFILE, name.clone())?;
            writeln!(stdout, "saved profile '{name}' (now active)")?;
        }
        ProfileCommand::Delete(name) => {
            store.remove(name)?;
            store.save()?;
            prefs.set(PREF_ACTIVE_PROFILE, store.active_name().to_string())?;
            writeln!(stdout, "deleted profile '{name}'")?;
        }
    }
    Ok(())
}

async fn run_once(invocation: &Invocation, profile: &Profile, gh: &GhCli) -> Result<()> {
    let result = fetch_review_requests(&profile.query_spec(), gh).await?;
    let mut stdout = std::io::stdout();
    render_results(&result, profile, invocation.output, invocation.flat, &mut stdout)
}

async fn run_watch(
    invocation: &Invocation,
    profile: &Profile,
    gh: &GhCli,
    prefs: &mut Preferences,
    interval: std::time::Duration,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let mut refresher = Refresher::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let gh = gh.clone();
                let profile = profile.clone();
                let tx = tx.clone();
                // A slow gh invocation must never overlap the next tick's.
                refresher.trigger(async move {
                    let result = fetch_review_requests(&profile.query_spec(), &gh).await;
                    let _ = tx.send(result).await;
                });
            }
            Some(result) = rx.recv() => {
                match result {
                    Ok(result) => {
                        let mut stdout = std::io::stdout();
                        if stdout.is_terminal() {
                            // Repaint in place, watch(1)-style.
                            write!(stdout, "\x1b[2J\x1b[H")?;
                        }
                        render_results(
                            &result,
                            profile,
                            invocation.output,
                            invocation.flat,
                            &mut stdout,
                        )?;
                        prefs.set(PREF_LAST_REFRESH, chrono::Utc::now().to_rfc3339())?;
                    }
                    Err(err) => eprintln!("revq: {err}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                refresher.abort();
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let invocation = match parse_args(std::env::args()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    let mut store = ProfileStore::load(ProfileStore::default_path()?)
        .context("failed to load profiles")?;
    let mut prefs =
        Preferences::load(Preferences::default_path()?).context("failed to load preferences")?;

    if let Some(command) = &invocation.command {
        return run_profile_command(command, &invocation, &mut store, &mut prefs);
    }

    let profile = effective_profile(&invocation, select_profile(&invocation, &store)?);

    let gh = GhCli::new();
    gh.check_auth().await?;

    match invocation.watch {
        Some(interval) => {
            // An explicitly passed interval becomes the sticky preference;
            // otherwise a previously saved one wins over the default.
            let saved_secs: Option<u64> = prefs.get(PREF_INTERVAL).and_then(|s| s.parse().ok());
            let interval = match saved_secs {
                Some(secs) if !invocation.interval_explicit => {
                    std::time::Duration::from_secs(secs).max(revq::cli::MIN_WATCH_INTERVAL)
                }
                _ => {
                    prefs.set(PREF_INTERVAL, interval.as_secs().to_string())?;
                    interval
                }
            };
            run_watch(&invocation, &profile, &gh, &mut prefs, interval).await
        }
        None => run_once(&invocation, &profile, &gh).await,
    }
    .map_err(flatten_fetch_error)
}

/// FetchError already reads as a user-facing headline; strip the anyhow
/// layering so it prints as one line.
fn flatten_fetch_error(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<FetchError>() {
        Ok(fetch) => anyhow::anyhow!("{fetch}"),
        Err(other) => other,
    }
}
