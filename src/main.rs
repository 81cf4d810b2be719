//! pom - pomodoro timer that keeps breaks in sync across a group.
//!
//! Usage:
//!   pom start [<name>] [--schedule 25-5-25-5] [--start-time 0900]   # Run a timer, optionally as a group
//!   pom connect <name>                                              # Follow an existing group
//!   pom serve [--port 3000]                                         # Run the group registry

mod client;
mod config;
mod http_server;
mod reporter;
mod schedule;
mod start_time;
mod state;

use anyhow::Context;
use clap::{Parser, Subcommand};
use client::PomClient;
use config::{ClientConfig, ServerConfig, DEFAULT_SERVER};
use reporter::{NotificationSink, Reporter, Silent, SoundSink, TerminalBell, TerminalNotifier};
use schedule::{Schedule, DEFAULT_SCHEDULE};
use start_time::StartTime;
use state::{AppState, Clock, SessionRegistry, SystemClock};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pom", version)]
#[command(about = "Pomodoro timer that lines up breaks with the people you work with")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Disable all sound alerts
    #[arg(long, global = true)]
    no_sounds: bool,

    /// Disable all notifications
    #[arg(long, global = true)]
    no_notifications: bool,

    /// Base URL of the pom server
    #[arg(long, global = true, env = "POM_SERVER", default_value = DEFAULT_SERVER)]
    server: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a pomodoro timer, creating a public group if a name is given
    Start {
        /// Group name other people can connect to
        name: Option<String>,

        /// Work and break durations in minutes, separated by dashes
        #[arg(long, default_value = DEFAULT_SCHEDULE)]
        schedule: Schedule,

        /// Anchor the schedule to a time of day, as <hhmm> on the 24-hour clock
        #[arg(long)]
        start_time: Option<String>,

        /// UTC offset that --start-time and the clock display use
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Follow the schedule of an existing group
    Connect {
        name: String,

        /// UTC offset for the clock display
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Run the group registry server
    Serve {
        #[arg(long, env = "POM_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(long, env = "POM_PORT", default_value = "3000")]
        port: u16,

        /// Minutes a group may go unqueried before it is removed
        #[arg(long, env = "POM_SESSION_LIFETIME_MINS", default_value = "60")]
        lifetime_mins: u64,

        /// Minutes between sweeps for idle groups
        #[arg(long, env = "POM_SWEEP_INTERVAL_MINS", default_value = "60")]
        sweep_interval_mins: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Serve {
            host,
            port,
            lifetime_mins,
            sweep_interval_mins,
        } => {
            init_tracing("pom=info,tower_http=info");
            let config = ServerConfig::new(host, port, lifetime_mins, sweep_interval_mins)?;
            let registry =
                SessionRegistry::new(Arc::new(SystemClock)).lifetime(config.session_lifetime);
            http_server::run_server(&config, AppState::new(registry))
                .await
                .context("pom server stopped")?;
        }
        Commands::Start {
            name,
            schedule,
            start_time,
            timezone,
        } => {
            init_tracing("pom=warn");
            let config = ClientConfig::new(
                args.server,
                args.no_sounds,
                args.no_notifications,
                timezone.as_deref(),
            )?;
            start(config, name, schedule, start_time).await?;
        }
        Commands::Connect { name, timezone } => {
            init_tracing("pom=warn");
            let config = ClientConfig::new(
                args.server,
                args.no_sounds,
                args.no_notifications,
                timezone.as_deref(),
            )?;
            connect(config, name).await?;
        }
    }
    Ok(())
}

/// Log to stderr so the progress line on stdout stays intact.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn start(
    config: ClientConfig,
    name: Option<String>,
    schedule: Schedule,
    start_time: Option<String>,
) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let start_time = match start_time {
        Some(hhmm) => StartTime::parse_hhmm(&hhmm, config.offset)?,
        None => StartTime::Absolute(clock.now()),
    };

    if let Some(name) = name {
        let client = Arc::new(PomClient::new(&config.server)?);
        let created = client.create(&name, &start_time, &schedule).await;
        match created {
            Ok(session) => {
                info!(name = %session.name, "Created group");
                println!("Group '{}' is live. Others can join with: pom connect {}", name, name);
                client::spawn_keep_alive(client, name);
            }
            Err(e) if e.is_transport() => {
                warn!("{e}");
                eprintln!("{e}. Running locally without a group.");
            }
            Err(e) => return Err(e).context(format!("could not create group '{name}'")),
        }
    }

    reporter(&config, start_time, schedule)
        .run(clock, config.offset)
        .await;
    Ok(())
}

async fn connect(config: ClientConfig, name: String) -> anyhow::Result<()> {
    let client = Arc::new(PomClient::new(&config.server)?);
    let session = client
        .fetch(&name)
        .await
        .with_context(|| format!("could not connect to group '{name}'"))?;
    info!(name = %session.name, schedule = %session.schedule, "Connected to group");
    client::spawn_keep_alive(client, name);

    reporter(&config, session.start_time, session.schedule)
        .run(Arc::new(SystemClock), config.offset)
        .await;
    Ok(())
}

fn reporter(config: &ClientConfig, start_time: StartTime, schedule: Schedule) -> Reporter {
    let notifier: Box<dyn NotificationSink> = if config.notifications {
        Box::new(TerminalNotifier)
    } else {
        Box::new(Silent)
    };
    let sound: Box<dyn SoundSink> = if config.sounds {
        Box::new(TerminalBell)
    } else {
        Box::new(Silent)
    };
    Reporter::new(start_time, schedule, notifier, sound)
}
