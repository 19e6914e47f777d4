use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepform_core::{Request, Transition};
use stepform_web::{AxumStepformAdapter, Site, SiteConfig};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Serve {
        port: u16,
        config: Option<PathBuf>,
        user: Option<String>,
    },
    Render {
        app: RenderTarget,
        config: Option<PathBuf>,
        user: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderTarget {
    Calendar,
    Election,
}

pub async fn run_from_env() -> Result<(), String> {
    run_from_args(env::args().skip(1).collect()).await
}

pub async fn run_from_args(args: Vec<String>) -> Result<(), String> {
    let command = parse_command(args)?;

    match command {
        CliCommand::Serve { port, config, user } => {
            init_tracing();
            run_server(port, config, user).await
        }
        CliCommand::Render { app, config, user } => {
            let config = load_config(config.as_deref())?;
            println!("{}", render_page(app, config, &user)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn parse_command(args: Vec<String>) -> Result<CliCommand, String> {
    if args.is_empty() {
        return Err(help_text());
    }

    let cmd = args[0].as_str();
    match cmd {
        "serve" => parse_serve(args),
        "render" => parse_render(args),
        "help" | "--help" | "-h" => Err(help_text()),
        _ => Err(format!("unknown command: {cmd}\n\n{}", help_text())),
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String, String> {
    args.get(i).ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_serve(args: Vec<String>) -> Result<CliCommand, String> {
    let mut port: u16 = 8080;
    let mut config = None;
    let mut user = None;

    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                let value = flag_value(&args, i, "--port")?;
                port = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {value}"))?;
            }
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(flag_value(&args, i, "--config")?));
            }
            "--user" => {
                i += 1;
                user = Some(flag_value(&args, i, "--user")?.clone());
            }
            x if x.starts_with("--") => return Err(format!("unknown flag: {x}")),
            x => return Err(format!("unexpected argument: {x}")),
        }
        i += 1;
    }

    Ok(CliCommand::Serve { port, config, user })
}

fn parse_render(args: Vec<String>) -> Result<CliCommand, String> {
    let mut app = None;
    let mut config = None;
    let mut user = "demo".to_string();

    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(flag_value(&args, i, "--config")?));
            }
            "--user" => {
                i += 1;
                user = flag_value(&args, i, "--user")?.clone();
            }
            x if x.starts_with("--") => return Err(format!("unknown flag: {x}")),
            "calendar" if app.is_none() => app = Some(RenderTarget::Calendar),
            "election" if app.is_none() => app = Some(RenderTarget::Election),
            x => return Err(format!("unexpected argument: {x}")),
        }
        i += 1;
    }

    let app = app.ok_or_else(|| "render requires calendar or election".to_string())?;
    Ok(CliCommand::Render { app, config, user })
}

fn help_text() -> String {
    [
        "stepform CLI",
        "",
        "Commands:",
        "  stepform serve [--port 8080] [--config site.json] [--user USER]",
        "  stepform render calendar|election [--config site.json] [--user demo]",
    ]
    .join("\n")
}

fn load_config(path: Option<&Path>) -> Result<SiteConfig, String> {
    match path {
        Some(path) => SiteConfig::from_file(path).map_err(|e| e.to_string()),
        None => Ok(SiteConfig::minimal()),
    }
}

/// Initial page of an application, as a first visitor would see it.
fn render_page(app: RenderTarget, config: SiteConfig, user: &str) -> Result<String, String> {
    let site = Site::new(config);
    let token = match app {
        RenderTarget::Calendar => site.start_calendar(),
        RenderTarget::Election => site.start_election().map_err(|e| e.to_string())?,
    };
    let outcome = site.handle(Request::new(token, Transition::Enter).with_user(user));
    if outcome.status != 200 {
        return Err(format!(
            "render failed with status {}: {}",
            outcome.status,
            outcome.page.title()
        ));
    }
    Ok(outcome.page.render())
}

async fn run_server(port: u16, config: Option<PathBuf>, user: Option<String>) -> Result<(), String> {
    let config = load_config(config.as_deref())?;
    let site = Arc::new(Site::new(config));
    let mut adapter = AxumStepformAdapter::new(Arc::clone(&site));
    if let Some(user) = &user {
        adapter = adapter.with_default_user(user.clone());
    }

    let maintenance = tokio::spawn(maintenance_loop(Arc::clone(&site)));

    let host = format!("0.0.0.0:{port}");
    println!("STEPFORM serve");
    println!("URL:  http://localhost:{port}");
    println!("Mail: {}", if site.config().local_debug { "preview" } else { "log" });
    if let Some(user) = &user {
        println!("User: {user}");
    }

    let listener = tokio::net::TcpListener::bind(&host)
        .await
        .map_err(|e| format!("failed to bind {host}: {e}"))?;
    axum::serve(listener, adapter.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"))?;

    maintenance.abort();
    let (_, report) = site.maintain();
    info!(undelivered = report.pending + report.failed, "server stopped");
    Ok(())
}

async fn maintenance_loop(site: Arc<Site>) {
    let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let (swept, report) = site.maintain();
        debug!(
            swept,
            live = site.table().len(),
            sent = report.sent,
            pending = report.pending,
            "maintenance pass"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
