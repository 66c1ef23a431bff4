use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtc_player::config::{self, IceServerConfig, SessionConfig, SinkStrategy};
use rtc_player::Player;

/// Base path for recordings when none is given
const DEFAULT_OUTPUT: &str = "output";

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// rtc-player command line arguments
#[derive(Parser, Debug)]
#[command(name = "rtc-player")]
#[command(version, about = "Play a WebRTC stream from an SRS server", long_about = None)]
struct CliArgs {
    /// Player page URL, or the play API endpoint itself
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Play API endpoint (skips page resolution)
    #[arg(long, value_name = "URL")]
    api: Option<String>,

    /// Stream name (default: `stream` query parameter, then "livestream")
    #[arg(short = 's', long, value_name = "NAME")]
    stream: Option<String>,

    /// Seconds to play after connecting, 0 plays until interrupted (default: 30)
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Seconds to wait for the connection (default: 30)
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// STUN server URL, repeatable (replaces the default server)
    #[arg(long = "ice-server", value_name = "URL")]
    ice_servers: Vec<String>,

    /// Present received video
    #[arg(long, conflicts_with = "record")]
    display: bool,

    /// Record received media to files
    #[arg(long)]
    record: bool,

    /// Recording base path; files get -video/-audio suffixes (default: output)
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// JSON configuration file, command line flags take precedence
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the endpoint and stream that would be used, then exit
    #[arg(long)]
    resolve_only: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    // Install default crypto provider (required by rustls 0.23+)
    if CryptoProvider::install_default(ring::default_provider()).is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing::info!("Starting rtc-player v{}", env!("CARGO_PKG_VERSION"));

    let resolve_only = args.resolve_only;
    let config = build_config(args).await?;
    let player = Player::new(config)?;

    if resolve_only {
        let target = player.target().await?;
        println!("endpoint: {} ({})", target.endpoint.url, target.endpoint.source);
        println!("stream:   {}", target.stream);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                interrupt.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    match player.run(cancel).await {
        Ok(report) => {
            tracing::info!(
                "Played {:.1}s, {} track(s)",
                report.duration.as_secs_f64(),
                report.tracks.len()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Playback failed ({}): {}", e.kind(), e);
            Err(e.into())
        }
    }
}

/// Load the optional config file and layer the command line on top
async fn build_config(args: CliArgs) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path).await?,
        None => SessionConfig::default(),
    };

    if let Some(url) = args.url {
        config.page_url = url;
    }
    if config.page_url.trim().is_empty() {
        bail!("a player page URL is required (positional URL or page_url in --config)");
    }

    if let Some(api) = args.api {
        config.endpoint = Some(api);
    }
    if let Some(stream) = args.stream {
        config.stream = Some(stream);
    }
    if let Some(secs) = args.timeout {
        config.hold_secs = secs;
    }
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    if !args.ice_servers.is_empty() {
        config.ice_servers = args
            .ice_servers
            .into_iter()
            .map(IceServerConfig::stun)
            .collect();
    }

    if args.display {
        config.sink = SinkStrategy::Display;
    } else if args.record {
        config.sink = SinkStrategy::Record {
            output: args
                .output
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        };
    } else if let (SinkStrategy::Record { output }, Some(path)) = (&mut config.sink, args.output) {
        *output = path;
    }

    if args.insecure {
        config.accept_invalid_certs = true;
    }

    Ok(config)
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "rtc_player=error,webrtc=error",
        LogLevel::Warn => "rtc_player=warn,webrtc=warn",
        LogLevel::Info => "rtc_player=info,webrtc=warn",
        LogLevel::Verbose => "rtc_player=debug,webrtc=warn",
        LogLevel::Debug => "rtc_player=debug,webrtc=info",
        LogLevel::Trace => "rtc_player=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("rtc-player").chain(args.iter().copied())).unwrap()
    }

    #[tokio::test]
    async fn test_cli_overrides() {
        let args = parse(&[
            "http://h:8080/players/rtc_player.html",
            "--stream",
            "cam",
            "-t",
            "0",
            "--ice-server",
            "stun:stun.example.com:3478",
            "--record",
            "-o",
            "/tmp/rec",
            "--insecure",
        ]);
        let config = build_config(args).await.unwrap();

        assert_eq!(config.stream.as_deref(), Some("cam"));
        assert_eq!(config.hold_timeout(), None);
        assert_eq!(
            config.ice_servers,
            vec![IceServerConfig::stun("stun:stun.example.com:3478")]
        );
        assert_eq!(
            config.sink,
            SinkStrategy::Record {
                output: PathBuf::from("/tmp/rec")
            }
        );
        assert!(config.accept_invalid_certs);
    }

    #[tokio::test]
    async fn test_defaults() {
        let config = build_config(parse(&["http://h/"])).await.unwrap();
        assert_eq!(config.hold_secs, 30);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.sink, SinkStrategy::Discard);
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_display_conflicts_with_record() {
        let result = CliArgs::try_parse_from(["rtc-player", "http://h/", "--display", "--record"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_url_required() {
        assert!(build_config(parse(&[])).await.is_err());
    }
}
