use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use livechat_stream::logging::{init_logging_with_default, LoggingMode};
use livechat_stream::{
    Credentials, EventSink, ListenerSpec, Platform, SinkEvent, StreamConfig, Supervisor,
    SupervisorError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod prompt;
pub mod session;

use session::{SavedSession, SessionStore};

/// How often the main loop wakes up to check for Ctrl+C and finished listeners
const TICK: Duration = Duration::from_millis(250);

/// Live chat from Twitch, YouTube and TikTok in one terminal
///
/// Targets given on the command line replace the saved session. Without any
/// targets the last session can be restored with --restore, otherwise the
/// targets are asked for interactively.
#[derive(Parser, Debug)]
#[command(name = "livechat")]
#[command(about = "Print Twitch, YouTube and TikTok live chat as one stream")]
#[command(version)]
pub struct Args {
    /// Twitch channel to join (repeatable)
    #[arg(long = "twitch", value_name = "CHANNEL")]
    pub twitch: Vec<String>,

    /// YouTube video id to poll (repeatable)
    #[arg(long = "youtube", value_name = "VIDEO_ID")]
    pub youtube: Vec<String>,

    /// TikTok username to follow (repeatable)
    #[arg(long = "tiktok", value_name = "USER")]
    pub tiktok: Vec<String>,

    /// Credentials file
    #[arg(short, long, env = "LIVECHAT_KEYS", default_value = "api_keys.json")]
    pub keys: PathBuf,

    /// Seconds listeners get to stop after Ctrl+C
    #[arg(long, env = "LIVECHAT_GRACE_PERIOD", default_value = "5")]
    pub grace_period: u64,

    /// Callback server port range start (TikTok)
    #[arg(long, default_value = "3400")]
    pub port_start: u16,

    /// Callback server port range end (TikTok)
    #[arg(long, default_value = "3500")]
    pub port_end: u16,

    /// Log level or filter directive, e.g. `debug` or `livechat_stream::adapters=trace`
    #[arg(long, env = "LIVECHAT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Reuse the listeners of the last session
    #[arg(long)]
    pub restore: bool,

    /// Do not remember this session's listeners
    #[arg(long)]
    pub no_save: bool,
}

impl Args {
    /// Listeners named on the command line, in platform order.
    pub fn specs(&self) -> Vec<ListenerSpec> {
        let named = [
            (Platform::Twitch, &self.twitch),
            (Platform::YouTube, &self.youtube),
            (Platform::TikTok, &self.tiktok),
        ];

        named
            .into_iter()
            .flat_map(|(platform, targets)| {
                targets
                    .iter()
                    .map(move |target| ListenerSpec::new(platform, target.as_str()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.grace_period == 0 {
            return Err(anyhow::anyhow!("Grace period must be positive"));
        }

        if self.port_start > self.port_end {
            return Err(anyhow::anyhow!(
                "Invalid port range: start ({}) > end ({})",
                self.port_start,
                self.port_end
            ));
        }

        if let Some(invalid) = self.specs().iter().find(|spec| !spec.is_valid()) {
            return Err(anyhow::anyhow!("Empty {} target", invalid.platform()));
        }

        EnvFilter::try_new(&self.log_level).map_err(|e| {
            anyhow::anyhow!(
                "Invalid log level '{}': {}. Use a level (error, warn, info, debug, trace) or a filter directive",
                self.log_level,
                e
            )
        })?;

        Ok(())
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .with_grace_period(Duration::from_secs(self.grace_period))
            .with_callback_ports(self.port_start, self.port_end)
    }
}

/// Work out which listeners to start: command line, then saved session, then stdin.
fn resolve_specs(args: &Args, store: Option<&SessionStore>) -> Result<Vec<ListenerSpec>> {
    let specs = args.specs();
    if !specs.is_empty() {
        return Ok(specs);
    }

    if args.restore {
        match store {
            Some(store) => {
                let saved = store.load()?;
                if !saved.listeners.is_empty() {
                    info!("Restored {} listener(s) from {}", saved.listeners.len(), store.path().display());
                    return Ok(saved.listeners);
                }
                warn!("No saved session at {}", store.path().display());
            }
            None => warn!("No config directory available, nothing to restore"),
        }
    }

    let stdin = io::stdin();
    prompt::ask_for_targets(&mut stdin.lock(), &mut io::stdout())
}

fn print_event(event: &SinkEvent, json: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer(&mut stdout, event).context("Failed to encode event")?;
        writeln!(stdout)?;
    } else {
        writeln!(stdout, "{event}")?;
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let store = SessionStore::in_config_dir();
    let specs = resolve_specs(&args, store.as_ref())?;
    if specs.is_empty() {
        println!("No streams given, nothing to listen to.");
        return Ok(());
    }

    if !args.no_save {
        if let Some(store) = &store {
            let saved = SavedSession {
                listeners: specs.clone(),
            };
            if let Err(e) = store.save(&saved) {
                warn!("Could not save session: {:#}", e);
            }
        }
    }

    let supervisor = Supervisor::builder()
        .with_config(args.stream_config())
        .with_credentials(Credentials::load(&args.keys))
        .build()
        .context("Failed to set up listeners")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let (sink, events) = EventSink::channel();
    let session = supervisor
        .start(specs, sink)
        .context("Failed to start session")?;

    eprintln!("Listening... (Press Ctrl+C to stop)");

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(TICK) {
            Some(event) => print_event(&event, args.json)?,
            None if supervisor.all_finished() => {
                info!("Every listener has finished");
                break;
            }
            None => {}
        }
    }

    eprintln!("Stopping...");
    let outcome = supervisor.stop(session);
    for event in events.try_iter() {
        print_event(&event, args.json)?;
    }

    match outcome {
        Ok(report) => {
            for listener in report.failed() {
                warn!("{} ended as {:?}", listener.spec, listener.state);
            }
            Ok(())
        }
        Err(SupervisorError::ForcedTermination { listeners }) => {
            for spec in &listeners {
                warn!("{} was terminated", spec);
            }
            Err(anyhow::anyhow!("{} listener(s) had to be terminated", listeners.len()))
        }
        Err(e) => Err(e).context("Failed to stop session"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;

    init_logging_with_default(LoggingMode::Development, Some(&args.log_level))
        .context("Failed to initialize logging")?;

    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("livechat").chain(argv.iter().copied()))
    }

    #[test]
    fn test_specs_from_flags() {
        let args = parse(&["--youtube", "vid1", "--twitch", "#chan1", "--twitch", "chan2"]);
        assert_eq!(
            args.specs(),
            vec![
                ListenerSpec::new(Platform::Twitch, "chan1"),
                ListenerSpec::new(Platform::Twitch, "chan2"),
                ListenerSpec::new(Platform::YouTube, "vid1"),
            ]
        );
    }

    #[rstest]
    #[case(&["--grace-period", "0"])]
    #[case(&["--port-start", "4000", "--port-end", "3000"])]
    #[case(&["--twitch", " "])]
    #[case(&["--log-level", "livechat_stream=loud"])]
    fn test_invalid_arguments(#[case] argv: &[&str]) {
        assert!(parse(argv).validate().is_err());
    }

    #[rstest]
    #[case("debug")]
    #[case("TRACE")]
    #[case("livechat_stream::adapters=trace")]
    #[case("warn,livechat_stream=debug")]
    fn test_log_level_accepts_filter_directives(#[case] level: &str) {
        assert!(parse(&["--log-level", level]).validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.keys, PathBuf::from("api_keys.json"));

        let config = args.stream_config();
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.callback_port_range, (3400, 3500));
    }

    #[test]
    fn test_flags_win_over_restore() {
        let args = parse(&["--restore", "--tiktok", "someone"]);
        let specs = resolve_specs(&args, None).unwrap();
        assert_eq!(specs, vec![ListenerSpec::new(Platform::TikTok, "someone")]);
    }
}
