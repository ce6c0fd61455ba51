use anyhow::{bail, Result};
use clap::{builder::RangedU64ValueParser, Args, Parser, Subcommand};
use handle_scout::{
    candidates::{CandidateKind, CandidateSource},
    notify::WebhookNotifier,
    proxy::{ProxyParser, ProxyType, RegistryConfig},
    tui::ProbeMonitorApp,
    Config, DispatcherConfig, ProbeEngine, ProbeEvent, SchedulerConfig, DEFAULT_PROXY_FILE,
    DEFAULT_VALIDATION_URL, MAX_CONCURRENCY,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

/// Concurrent username availability prober with proxy rotation
#[derive(Parser)]
#[command(name = "handle-scout")]
#[command(about = "Concurrent username availability prober with proxy rotation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

/// Options shared by `run` and `tui`
#[derive(Args, Debug, Clone)]
struct ProbeArgs {
    /// Comma separated candidate kinds (4l, 4c, 5l, 5c, 5l_meaningful, mixed, clean_mixed)
    #[arg(short, long)]
    types: Option<String>,

    /// File with one candidate per line, probed as a bounded source
    #[arg(short, long)]
    wordlist: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(
        short = 'n',
        long,
        default_value = "10",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_CONCURRENCY as u64)
    )]
    concurrency: usize,

    /// Connect directly instead of through proxies
    #[arg(long)]
    no_proxy: bool,

    /// Proxy list file
    #[arg(short, long, default_value = DEFAULT_PROXY_FILE)]
    proxies: PathBuf,

    /// Webhook URL notified on every hit
    #[arg(long, env = "SCOUT_WEBHOOK_URL", default_value = "")]
    webhook: String,

    /// Report every check, not only hits
    #[arg(short, long)]
    verbose: bool,

    /// Validation endpoint
    #[arg(long, default_value = DEFAULT_VALIDATION_URL)]
    endpoint: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "20")]
    timeout: u64,

    /// Append hits to this file as they are found
    #[arg(long)]
    hits: Option<PathBuf>,
}

#[derive(Parser)]
struct DefaultTui {
    #[command(flatten)]
    probe: ProbeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe in the foreground, printing results; Ctrl-C stops
    Run {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Probe with the interactive monitor
    Tui {
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Parse and normalize a proxy list
    ParseProxies {
        /// Input file containing proxies
        input: PathBuf,
        /// Output file for parsed proxies
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
    /// Send a test message to the webhook
    TestWebhook {
        /// Webhook URL
        #[arg(long, env = "SCOUT_WEBHOOK_URL")]
        webhook: String,
    },
    /// Print sample candidates of a kind
    Generate {
        /// Candidate kind
        #[arg(default_value = "4l")]
        kind: String,
        /// Number of candidates
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tui_mode = matches!(cli.command, Some(Commands::Tui { .. }) | None);
    init_logging(cli.debug, tui_mode);

    match cli.command {
        None => {
            // Default to TUI mode
            let defaults = DefaultTui::parse_from(["handle-scout"]);
            run_tui(defaults.probe).await?;
        }
        Some(Commands::Tui { probe }) => run_tui(probe).await?,
        Some(Commands::Run { probe, json }) => run_headless(probe, json).await?,
        Some(Commands::ParseProxies {
            input,
            output,
            proxy_type,
        }) => {
            let ptype: ProxyType = proxy_type.parse()?;
            if !input.exists() {
                bail!("Proxy file not found: {:?}", input);
            }
            let proxies = ProxyParser::load_file(&input, ptype)?;

            println!("Parsed {} proxies from {:?}", proxies.len(), input);

            if let Some(output_path) = output {
                ProxyParser::save_to_file(&proxies, &output_path)?;
                println!("Saved parsed proxies to {:?}", output_path);
            } else {
                for proxy in &proxies {
                    println!("{}", proxy.url());
                }
            }
        }
        Some(Commands::TestWebhook { webhook }) => {
            let notifier = WebhookNotifier::new(webhook)?;
            if !notifier.is_enabled() {
                bail!("No webhook URL given");
            }
            if notifier.send_connectivity_test().await {
                println!("Webhook test sent");
            } else {
                bail!("Webhook test failed");
            }
        }
        Some(Commands::Generate { kind, count }) => {
            let kind: CandidateKind = kind.parse()?;
            for candidate in kind.generator().take(count) {
                println!("{}", candidate);
            }
        }
    }

    Ok(())
}

/// Install the fmt subscriber.
///
/// In TUI mode nothing is installed unless `RUST_LOG` is set, so log lines do
/// not tear the alternate screen.
fn init_logging(debug: bool, tui_mode: bool) {
    let env_set = std::env::var_os("RUST_LOG").is_some();
    if tui_mode && !env_set && !debug {
        return;
    }

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(args: &ProbeArgs) -> Result<Arc<ProbeEngine>> {
    let config = Config {
        proxy_file: args.proxies.clone(),
        webhook_url: args.webhook.clone(),
    };

    let dispatcher_config = DispatcherConfig::new()
        .with_endpoint(args.endpoint.clone())
        .with_timeout(Duration::from_secs(args.timeout));

    let engine = ProbeEngine::from_config(
        dispatcher_config,
        RegistryConfig::default(),
        &config.webhook_url,
    )?;

    if !args.no_proxy {
        let count = engine.load_proxies_from_file(&config.proxy_file)?;
        if count == 0 {
            eprintln!(
                "No proxies loaded from {:?}, connecting directly",
                config.proxy_file
            );
        } else {
            eprintln!("Loaded {} proxies from {:?}", count, config.proxy_file);
        }
    }

    Ok(Arc::new(engine))
}

fn build_sources(args: &ProbeArgs) -> Result<Vec<CandidateSource>> {
    let tags: Vec<String> = match (&args.types, &args.wordlist) {
        (Some(types), _) => types
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        // A wordlist on its own probes only the wordlist.
        (None, Some(_)) => Vec::new(),
        (None, None) => vec![CandidateKind::FourLetters.tag().to_string()],
    };

    let mut sources = CandidateSource::from_tags(&tags)?;
    if let Some(path) = &args.wordlist {
        sources.push(CandidateSource::from_wordlist_file(path)?);
    }
    Ok(sources)
}

fn start(args: &ProbeArgs) -> Result<(Arc<ProbeEngine>, UnboundedReceiver<ProbeEvent>)> {
    let sources = build_sources(args)?;
    let engine = build_engine(args)?;

    let config = SchedulerConfig::new()
        .with_concurrency(args.concurrency)
        .with_proxy(!args.no_proxy);
    let events = engine.start_run(sources, config, args.verbose)?;
    Ok((engine, events))
}

fn open_hits_file(path: Option<&Path>) -> Result<Option<File>> {
    Ok(path
        .map(|p| OpenOptions::new().create(true).append(true).open(p))
        .transpose()?)
}

async fn run_tui(args: ProbeArgs) -> Result<()> {
    let (engine, events) = start(&args)?;
    let mut app = ProbeMonitorApp::new(engine, events, args.hits.clone());
    app.run().await?;
    Ok(())
}

async fn run_headless(args: ProbeArgs, json: bool) -> Result<()> {
    let mut hits_file = open_hits_file(args.hits.as_deref())?;
    let (engine, mut events) = start(&args)?;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };

                if let ProbeEvent::Hit { candidate, .. } = &event {
                    if let Some(file) = hits_file.as_mut() {
                        writeln!(file, "{}", candidate)?;
                    }
                }

                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print_event(&event);
                }
            }
            _ = signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Stopping, waiting for in-flight checks...");
                engine.cancel_run();
            }
        }
    }

    engine.join().await;
    Ok(())
}

fn print_event(event: &ProbeEvent) {
    match event {
        ProbeEvent::Hit { candidate, kind } => {
            println!("[HIT] [{}] {}", kind.to_uppercase(), candidate);
        }
        ProbeEvent::Checked {
            candidate,
            kind,
            result,
        } => {
            println!("[{}] {} - {}", kind.to_uppercase(), candidate, result.message);
        }
        ProbeEvent::SourceExhausted { kind } => {
            println!("Source {} exhausted", kind);
        }
        ProbeEvent::Stats(stats) => {
            println!(
                "Checks: {} | Hits: {} | Errors: {} | CPM: {} | Proxies: {}",
                stats.checks, stats.hits, stats.errors, stats.cpm, stats.proxy_count
            );
        }
        ProbeEvent::Notified {
            candidate,
            delivered,
        } => {
            if !delivered {
                eprintln!("Webhook failed for {}", candidate);
            }
        }
        ProbeEvent::Finished(outcome) => {
            println!("Run finished: {}", outcome);
        }
    }
}
