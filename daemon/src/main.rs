use anyhow::Result;
use pidwatch_daemon::{
    cli::{parse_args, CliAction, RunArgs},
    collector::LinuxProcessCollector,
    config::Config,
    monitor::{Monitor, MonitorState, RunReport},
    sampler::Sampler,
    sink::OutputTarget,
};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reads the config before logging exists, so problems are handed back for
/// logging once the subscriber is up.
fn load_config(explicit: Option<&Path>) -> (Config, Option<String>) {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_path);
    if explicit.is_none() && !path.exists() {
        return (Config::default(), None);
    }
    match Config::load(&path) {
        Ok(config) => (config, None),
        Err(e) => (
            Config::default(),
            Some(format!("Failed to load config {}: {}, using defaults", path.display(), e)),
        ),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs, config: Config, target: OutputTarget) -> Result<RunReport> {
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.sampling.interval());
    let max_samples = args.max_samples.or(config.sampling.max_samples);

    let collector = LinuxProcessCollector::new();
    let sampler = Sampler::new(&collector, args.pid)?;

    let report = Monitor::new(sampler, target.into_sink())
        .with_interval(interval)
        .with_max_samples(max_samples)
        .run()
        .await;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args(std::env::args_os()) {
        CliAction::Help(text) | CliAction::Version(text) | CliAction::ParamError(text) => {
            println!("{}", text.trim_end());
            return Ok(());
        }
        CliAction::Run(args) => args,
    };

    let (config, config_warning) = load_config(args.config.as_deref());
    init_logging(args.log_level.as_deref().unwrap_or(&config.logging.level));
    if let Some(message) = config_warning {
        warn!("{}", message);
    }

    let target = OutputTarget::from_path(args.out.clone().or_else(|| config.output.path.clone()));
    let console = target.is_console();
    info!("pidwatch starting for PID {}, output: {}", args.pid, target);

    match run(args, config, target).await {
        Ok(report) => match report.state {
            MonitorState::StoppedOk => info!("Stopped after {} samples", report.samples),
            _ => {
                if let Some(e) = report.error {
                    warn!("Stopped after {} samples: {}", report.samples, e);
                }
            }
        },
        Err(e) => {
            // Nothing is written to an output file for startup failures.
            error!("{}", e);
            if console {
                println!("Error: {}", e);
            }
        }
    }
    Ok(())
}
