use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use waypoint_agent::control_server::start_control_server;
use waypoint_agent::network::NetworkMonitor;
use waypoint_agent::notifier::LogNotifier;
use waypoint_agent::replay::{load_events, replay_events};
use waypoint_agent::store::FileStore;
use waypoint_agent::{AgentParts, ChannelSource, HttpTransport, TrackerTuning, TrackingAgent};

#[derive(Parser, Debug)]
#[command(name = "waypoint_agent")]
#[command(about = "Location tracking agent - filter, buffer and upload position fixes", long_about = None)]
struct Args {
    /// Directory for settings, buffer and status
    #[arg(long, default_value = "waypoint_data")]
    data_dir: PathBuf,

    /// Replay a recorded event log instead of waiting for a platform
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay speed-up factor (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    speedup: f64,

    /// Serve the control API on this port
    #[arg(long)]
    control_port: Option<u16>,

    /// Collection server base URL
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    /// Buffer size that triggers an upload (5, 60, 120, 300, 600)
    #[arg(long)]
    max_buffer_size: Option<usize>,

    /// Turn tracking on before starting
    #[arg(long)]
    enable_tracking: bool,

    /// Run the live sampling loop while moving
    #[arg(long)]
    high_density: bool,

    /// Log debug notifications
    #[arg(long)]
    notifications: bool,

    /// Start with the network marked unreachable
    #[arg(long)]
    offline: bool,

    /// Worst accepted horizontal accuracy (meters)
    #[arg(long, default_value = "50.0")]
    max_accuracy: f64,

    /// Minimum distance between stored points (meters)
    #[arg(long, default_value = "15.0")]
    min_distance: f64,

    /// Idle seconds before live sampling stops on foot
    #[arg(long, default_value = "60.0")]
    foot_timeout: f64,

    /// Idle seconds before live sampling stops in a vehicle
    #[arg(long, default_value = "300.0")]
    vehicle_timeout: f64,

    /// Records per upload request
    #[arg(long, default_value = "300")]
    chunk_size: usize,

    /// Upload request timeout (seconds)
    #[arg(long, default_value = "30")]
    request_timeout: u64,
}

impl Args {
    fn tuning(&self) -> TrackerTuning {
        TrackerTuning {
            max_horizontal_accuracy_m: self.max_accuracy,
            min_distance_before_save_m: self.min_distance,
            foot_idle_timeout_secs: self.foot_timeout,
            vehicle_idle_timeout_secs: self.vehicle_timeout,
            max_chunk_size: self.chunk_size,
            request_timeout: Duration::from_secs(self.request_timeout),
            ..TrackerTuning::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating {}", args.data_dir.display()))?;
    let store = Arc::new(FileStore::open(&args.data_dir)?);
    let tuning = args.tuning();
    let source = Arc::new(ChannelSource::default());

    let agent = TrackingAgent::new(AgentParts {
        store,
        source: source.clone(),
        transport: Arc::new(HttpTransport::new(tuning.request_timeout)),
        notifier: Arc::new(LogNotifier),
        network: NetworkMonitor::new(!args.offline),
        tuning,
    })?;

    if let Some(host) = &args.host {
        agent.set_server_host(host)?;
    }
    if let Some(key) = &args.api_key {
        agent.set_api_key(key)?;
    }
    if let Some(records) = args.max_buffer_size {
        agent.set_max_buffer_size(records)?;
    }
    if args.high_density {
        agent.set_high_density(true)?;
    }
    if args.notifications {
        agent.set_debug_notifications(true)?;
    }
    if args.enable_tracking && !agent.config().tracking_enabled {
        agent.set_tracking_enabled(true)?;
    } else {
        agent.try_start();
    }

    let config = agent.config();
    log::info!("Waypoint agent starting");
    log::info!("  Data dir: {}", args.data_dir.display());
    log::info!("  Server: {:?}", config.server_host);
    log::info!("  Tracking: {}, high density: {}", config.tracking_enabled, config.high_density);
    log::info!("  Buffered records: {} (flush at {})", agent.buffer_len(), config.max_buffer_size);

    if let Some(port) = args.control_port {
        let server_agent = agent.clone();
        tokio::spawn(async move {
            if let Err(e) = start_control_server(server_agent, port).await {
                log::error!("Control server stopped: {}", e);
            }
        });
    }

    match &args.replay {
        Some(path) => {
            let events = load_events(path)
                .with_context(|| format!("loading replay log {}", path.display()))?;
            replay_events(&agent, &source, events, args.speedup).await;
            source.end_live();
        }
        None => {
            log::info!("Waiting for events, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            source.end_live();
        }
    }
    agent.wait_live_loop().await;

    let outcome = agent.flush_now().await;
    log::info!("Final flush: {:?}", outcome);

    let status = agent.status();
    status.save(args.data_dir.join("status.json"))?;
    log::info!(
        "Done: {} fixes received, {} accepted, {} uploaded, {} still buffered",
        status.fixes_received,
        status.fixes_accepted,
        status.records_uploaded,
        status.buffer_len
    );
    Ok(())
}
