use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use vlanflow::config::{self, TraceEvent};
use vlanflow::controller::service::DEFAULT_EVENT_CAPACITY;
use vlanflow::controller::{Controller, ControllerService, RecordingPlane, SwitchId, VlanBinding};
use vlanflow::telemetry::{init_logging, MetricsRegistry};

#[derive(Parser)]
#[command(name = "vlanflow")]
#[command(about = "VLAN-aware OpenFlow learning-switch controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Feed a recorded packet-in trace through the controller
    Replay {
        /// Path to controller.toml
        #[arg(short, long, default_value = "controller.toml")]
        config: PathBuf,

        /// Path to the trace file
        #[arg(short, long)]
        trace: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate controller.lock from controller.toml
    Generate {
        /// Path to controller.toml
        #[arg(short, long, default_value = "controller.toml")]
        config: PathBuf,

        /// Output path for controller.lock
        #[arg(short, long, default_value = "controller.lock")]
        output: PathBuf,
    },
    /// Validate controller.toml without generating lock file
    Validate {
        /// Path to controller.toml
        #[arg(short, long, default_value = "controller.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Generate { config, output } => cmd_config_generate(&config, &output),
            ConfigAction::Validate { config } => cmd_config_validate(&config),
        },
        Commands::Replay { config, trace } => cmd_replay(&config, &trace),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_validated(config_path: &PathBuf) -> Result<(config::Config, String), String> {
    let content = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;
    let cfg = config::parse(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }
    Ok((cfg, content))
}

fn cmd_replay(config_path: &PathBuf, trace_path: &PathBuf) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let (cfg, _) = load_validated(config_path)?;
    let log_config = cfg.logging.as_ref().map(|l| l.to_log_config());
    init_logging(log_config.as_ref());

    let trace = config::load_trace(trace_path)
        .map_err(|e| format!("Failed to load trace {}: {}", trace_path.display(), e))?;
    let settings = cfg
        .controller
        .to_settings()
        .map_err(|e| format!("Invalid controller settings: {}", e))?;
    let sweep_interval = cfg
        .controller
        .sweep_duration()
        .map_err(|e| format!("Invalid controller settings: {}", e))?;

    info!(
        "Replaying {} events from {} ({:?} mode, expiration {:?})",
        trace.events.len(),
        trace_path.display(),
        settings.mode,
        settings.expiration_time
    );

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(MetricsRegistry::new());
        let controller = Controller::new(settings, metrics.clone());
        let plane = match cfg.controller.flow_table_capacity {
            Some(capacity) => RecordingPlane::with_flow_capacity(capacity),
            None => RecordingPlane::new(),
        };

        // Sweeps follow trace time, not wall-clock time
        let (service, handle) =
            ControllerService::new(controller, plane, None, DEFAULT_EVENT_CAPACITY);
        let task = tokio::spawn(service.run());

        for switch in &cfg.switches {
            let id = switch.switch_id();
            let ports = switch.ports.iter().map(|p| p.port).collect();
            handle
                .connect_switch(id, ports)
                .await
                .map_err(|e| e.to_string())?;

            for port in &switch.ports {
                // Validated above, so bindings resolve
                if let Ok(Some(binding)) = port.binding() {
                    handle
                        .set_vlan_id(id, port.port, binding.config_id())
                        .await
                        .map_err(|e| format!("Switch {} port {}: {}", id, port.port, e))?;
                }
            }
        }

        let mut events = trace.events.clone();
        events.sort_by(|a, b| a.at().total_cmp(&b.at()));

        let start = Instant::now();
        let mut next_sweep = sweep_interval;
        for event in &events {
            let offset = event.offset();
            while next_sweep <= offset && !sweep_interval.is_zero() {
                handle
                    .sweep(start + next_sweep)
                    .await
                    .map_err(|e| e.to_string())?;
                next_sweep += sweep_interval;
            }

            let now = start + offset;
            match event {
                TraceEvent::PacketIn { switch, port, .. } => match event.frame() {
                    Ok(frame) => handle
                        .packet_in(SwitchId(*switch), *port, frame, now)
                        .await
                        .map_err(|e| e.to_string())?,
                    Err(e) => warn!("Skipping trace event at {}s: {}", event.at(), e),
                },
                TraceEvent::SetVlan { switch, port, vlan, .. } => {
                    if let Err(e) = handle.set_vlan_id(SwitchId(*switch), *port, *vlan).await {
                        warn!("Trace event at {}s: set_vlan failed: {}", event.at(), e);
                    }
                }
                TraceEvent::Sweep { .. } => {
                    handle.sweep(now).await.map_err(|e| e.to_string())?;
                }
            }
        }

        handle.shutdown().await.map_err(|e| e.to_string())?;
        let (controller, plane) = task.await.map_err(|e| format!("Controller task failed: {}", e))?;

        print_summary(&controller, &plane);
        for (name, value) in metrics.export() {
            println!("{} {}", name, value);
        }
        Ok::<(), String>(())
    })
}

fn print_summary(controller: &Controller, plane: &RecordingPlane) {
    for id in controller.switch_ids() {
        let Some(snapshot) = controller.snapshot(id) else {
            continue;
        };
        println!("[INFO] Switch {}", id);
        for (port, binding) in &snapshot.ports {
            let binding = binding.map_or("unbound".to_string(), |b: VlanBinding| b.to_string());
            println!("  port {:>4}  {}", port, binding);
        }
        for entry in &snapshot.learned {
            println!(
                "  learned  vlan {:>4}  {}  port {}",
                entry.vlan, entry.mac, entry.port
            );
        }
        for rule in &snapshot.rules {
            println!(
                "  rule     vlan {:>4}  {}  -> port {}",
                rule.flow.vlan, rule.flow.dst_mac, rule.out_port
            );
        }
        println!("  plane holds {} rules", plane.flow_count(id));
    }
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let (cfg, content) = load_validated(config_path)?;
    let lock = config::generate_lock(&cfg, &content);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by vlanflow - DO NOT EDIT\n# Source: {} (crc32: {})\n\n{}",
        config_path.display(),
        lock.source_hash,
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    load_validated(config_path)?;
    println!("[INFO] Configuration is valid");
    Ok(())
}
