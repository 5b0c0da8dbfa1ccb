use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use shelfscan::config::{Config, GroupingMode};
use shelfscan::pipeline::{Orchestrator, PipelineReport};
use shelfscan::service::server;
use shelfscan::service::{
    DetectStage, GroupStage, HttpDetect, HttpGroup, HttpStage, HttpVisualize, LocalDetect,
    LocalGroup, LocalVisualize, VisualizeStage,
};
use shelfscan::{CascadeDetector, GroupingEngine, Visualizer};

#[derive(Parser)]
#[command(name = "shelfscan")]
#[command(about = "Detect products on shelf photos and group them by brand")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline on one image and print the summary
    Analyze {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory for the rendered result image
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Call the stage services configured under [services] instead of
        /// running the stages in this process
        #[arg(long)]
        remote: bool,
    },
    /// Expose stage services over HTTP
    Serve {
        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        #[arg(long, value_enum, default_value_t = Role::All)]
        role: Role,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Role {
    Detect,
    Group,
    Visualize,
    /// `/process` backed by the remote stage services
    Orchestrator,
    /// Every endpoint, with all stages in this process
    All,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn local_detect(config: &Config) -> LocalDetect {
    let detector = CascadeDetector::from_config(&config.detection, &config.fallback);
    LocalDetect::new(Arc::new(detector))
}

fn local_group(config: &Config) -> LocalGroup {
    LocalGroup::new(Arc::new(GroupingEngine::from_config(&config.grouping)))
}

fn local_visualize(config: &Config) -> LocalVisualize {
    LocalVisualize::new(Arc::new(Visualizer::new(&config.output.results_dir)))
}

fn local_stages(config: &Config) -> (LocalDetect, LocalGroup, LocalVisualize) {
    (local_detect(config), local_group(config), local_visualize(config))
}

fn remote_stages(config: &Config) -> anyhow::Result<(HttpDetect, HttpGroup, HttpVisualize)> {
    let services = &config.services;
    let timeouts = &services.timeouts;
    Ok((
        HttpDetect(HttpStage::new(&services.detect_url, timeouts.detect, timeouts.health)?),
        HttpGroup(HttpStage::new(&services.group_url, timeouts.group, timeouts.health)?),
        HttpVisualize(HttpStage::new(
            &services.visualize_url,
            timeouts.visualize,
            timeouts.health,
        )?),
    ))
}

fn print_report(report: &PipelineReport, verbose: bool) -> anyhow::Result<()> {
    if verbose {
        println!("States: {:?}", report.trace);
    }

    let summary = match &report.outcome {
        Ok(summary) => summary,
        Err(e) => anyhow::bail!("{e}"),
    };

    println!("\n=== Shelf Analysis Results ===");
    println!("Products detected: {}", summary.products_count);
    println!("Groups: {}", summary.groups_count);
    println!("Processing time: {:.2}s", summary.processing_time);
    println!("Result image: {}", summary.result_image);

    for (group_id, count) in &summary.groups {
        let brand = summary
            .detections
            .iter()
            .find(|d| d.group_id() == Some(*group_id))
            .and_then(|d| d.brand_name())
            .unwrap_or("?");
        println!("  Group {group_id}: {brand} ({count} products)");
    }

    if verbose {
        println!("\nDetections:");
        for det in &summary.detections {
            let b = det.bbox();
            println!(
                "  [{}, {}, {}, {}] conf {:.2} -> {}",
                b.x1(),
                b.y1(),
                b.x2(),
                b.y2(),
                det.confidence(),
                det.group_name().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn analyze<D, G, V>(
    orchestrator: Orchestrator<D, G, V>,
    image_path: &Path,
    verbose: bool,
) -> anyhow::Result<()>
where
    D: DetectStage,
    G: GroupStage,
    V: VisualizeStage,
{
    let bytes = std::fs::read(image_path)
        .with_context(|| format!("failed to read {}", image_path.display()))?;
    let report = orchestrator.run(bytes).await;
    print_report(&report, verbose)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Analyze {
            image_path,
            config,
            output_dir,
            remote,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output.results_dir = dir;
            }
            let timeouts = config.services.timeouts;

            if remote {
                let (d, g, v) = remote_stages(&config)?;
                analyze(Orchestrator::new(d, g, v, timeouts), &image_path, args.verbose).await
            } else {
                let (d, g, v) = local_stages(&config);
                analyze(Orchestrator::new(d, g, v, timeouts), &image_path, args.verbose).await
            }
        }
        Command::Serve { config, bind, role } => {
            let config = load_config(config.as_deref())?;
            let timeouts = config.services.timeouts;

            let app = match role {
                Role::Detect => {
                    let d = local_detect(&config);
                    server::stage_health_routes("detection", d.capabilities())
                        .merge(server::detect_routes(d))
                }
                Role::Group => {
                    let g = local_group(&config);
                    let service = match config.grouping.mode {
                        GroupingMode::Full => "grouping",
                        GroupingMode::Fast => "fast_grouping",
                    };
                    server::stage_health_routes(service, g.capabilities())
                        .merge(server::group_routes(g))
                }
                Role::Visualize => {
                    let v = local_visualize(&config);
                    server::stage_health_routes("visualization", Default::default())
                        .merge(server::visualize_routes(v))
                        .merge(server::results_routes(&config.output.results_dir))
                }
                Role::Orchestrator => {
                    let (d, g, v) = remote_stages(&config)?;
                    server::process_routes(Arc::new(Orchestrator::new(d, g, v, timeouts)))
                        .merge(server::results_routes(&config.output.results_dir))
                }
                Role::All => {
                    let (d, g, v) = local_stages(&config);
                    server::detect_routes(d.clone())
                        .merge(server::group_routes(g.clone()))
                        .merge(server::visualize_routes(v.clone()))
                        .merge(server::process_routes(Arc::new(Orchestrator::new(
                            d, g, v, timeouts,
                        ))))
                        .merge(server::results_routes(&config.output.results_dir))
                }
            };

            server::serve(bind, app).await
        }
    }
}
