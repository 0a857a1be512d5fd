use anyhow::{Context, Result};
use clap::Parser;
use fraud_graph_analyzer::graph::build_graph;
use fraud_graph_analyzer::{analyze, data, relation_paths, storage, AnalysisConfig, RecordId};

#[derive(Parser, Debug)]
#[clap(
    name = "fraud-graph-analyzer",
    about = "Cycle, burst, ring and path analysis of transaction graph snapshots"
)]
struct Cli {
    /// Path to input snapshot JSON file
    #[clap(long)]
    input: String,

    /// Output directory for results
    #[clap(long, default_value = "analysis_results")]
    output_dir: String,

    /// JSON file with analysis options
    #[clap(long)]
    config: Option<String>,

    /// Burst window in milliseconds
    #[clap(long)]
    time_window: Option<i64>,

    /// Transactions per burst window
    #[clap(long)]
    min_transactions: Option<usize>,

    /// Similarity threshold for density neighbors
    #[clap(long)]
    eps: Option<f64>,

    /// Density neighbors needed to seed a cluster
    #[clap(long)]
    min_pts: Option<usize>,

    /// Minimum cluster size
    #[clap(long)]
    min_cluster_size: Option<usize>,

    /// Minimum risk for a cycle to be reported
    #[clap(long)]
    cycle_risk_threshold: Option<u8>,

    /// Stop the cycle search after this many cycles
    #[clap(long)]
    max_cycles: Option<usize>,

    /// Longest cycle (in nodes) the search explores
    #[clap(long)]
    max_path_length: Option<usize>,

    /// Wall-clock budget in milliseconds
    #[clap(long)]
    timeout_ms: Option<u64>,

    /// Skip the all-pairs path analysis
    #[clap(long)]
    skip_paths: bool,

    /// Smallest dense subgraph to report
    #[clap(long)]
    subgraph_min_size: Option<usize>,

    /// Density a dense subgraph must keep while growing
    #[clap(long)]
    subgraph_min_density: Option<f64>,

    /// Print the simple paths from this id to --path-to instead of analyzing
    #[clap(long, requires = "path_to")]
    path_from: Option<RecordId>,

    /// Target id of a relation-path query
    #[clap(long, requires = "path_from")]
    path_to: Option<RecordId>,

    /// Print the full result to stdout instead of writing files
    #[clap(long)]
    stdout: bool,

    /// Number of worker threads (0 = use all available cores)
    #[clap(long, default_value = "0")]
    threads: usize,

    /// Verbose logging
    #[clap(long, short)]
    verbose: bool,
}

impl Cli {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path))?;
                AnalysisConfig::from_json(&text)?
            }
            None => AnalysisConfig::default(),
        };

        if let Some(time_window) = self.time_window {
            config.time_window = time_window;
        }
        if let Some(min_transactions) = self.min_transactions {
            config.min_transactions = min_transactions;
        }
        if let Some(eps) = self.eps {
            config.eps = eps;
        }
        if let Some(min_pts) = self.min_pts {
            config.min_pts = min_pts;
        }
        if let Some(min_cluster_size) = self.min_cluster_size {
            config.min_cluster_size = min_cluster_size;
        }
        if let Some(threshold) = self.cycle_risk_threshold {
            config.cycle_risk_threshold = threshold;
        }
        if let Some(max_cycles) = self.max_cycles {
            config.max_cycles_emitted = max_cycles;
        }
        if let Some(max_path_length) = self.max_path_length {
            config.max_path_length = max_path_length;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = Some(timeout_ms);
        }
        if self.skip_paths {
            config.analyze_paths = false;
        }
        if let Some(min_size) = self.subgraph_min_size {
            config.subgraph_min_size = min_size;
        }
        if let Some(min_density) = self.subgraph_min_density {
            config.subgraph_min_density = min_density;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    // Configure logging
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    // Set number of threads
    let num_threads = if args.threads > 0 {
        args.threads
    } else {
        // If threads = 0, use all available cores
        num_cpus::get()
    };

    log::info!("Using {} worker threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let config = args.analysis_config()?;

    log::info!("Starting fraud graph analysis");
    log::info!("Input: {}", args.input);

    let snapshot = data::load_snapshot(&args.input)?;

    if let (Some(from), Some(to)) = (&args.path_from, &args.path_to) {
        let (graph, _) = build_graph(&snapshot.nodes, &snapshot.edges);
        let found = relation_paths(&graph, from, to, config.max_path_length, config.max_relation_paths);
        log::info!("{} paths from {} to {}", found.paths.len(), from, to);
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    let result = analyze(&snapshot, &config)?;

    if args.stdout {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        storage::save_results(&result, &args.output_dir)?;
        log::info!("Analysis complete. Results saved to {}", args.output_dir);
    }

    Ok(())
}
