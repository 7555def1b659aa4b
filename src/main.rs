use anyhow::{Context, Result};
use clap::Parser;

use fraud_signal_engine::data::loader::load_claims;
use fraud_signal_engine::data::preprocessing::ClaimFilter;
use fraud_signal_engine::{analyze_network, score_anomalies, storage, Config, MethodConfig};

#[derive(Parser, Debug)]
#[clap(
    name = "fraud-signal-engine",
    about = "Anomaly scoring and fraud ring detection over healthcare claims"
)]
struct Cli {
    /// Path to input claims file (CSV or Parquet)
    #[clap(long)]
    input: String,

    /// Output directory for results
    #[clap(long, default_value = "fraud_results")]
    output_dir: String,

    /// JSON configuration file; command line options override it
    #[clap(long)]
    config: Option<String>,

    /// Anomaly method as name[:parameter[:weight]], repeatable (e.g. zscore:2.5)
    #[clap(long = "method")]
    methods: Vec<MethodConfig>,

    /// Seed for the ensemble method
    #[clap(long)]
    seed: Option<u64>,

    /// Number of top anomalies to report
    #[clap(long)]
    top_n: Option<usize>,

    /// Number of suspicious clusters to report
    #[clap(long)]
    top_k: Option<usize>,

    /// Minimum cluster size in nodes
    #[clap(long)]
    min_clique_size: Option<usize>,

    /// Maximum cluster size in nodes
    #[clap(long)]
    max_clique_size: Option<usize>,

    /// Minimum distinct partners for a node to join the cluster search
    #[clap(long)]
    min_degree: Option<usize>,

    /// Cap on cluster search expansions
    #[clap(long)]
    max_expansions: Option<usize>,

    /// Wall-clock cap on the cluster search in milliseconds
    #[clap(long)]
    time_budget_ms: Option<u64>,

    /// Only analyze claims for this patient, repeatable
    #[clap(long = "patient-id")]
    patient_ids: Vec<i64>,

    /// Only analyze claims for this provider, repeatable
    #[clap(long = "provider-id")]
    provider_ids: Vec<i64>,

    /// Only analyze claims of at least this amount
    #[clap(long)]
    min_amount: Option<f64>,

    /// Only analyze claims of at most this amount
    #[clap(long)]
    max_amount: Option<f64>,

    /// Drop unusable rows instead of failing
    #[clap(long)]
    sanitize: bool,

    /// Number of worker threads (0 = use all available cores)
    #[clap(long, default_value = "0")]
    threads: usize,

    /// Verbose logging
    #[clap(long, short)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<(Config, String, String)> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if !self.methods.is_empty() {
            config.methods = self.methods;
        }
        if let Some(seed) = self.seed {
            config.set_seed(seed);
        }
        if let Some(top_n) = self.top_n {
            config.top_n = top_n;
        }

        let network = &mut config.network;
        if let Some(top_k) = self.top_k {
            network.top_k = top_k;
        }
        if let Some(min) = self.min_clique_size {
            network.min_clique_size = min;
        }
        if self.max_clique_size.is_some() {
            network.max_clique_size = self.max_clique_size;
        }
        if let Some(min_degree) = self.min_degree {
            network.min_degree = min_degree;
        }
        if self.max_expansions.is_some() {
            network.max_expansions = self.max_expansions;
        }
        if self.time_budget_ms.is_some() {
            network.time_budget_ms = self.time_budget_ms;
        }
        config.sanitize |= self.sanitize;

        let filter = config.filter.get_or_insert_with(ClaimFilter::default);
        if !self.patient_ids.is_empty() {
            filter.patient_ids = Some(self.patient_ids);
        }
        if !self.provider_ids.is_empty() {
            filter.provider_ids = Some(self.provider_ids);
        }
        if self.min_amount.is_some() {
            filter.min_amount = self.min_amount;
        }
        if self.max_amount.is_some() {
            filter.max_amount = self.max_amount;
        }

        Ok((config, self.input, self.output_dir))
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
        num_cpus::get()
    };

    log::info!("Using {} worker threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let (config, input, output_dir) = args.into_config()?;

    log::info!("Starting fraud signal analysis");
    log::info!("Input: {}", input);
    log::info!("Output: {}", output_dir);

    // 1. Load claims
    let table = load_claims(&input, config.sanitize)?;
    log::info!("Loaded {} claims", table.len());
    let table = config.select_claims(table);

    // 2. Score anomalies
    let anomalies = score_anomalies(&table, &config.methods).context("anomaly scoring failed")?;
    let flagged = anomalies.iter().filter(|r| r.is_anomaly).count();
    log::info!("Flagged {} of {} claims as anomalous", flagged, anomalies.len());

    // 3. Analyze the patient-provider network
    let network = analyze_network(&table, &config.network).context("network analysis failed")?;
    if network.truncated {
        log::warn!("Cluster search stopped early; reported clusters are partial");
    }

    // 4. Save results
    storage::save_results(&table, &anomalies, &network, config.top_n, &output_dir)?;

    log::info!("Analysis complete. Results saved to {}", output_dir);

    Ok(())
}
