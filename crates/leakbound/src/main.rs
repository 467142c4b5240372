use anyhow::{Context as _, Result};
use clap::Parser;
use leakbound_core::config::{AnalysisConfig, LatticeKind};
use leakbound_core::lattice::{BasicSec, BitId, DiamondSec, Sec};
use leakbound_core::{analyze, Algo, FlowError, LeakageResult, Program};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Bound how many secret input bits a program leaks to its public outputs
#[derive(Parser, Debug)]
#[command(name = "leakbound", version, about)]
struct Cli {
    /// Program to analyze (JSON)
    program: PathBuf,

    /// Analysis configuration file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Method invocation handler, e.g. `handler=call_string;maxrec=2;bot=basic`
    #[arg(long)]
    handler: Option<String>,

    /// Min-cut algorithm: edmonds_karp, dinic or cut_enumeration
    #[arg(long)]
    algo: Option<Algo>,

    /// Record every minimum cut (cut_enumeration only)
    #[arg(short = 'r', long, visible_alias = "ra")]
    record_alternatives: bool,

    /// Security lattice: basic or diamond
    #[arg(long)]
    lattice: Option<LatticeKind>,

    /// Observer level; `bot`, `top`, a level name, or `all`
    #[arg(long, default_value = "bot")]
    level: String,

    /// Width of integer values in bits
    #[arg(long)]
    bit_width: Option<usize>,

    /// Print the final variable bindings
    #[arg(long)]
    dump: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                AnalysisConfig::from_json(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => AnalysisConfig::default(),
        };
        if let Some(handler) = &self.handler {
            config.handler = handler.clone();
        }
        if let Some(algo) = self.algo {
            config.algo = algo;
        }
        if let Some(lattice) = self.lattice {
            config.lattice = lattice;
        }
        if let Some(width) = self.bit_width {
            config.bit_width = width;
        }
        config.record_alternatives |= self.record_alternatives;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.analysis_config()?;
    let source = fs::read_to_string(&cli.program)
        .with_context(|| format!("failed to read program {}", cli.program.display()))?;
    let program = Program::from_json(&source)
        .with_context(|| format!("invalid program {}", cli.program.display()))?;
    debug!(?config, "starting analysis");

    match config.lattice {
        LatticeKind::Basic => run::<BasicSec>(&cli, &program, config),
        LatticeKind::Diamond => run::<DiamondSec>(&cli, &program, config),
    }
}

fn observers<S: Sec>(level: &str) -> Result<Vec<S>, FlowError> {
    Ok(match level {
        "all" => S::elements().to_vec(),
        "bot" => vec![S::bot()],
        "top" => vec![S::top()],
        name => vec![S::parse(name).ok_or_else(|| FlowError::UnknownSecurityLevel(name.to_string()))?],
    })
}

fn run<S: Sec>(cli: &Cli, program: &Program, config: AnalysisConfig) -> Result<()> {
    let observers = observers::<S>(&cli.level)?;
    let algo = config.algo;
    let mut ctx = analyze::<S>(program, config).context("analysis failed")?;
    if cli.dump {
        println!("{}", ctx.dump());
    }

    let all = observers.len() > 1;
    for observer in observers {
        let result = ctx.leakage_at(observer, algo)?;
        if all {
            println!("Leakage at {observer}: {}", result.max_flow);
        } else {
            println!("Leakage: {}", result.max_flow);
        }
        if cli.record_alternatives {
            print_cuts(&result);
        }
    }
    Ok(())
}

fn render(cut: &BTreeSet<BitId>) -> String {
    cut.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn print_cuts(result: &LeakageResult) {
    println!("Min cut: {}", render(&result.min_cut));
    for (i, cut) in result.alternatives.iter().enumerate() {
        println!("  cut {}: {}", i + 1, render(cut));
    }
}
