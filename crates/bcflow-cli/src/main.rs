use anyhow::{Context, Result};
use bcflow_bytecode::Opcode;
use bcflow_dataflow::rules::is_supported_opcode;
use bcflow_dataflow::{BuildStats, ByteFlow, DataflowBuilder, can_translate};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

mod config;

#[derive(Parser)]
#[command(name = "bcflow", version, about = "Bytecode to dataflow graph builder")]
struct Cli {
    /// Config file (defaults to bcflow.toml in the current or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a byte-flow bundle into a dataflow tree
    Build {
        /// Byte-flow bundle (JSON)
        input: PathBuf,
        /// Write the tree here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Convert sibling blocks in parallel
        #[arg(long)]
        parallel: bool,
        /// Skip post-conversion verification
        #[arg(long)]
        no_verify: bool,
        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Report instructions without a translation rule
    Check {
        /// Byte-flow bundle (JSON)
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            input,
            output,
            parallel,
            no_verify,
            pretty,
        } => {
            let mut builder = config.builder;
            if parallel {
                builder = builder.with_parallel(true);
            }
            if no_verify {
                builder = builder.with_verify(false);
            }
            build(&input, output.as_deref(), DataflowBuilder::new(builder), pretty)?
        }
        Commands::Check { input } => check(&input)?,
    }

    Ok(())
}

fn read_flow(path: &Path) -> Result<ByteFlow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn build(input: &Path, output: Option<&Path>, builder: DataflowBuilder, pretty: bool) -> Result<()> {
    let flow = read_flow(input)?;
    let rvsdg = builder.build(&flow)?;

    let stats = BuildStats::collect(&rvsdg);
    info!(
        blocks = stats.blocks,
        ops = stats.ops,
        incoming_stack = stats.incoming_stack,
        incoming_vars = stats.incoming_vars,
        effects = stats.effects,
        "built {}",
        input.display()
    );

    let json = if pretty {
        serde_json::to_string_pretty(&rvsdg)?
    } else {
        serde_json::to_string(&rvsdg)?
    };

    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn check(input: &Path) -> Result<()> {
    let flow = read_flow(input)?;
    if can_translate(&flow.scfg, &flow.instructions) {
        info!("{}: all instructions supported", input.display());
        return Ok(());
    }

    let mut opcodes: BTreeSet<Opcode> = BTreeSet::new();
    let mut listing = String::new();
    for block in flow.scfg.leaves() {
        for instruction in block.instructions(&flow.instructions) {
            if !is_supported_opcode(instruction.opcode) {
                opcodes.insert(instruction.opcode);
                listing.push_str(&format!("\n  [{}] {instruction}", block.label));
            }
        }
    }
    let names: Vec<&str> = opcodes.iter().map(|opcode| opcode.name()).collect();
    Err(anyhow::anyhow!(
        "{}: unsupported instructions: {}{listing}",
        input.display(),
        names.join(", ")
    ))
}
