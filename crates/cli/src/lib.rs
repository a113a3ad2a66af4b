//! # cli
//!
//! Command-line interface for proving and verifying hash chains.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chain_prover::{bootstrap, index_after, load_or_bootstrap, ArtifactStore, ChainProver, ProofRef, ProverConfig, ShapeId};
use chain_recursion::{run_extractor, HashChainStep};
use circuit_kit::TransparentBackend;
use clap::{Parser, Subcommand};
use linkage::{ChainId, ElementShape};
use tracing::info;

/// chainrec command-line application
#[derive(Parser)]
#[command(name = "chainrec")]
#[command(about = "Prove long hash chains with recursively merged proofs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Data directory (overrides CHAINREC_DATA_DIR)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Verify merge children with the batched gadget (overrides CHAINREC_BATCH_VERIFY)
    #[arg(long)]
    pub batch_verify: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and set up every shape, and write the fingerprint registry
    Setup {
        /// Rebuild even if matching artifacts exist
        #[arg(long)]
        force: bool,
    },
    /// Prove one leaf
    ProveUnit {
        /// Starting identifier (hex)
        #[arg(long)]
        begin: String,

        /// Expected end identifier (hex); computed when omitted
        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value_t = 0)]
        begin_index: u64,

        #[arg(long)]
        end_index: Option<u64>,

        /// Leaf shape; defaults to the smallest one
        #[arg(long)]
        iterations: Option<u32>,
    },
    /// Merge two stored proofs
    ProveMerge {
        /// genesis or recursive; chosen from the children when omitted
        #[arg(long)]
        shape: Option<String>,

        /// First child, as shape:begin:end
        #[arg(long)]
        first: String,

        /// Second child, as shape:begin:end
        #[arg(long)]
        second: String,

        /// Expected identifiers, checked against the children when given
        #[arg(long)]
        begin: Option<String>,
        #[arg(long)]
        relay: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Extend a stored proof with one inlined transition
    ProveHybrid {
        /// Child, as shape:begin:end
        #[arg(long)]
        first: String,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        end_index: Option<u64>,
    },
    /// Verify a stored proof as a final chain proof
    Verify {
        /// Proof, as shape:begin:end
        #[arg(long)]
        proof: String,

        #[arg(long)]
        begin: String,

        #[arg(long)]
        end: String,
    },
    /// Run the fingerprint extractor on a stored shape
    Fingerprint {
        /// unit_<n>, genesis, recursive or hybrid
        #[arg(long)]
        shape: String,
    },
    /// Prove and verify a chain of the given length from a zero identifier
    Demo {
        #[arg(long, default_value_t = 11)]
        links: u64,

        /// Starting identifier (hex)
        #[arg(long)]
        begin: Option<String>,
    },
}

/// Parse a 32-byte identifier, with or without `0x`.
pub fn parse_id(s: &str) -> Result<ChainId> {
    ChainId::from_hex(s, ElementShape::digest256()).with_context(|| format!("invalid identifier {s:?}"))
}

fn parse_ref(s: &str) -> Result<ProofRef> {
    s.parse::<ProofRef>().with_context(|| format!("invalid proof reference {s:?}"))
}

fn parse_shape(s: &str) -> Result<ShapeId> {
    s.parse::<ShapeId>().with_context(|| format!("invalid shape {s:?}"))
}

fn expect_id(label: &str, expected: Option<&String>, actual: &ChainId) -> Result<()> {
    if let Some(e) = expected {
        let e = parse_id(e)?;
        if e != *actual {
            bail!("{label} mismatch: expected {}, the proofs declare {}", e, actual);
        }
    }
    Ok(())
}

fn config(cli: &Cli) -> ProverConfig {
    let mut cfg = ProverConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = dir.clone();
    }
    cfg.batch_verify |= cli.batch_verify;
    cfg
}

/// Run the CLI application
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cfg = config(&cli);
    execute(cli.command, &cfg)
}

pub fn execute(command: Commands, cfg: &ProverConfig) -> Result<()> {
    match command {
        Commands::Setup { force } => {
            let store = ArtifactStore::open(&cfg.data_dir)?;
            let registry = if force {
                bootstrap(&TransparentBackend, cfg, &store)?
            } else {
                load_or_bootstrap(&TransparentBackend, cfg, &store)?
            };
            for (id, keys) in registry.shapes() {
                println!("{:<12} {}", id.to_string(), keys.fingerprint);
            }
            println!("Artifacts in {}", store.dir().display());
            Ok(())
        }
        Commands::ProveUnit { begin, end, begin_index, end_index, iterations } => {
            let prover = ChainProver::open(cfg)?;
            let iterations = match iterations {
                Some(n) => n,
                None => prover
                    .registry()
                    .leaves
                    .first()
                    .map(|s| s.iterations())
                    .ok_or_else(|| anyhow!("no leaf shapes configured"))?,
            };
            let covered = index_after(begin_index, u64::from(iterations))?;
            if let Some(e) = end_index {
                if e != covered {
                    bail!("unit_{iterations} covers {iterations} links, not {begin_index}..{e}");
                }
            }
            let begin = parse_id(&begin)?;
            let end = end.as_deref().map(parse_id).transpose()?;
            let proof = prover.prove_unit(iterations, begin_index, &begin, end.as_ref())?;
            println!("{}", proof.reference);
            Ok(())
        }
        Commands::ProveMerge { shape, first, second, begin, relay, end } => {
            let prover = ChainProver::open(cfg)?;
            let first = prover.load(&parse_ref(&first)?)?;
            let second = prover.load(&parse_ref(&second)?)?;
            let layout = prover.layout();
            let d1 = first.declared(&layout)?;
            let d2 = second.declared(&layout)?;
            expect_id("begin", begin.as_ref(), &d1.begin)?;
            expect_id("relay", relay.as_ref(), &d1.end)?;
            expect_id("end", end.as_ref(), &d2.end)?;

            let proof = match shape {
                Some(s) => prover.prove_merge_as(parse_shape(&s)?, &first, &second)?,
                None => prover.prove_merge(&first, &second)?,
            };
            println!("{}", proof.reference);
            Ok(())
        }
        Commands::ProveHybrid { first, end, end_index } => {
            let prover = ChainProver::open(cfg)?;
            let first = prover.load(&parse_ref(&first)?)?;
            let end = end.as_deref().map(parse_id).transpose()?;
            if let (Some(e), Some((_, aux))) = (end_index, &prover.registry().hybrid) {
                let covered = index_after(first.reference.end, u64::from(aux.iterations()))?;
                if e != covered {
                    bail!("the hybrid shape ends at index {covered}, not {e}");
                }
            }
            let proof = prover.prove_hybrid(&first, end.as_ref())?;
            println!("{}", proof.reference);
            Ok(())
        }
        Commands::Verify { proof, begin, end } => {
            let prover = ChainProver::open(cfg)?;
            let artifact = prover.load(&parse_ref(&proof)?)?;
            let declared = prover.verify_final(&artifact, &parse_id(&begin)?, &parse_id(&end)?)?;
            match declared.steps {
                Some(n) => println!("valid: {} ({} links)", artifact.reference, n),
                None => println!("valid: {}", artifact.reference),
            }
            Ok(())
        }
        Commands::Fingerprint { shape } => {
            let prover = ChainProver::open(cfg)?;
            let id = parse_shape(&shape)?;
            let keys = prover.registry().shape(id)?;
            let fp = run_extractor(&TransparentBackend, &keys.artifacts.vk, prover.layout().fp)?;
            if fp != keys.fingerprint {
                bail!("extracted fingerprint {} differs from the registry entry {}", fp, keys.fingerprint);
            }
            println!("{fp}");
            Ok(())
        }
        Commands::Demo { links, begin } => {
            let prover = ChainProver::open(cfg)?;
            let begin = match begin {
                Some(s) => parse_id(&s)?,
                None => ChainId::zero(ElementShape::digest256()),
            };
            let proof = prover.prove_segment(0, &begin, links)?;

            let link = HashChainStep::new(1, cfg.tag.clone());
            let mut end = begin.clone();
            for _ in 0..links {
                end = link.apply(&end)?;
            }
            let declared = prover.verify_final(&proof, &begin, &end)?;
            info!(proof = %proof.reference, steps = ?declared.steps, "demo chain verified");
            println!("{} -> {}", begin, end);
            println!("valid: {}", proof.reference);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_prefix() {
        let hex = "ab".repeat(32);
        assert_eq!(parse_id(&hex).unwrap(), parse_id(&format!("0x{hex}")).unwrap());
        assert!(parse_id("0xabcd").is_err());
        assert!(parse_id(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "chainrec",
            "--data-dir",
            "/tmp/x",
            "prove-merge",
            "--first",
            "unit_1:0:1",
            "--second",
            "unit_1:1:2",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::ProveMerge { first, shape, .. } => {
                assert_eq!(parse_ref(&first).unwrap(), ProofRef::new(ShapeId::Unit(1), 0, 1));
                assert!(shape.is_none());
            }
            _ => panic!("wrong command"),
        }
        assert!(Cli::try_parse_from(["chainrec", "verify", "--proof", "genesis:0:2"]).is_err());
    }

    #[test]
    fn test_demo_and_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = ProverConfig { data_dir: tmp.path().to_path_buf(), unit_iterations: vec![1, 2], ..ProverConfig::default() };
        execute(Commands::Demo { links: 5, begin: None }, &cfg).unwrap();

        let zero = "00".repeat(32);
        let end = HashChainStep::new(5, cfg.tag.clone()).apply(&parse_id(&zero).unwrap()).unwrap();
        // [2, 2, 1] leaves: genesis over the first pair, then recursive.
        execute(Commands::Verify { proof: "recursive:0:5".into(), begin: zero.clone(), end: end.to_hex() }, &cfg).unwrap();
        let err = execute(Commands::Verify { proof: "recursive:0:5".into(), begin: zero, end: "11".repeat(32) }, &cfg);
        assert!(err.is_err());
        execute(Commands::Fingerprint { shape: "genesis".into() }, &cfg).unwrap();
    }
}
