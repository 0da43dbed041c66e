#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use irlp_api::{Solver, SolverParams, Status};
use irlp_core::options::{Algorithm, PricerKind, RatioTesterKind, ScalerKind, SimplifierKind, Verbosity};
use irlp_core::rational::{parse_rational, ExactInfinity};
use irlp_core::solution::Solution;
use irlp_io::{read_json_problem, write_solution, JsonSolution};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "irlp")]
#[command(version, about = "Simplex LP solver with exact rational refinement")]
struct Cli {
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Solve(SolveArgs),
    Check {
        #[arg(long)]
        problem: PathBuf,
    },
}

#[derive(clap::Args)]
struct SolveArgs {
    #[arg(long)]
    problem: PathBuf,
    /// Floating-point solve only, without exact refinement.
    #[arg(long)]
    real: bool,
    /// Exact feasibility tolerance, e.g. `1e-9`, `0` or `1/1000000`.
    #[arg(long)]
    feastol: Option<String>,
    #[arg(long)]
    opttol: Option<String>,
    #[arg(long)]
    iter_limit: Option<usize>,
    #[arg(long)]
    ref_limit: Option<usize>,
    /// Seconds.
    #[arg(long)]
    time_limit: Option<f64>,
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,
    #[arg(long, value_enum)]
    pricer: Option<PricerArg>,
    #[arg(long, value_enum)]
    ratio: Option<RatioArg>,
    #[arg(long, value_enum)]
    scaler: Option<ScalerArg>,
    #[arg(long)]
    no_presolve: bool,
    #[arg(long, value_enum)]
    verbosity: Option<VerbosityArg>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the solution as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Enter,
    Leave,
}

#[derive(Clone, Copy, ValueEnum)]
enum PricerArg {
    Auto,
    Dantzig,
    ParMult,
    Devex,
    QuickSteep,
    Steep,
    Hybrid,
}

#[derive(Clone, Copy, ValueEnum)]
enum RatioArg {
    Textbook,
    Harris,
    Fast,
    BoundFlipping,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScalerArg {
    Off,
    UniEqui,
    BiEqui,
    Geo1,
    Geo8,
}

#[derive(Clone, Copy, ValueEnum)]
enum VerbosityArg {
    Error,
    Warning,
    Debug,
    Normal,
    High,
    Full,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Enter => Algorithm::Enter,
            AlgorithmArg::Leave => Algorithm::Leave,
        }
    }
}

impl From<PricerArg> for PricerKind {
    fn from(arg: PricerArg) -> Self {
        match arg {
            PricerArg::Auto => PricerKind::Auto,
            PricerArg::Dantzig => PricerKind::Dantzig,
            PricerArg::ParMult => PricerKind::ParMult,
            PricerArg::Devex => PricerKind::Devex,
            PricerArg::QuickSteep => PricerKind::QuickSteep,
            PricerArg::Steep => PricerKind::Steep,
            PricerArg::Hybrid => PricerKind::Hybrid,
        }
    }
}

impl From<RatioArg> for RatioTesterKind {
    fn from(arg: RatioArg) -> Self {
        match arg {
            RatioArg::Textbook => RatioTesterKind::Textbook,
            RatioArg::Harris => RatioTesterKind::Harris,
            RatioArg::Fast => RatioTesterKind::Fast,
            RatioArg::BoundFlipping => RatioTesterKind::BoundFlipping,
        }
    }
}

impl From<ScalerArg> for ScalerKind {
    fn from(arg: ScalerArg) -> Self {
        match arg {
            ScalerArg::Off => ScalerKind::Off,
            ScalerArg::UniEqui => ScalerKind::UniEqui,
            ScalerArg::BiEqui => ScalerKind::BiEqui,
            ScalerArg::Geo1 => ScalerKind::Geo1,
            ScalerArg::Geo8 => ScalerKind::Geo8,
        }
    }
}

impl From<VerbosityArg> for Verbosity {
    fn from(arg: VerbosityArg) -> Self {
        match arg {
            VerbosityArg::Error => Verbosity::Error,
            VerbosityArg::Warning => Verbosity::Warning,
            VerbosityArg::Debug => Verbosity::Debug,
            VerbosityArg::Normal => Verbosity::Normal,
            VerbosityArg::High => Verbosity::High,
            VerbosityArg::Full => Verbosity::Full,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.log_json);
    match cli.command {
        Commands::Solve(args) => solve_command(args),
        Commands::Check { problem } => check_command(problem),
    }
}

fn initialize_tracing(log_json: bool) {
    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init()
            .ok();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init()
            .ok();
    }
}

fn params_from(args: &SolveArgs) -> Result<SolverParams> {
    let mut params = SolverParams::default();
    let inf = ExactInfinity::new(params.infinity);
    if let Some(tol) = &args.feastol {
        params.feastol = parse_rational(tol, &inf).context("invalid --feastol")?;
    }
    if let Some(tol) = &args.opttol {
        params.opttol = parse_rational(tol, &inf).context("invalid --opttol")?;
    }
    if let Some(limit) = args.iter_limit {
        params = params.with_iter_limit(limit);
    }
    params.ref_limit = args.ref_limit.or(params.ref_limit);
    if let Some(seconds) = args.time_limit {
        let limit = Duration::try_from_secs_f64(seconds).context("invalid --time-limit")?;
        params = params.with_time_limit(limit);
    }
    if let Some(algorithm) = args.algorithm {
        params.algorithm = algorithm.into();
    }
    if let Some(pricer) = args.pricer {
        params = params.with_pricer(pricer.into());
    }
    if let Some(ratio) = args.ratio {
        params = params.with_ratio_tester(ratio.into());
    }
    let scaler = args.scaler.map_or(params.scaler, ScalerKind::from);
    let simplifier = if args.no_presolve {
        SimplifierKind::Off
    } else {
        params.simplifier
    };
    params = params.with_preprocessing(scaler, simplifier);
    if let Some(verbosity) = args.verbosity {
        params.verbosity = verbosity.into();
    }
    params.validate().context("inconsistent solver parameters")?;
    Ok(params)
}

fn solve_command(args: SolveArgs) -> Result<()> {
    let params = params_from(&args)?;
    let inf = ExactInfinity::new(params.infinity);
    let lp = read_json_problem(&args.problem)?.to_lp(&inf)?;
    info!(rows = lp.num_rows(), cols = lp.num_cols(), "problem loaded");

    let mut solver = Solver::from_rational(lp);
    solver.set_params(params)?;
    let status = if args.real {
        solver.solve_real()?
    } else {
        solver.solve_exact()?
    };
    let solution = solver.solution_rational().unwrap_or_else(Solution::empty);
    let report = JsonSolution::new(status, &solution);
    emit_solution(&solver, status, &report, args.json)?;
    if let Some(path) = args.output {
        write_solution(path, &report)?;
    }
    Ok(())
}

fn emit_solution(solver: &Solver, status: Status, report: &JsonSolution, json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut handle, report)?;
        handle.write_all(b"\n")?;
    } else {
        writeln!(handle, "status: {status:?}")?;
        writeln!(handle, "verified: {}", report.verified)?;
        if let Some(objective) = &report.objective {
            writeln!(handle, "objective: {objective}")?;
        }
        if let Some(stats) = solver.stats() {
            writeln!(
                handle,
                "iterations: {}\nrefinements: {}\ntime: {:.3}s",
                stats.simplex.iterations,
                stats.refinements,
                stats.solve_time.as_secs_f64()
            )?;
        }
    }
    handle.flush()?;
    Ok(())
}

fn check_command(path: PathBuf) -> Result<()> {
    let inf = ExactInfinity::default();
    let lp = read_json_problem(&path)?
        .to_lp(&inf)
        .context("LP validation failed")?;
    println!(
        "LP validation succeeded: {} rows, {} columns, {} nonzeros.",
        lp.num_rows(),
        lp.num_cols(),
        lp.num_nonzeros()
    );
    Ok(())
}
