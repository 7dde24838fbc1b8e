use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use wshade_analysis::AnalysisOptions;

/// WShade — uniform/varying analysis for batched shader layers
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input .wsir file
    input: PathBuf,

    /// Dump the parsed IR to stderr before analysis
    #[arg(long)]
    emit_ir: bool,

    /// Analyze init ops of plain locals and temps
    #[arg(long)]
    debug_uninit: bool,

    /// Skip unconnected interpolated parameters
    #[arg(long)]
    lazy_userdata: bool,

    /// Only list the ops that require masking
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    env_logger::try_init().ok();

    let cli = Cli::parse();

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse the textual IR.
    let layer = wshade_parser::parse(&source)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("IR parse failed")?;

    // 3. Optionally dump the IR to stderr.
    if cli.emit_ir {
        eprintln!("{}", wshade_ir::dump_layer(&layer));
    }

    // 4. Analyze.
    let options = AnalysisOptions {
        debug_uninit: cli.debug_uninit,
        lazy_userdata: cli.lazy_userdata,
    };
    let analysis = wshade_analysis::analyze(&layer, &options)
        .map_err(|e| miette::miette!("layer '{}': {e}", layer.name()))
        .wrap_err("analysis failed")?;

    // 5. Report.
    if !cli.quiet {
        println!("layer {}", layer.name());
        for (id, sym) in layer.symbols() {
            let wideness = if analysis.is_uniform(id) {
                "uniform"
            } else {
                "varying"
            };
            println!("  {wideness}  {} {} {}", sym.class, sym.ty, sym.name);
        }
    }
    for op_index in analysis.masked_op_indices() {
        println!("  masked  op {op_index}: {}", layer.op(op_index).name());
    }
    Ok(())
}
