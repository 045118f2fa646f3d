use clap::{ArgAction, Parser};
use log::{debug, warn};
use rivet_core::memory::Memory;
use rivet_core::simulator::{RunStats, Simulator, State};
use rivet_core::trace::{NoTrace, TraceSink, TraceWriter};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;

mod loader;

/// A little RV32 machine: runs statically linked RISC-V ELF binaries.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// ELF binary to execute.
    binary: PathBuf,
    /// Write an instruction-level execution trace to this file.
    #[arg(short, long, value_name = "FILE")]
    trace: Option<PathBuf>,
    /// Stop after this many retired instructions, even without an exit call.
    #[arg(short, long, value_name = "N")]
    max_instructions: Option<u64>,
    /// Increase log verbosity (repeat for more).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    stderrlog::new()
        .verbosity(args.verbose as usize + 1)
        .modules([module_path!(), "rivet_core"])
        .init()
        .unwrap();

    let mut buf = Vec::new();
    let mut file = File::open(&args.binary)?;
    file.read_to_end(&mut buf)?;

    let image = loader::load_elf(&buf).map_err(io::Error::other)?;
    match image.symbols.get(&image.entry) {
        Some(name) => debug!("starting at {:#010x} ({name})", image.entry),
        None => debug!("starting at {:#010x}", image.entry),
    }

    let mut simulator = Simulator::new(image.memory, image.entry);

    let stats = match &args.trace {
        Some(path) => {
            let mut tracer = TraceWriter::new(BufWriter::new(File::create(path)?));
            let stats = drive(&mut simulator, &mut tracer, args.max_instructions);
            tracer.into_inner()?;
            stats
        }
        None => drive(&mut simulator, &mut NoTrace, args.max_instructions),
    };

    println!("{} instructions retired", stats.retired);
    Ok(())
}

/// Steps the machine until the program exits, or until the optional instruction
/// ceiling is reached.
fn drive<M: Memory>(
    simulator: &mut Simulator<M>,
    tracer: &mut impl TraceSink,
    max_instructions: Option<u64>,
) -> RunStats {
    let Some(limit) = max_instructions else {
        return simulator.run(tracer);
    };
    while simulator.state() == State::Running && simulator.retired() < limit {
        simulator.step(tracer);
    }
    if simulator.state() == State::Running {
        warn!("stopping after {limit} instructions without the program exiting");
    }
    RunStats {
        retired: simulator.retired(),
    }
}
