//! hipcomp command line driver.
//!
//! Compiles a HIP (or GCN assembly) file to an AMDGPU code object, or
//! disassembles an existing one.

use clap::{Parser, Subcommand};
use hipcomp::{elf, BackendKind, Compiler, Config, LinkerKind};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hipcomp")]
#[command(about = "Ahead-of-time HIP kernel compiler for AMD GPUs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to a code object
    Compile {
        /// Input file (use '-' for stdin)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Target architecture, e.g. gfx1100 or gfx90a:xnack+
        #[arg(short, long, default_value = "gfx1100")]
        arch: String,

        /// Treat the input as GCN assembly
        #[arg(long)]
        asm: bool,

        /// Backend: comgr, ir or clang (default from HIPCOMP_BACKEND)
        #[arg(short, long)]
        backend: Option<String>,

        /// Linker: comgr or lld (default from HIPCOMP_LINKER)
        #[arg(long)]
        linker: Option<String>,

        /// Output file (default: <FILE>.hsaco)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the disassembly of the result
        #[arg(short, long)]
        disasm: bool,
    },

    /// Disassemble a code object
    Disasm {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if path.to_str() == Some("-") {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read(path)
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Compile {
            input,
            arch,
            asm,
            backend,
            linker,
            output,
            disasm,
        } => {
            let mut config = Config::from_env()?;
            if let Some(backend) = backend {
                config = config.with_backend(backend.parse::<BackendKind>()?);
            }
            if let Some(linker) = linker {
                config = config.with_linker(linker.parse::<LinkerKind>()?);
            }

            let source = String::from_utf8(read_input(&input)?)?;
            let compiler = Compiler::with_config(&arch, config)?;
            let (result, stats) = compiler.compile_with_stats(&source, asm);
            log::debug!("{}", stats);
            let lib = result?;

            let output = output.unwrap_or_else(|| {
                if input.to_str() == Some("-") {
                    PathBuf::from("out.hsaco")
                } else {
                    input.with_extension("hsaco")
                }
            });
            fs::write(&output, &lib)?;

            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}: {} bytes for {}", output.display(), lib.len(), compiler.arch())?;
            for kernel in elf::kernel_names(&lib)? {
                writeln!(stdout, "  kernel {}", kernel)?;
            }
            drop(stdout);

            if disasm {
                compiler.disassemble(&lib)?;
            }
        }
        Commands::Disasm { input } => {
            let lib = read_input(&input)?;
            let info = elf::inspect(&lib)?;
            log::debug!("{:?}", info);
            hipcomp::disasm::disassemble(&lib, &Config::from_env()?)?;
        }
    }
    Ok(())
}
