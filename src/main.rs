use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use educpu::{assemble, object, Cpu, Format, Image};

/// Assembler and simulator toolchain for the EDU-CPU teaching processor.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` source into an object file plus a listing
    Asm {
        /// Assembly source file
        name: PathBuf,
        /// Object format to emit
        #[arg(long, value_enum, default_value = "bin")]
        format: OutFormat,
    },
    /// Load object file(s) and execute until HLT
    Run {
        /// Program files (.bin, .hex, or .srec); raw binary only alone
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print CPU state before each instruction
        #[arg(long)]
        trace: bool,
        /// Stop with an error after this many cycles
        #[arg(long, default_value_t = 65536)]
        max_cycles: u64,
    },
    /// Assemble a `.asm` source without writing any output
    Check {
        /// File to check
        name: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutFormat {
    Bin,
    Hex,
    Srec,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Asm { name, format } => {
            // Spans in diagnostics borrow the source for the whole run.
            let contents: &'static str =
                Box::leak(Box::new(fs::read_to_string(&name).into_diagnostic()?));
            println!(
                "{:>12} target {}",
                "Assembling".green().bold(),
                name.display()
            );
            let out = assemble(contents)?;

            let obj_path = match format {
                OutFormat::Bin => {
                    let path = name.with_extension("bin");
                    let mut file = File::create(&path).into_diagnostic()?;
                    file.write_all(&object::write_bin(&out.image))
                        .into_diagnostic()?;
                    path
                }
                OutFormat::Hex => {
                    let path = name.with_extension("hex");
                    fs::write(&path, object::write_hex(&out.image)).into_diagnostic()?;
                    path
                }
                OutFormat::Srec => {
                    let path = name.with_extension("srec");
                    fs::write(&path, object::write_srec(&out.image)).into_diagnostic()?;
                    path
                }
            };
            let lst_path = name.with_extension("lst");
            fs::write(&lst_path, out.listing.render()).into_diagnostic()?;

            println!("{:>12} {}", "Saved to".green().bold(), obj_path.display());
            println!("{:>12} {}", "Listing".green().bold(), lst_path.display());
            Ok(())
        }
        Command::Run {
            files,
            trace,
            max_cycles,
        } => run_files(&files, trace, max_cycles),
        Command::Check { name } => {
            let contents: &'static str =
                Box::leak(Box::new(fs::read_to_string(&name).into_diagnostic()?));
            println!(
                "{:>12} target {}",
                "Checking".green().bold(),
                name.display()
            );
            assemble(contents)?;
            println!("{:>12} with 0 errors", "Finished".green().bold());
            Ok(())
        }
    }
}

fn run_files(files: &[PathBuf], trace: bool, max_cycles: u64) -> Result<()> {
    // Loading failures print plain `ERROR:` lines and abort before any
    // cycle executes.
    let mut images: Vec<(String, Image)> = Vec::new();
    for path in files {
        let data = fs::read(path).into_diagnostic()?;
        let format = Format::detect(path, &data);
        if files.len() > 1 && format == Format::Bin {
            eprintln!(
                "ERROR: raw binary format ({}) cannot be used when loading multiple files -- use .hex or .srec",
                path.display()
            );
            process::exit(1);
        }
        match object::load(path, &data) {
            Ok(image) => images.push((path.display().to_string(), image)),
            Err(e) => {
                eprintln!("ERROR: {}: {e}", path.display());
                process::exit(1);
            }
        }
    }

    if images.len() > 1 {
        let errors = object::check_overlaps(&images);
        if !errors.is_empty() {
            for e in errors {
                eprintln!("ERROR: {e}");
            }
            process::exit(1);
        }
    }

    let mut cpu = Cpu::new(io::stdout());
    cpu.set_trace(trace);
    for (_, image) in &images {
        cpu.load_image(image);
    }

    match cpu.run(max_cycles) {
        Ok(()) => {
            if trace {
                eprintln!("\nHalted after {} cycles.", cpu.cycles());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}
