//! Assembly to machine-image compiler CLI.
//!
//! Assembles a source file and wraps the code in a fresh machine image,
//! packed with the transport codec so the driver can load it directly.
//!
//! # Usage
//! ```text
//! wordasm <input.asm> [OPTIONS]
//! ```
//!
//! # Options
//! - `-o, --output <file>`: output path (defaults to `<input>.wvm`)
//! - `-O, --optimize`: apply the peephole shrink pass

use std::env;
use std::fs;
use std::path::Path;
use std::process;
use wordvm::vm::assembler;
use wordvm::vm::codec;
use wordvm::vm::frame::Frame;
use wordvm::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut optimize = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            flag @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{flag} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--optimize" | "-O" => {
                optimize = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let source = match fs::read_to_string(input_path) {
        Ok(source) => source,
        Err(e) => {
            error!("cannot read {}: {}", input_path, e);
            process::exit(1);
        }
    };

    let assembled = if optimize {
        assembler::assemble_optimized(&source)
    } else {
        assembler::assemble(&source)
    };
    let code = match assembled {
        Ok(code) => code,
        Err(err) => {
            eprintln!(
                "{}",
                assembler::render_diagnostic(input_path, &source, &err)
            );
            process::exit(1);
        }
    };

    let output_path = output_path.unwrap_or_else(|| {
        let path = Path::new(input_path);
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        path.parent()
            .unwrap_or(Path::new("."))
            .join(format!("{}.wvm", stem))
            .to_string_lossy()
            .into_owned()
    });

    let image = Frame::new(code.clone()).flatten();
    if let Err(e) = fs::write(&output_path, codec::pack(&image)) {
        error!("cannot write {}: {}", output_path, e);
        process::exit(1);
    }

    info!(
        "compiled {} -> {} ({} code words, {} image words)",
        input_path,
        output_path,
        code.len(),
        image.len()
    );
}

const USAGE: &str = "\
Word Machine Assembler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>    Output path (defaults to <input>.wvm)
    -O, --optimize         Apply the peephole shrink pass
    -h, --help             Print this help message

EXAMPLES:
    # Compile to the default output name
    {program} program.asm

    # Compile shrunk, with an explicit output
    {program} program.asm -O -o build/program.wvm
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
