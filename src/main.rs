//! Word machine driver.
//!
//! Loads a program — assembly source or a packed machine image — seeds a
//! fresh machine with caller-chosen budgets, and steps it until it stops.
//! On a voluntary return the top of the last memory area is reported as
//! the return value; in interactive mode new host input is written into
//! memory area 0 and the machine resumes with re-armed budgets.
//!
//! # Usage
//! ```text
//! wordvm <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: `.asm` assembly source, anything else is a packed image
//!
//! # Options
//! - `--gas <n>`: step budget per run (default 1000)
//! - `--mem <n>`: allocation budget per run (default 1000)
//! - `--input <w,w,…>`: words preloaded into memory area 0
//! - `--interactive`: prompt for new area-0 input after each return
//! - `--trace`: log status, gas and mem before every step
//! - `--emit <file>`: write the final state as a packed image

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;
use wordvm::types::word::Word;
use wordvm::vm::assembler;
use wordvm::vm::codec;
use wordvm::vm::frame::{Frame, Status};
use wordvm::vm::step::step;
use wordvm::{error, info};

const DEFAULT_GAS: u64 = 1000;
const DEFAULT_MEM: u64 = 1000;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let program_path = &args[1];
    let mut gas = Word::from(DEFAULT_GAS);
    let mut mem = Word::from(DEFAULT_MEM);
    let mut input: Vec<Word> = Vec::new();
    let mut interactive = false;
    let mut trace = false;
    let mut emit: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            flag @ ("--gas" | "--mem") => {
                i += 1;
                if i >= args.len() {
                    error!("{flag} requires an argument");
                    process::exit(1);
                }
                let value = Word::from_dec_str(&args[i]).unwrap_or_else(|_| {
                    error!("invalid {flag} value: {}", args[i]);
                    process::exit(1);
                });
                if flag == "--gas" {
                    gas = value;
                } else {
                    mem = value;
                }
                i += 1;
            }
            "--input" => {
                i += 1;
                if i >= args.len() {
                    error!("--input requires an argument");
                    process::exit(1);
                }
                input = parse_words(&args[i]).unwrap_or_else(|message| {
                    error!("{message}");
                    process::exit(1);
                });
                i += 1;
            }
            "--emit" => {
                i += 1;
                if i >= args.len() {
                    error!("--emit requires an argument");
                    process::exit(1);
                }
                emit = Some(args[i].clone());
                i += 1;
            }
            "--interactive" => {
                interactive = true;
                i += 1;
            }
            "--trace" => {
                trace = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let mut frame = load_program(program_path);
    if frame.memory.is_empty() {
        frame.memory.push(Vec::new());
    }
    if !input.is_empty() {
        frame.memory[0] = input;
    }
    frame.status = Status::Normal;
    frame.gas = gas;
    frame.mem = mem;

    let mut state = frame.flatten();
    let mut steps = 0u64;

    loop {
        let current = match Frame::unflatten(&state) {
            Ok(frame) => frame,
            Err(e) => {
                error!("machine state corrupt: {e}");
                process::exit(1);
            }
        };
        if trace {
            info!(
                "step {}: {} gas={} mem={}",
                steps, current.status, current.gas, current.mem
            );
        }

        if current.status.is_runnable() {
            state = match step(&state) {
                Ok(next) => next,
                Err(e) => {
                    error!("step failed: {e}");
                    process::exit(1);
                }
            };
            steps += 1;
            continue;
        }

        match current.status {
            Status::VolReturn => {
                report_return(&current);
                if !interactive {
                    break;
                }
                match read_host_input() {
                    Some(words) => {
                        let mut resumed = current;
                        // the reported return area is consumed
                        if resumed.memory.len() > 1 {
                            resumed.memory.pop();
                        }
                        if resumed.memory.is_empty() {
                            resumed.memory.push(Vec::new());
                        }
                        resumed.memory[0] = words;
                        resumed.status = Status::Normal;
                        resumed.gas = gas;
                        resumed.mem = mem;
                        state = resumed.flatten();
                    }
                    None => break,
                }
            }
            Status::VolHalt => {
                info!("machine halted after {} steps", steps);
                break;
            }
            other => {
                error!(
                    "machine stopped: {} (ip={} gas={} mem={})",
                    other, current.ip, current.gas, current.mem
                );
                if let Some(path) = &emit {
                    write_image(path, &state);
                }
                process::exit(1);
            }
        }
    }

    if let Some(path) = &emit {
        write_image(path, &state);
    }
}

/// Assembles `.asm` sources; everything else is unpacked as an image.
fn load_program(path: &str) -> Frame {
    if path.ends_with(".asm") {
        match assembler::assemble_file(path) {
            Ok(code) => Frame::new(code),
            Err(_) => process::exit(1),
        }
    } else {
        let load = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                codec::unpack(&text)
                    .and_then(|words| Frame::unflatten(&words))
                    .map_err(|e| e.to_string())
            });
        match load {
            Ok(frame) => frame,
            Err(e) => {
                error!("cannot load machine image {path}: {e}");
                process::exit(1);
            }
        }
    }
}

/// The top word of the last memory area is the conventional return value.
fn report_return(frame: &Frame) {
    match frame.memory.last().and_then(|area| area.last()) {
        Some(value) => info!("returned: {}", value),
        None => info!("returned with no value"),
    }
}

/// Prompts for a line of host input. Empty input or EOF ends the session.
fn read_host_input() -> Option<Vec<Word>> {
    print!("ready> ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => {
            let text = line.trim();
            if text.is_empty() {
                return None;
            }
            match parse_words(text) {
                Ok(words) => Some(words),
                Err(message) => {
                    error!("{message}");
                    None
                }
            }
        }
        Err(_) => None,
    }
}

/// Parses comma or space separated decimal words.
fn parse_words(text: &str) -> Result<Vec<Word>, String> {
    text.split([',', ' '])
        .filter(|token| !token.is_empty())
        .map(|token| Word::from_dec_str(token).map_err(|_| format!("invalid word: {token}")))
        .collect()
}

fn write_image(path: &str, state: &[Word]) {
    match fs::write(path, codec::pack(state)) {
        Ok(()) => info!("machine image written to {}", path),
        Err(e) => error!("cannot write {}: {}", path, e),
    }
}

const USAGE: &str = "\
Word Machine Driver

USAGE:
    {program} <program> [OPTIONS]

ARGS:
    <program>    Assembly source (.asm) or packed machine image

OPTIONS:
    --gas <n>          Step budget per run (default 1000)
    --mem <n>          Allocation budget per run (default 1000)
    --input <w,w,...>  Words preloaded into memory area 0
    --interactive      Prompt for new area-0 input after each return
    --trace            Log status, gas and mem before every step
    --emit <file>      Write the final state as a packed image
    -h, --help         Print this help message

EXAMPLES:
    # Assemble and run with default budgets
    {program} program.asm

    # Feed two input words and trace every step
    {program} program.asm --input 7,42 --trace

    # Resume a packed image interactively
    {program} snapshot.wvm --interactive
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
