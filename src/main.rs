//! linevm - CLI Entry Point
//!
//! Commands:
//! - `linevm run <program>` - Run an assembly file until it halts
//! - `linevm shell` - Interactive shell (load/run/reset/state)

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "linevm")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented pseudo-assembly virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the assembly file to execute
        program: String,
        /// Maximum number of instructions to execute (default: 100000)
        #[arg(short, long, default_value = "100000")]
        max_cycles: u64,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive shell
    Shell,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            max_cycles,
            trace,
            json,
        }) => {
            run_program(&program, max_cycles, trace, json);
        }
        Some(Commands::Shell) => {
            run_shell();
        }
        None => {
            println!("linevm v0.1.0");
            println!("A line-oriented pseudo-assembly virtual machine");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn run_program(path: &str, max_cycles: u64, trace: bool, json: bool) {
    use linevm::{load_source, Machine, StdoutSink};

    let lines = match load_source(path) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    if lines.is_empty() {
        eprintln!("No instructions to execute");
        std::process::exit(1);
    }

    let mut machine = Machine::new();
    if let Err(e) = machine.load_program(&lines) {
        eprintln!("Failed to load program: {}", e);
        std::process::exit(1);
    }
    println!("Loaded {} instructions into memory.", lines.len());

    let mut out = StdoutSink;
    let mut reached_limit = false;

    if trace {
        while machine.is_running() && machine.regs.pc_in_bounds() {
            if machine.cycles >= max_cycles {
                reached_limit = true;
                break;
            }
            let pc = machine.regs.pc;
            match machine.step(&mut out) {
                Ok(Some(instr)) => println!("{:04X}: {}", pc, instr),
                Ok(None) => {}
                Err(e) => {
                    eprintln!("Machine error at pc={:04X}: {}", pc, e);
                    std::process::exit(1);
                }
            }
        }
    } else {
        match machine.run_limited(max_cycles, &mut out) {
            Ok(_) => {
                reached_limit =
                    machine.is_running() && machine.regs.pc_in_bounds() && machine.cycles >= max_cycles;
            }
            Err(e) => {
                eprintln!("Machine error at pc={:04X}: {}", machine.regs.pc, e);
                std::process::exit(1);
            }
        }
    }

    if json {
        match serde_json::to_string_pretty(&machine.snapshot()) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to serialize state: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!();
        print_state(&machine);
    }

    if reached_limit {
        println!();
        println!(
            "Reached max cycles limit ({}). Use --max-cycles to increase.",
            max_cycles
        );
    }
}

fn print_state(machine: &linevm::Machine) {
    println!("Cycles: {}", machine.cycles);
    println!("State:  {:?}", machine.state);
    println!("pc:     {:04X}", machine.regs.pc);
    let regs = machine.regs.values();
    for (i, value) in regs.iter().enumerate() {
        if *value != 0 {
            println!("R{}:     {}", i, value);
        }
    }
    println!("Stack:  {:?}", machine.stack);
}

fn run_shell() {
    use linevm::{load_source, Machine, StdoutSink};
    use std::io::{BufRead, Write};

    let mut machine = Machine::new();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("Welcome to the linevm shell. Type 'help' for commands.");

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }

        let mut words = input.split_whitespace();
        let cmd = match words.next() {
            Some(cmd) => cmd,
            None => continue,
        };

        match cmd {
            "load" => match words.next() {
                Some(path) => match load_source(path) {
                    Ok(lines) => match machine.load_program(&lines) {
                        Ok(()) => {
                            println!("Loaded {} instructions into memory.", lines.len());
                            println!("Program '{}' loaded into memory.", path);
                        }
                        Err(e) => println!("Failed to load program: {}", e),
                    },
                    Err(e) => println!("File '{}' not found: {}", path, e),
                },
                None => println!("Usage: load <filename>"),
            },

            "run" => {
                println!("Running program...");
                let mut out = StdoutSink;
                match machine.run(&mut out) {
                    Ok(executed) => println!("Executed {} instructions.", executed),
                    Err(e) => println!("Machine error at pc={:04X}: {}", machine.regs.pc, e),
                }
            }

            "reset" => {
                machine.reset();
                println!("VM reset.");
            }

            "state" => {
                print_state(&machine);
            }

            "mem" => {
                let start = words
                    .next()
                    .and_then(|w| u16::from_str_radix(&w.replace('%', ""), 16).ok())
                    .unwrap_or(0);
                let count = words.next().and_then(|w| w.parse().ok()).unwrap_or(16);
                for (addr, cell) in machine.mem.dump(start, count) {
                    println!("{:04X}: {}", addr, cell);
                }
            }

            "clear" => {
                // ANSI: clear screen, cursor home.
                print!("\x1B[2J\x1B[1;1H");
                let _ = stdout.flush();
            }

            "exit" => {
                println!("Exiting...");
                break;
            }

            "help" => {
                println!("Available commands:");
                println!("  clear               - Clear the screen.");
                println!("  load <filename>     - Load an assembly program into memory.");
                println!("  run                 - Run the loaded program.");
                println!("  reset               - Reset the VM to its initial state.");
                println!("  state               - Show registers, stack, and pc.");
                println!("  mem [addr] [count]  - Dump memory cells (hex addr).");
                println!("  exit                - Exit the shell.");
                println!("  help                - Show this help message.");
            }

            other => {
                println!("Unknown command: {}. Type 'help' for a list of commands.", other);
            }
        }
    }
}
