//! calc-evaluator: evaluate one expression read from stdin
//!
//! Prints the result on stdout and exits 0, or prints `error: <message>` on
//! stderr and exits 1.

use arith_evaluator::evaluate;
use calc_protocol::Mode;
use clap::Parser;
use std::io::Read;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "calc-evaluator")]
#[command(about = "Evaluate an arithmetic expression read from stdin")]
#[command(version)]
struct Args {
    /// Evaluate in floating-point instead of 64-bit integer arithmetic
    #[arg(long)]
    float: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        eprintln!("error: failed to read stdin: {e}");
        return ExitCode::FAILURE;
    }

    match evaluate(&input, Mode::from_float_flag(args.float)) {
        Ok(result) => {
            println!("{result}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
