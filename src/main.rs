// IntraPaint headless entry point. Without `-i/--input` it prints usage, since the
// editor front end lives outside this crate.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use intrapaint::cli::{self, CliArgs};
use intrapaint::logger;

fn main() -> ExitCode {
    if !CliArgs::is_cli_mode() {
        let _ = CliArgs::command().print_help();
        return ExitCode::FAILURE;
    }

    let args = CliArgs::parse();
    logger::init(args.verbose);
    cli::run(args)
}
