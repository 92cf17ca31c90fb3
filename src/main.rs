//! Binary entry point: argument parsing and dispatch.
//!
//! Everything past argument parsing lives in the library; see [`Hyprsunset`]
//! for the startup sequence.

use hyprsunset::args::{self, CliAction, ParsedArgs};
use hyprsunset::logger::Log;
use hyprsunset::{Hyprsunset, log_error_exit, log_pipe};

fn main() {
    let parsed = ParsedArgs::parse(std::env::args());

    match parsed.action {
        CliAction::ShowVersion => args::display_version(),
        CliAction::ShowHelp => args::display_help(),
        CliAction::ShowHelpDueToError(message) => {
            log_error_exit!("{}", message);
            log_pipe!();
            args::display_help();
            std::process::exit(1);
        }
        CliAction::Run(options) => {
            Log::set_verbose(options.verbose);
            if let Err(e) = Hyprsunset::new(options).run() {
                log_error_exit!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}
