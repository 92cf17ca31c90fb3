//! Command-line argument parsing.
//!
//! The daemon takes a handful of flags, so parsing is done by hand. Values
//! given here seed the initial color state; an active profile from the
//! configuration takes precedence once the schedule is resolved.

use std::path::PathBuf;

use crate::common::constants::*;

/// Options for a normal daemon run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub temperature: Option<u32>,
    /// Gamma as a percentage.
    pub gamma: Option<f32>,
    /// Gamma ceiling as a percentage, overrides the config value.
    pub max_gamma: Option<f32>,
    pub identity: bool,
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

/// What the binary should do after parsing.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    Run(RunOptions),
    ShowHelp,
    ShowVersion,
    /// Invalid arguments: print the message and help, then exit with failure.
    ShowHelpDueToError(String),
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments, the first item being the program name.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let action = match parse_run_options(&args_vec) {
            Ok(Some(options)) => CliAction::Run(options),
            Ok(None) => return Self::early_exit(&args_vec),
            Err(message) => CliAction::ShowHelpDueToError(message),
        };

        ParsedArgs { action }
    }

    fn early_exit(args: &[String]) -> ParsedArgs {
        let action = if args.iter().any(|a| a == "-h" || a == "--help") {
            CliAction::ShowHelp
        } else {
            CliAction::ShowVersion
        };
        ParsedArgs { action }
    }
}

/// `Ok(None)` means help or version was requested.
fn parse_run_options(args: &[String]) -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" | "-v" | "--version" => return Ok(None),
            "--verbose" => options.verbose = true,
            "-i" | "--identity" => options.identity = true,
            "-t" | "--temperature" => {
                let value = next_value(&mut iter, arg)?;
                let temp: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid temperature '{value}'"))?;
                if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&temp) {
                    return Err(format!(
                        "Temperature must be between {MINIMUM_TEMP} and {MAXIMUM_TEMP}K"
                    ));
                }
                options.temperature = Some(temp);
            }
            "-g" | "--gamma" => {
                let value = next_value(&mut iter, arg)?;
                let gamma = parse_percent(value)?;
                options.gamma = Some(gamma);
            }
            "--gamma_max" => {
                let value = next_value(&mut iter, arg)?;
                let max = parse_percent(value)?;
                if !(MINIMUM_GAMMA_CEILING as f32..=MAXIMUM_GAMMA_CEILING as f32).contains(&max) {
                    return Err(format!(
                        "Maximum gamma must be between {MINIMUM_GAMMA_CEILING}% and {MAXIMUM_GAMMA_CEILING}%"
                    ));
                }
                options.max_gamma = Some(max);
            }
            "-c" | "--config" => {
                let value = next_value(&mut iter, arg)?;
                options.config_path = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(Some(options))
}

fn next_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<&'a String, String> {
    iter.next()
        .ok_or_else(|| format!("Missing value for {flag}"))
}

fn parse_percent(value: &str) -> Result<f32, String> {
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("Invalid percentage '{value}'")),
    }
}

/// Print usage information.
pub fn display_help() {
    log_version!();
    log_block_start!("Usage: hyprsunset [OPTIONS]");
    log_pipe!();
    log_decorated!("Options:");
    log_indented!("-t, --temperature <K>   Initial temperature in Kelvin ({MINIMUM_TEMP}-{MAXIMUM_TEMP})");
    log_indented!("-g, --gamma <PERCENT>   Initial gamma as a percentage");
    log_indented!("    --gamma_max <PERCENT>  Gamma ceiling ({MINIMUM_GAMMA_CEILING}-{MAXIMUM_GAMMA_CEILING}%)");
    log_indented!("-i, --identity          Start in identity mode");
    log_indented!("-c, --config <PATH>     Use a specific configuration file");
    log_indented!("    --verbose           Show debug output");
    log_indented!("-v, --version           Print version information");
    log_indented!("-h, --help              Print this help");
    log_pipe!();
    log_decorated!("Runtime control (via hyprctl hyprsunset ...):");
    log_indented!("temperature [[+|-]K], gamma [[+|-]PERCENT], identity [get|true|false]");
    log_end!();
}

/// Print version information.
pub fn display_version() {
    println!("hyprsunset {}", env!("CARGO_PKG_VERSION"));
}
