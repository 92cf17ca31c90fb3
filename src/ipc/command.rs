//! Control request grammar and execution against the color state.
//!
//! ```text
//! gamma [[+|-]PERCENT]
//! temperature [[+|-]KELVIN]
//! identity [get|true|false]
//! ```
//!
//! A bare keyword queries the current value (except `identity`, which enables
//! identity mode). Relative deltas saturate at the range limits; absolute
//! values outside the range are rejected. Successful mutations reply `ok`.

use crate::color::ColorState;
use crate::common::constants::{MAXIMUM_TEMP, MINIMUM_TEMP};

const REPLY_OK: &str = "ok";
const REPLY_INVALID_COMMAND: &str = "invalid command";
const REPLY_INVALID_IDENTITY: &str = "Invalid identity value (should be true or false)";

/// Result of executing one control request.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub reply: String,
    /// Whether the color state changed and must be pushed to the outputs.
    pub mutated: bool,
}

impl CommandOutcome {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            mutated: false,
        }
    }

    fn applied(changed: bool) -> Self {
        Self {
            reply: REPLY_OK.to_string(),
            mutated: changed,
        }
    }
}

enum Argument<'a> {
    None,
    Absolute(&'a str),
    Increase(&'a str),
    Decrease(&'a str),
}

fn argument(arg: Option<&str>) -> Argument<'_> {
    match arg {
        None => Argument::None,
        Some(a) => {
            if let Some(rest) = a.strip_prefix('+') {
                Argument::Increase(rest)
            } else if let Some(rest) = a.strip_prefix('-') {
                Argument::Decrease(rest)
            } else {
                Argument::Absolute(a)
            }
        }
    }
}

/// Execute `request` against `color`. The state is only touched on success.
pub fn execute(color: &mut ColorState, request: &str) -> CommandOutcome {
    let mut words = request.split_whitespace();
    let Some(keyword) = words.next() else {
        return CommandOutcome::reply(REPLY_INVALID_COMMAND);
    };
    let arg = words.next();

    match keyword {
        "gamma" => gamma(color, argument(arg)),
        "temperature" => temperature(color, argument(arg)),
        "identity" => identity(color, arg),
        _ => CommandOutcome::reply(REPLY_INVALID_COMMAND),
    }
}

fn format_percent(fraction: f32) -> String {
    let percent = (fraction * 100.0 * 100.0).round() / 100.0;
    format!("{percent}")
}

fn gamma(color: &mut ColorState, arg: Argument<'_>) -> CommandOutcome {
    let max_percent = color.max_gamma() * 100.0;
    let max_label = format_percent(color.max_gamma());
    let invalid = || {
        CommandOutcome::reply(format!(
            "Invalid gamma value (should be in range 0-{max_label}%)"
        ))
    };
    let parse = |s: &str| s.parse::<f32>().ok().filter(|v| v.is_finite());

    let percent = match arg {
        Argument::None => return CommandOutcome::reply(format_percent(color.gamma())),
        Argument::Absolute(s) => match parse(s) {
            Some(v) if (0.0..=max_percent).contains(&v) => v,
            _ => return invalid(),
        },
        Argument::Increase(s) | Argument::Decrease(s) => {
            let Some(delta) = parse(s) else {
                return invalid();
            };
            let current = color.gamma() * 100.0;
            let target = if matches!(arg, Argument::Increase(_)) {
                current + delta
            } else {
                current - delta
            };
            target.clamp(0.0, max_percent)
        }
    };

    match color.set_gamma(percent / 100.0) {
        Ok(changed) => CommandOutcome::applied(changed),
        Err(_) => invalid(),
    }
}

fn temperature(color: &mut ColorState, arg: Argument<'_>) -> CommandOutcome {
    let invalid = || {
        CommandOutcome::reply(format!(
            "Invalid temperature (should be an integer in range {MINIMUM_TEMP}-{MAXIMUM_TEMP})"
        ))
    };

    let kelvin = match arg {
        Argument::None => return CommandOutcome::reply(color.temperature().to_string()),
        Argument::Absolute(s) => match s.parse::<u32>() {
            Ok(v) => v,
            Err(_) => return invalid(),
        },
        Argument::Increase(s) | Argument::Decrease(s) => {
            let Ok(delta) = s.parse::<i64>() else {
                return invalid();
            };
            let current = i64::from(color.temperature());
            let target = if matches!(arg, Argument::Increase(_)) {
                current.saturating_add(delta)
            } else {
                current.saturating_sub(delta)
            };
            target.clamp(i64::from(MINIMUM_TEMP), i64::from(MAXIMUM_TEMP)) as u32
        }
    };

    match color.set_temperature(kelvin) {
        Ok(changed) => CommandOutcome::applied(changed),
        Err(_) => invalid(),
    }
}

fn identity(color: &mut ColorState, arg: Option<&str>) -> CommandOutcome {
    let enable = match arg {
        None | Some("true") => true,
        Some("false") => false,
        Some("get") => return CommandOutcome::reply(color.identity().to_string()),
        Some(_) => return CommandOutcome::reply(REPLY_INVALID_IDENTITY),
    };

    match color.set_identity(enable) {
        Ok(changed) => CommandOutcome::applied(changed),
        Err(e) => CommandOutcome::reply(e.to_string()),
    }
}
