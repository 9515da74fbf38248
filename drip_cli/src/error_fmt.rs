//! Human-readable error descriptions, exit codes and structured JSON errors.

use drip_core::error::{BuildError, DripError};

/// Exit code asking the supervisor to start the controller again.
pub const EXIT_RESTART: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: The controller was assembled without its {}.\nLikely causes: A hardware backend failed to initialize.\nHow to fix: Check the earlier log lines for the failing device.",
            match be {
                BuildError::MissingValves => "valves",
                BuildError::MissingPublisher => "message publisher",
                BuildError::MissingStore => "config store",
            }
        );
    }

    if let Some(de) = err.downcast_ref::<DripError>() {
        return match de {
            DripError::Fatal(msg) => format!(
                "What happened: The controller could not start ({msg}).\nLikely causes: The config file is unreadable or not valid TOML.\nHow to fix: Repair or remove the file (a missing file starts from defaults), then restart."
            ),
            DripError::Configuration(msg) => format!(
                "What happened: The configuration does not match the installation ({msg}).\nLikely causes: [topology] declares hardware that is not wired, or a value is out of range.\nHow to fix: Edit the config file and run `drip check-config`."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: A TOML syntax error or an out-of-range value.\nHow to fix: Edit the config file and try again."
        );
    }

    if lower.contains("gpio") {
        return format!(
            "What happened: Failed to initialize GPIO ({msg}).\nLikely causes: Wrong pin numbers or missing permission to access /dev/gpiomem.\nHow to fix: Check --valve-pins and --flow-pin; run as a user in the gpio group."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Configuration problems exit with 3, a failed boot with 4, everything else with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<DripError>() {
        Some(DripError::Configuration(_)) => 3,
        Some(DripError::Fatal(_)) => 4,
        _ if format!("{err:#}")
            .to_ascii_lowercase()
            .contains("invalid configuration") =>
        {
            3
        }
        _ => 1,
    }
}

/// Stable reason name for the JSON error object.
fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<DripError>() {
        Some(DripError::Validation(_)) => "Validation",
        Some(DripError::Conflict(_)) => "Conflict",
        Some(DripError::Configuration(_)) => "Configuration",
        Some(DripError::TransientIo(_)) => "TransientIo",
        Some(DripError::Fatal(_)) => "Fatal",
        None if err.downcast_ref::<BuildError>().is_some() => "Build",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
