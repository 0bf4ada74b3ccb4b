//! Shared helpers for command handlers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use domus_core::{
    Alert, AlertKind, CommandOutcome, CommandStatus, Controller, CoreError, DeviceRegistry,
    Outcome, Resolution, Session,
};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;

/// A signed-in controller and its live session.
pub struct Link {
    pub controller: Controller,
    pub session: Session,
}

/// Build the backend clients, sign in, and wait for the first session.
pub async fn connect(global: &GlobalOpts) -> Result<Link, CliError> {
    let config::Target {
        profile,
        connection,
        session: session_config,
        email,
        password,
    } = config::resolve_target(global)?;
    let timeout = connection.timeout;

    let controller =
        Controller::connect(&connection, DeviceRegistry::default_catalog(), session_config)?;
    controller.start().await;

    let signed_in = async {
        controller
            .sign_in(&email, &password)
            .await
            .map_err(|e| match e {
                CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                    profile: profile.clone(),
                    reason: message,
                },
                other => CliError::from(other),
            })?;
        Ok::<_, CliError>(controller.wait_for_session().await?)
    };

    let session = match tokio::time::timeout(timeout, signed_in).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            controller.shutdown().await;
            return Err(e);
        }
        Err(_) => {
            controller.shutdown().await;
            return Err(CliError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
    };
    debug!(profile = %profile, devices = session.registry().len(), "connected");

    Ok(Link {
        controller,
        session,
    })
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Label of a device for messages, falling back to its id.
pub fn label(session: &Session, outcome: &CommandOutcome) -> String {
    session
        .registry()
        .get(outcome.device)
        .map_or_else(|| outcome.device.to_string(), |d| d.label.clone())
}

fn spinner(message: String, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn is_ours(resolution: &Resolution, outcome: &CommandOutcome) -> bool {
    resolution.device == outcome.device
        && resolution.command.expected == outcome.value
        && resolution.command.cmd_id == outcome.cmd_id
}

/// Block until a pending command resolves, showing a spinner.
///
/// `resolutions` and `alerts` must be subscribed before the command was
/// dispatched so the outcome cannot be missed. Returns the outcome with
/// its status updated to `Confirmed`.
pub async fn await_confirmation(
    session: &Session,
    mut outcome: CommandOutcome,
    mut resolutions: broadcast::Receiver<Resolution>,
    mut alerts: broadcast::Receiver<Alert>,
    quiet: bool,
) -> Result<CommandOutcome, CliError> {
    if outcome.status != CommandStatus::Pending {
        return Ok(outcome);
    }
    let device = label(session, &outcome);
    let bar = spinner(format!("Waiting for {device} to confirm"), quiet);

    let result = loop {
        tokio::select! {
            biased;
            () = session.closed() => break Err(CliError::SessionClosed),
            res = resolutions.recv() => match res {
                Ok(r) if is_ours(&r, &outcome) => break match r.outcome {
                    Outcome::Confirmed | Outcome::Acknowledged => Ok(()),
                    Outcome::Expired => Err(CliError::Unconfirmed {
                        message: format!("{device} did not confirm the command"),
                        device: device.clone(),
                    }),
                    Outcome::Superseded | Outcome::Cleared => Err(CliError::Superseded {
                        device: device.clone(),
                    }),
                },
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "resolution stream lagged"),
                Err(RecvError::Closed) => break Err(CliError::SessionClosed),
            },
            alert = alerts.recv() => match alert {
                Ok(a) if a.kind == AlertKind::Unconfirmed && a.device == Some(outcome.device) => {
                    break Err(CliError::Unconfirmed {
                        device: device.clone(),
                        message: a.message,
                    });
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Err(CliError::SessionClosed),
            },
        }
    };

    bar.finish_and_clear();
    result.map(|()| {
        outcome.status = CommandStatus::Confirmed;
        outcome
    })
}
