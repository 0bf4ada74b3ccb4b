//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use domus_core::{
    AllOffReport, CommandOutcome, CommandStatus, DeviceId, DeviceView, DisplayState, Preset,
    Session,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts, WaitArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Pending")]
    pending: String,
}

impl DeviceRow {
    fn from_view(v: &DeviceView, color: bool) -> Self {
        Self {
            id: v.id.to_string(),
            name: v.label.clone(),
            key: v.key.clone(),
            kind: v.kind.to_string(),
            mode: v.mode.to_string(),
            state: output::paint_state(v.state, color),
            pending: if v.pending { "yes".into() } else { String::new() },
        }
    }
}

#[derive(Tabled)]
struct AllOffRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Result")]
    result: String,
}

// ── Detail formatting ───────────────────────────────────────────────

fn outcome_detail(session: &Session, outcome: &CommandOutcome) -> String {
    let name = util::label(session, outcome);
    let target = session
        .registry()
        .get(outcome.device)
        .map_or_else(
            || outcome.value.to_string(),
            |d| DisplayState::from_level(d.kind, outcome.value).to_string(),
        );
    match outcome.status {
        CommandStatus::Confirmed => format!("{name}: {target} (confirmed)"),
        CommandStatus::Pending => format!("{name}: {target} (sent, awaiting confirmation)"),
        CommandStatus::Assumed => format!("{name}: {target} (sent)"),
    }
}

fn all_off_rows(session: &Session, report: &AllOffReport) -> Vec<AllOffRow> {
    let name = |id: DeviceId| {
        session
            .registry()
            .get(id)
            .map_or_else(String::new, |d| d.label.clone())
    };
    report
        .sent
        .iter()
        .map(|o| AllOffRow {
            id: o.device.to_string(),
            name: name(o.device),
            result: o.status.to_string(),
        })
        .chain(report.failed.iter().map(|f| AllOffRow {
            id: f.device.to_string(),
            name: name(f.device),
            result: format!("failed: {}", f.error),
        }))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: DevicesArgs,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let snap = session.snapshot();
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                snap.as_slice(),
                |v: &Arc<DeviceView>| DeviceRow::from_view(v, color),
                |v| format!("{}\t{}", v.key, output::paint_state(v.state, false)),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Toggle { device, wait } => {
            let id = session.registry().resolve(&device)?.id;
            command(session, global, &wait, |s| async move {
                s.dispatcher().toggle(id).await
            })
            .await
        }

        DevicesCommand::Set {
            device,
            percent,
            wait,
        } => {
            let id = session.registry().resolve(&device)?.id;
            command(session, global, &wait, |s| async move {
                s.dispatcher().set_percent(id, percent).await
            })
            .await
        }

        DevicesCommand::Preset {
            device,
            preset,
            wait,
        } => {
            let id = session.registry().resolve(&device)?.id;
            let preset = Preset::from(preset);
            command(session, global, &wait, |s| async move {
                s.dispatcher().apply_preset(id, preset).await
            })
            .await
        }

        DevicesCommand::AllOff => {
            let switches = session.registry().switches().count();
            if !util::confirm(&format!("Turn off all {switches} switches?"), global.yes)? {
                return Ok(());
            }
            let report = session.dispatcher().all_off(true).await?;

            let out = output::render_single(
                &global.output,
                &report,
                |r| output::render_table(&all_off_rows(session, r)),
                |r| {
                    r.sent
                        .iter()
                        .map(|o| o.device.to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);

            if report.failed.is_empty() {
                Ok(())
            } else {
                Err(CliError::PartialFailure {
                    failed: report.failed.len(),
                    total: report.failed.len() + report.sent.len(),
                })
            }
        }
    }
}

/// Dispatch one command, optionally wait for its confirmation, and print
/// the outcome.
async fn command<F, Fut>(
    session: &Session,
    global: &GlobalOpts,
    wait: &WaitArgs,
    send: F,
) -> Result<(), CliError>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<CommandOutcome, domus_core::CoreError>>,
{
    let resolutions = session.resolutions();
    let alerts = session.alerts();
    let mut outcome = send(session.clone()).await?;

    if !wait.no_wait {
        outcome =
            util::await_confirmation(session, outcome, resolutions, alerts, global.quiet).await?;
    }

    let out = output::render_single(
        &global.output,
        &outcome,
        |o| outcome_detail(session, o),
        |o| o.status.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
