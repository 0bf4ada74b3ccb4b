//! `domus watch`: stream view changes, ON count, liveness, and alerts.
//!
//! Table/plain output prints one human-readable line per event; JSON and
//! YAML emit one document per event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use domus_core::{Alert, DeviceId, DeviceView, Liveness, OnCount, Session};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    Device {
        at: DateTime<Utc>,
        view: Arc<DeviceView>,
    },
    OnCount {
        at: DateTime<Utc>,
        on: usize,
        total: usize,
    },
    Liveness {
        at: DateTime<Utc>,
        state: Liveness,
    },
    Alert {
        alert: Alert,
    },
}

impl WatchEvent {
    fn on_count(count: OnCount) -> Self {
        Self::OnCount {
            at: Utc::now(),
            on: count.on,
            total: count.total,
        }
    }

    fn liveness(state: Liveness) -> Self {
        Self::Liveness {
            at: Utc::now(),
            state,
        }
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn emit(&self, event: &WatchEvent) -> Result<(), CliError> {
        let out = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_line(event)?,
            OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event)?.trim_end()),
            OutputFormat::Table | OutputFormat::Plain => self.line(event),
        };
        output::print_output(&out, self.quiet);
        Ok(())
    }

    fn line(&self, event: &WatchEvent) -> String {
        let stamp = |at: &DateTime<Utc>| at.with_timezone(&Local).format("%H:%M:%S").to_string();
        match event {
            WatchEvent::Device { at, view } => {
                let mut line = format!(
                    "{} {:<20} {}",
                    stamp(at),
                    view.label,
                    output::paint_state(view.state, self.color)
                );
                if view.pending {
                    line.push_str(" (pending)");
                }
                if !view.enabled {
                    line.push_str(" (disabled)");
                }
                line
            }
            WatchEvent::OnCount { at, on, total } => {
                format!("{} {on}/{total} on", stamp(at))
            }
            WatchEvent::Liveness { at, state } => {
                format!("{} devices {}", stamp(at), output::paint_liveness(*state, self.color))
            }
            WatchEvent::Alert { alert } => format!(
                "{} {}",
                stamp(&alert.raised_at),
                output::paint_alert(alert.kind, &alert.message, self.color)
            ),
        }
    }
}

/// Run until Ctrl-C or until the session ends.
pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let printer = Printer {
        format: global.output.clone(),
        color: output::should_color(&global.color),
        quiet: global.quiet,
    };

    let mut views = session.views();
    let mut on_count = session.on_count();
    let mut liveness = session.liveness();
    let mut alerts = session.alerts();

    // Initial picture
    let mut last: HashMap<DeviceId, Arc<DeviceView>> = HashMap::new();
    let now = Utc::now();
    for view in views.current().iter() {
        last.insert(view.id, Arc::clone(view));
        printer.emit(&WatchEvent::Device {
            at: now,
            view: Arc::clone(view),
        })?;
    }
    printer.emit(&WatchEvent::on_count(*on_count.borrow_and_update()))?;
    printer.emit(&WatchEvent::liveness(*liveness.borrow_and_update()))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                debug!("interrupted");
                break;
            }
            () = session.closed() => break,
            snap = views.changed() => {
                let Some(snap) = snap else { break };
                let at = Utc::now();
                for view in snap.iter() {
                    if last.get(&view.id).is_some_and(|prev| prev == view) {
                        continue;
                    }
                    last.insert(view.id, Arc::clone(view));
                    printer.emit(&WatchEvent::Device {
                        at,
                        view: Arc::clone(view),
                    })?;
                }
            }
            changed = on_count.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *on_count.borrow_and_update();
                printer.emit(&WatchEvent::on_count(count))?;
            }
            changed = liveness.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *liveness.borrow_and_update();
                printer.emit(&WatchEvent::liveness(state))?;
            }
            alert = alerts.recv() => match alert {
                Ok(alert) => printer.emit(&WatchEvent::Alert { alert })?,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "alert stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
