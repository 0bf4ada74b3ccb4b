//! Settings document handlers.

use tabled::Tabled;
use tracing::info;

use domus_core::{Controller, CoreError, Relay, Settings};

use crate::cli::{GlobalOpts, SettingsArgs, SettingsCommand};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct RelayRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Mode")]
    mode: String,
}

impl From<&Relay> for RelayRow {
    fn from(r: &Relay) -> Self {
        Self {
            id: r.id,
            label: r.label.clone(),
            path: r.path.clone(),
            kind: r.kind.to_string(),
            mode: r.mode.unwrap_or_default().to_string(),
        }
    }
}

fn detail(settings: &Settings) -> String {
    let rows: Vec<RelayRow> = settings.relays.iter().map(RelayRow::from).collect();
    let mut lines = vec![
        format!(
            "Prefix:   {}",
            if settings.prefix.is_empty() {
                "(none)"
            } else {
                &settings.prefix
            }
        ),
        output::render_table(&rows),
    ];
    if !settings.presets.is_empty() {
        lines.push("Presets:".into());
        for (path, p) in &settings.presets {
            lines.push(format!(
                "  {path}: open {}%, half {}%, close {}%",
                p.open, p.half, p.close
            ));
        }
    }
    lines.join("\n")
}

pub async fn handle(
    args: SettingsArgs,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let store = controller.store().as_ref();
    let path = &controller.config().settings_path;

    let settings = match args.command {
        SettingsCommand::Show => Settings::load(store, path).await?,

        SettingsCommand::Init { force } => {
            let existing = store.read(path).await.map_err(CoreError::from)?;
            if existing.is_some() && !force {
                if !global.quiet {
                    eprintln!("Settings already stored at {path}; use --force to overwrite");
                }
                return Ok(());
            }
            let saved = Settings::default().save(store, path).await?;
            info!(path = %path, relays = saved.relays.len(), "default settings written");
            saved
        }
    };

    let out = output::render_single(&global.output, &settings, detail, |s| {
        s.relays
            .iter()
            .map(|r| r.path.clone())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
