//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use domus_core::{AlertKind, DisplayState, Liveness};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// A display state as text: green when on, dimmed when off, `-` when
/// nothing has been reported yet.
pub fn paint_state(state: Option<DisplayState>, color: bool) -> String {
    let Some(state) = state else {
        return "-".into();
    };
    let text = state.to_string();
    match (color, state.is_on()) {
        (false, _) => text,
        (true, true) => text.green().bold().to_string(),
        (true, false) => text.dimmed().to_string(),
    }
}

pub fn paint_liveness(liveness: Liveness, color: bool) -> String {
    let text = liveness.to_string();
    if !color {
        return text;
    }
    match liveness {
        Liveness::Online => text.green().to_string(),
        Liveness::Offline => text.red().bold().to_string(),
        Liveness::Unknown => text.yellow().to_string(),
    }
}

pub fn paint_alert(kind: AlertKind, message: &str, color: bool) -> String {
    if !color {
        return format!("[{kind}] {message}");
    }
    match kind {
        AlertKind::Offline | AlertKind::Auth => format!("[{kind}] {message}").red().to_string(),
        AlertKind::Transport | AlertKind::Unconfirmed => {
            format!("[{kind}] {message}").yellow().to_string()
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted string.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

/// Compact single-line JSON, one document per event.
pub(crate) fn render_json_line<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    render_json(data, true)
}

pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        id: u32,
        name: &'static str,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                id: 1,
                name: "Bedroom Light",
            },
            Item {
                id: 5,
                name: "Bedroom Window",
            },
        ]
    }

    #[test]
    fn plain_emits_one_identifier_per_line() {
        let out = render_list(
            &OutputFormat::Plain,
            &items(),
            |i| Row {
                name: i.name.into(),
            },
            |i| i.id.to_string(),
        )
        .unwrap();
        assert_eq!(out, "1\n5");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(
            &OutputFormat::JsonCompact,
            &items(),
            |i| Row {
                name: i.name.into(),
            },
            |i| i.id.to_string(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"[{"id":1,"name":"Bedroom Light"},{"id":5,"name":"Bedroom Window"}]"#
        );
    }

    #[test]
    fn table_uses_row_headers() {
        let out = render_list(
            &OutputFormat::Table,
            &items(),
            |i| Row {
                name: i.name.into(),
            },
            |i| i.id.to_string(),
        )
        .unwrap();
        assert!(out.contains("Name"));
        assert!(out.contains("Bedroom Window"));
    }

    #[test]
    fn states_render_without_color() {
        assert_eq!(paint_state(None, false), "-");
        assert_eq!(paint_state(Some(DisplayState::Switch(true)), false), "ON");
        assert_eq!(paint_state(Some(DisplayState::Slider(80)), false), "80%");
        assert_eq!(paint_liveness(Liveness::Offline, false), "offline");
        assert_eq!(
            paint_alert(AlertKind::Unconfirmed, "Bedroom Light not confirmed", false),
            "[unconfirmed] Bedroom Light not confirmed"
        );
    }
}
