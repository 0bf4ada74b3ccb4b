//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Config with secrets masked, ready for display.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
        if profile.api_key.is_some() {
            profile.api_key = Some(MASK.into());
        }
    }
    cfg
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_password() -> Result<String, CliError> {
    let pass = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if pass.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(pass)
}

/// Store the password in the keyring or return it for the config file.
///
/// Returns `Some(password)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_password_storage(profile_name: &str, password: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the password?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        config::store_password(profile_name, password)?;
        eprintln!("   ✓ Password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(password.to_owned()))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let shown = redacted(&cfg);
            let out = output::render_single(
                &global.output,
                &shown,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| {
                    let mut names: Vec<_> = c.profiles.keys().cloned().collect();
                    names.sort();
                    names.join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let password = prompt_password()?;
            config::store_password(&profile_name, &password)?;
            if !global.quiet {
                eprintln!("✓ Password stored in keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}

/// Interactive wizard: create or update one profile.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config_or_default();
    eprintln!("domus: configuration wizard");
    eprintln!("   Config path: {}\n", config::config_path().display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default(global.profile.clone().unwrap_or_else(|| "default".into()))
        .interact_text()
        .map_err(prompt_err)?;

    let existing = cfg.profiles.get(&profile_name).cloned().unwrap_or_default();

    let database_url: String = Input::new()
        .with_prompt("Realtime database URL")
        .with_initial_text(existing.database_url.clone())
        .validate_with(|s: &String| {
            s.parse::<url::Url>()
                .map(|_| ())
                .map_err(|e| format!("invalid URL: {e}"))
        })
        .interact_text()
        .map_err(prompt_err)?;

    let api_key: String = Input::new()
        .with_prompt("Project API key")
        .with_initial_text(existing.api_key.clone().unwrap_or_default())
        .interact_text()
        .map_err(prompt_err)?;

    let email: String = Input::new()
        .with_prompt("Sign-in email")
        .with_initial_text(existing.email.clone().unwrap_or_default())
        .interact_text()
        .map_err(prompt_err)?;

    let password = prompt_password()?;
    let password = prompt_password_storage(&profile_name, &password)?;

    let registry_from_settings = Confirm::new()
        .with_prompt("Load devices from the shared settings document?")
        .default(existing.registry_from_settings)
        .interact()
        .map_err(prompt_err)?;

    let profile = Profile {
        database_url,
        api_key: Some(api_key).filter(|k| !k.is_empty()),
        email: Some(email).filter(|e| !e.is_empty()),
        password,
        registry_from_settings,
        ..existing
    };
    cfg.profiles.insert(profile_name.clone(), profile);

    let make_default = cfg.default_profile.as_deref() == Some(profile_name.as_str())
        || !cfg.profiles.contains_key(cfg.default_profile.as_deref().unwrap_or_default())
        || Confirm::new()
            .with_prompt(format!("Make '{profile_name}' the default profile?"))
            .default(false)
            .interact()
            .map_err(prompt_err)?;
    if make_default {
        cfg.default_profile = Some(profile_name.clone());
    }

    let path = config::save_config(&cfg)?;
    eprintln!("\n✓ Profile '{profile_name}' saved to {}", path.display());
    Ok(())
}
