//! CLI configuration: thin wrapper around `domus_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--database-url, --email, etc.).

use std::time::Duration;

use secrecy::SecretString;

use domus_core::{ConnectionConfig, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use domus_config::{
    Config, Profile, config_path, load_config_or_default, save_config, store_password,
};

/// Everything needed to connect and sign in.
pub struct Target {
    pub profile: String,
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub email: String,
    pub password: SecretString,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Build the connection target from the config file, the active profile,
/// and CLI overrides. Without a matching profile, flags and environment
/// must supply everything.
pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.database_url.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    resolve_profile(&profile, &profile_name, global, &cfg)
}

/// Translate a `Profile` + global flags into connection and session
/// configs. CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<Target, CliError> {
    let mut profile = profile.clone();
    if let Some(ref url) = global.database_url {
        profile.database_url.clone_from(url);
    }
    if let Some(ref key) = global.api_key {
        profile.api_key = Some(key.clone());
    }
    if let Some(ref email) = global.email {
        profile.email = Some(email.clone());
    }

    let mut connection =
        domus_config::profile_to_connection_config(&profile, profile_name, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        connection.timeout = Duration::from_secs(secs);
    }

    let email = domus_config::resolve_email(&profile, profile_name)?;
    let password = match global.password {
        Some(ref pw) => SecretString::from(pw.clone()),
        None => domus_config::resolve_password(&profile, profile_name)?,
    };

    Ok(Target {
        profile: profile_name.to_owned(),
        session: domus_config::profile_to_session_config(&profile),
        connection,
        email,
        password,
    })
}
