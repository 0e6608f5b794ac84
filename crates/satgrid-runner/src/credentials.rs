//! API credentials from the environment, with an interactive fallback.

use crate::config::ApiSection;
use crate::error::RunnerError;
use satgrid_tiles::Credentials;

/// Resolve credentials using `env` to read variables and `prompt` to ask for
/// the key when its variable is unset or empty.
///
/// The signing secret is optional and is never prompted for.
pub fn resolve_credentials<E, P>(api: &ApiSection, env: E, prompt: P) -> Result<Credentials, RunnerError>
where
    E: Fn(&str) -> Option<String>,
    P: FnOnce() -> Result<String, RunnerError>,
{
    let api_key = match env(&api.key_env).filter(|k| !k.trim().is_empty()) {
        Some(key) => key,
        None => {
            let key = prompt()?;
            if key.trim().is_empty() {
                return Err(RunnerError::Credentials(format!(
                    "no API key in ${} and none entered",
                    api.key_env
                )));
            }
            key
        }
    };
    let signing_secret = env(&api.secret_env).filter(|s| !s.trim().is_empty());

    Ok(Credentials {
        api_key: api_key.trim().to_string(),
        signing_secret,
    })
}

/// Read credentials from the process environment, prompting on the terminal
/// for a missing key.
pub fn credentials_from_env(api: &ApiSection) -> Result<Credentials, RunnerError> {
    resolve_credentials(api, |name| std::env::var(name).ok(), prompt_api_key)
}

fn prompt_api_key() -> Result<String, RunnerError> {
    dialoguer::Password::new()
        .with_prompt("Please enter your API key")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| RunnerError::Credentials(e.to_string()))
}
