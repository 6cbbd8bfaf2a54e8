use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::debug;
use std::io::{self, IsTerminal, Write};

use crate::utils::error::{AppError, AppResult};

/// Environment variable consulted before prompting for the sudo password
pub const PASSWORD_ENV: &str = "QUEUESNOOP_SUDO_PASSWORD";

/// Supplies the secret used for elevated capture
pub trait CredentialProvider: Send + Sync {
    fn secret(&self, prompt: &str) -> AppResult<String>;
}

/// A secret known up front (environment, tests)
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Credentials from `QUEUESNOOP_SUDO_PASSWORD`, if set
    pub fn from_env() -> Option<Self> {
        std::env::var(PASSWORD_ENV).ok().map(Self)
    }
}

impl CredentialProvider for StaticCredentials {
    fn secret(&self, _prompt: &str) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

/// Prompts on the terminal with echo disabled
pub struct TerminalCredentials;

impl CredentialProvider for TerminalCredentials {
    fn secret(&self, prompt: &str) -> AppResult<String> {
        if !io::stdin().is_terminal() {
            return Err(AppError::CredentialError(
                "stdin is not a terminal, cannot prompt for password".to_string(),
            ));
        }

        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush()?;

        enable_raw_mode()?;
        let secret = read_hidden_line();
        disable_raw_mode()?;
        writeln!(stderr)?;

        let secret = secret?;
        debug!("Read {} character password from terminal", secret.chars().count());
        Ok(secret)
    }
}

/// Collect key presses until Enter; Ctrl-C aborts
fn read_hidden_line() -> AppResult<String> {
    let mut secret = String::new();
    loop {
        if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
            if kind != KeyEventKind::Press {
                continue;
            }
            match code {
                KeyCode::Enter => return Ok(secret),
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(AppError::CredentialError("password prompt interrupted".to_string()));
                }
                KeyCode::Char(c) => secret.push(c),
                KeyCode::Backspace => {
                    secret.pop();
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_ignore_prompt() {
        let provider = StaticCredentials::new("hunter2");
        assert_eq!(provider.secret("password: ").unwrap(), "hunter2");
    }
}
