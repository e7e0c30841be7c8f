//! Terminal prompts.
//!
//! Uses dialoguer for the removal confirmation.

use conduit_core::install::Confirm;
use dialoguer::theme::ColorfulTheme;

/// Asks on the terminal; a failed prompt (no tty) counts as "no".
pub struct TerminalConfirm {
    theme: ColorfulTheme,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        match dialoguer::Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt unavailable");
                false
            }
        }
    }
}
