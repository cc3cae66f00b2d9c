//! Terminal UI helpers: colors, spinner and interactive prompts.

use anyhow::{Result, bail};
use inquire::{Confirm, InquireError, Password, PasswordDisplayMode};

mod lookup;
mod spinner;
mod style;

pub use lookup::{LookupOutcome, print_lookup};
pub use spinner::Spinner;
pub use style::Style;

/// Check if the inquire error is a user cancellation/interruption.
const fn is_prompt_cancelled(err: &InquireError) -> bool {
    matches!(
        err,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Runs `f`, treating a cancelled prompt (Ctrl+C or Escape) as success.
///
/// A newline is printed so the shell prompt starts on a clean line.
pub fn handle_prompt_cancellation<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    match f() {
        Ok(()) => Ok(()),
        Err(e)
            if e.downcast_ref::<InquireError>()
                .is_some_and(is_prompt_cancelled) =>
        {
            println!();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Asks for a secret without echoing it.
pub fn prompt_secret(label: &str) -> Result<String> {
    let value = Password::new(label)
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;

    let value = value.trim();
    if value.is_empty() {
        bail!("{label} cannot be empty");
    }
    Ok(value.to_string())
}

pub fn confirm(message: &str, default: bool) -> Result<bool> {
    Ok(Confirm::new(message).with_default(default).prompt()?)
}
