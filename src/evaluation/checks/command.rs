#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use async_trait::async_trait;

use super::{StepResult, run_step};
use crate::{
    checkout::Checkout,
    config::Settings,
    evaluation::job::{Check, CheckError, CheckOutcome},
    process::Invocation,
};

/// Runs an operator supplied shell command in the checkout root and passes on
/// a zero exit status.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    /// Runtime configuration.
    settings: Settings,
    /// Command line handed to `sh -c`.
    command:  String,
}

impl CommandCheck {
    /// Creates the check.
    pub fn new(settings: Settings, command: impl Into<String>) -> Self {
        Self {
            settings,
            command: command.into(),
        }
    }
}

#[async_trait]
impl Check for CommandCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let invocation = Invocation::shell(&self.command)
            .current_dir(checkout.local_path())
            .deadline(self.settings.command_timeout());

        Ok(match run_step(invocation).await {
            StepResult::Aborted(comment) => CheckOutcome::failed(comment),
            StepResult::Finished(output) if output.success() => CheckOutcome::passed(),
            StepResult::Finished(output) => CheckOutcome::failed(format!(
                "`{}` exited with {}",
                self.command, output.status
            )),
        })
    }
}
