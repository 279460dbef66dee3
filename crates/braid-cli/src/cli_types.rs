use braid_session::ConversationSort;
use clap::ValueEnum;
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliConversationSort {
    /// Last activity.
    #[default]
    Time,
    /// Number of responses.
    Length,
}

impl From<CliConversationSort> for ConversationSort {
    fn from(value: CliConversationSort) -> Self {
        match value {
            CliConversationSort::Time => ConversationSort::Recency,
            CliConversationSort::Length => ConversationSort::TurnCount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliShellCompletion {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

impl From<CliShellCompletion> for Shell {
    fn from(value: CliShellCompletion) -> Self {
        match value {
            CliShellCompletion::Bash => Shell::Bash,
            CliShellCompletion::Zsh => Shell::Zsh,
            CliShellCompletion::Fish => Shell::Fish,
            CliShellCompletion::PowerShell => Shell::PowerShell,
        }
    }
}
