use console::{style, StyledObject};
use openqa_client::jobs::{JobResult, JobState, ResultGroup};
use std::fmt::Display;

/// How a value should read at a glance, in tables and plain listings alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Warning,
    Bad,
    Muted,
    Plain,
}

impl Tone {
    /// Passed is good, soft failures warn, failures and incompletes are bad
    /// and aborted jobs fade out. Jobs without a result stay plain.
    pub fn of_result(result: JobResult) -> Self {
        match (result, result.group()) {
            (JobResult::Passed, _) => Self::Good,
            (JobResult::Softfailed, _) => Self::Warning,
            (_, Some(ResultGroup::Complete | ResultGroup::NotComplete)) => Self::Bad,
            (_, Some(ResultGroup::Aborted)) => Self::Muted,
            (_, None) => Self::Plain,
        }
    }

    /// Jobs still on their way stand out; final ones don't.
    pub fn of_state(state: JobState) -> Self {
        if state.is_final() {
            Self::Plain
        } else {
            Self::Warning
        }
    }

    pub fn paint(self, text: impl Display) -> StyledObject<String> {
        let styled = style(text.to_string());
        match self {
            Self::Good => styled.bright().green(),
            Self::Warning => styled.bright().yellow(),
            Self::Bad => styled.bright().red(),
            Self::Muted => styled.dim(),
            Self::Plain => styled,
        }
    }
}

pub fn label(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn job_id(id: u64) -> StyledObject<String> {
    style(id.to_string()).cyan()
}

pub fn heading(emoji: &str, title: &str) -> String {
    format!(
        "{} {}",
        style(emoji).bright(),
        style(title).bright().underlined()
    )
}

pub fn brand(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_tones() {
        assert_eq!(Tone::of_result(JobResult::Passed), Tone::Good);
        assert_eq!(Tone::of_result(JobResult::Softfailed), Tone::Warning);
        assert_eq!(Tone::of_result(JobResult::Failed), Tone::Bad);
        assert_eq!(Tone::of_result(JobResult::TimeoutExceeded), Tone::Bad);
        assert_eq!(Tone::of_result(JobResult::Obsoleted), Tone::Muted);
        assert_eq!(Tone::of_result(JobResult::None), Tone::Plain);
    }

    #[test]
    fn test_state_tones() {
        assert_eq!(Tone::of_state(JobState::Running), Tone::Warning);
        assert_eq!(Tone::of_state(JobState::Cancelled), Tone::Plain);
    }

    #[test]
    fn test_paint_keeps_text() {
        let painted = console::strip_ansi_codes(&Tone::Bad.paint("failed").to_string()).to_string();
        assert_eq!(painted, "failed");
    }
}
