//! Caller-facing prompt catalogue.

use crate::core::directory::Job;

/// Highest menu key that selects a job; 9 repeats the menu.
pub const MAX_MENU_JOBS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Welcome,
    AskPin { length: usize },
    PinNotRecognized,
    Greeting { first_name: String, provider: String },
    JobMenu { jobs: Vec<Job> },
    JobDetail { job: Job },
    ConfirmAccept { job: Job },
    ConfirmDecline { job: Job },
    Accepted { job: Job },
    Declined,
    NoJobs,
    NoInput,
    InvalidInput,
    ServiceApology,
    Transferring,
    RepresentativeUnavailable,
    HoldPosition { position: usize },
    Goodbye,
    SystemError,
}

fn job_line(job: &Job) -> String {
    format!("{} at {}, starting {}", job.title, job.location, job.starts_at)
}

impl Prompt {
    pub fn text(&self) -> String {
        match self {
            Prompt::Welcome => "Welcome to the shift line.".to_string(),
            Prompt::AskPin { length } => {
                format!("Please enter or say your {length} digit PIN, followed by the pound key.")
            }
            Prompt::PinNotRecognized => "Sorry, we could not find that PIN.".to_string(),
            Prompt::Greeting {
                first_name,
                provider,
            } => format!("Hi {first_name}, thanks for calling {provider}."),
            Prompt::JobMenu { jobs } => {
                let plural = if jobs.len() == 1 { "" } else { "s" };
                let mut text = format!("You have {} open shift{plural}.", jobs.len());
                for (index, job) in jobs.iter().take(MAX_MENU_JOBS).enumerate() {
                    text.push_str(&format!(" For {}, press {}.", job_line(job), index + 1));
                }
                text.push_str(" To hear this again, press 9. To end the call, press star.");
                text
            }
            Prompt::JobDetail { job } => {
                let mut text = format!("{}.", job_line(job));
                if let Some(rate) = &job.pay_rate {
                    text.push_str(&format!(" The pay rate is {rate}."));
                }
                text.push_str(
                    " To accept, press 1. To decline, press 2. To hear this again, press 9. \
                     To go back, press star.",
                );
                text
            }
            Prompt::ConfirmAccept { job } => format!(
                "You are accepting {}. To confirm, press 1. To cancel, press 2.",
                job_line(job)
            ),
            Prompt::ConfirmDecline { job } => format!(
                "You are declining {}. To confirm, press 1. To cancel, press 2.",
                job_line(job)
            ),
            Prompt::Accepted { job } => format!(
                "You are confirmed for {}. Thank you, goodbye.",
                job_line(job)
            ),
            Prompt::Declined => "Thanks for letting us know. Goodbye.".to_string(),
            Prompt::NoJobs => "There are no open shifts for you right now. Goodbye.".to_string(),
            Prompt::NoInput => "Sorry, I didn't hear anything.".to_string(),
            Prompt::InvalidInput => "Sorry, that's not a valid choice.".to_string(),
            Prompt::ServiceApology => {
                "Sorry, we're having trouble reaching our system. One moment please.".to_string()
            }
            Prompt::Transferring => {
                "Please hold while I connect you to a representative.".to_string()
            }
            Prompt::RepresentativeUnavailable => {
                "All of our representatives are busy. Please stay on the line.".to_string()
            }
            Prompt::HoldPosition { position } => format!(
                "You are caller number {position} in line. A representative will be with you shortly."
            ),
            Prompt::Goodbye => "Thank you for calling. Goodbye.".to_string(),
            Prompt::SystemError => {
                "We're sorry, something went wrong. Please call again later. Goodbye.".to_string()
            }
        }
    }

    /// Stable identifier, used for playback marks and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Prompt::Welcome => "welcome",
            Prompt::AskPin { .. } => "ask_pin",
            Prompt::PinNotRecognized => "pin_not_recognized",
            Prompt::Greeting { .. } => "greeting",
            Prompt::JobMenu { .. } => "job_menu",
            Prompt::JobDetail { .. } => "job_detail",
            Prompt::ConfirmAccept { .. } => "confirm_accept",
            Prompt::ConfirmDecline { .. } => "confirm_decline",
            Prompt::Accepted { .. } => "accepted",
            Prompt::Declined => "declined",
            Prompt::NoJobs => "no_jobs",
            Prompt::NoInput => "no_input",
            Prompt::InvalidInput => "invalid_input",
            Prompt::ServiceApology => "service_apology",
            Prompt::Transferring => "transferring",
            Prompt::RepresentativeUnavailable => "representative_unavailable",
            Prompt::HoldPosition { .. } => "hold_position",
            Prompt::Goodbye => "goodbye",
            Prompt::SystemError => "system_error",
        }
    }

    /// Static prompts are worth caching; prompts carrying caller data are not.
    pub fn is_cacheable(&self) -> bool {
        !matches!(
            self,
            Prompt::Greeting { .. }
                | Prompt::JobMenu { .. }
                | Prompt::JobDetail { .. }
                | Prompt::ConfirmAccept { .. }
                | Prompt::ConfirmDecline { .. }
                | Prompt::Accepted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(title: &str) -> Job {
        Job {
            id: title.to_lowercase(),
            title: title.to_string(),
            location: "Dock 4".to_string(),
            starts_at: "Monday 7 AM".to_string(),
            pay_rate: Some("$21 an hour".to_string()),
        }
    }

    #[test]
    fn test_job_menu_lists_keys_in_order() {
        let text = Prompt::JobMenu {
            jobs: vec![job("Picker"), job("Packer")],
        }
        .text();
        assert!(text.starts_with("You have 2 open shifts."));
        let picker = text.find("Picker at Dock 4, starting Monday 7 AM, press 1").unwrap();
        let packer = text.find("Packer at Dock 4, starting Monday 7 AM, press 2").unwrap();
        assert!(picker < packer);
    }

    #[test]
    fn test_detail_mentions_pay_rate() {
        let text = Prompt::JobDetail { job: job("Picker") }.text();
        assert!(text.contains("$21 an hour"));
    }

    #[test]
    fn test_personal_prompts_not_cacheable() {
        assert!(Prompt::Transferring.is_cacheable());
        assert!(Prompt::HoldPosition { position: 2 }.is_cacheable());
        assert!(
            !Prompt::Greeting {
                first_name: "Dana".into(),
                provider: "Northside".into()
            }
            .is_cacheable()
        );
    }
}
