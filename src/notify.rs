// ABOUTME: Rollout announcements sent when a rollout finishes.
// ABOUTME: The default transport pipes a plain-text message into a configured command.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::deploy::DeployRecord;
use crate::types::{EnvName, TagName};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify command is empty")]
    EmptyCommand,

    #[error("failed to run notify command `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("notify command `{program}` exited with {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "a signal".to_string()))]
    Failed { program: String, code: Option<i32> },
}

/// What finished, who did it and what went out.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub environment: EnvName,
    pub tag: Option<TagName>,
    pub operator: String,
    pub host: String,
    pub action: String,
    pub record: Option<DeployRecord>,
}

impl Announcement {
    pub fn subject(&self) -> String {
        match &self.tag {
            Some(tag) => format!("[rollout] {} {}: {}", self.environment, self.action, tag),
            None => format!("[rollout] {} {}", self.environment, self.action),
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subject: {}", self.subject())?;
        writeln!(f)?;
        writeln!(
            f,
            "{} finished a {} of {} from {}.",
            self.operator, self.action, self.environment, self.host
        )?;
        if let Some(record) = &self.record {
            writeln!(f)?;
            write!(f, "{}", record)?;
        }
        Ok(())
    }
}

/// Delivers rollout announcements.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, announcement: &Announcement) -> Result<(), NotifyError>;
}

/// Runs `argv` and writes the announcement to its stdin.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    argv: Vec<String>,
}

impl CommandNotifier {
    pub fn new(argv: Vec<String>) -> Result<Self, NotifyError> {
        if argv.is_empty() {
            return Err(NotifyError::EmptyCommand);
        }
        Ok(Self { argv })
    }

    fn program(&self) -> String {
        self.argv.first().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, announcement: &Announcement) -> Result<(), NotifyError> {
        let program = self.program();
        tracing::debug!("notify: {:?}", self.argv);

        let mut child = Command::new(&program)
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = announcement.to_string();
            // A command that ignores stdin may close it early.
            if let Err(e) = stdin.write_all(body.as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(NotifyError::Spawn { program, source: e });
            }
        }

        let status = child.wait().await.map_err(|source| NotifyError::Spawn {
            program: program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(NotifyError::Failed {
                program,
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement() -> Announcement {
        Announcement {
            environment: EnvName::new("sheep").unwrap(),
            tag: Some(TagName::new("sheep-20080825-2105")),
            operator: "alice".to_string(),
            host: "staging1".to_string(),
            action: "rollout".to_string(),
            record: None,
        }
    }

    #[test]
    fn announcement_text() {
        let text = announcement().to_string();
        assert!(text.starts_with("Subject: [rollout] sheep rollout: sheep-20080825-2105\n"));
        assert!(text.contains("alice finished a rollout of sheep from staging1."));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandNotifier::new(vec![]),
            Err(NotifyError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn command_receives_announcement_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mail.txt");
        let notifier = CommandNotifier::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat > {}", out.display()),
        ])
        .unwrap();

        notifier.notify(&announcement()).await.unwrap();
        let body = std::fs::read_to_string(&out).unwrap();
        assert!(body.contains("sheep-20080825-2105"));
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let notifier = CommandNotifier::new(vec!["false".to_string()]).unwrap();
        let err = notifier.notify(&announcement()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Failed { code: Some(1), .. }));
    }
}
