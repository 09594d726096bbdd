//! Remote command channel

use async_trait::async_trait;
use thiserror::Error;

/// Command template used when none is configured
pub const DEFAULT_COMMAND: &str = "ssh {device} {command}";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("invalid command template '{0}'")]
    InvalidTemplate(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Runs a diagnostic command on a managed device and returns its raw output
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn execute(&self, device: &str, args: &[&str]) -> Result<String, ChannelError>;
}

/// Spawns a local process per command.
///
/// The template is split shell-style; `{device}` is replaced by the device
/// name and `{command}` by the space-joined arguments. A template without
/// `{command}` gets the arguments appended.
#[derive(Debug, Clone)]
pub struct ProcessChannel {
    template: Vec<String>,
}

impl ProcessChannel {
    pub fn new(template: &str) -> Result<Self, ChannelError> {
        let template = shlex::split(template)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| ChannelError::InvalidTemplate(template.to_string()))?;
        Ok(Self { template })
    }

    fn argv(&self, device: &str, args: &[&str]) -> Vec<String> {
        let command = args.join(" ");
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|word| word.replace("{device}", device).replace("{command}", &command))
            .collect();
        if !self.template.iter().any(|w| w.contains("{command}")) {
            argv.extend(args.iter().map(|a| a.to_string()));
        }
        argv
    }
}

#[async_trait]
impl CommandChannel for ProcessChannel {
    async fn execute(&self, device: &str, args: &[&str]) -> Result<String, ChannelError> {
        let argv = self.argv(device, args);
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| ChannelError::InvalidTemplate(String::new()))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(rest).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(device, program = %program, args = ?rest, "Running device command");
        let output = cmd.output().await.map_err(|source| ChannelError::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ChannelError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_substituted() {
        let channel = ProcessChannel::new("ssh -o BatchMode=yes {device} '{command}'").unwrap();
        assert_eq!(
            channel.argv("ios0", &["show", "version"]),
            ["ssh", "-o", "BatchMode=yes", "ios0", "show version"]
        );
    }

    #[test]
    fn test_arguments_appended_without_placeholder() {
        let channel = ProcessChannel::new("cat").unwrap();
        assert_eq!(channel.argv("ios0", &["version.txt"]), ["cat", "version.txt"]);
    }

    #[test]
    fn test_rejects_empty_or_unbalanced_template() {
        assert!(ProcessChannel::new("").is_err());
        assert!(ProcessChannel::new("ssh 'unterminated").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_executes_local_process() {
        let channel = ProcessChannel::new("echo {device}").unwrap();
        let out = channel.execute("ios0", &["show", "version"]).await.unwrap();
        assert_eq!(out.trim(), "ios0 show version");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let channel = ProcessChannel::new("false").unwrap();
        let err = channel.execute("ios0", &[]).await.unwrap_err();
        assert!(matches!(err, ChannelError::Failed { .. }), "{err}");
    }
}
