use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Why a decode attempt failed. Only ever logged; callers of the HTTP API see
/// a generic failure.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to launch decoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decoder exited with {0}")]
    Exit(ExitStatus),

    #[error("decoder timed out after {0:?}")]
    TimedOut(Duration),

    #[error("decoder produced no output")]
    EmptyOutput,

    #[error("decoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a staged container file into playable audio at `output`.
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, input: &Path, output: &Path) -> Result<(), DecodeError>;

    /// Short name reported by the health endpoint
    fn name(&self) -> &str;
}

/// Where an external decoder writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `program <input> > <output>`
    Stdout,
    /// `program <input> <output>`
    Argument,
}

impl OutputMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "stdout" => Some(Self::Stdout),
            "argument" | "arg" => Some(Self::Argument),
            _ => None,
        }
    }
}

/// Runs an external decoder program, e.g. `ncmdump`.
///
/// Success means a zero exit status and a non-empty output file; the
/// program's stderr is only logged at debug level. The child is killed when
/// the time budget runs out.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    output_mode: OutputMode,
    timeout: Duration,
}

impl CommandDecoder {
    pub fn new(program: impl Into<String>, output_mode: OutputMode, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            output_mode,
            timeout,
        }
    }
}

#[async_trait]
impl Decoder for CommandDecoder {
    async fn decode(&self, input: &Path, output: &Path) -> Result<(), DecodeError> {
        let mut command = Command::new(&self.program);
        command
            .arg(input)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.output_mode {
            OutputMode::Stdout => {
                let file = tokio::fs::File::create(output).await?.into_std().await;
                command.stdout(Stdio::from(file));
            }
            OutputMode::Argument => {
                command.arg(output).stdout(Stdio::null());
            }
        }

        let child = command.spawn().map_err(|source| DecodeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DecodeError::TimedOut(self.timeout))??;

        if !result.stderr.is_empty() {
            tracing::debug!(
                "{} stderr: {}",
                self.program,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        if !result.status.success() {
            return Err(DecodeError::Exit(result.status));
        }

        ensure_populated(output).await
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Copies the input unchanged. Development mode and tests.
#[derive(Debug, Clone, Default)]
pub struct PassthroughDecoder;

#[async_trait]
impl Decoder for PassthroughDecoder {
    async fn decode(&self, input: &Path, output: &Path) -> Result<(), DecodeError> {
        tracing::warn!("PassthroughDecoder: copying input without decoding (development mode)");
        tokio::fs::copy(input, output).await?;
        ensure_populated(output).await
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

async fn ensure_populated(output: &Path) -> Result<(), DecodeError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(DecodeError::EmptyOutput),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DecodeError::EmptyOutput),
        Err(e) => Err(DecodeError::Io(e)),
    }
}

/// Factory function to create the decoder named by `decoder_type`
pub fn create_decoder(
    decoder_type: &str,
    program: &str,
    output_mode: OutputMode,
    timeout: Duration,
) -> Box<dyn Decoder> {
    match decoder_type.to_lowercase().as_str() {
        "command" | "external" => Box::new(CommandDecoder::new(program, output_mode, timeout)),
        "passthrough" | "noop" => Box::new(PassthroughDecoder),
        _ => {
            tracing::warn!(
                "Unknown decoder type '{}', falling back to external command '{}'",
                decoder_type,
                program
            );
            Box::new(CommandDecoder::new(program, output_mode, timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("input.ncm");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_passthrough_copies_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.ncm");
        let output = dir.path().join("a.mp3");
        std::fs::write(&input, b"audio").unwrap();

        PassthroughDecoder.decode(&input, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_passthrough_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.ncm");
        let output = dir.path().join("empty.mp3");
        std::fs::write(&input, b"").unwrap();

        let err = PassthroughDecoder.decode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DecodeError::EmptyOutput));
    }

    // The staged input doubles as a shell script: `sh <input>` runs it.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_stdout_mode_writes_output() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "printf decoded\n");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new("sh", OutputMode::Stdout, Duration::from_secs(10));
        decoder.decode(&input, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"decoded");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_argument_mode_passes_output_path() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "printf decoded > \"$1\"\n");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new("sh", OutputMode::Argument, Duration::from_secs(10));
        decoder.decode(&input, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"decoded");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_nonzero_exit_fails() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "echo 'bad key' >&2\nexit 3\n");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new("sh", OutputMode::Stdout, Duration::from_secs(10));
        let err = decoder.decode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DecodeError::Exit(status) if status.code() == Some(3)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_zero_exit_without_output_fails() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "exit 0\n");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new("sh", OutputMode::Argument, Duration::from_secs(10));
        let err = decoder.decode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DecodeError::EmptyOutput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_times_out() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "sleep 5\n");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new("sh", OutputMode::Stdout, Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = decoder.decode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DecodeError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let input = script(&dir, "");
        let output = dir.path().join("out.mp3");

        let decoder = CommandDecoder::new(
            "definitely-not-an-installed-decoder",
            OutputMode::Argument,
            Duration::from_secs(1),
        );
        let err = decoder.decode(&input, &output).await.unwrap_err();
        assert!(matches!(err, DecodeError::Spawn { .. }));
    }

    #[test]
    fn test_output_mode_from_name() {
        assert_eq!(OutputMode::from_name("STDOUT"), Some(OutputMode::Stdout));
        assert_eq!(OutputMode::from_name("arg"), Some(OutputMode::Argument));
        assert_eq!(OutputMode::from_name("pipe"), None);
    }

    #[test]
    fn test_create_decoder() {
        let timeout = Duration::from_secs(1);
        assert_eq!(create_decoder("passthrough", "ncmdump", OutputMode::Stdout, timeout).name(), "passthrough");
        assert_eq!(create_decoder("command", "ncmdump", OutputMode::Stdout, timeout).name(), "ncmdump");
        assert_eq!(create_decoder("bogus", "ncmdump", OutputMode::Stdout, timeout).name(), "ncmdump");
    }
}
