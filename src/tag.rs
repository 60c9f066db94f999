//! NFC tag writing.
//!
//! The tag itself is driven by an external script. A receipt id is written as
//! four big-endian bytes (or as the plain integer, depending on the script),
//! left on the tag for the customer to read, then optionally cleared.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use crate::config::{TagArgFormat, TagConfig};

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("receipt id {0} does not fit in four bytes")]
    IdOutOfRange(i64),
    #[error("File does not exist: {}", .0.display())]
    MissingScript(PathBuf),
    #[error("could not run {}: {source}", .script.display())]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} did not finish within {after:?}", .script.display())]
    Timeout { script: PathBuf, after: Duration },
    #[error("{} exited with {status}", .script.display())]
    Failed { script: PathBuf, status: ExitStatus },
}

/// A receipt id in the form stored on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptTag {
    id: u32,
}

impl ReceiptTag {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        self.id.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            id: u32::from_be_bytes(bytes),
        }
    }

    /// Script arguments for this tag.
    pub fn args(&self, format: TagArgFormat) -> Vec<String> {
        match format {
            TagArgFormat::DecimalBytes => self.to_bytes().iter().map(|b| b.to_string()).collect(),
            TagArgFormat::HexBytes => self.to_bytes().iter().map(|b| format!("{:x}", b)).collect(),
            TagArgFormat::Integer => vec![self.id.to_string()],
        }
    }
}

impl TryFrom<i64> for ReceiptTag {
    type Error = TagError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        u32::try_from(id)
            .map(ReceiptTag::new)
            .map_err(|_| TagError::IdOutOfRange(id))
    }
}

pub trait TagWriter {
    fn write(&mut self, tag: &ReceiptTag) -> Result<(), TagError>;
}

/// Writes tags by running an interpreter on the configured scripts.
pub struct ScriptTagWriter {
    interpreter: String,
    write_script: PathBuf,
    clear_script: Option<PathBuf>,
    arg_format: TagArgFormat,
    hold: Duration,
    timeout: Duration,
}

impl ScriptTagWriter {
    pub fn from_config(config: &TagConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            write_script: config.write_script.clone(),
            clear_script: config.clear_script.clone(),
            arg_format: config.arg_format,
            hold: config.hold_duration(),
            timeout: config.timeout(),
        }
    }

    /// Runs `script` with `args`, relaying its stdout to the log line by line.
    fn run_script(&self, script: &Path, args: &[String]) -> Result<(), TagError> {
        if !script.is_file() {
            return Err(TagError::MissingScript(script.to_path_buf()));
        }

        let mut child = Command::new(&self.interpreter)
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TagError::Spawn {
                script: script.to_path_buf(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        let (line_tx, line_rx) = mpsc::channel::<String>();

        if let Some(stdout) = child.stdout.take() {
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || relay_stderr(stderr));
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match line_rx.recv_timeout(remaining) {
                Ok(line) => tracing::info!("{}", line),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => return Err(self.kill(&mut child, script)),
            }
        }

        let status = match wait_until(&mut child, deadline) {
            Some(status) => status,
            None => return Err(self.kill(&mut child, script)),
        };

        if status.success() {
            Ok(())
        } else {
            Err(TagError::Failed {
                script: script.to_path_buf(),
                status,
            })
        }
    }

    fn kill(&self, child: &mut Child, script: &Path) -> TagError {
        let _ = child.kill();
        let _ = child.wait();
        TagError::Timeout {
            script: script.to_path_buf(),
            after: self.timeout,
        }
    }
}

impl TagWriter for ScriptTagWriter {
    fn write(&mut self, tag: &ReceiptTag) -> Result<(), TagError> {
        tracing::info!("Writing Receipt ID '{}' to Tag...", tag.id());
        self.run_script(&self.write_script, &tag.args(self.arg_format))?;
        tracing::info!("Write to Tag Complete!");

        if let Some(clear_script) = &self.clear_script {
            tracing::info!("Waiting {} seconds for Tag read.", self.hold.as_secs());
            thread::sleep(self.hold);

            tracing::info!("Clearing Tag data...");
            self.run_script(clear_script, &[])?;
            tracing::info!("Tag Clear Complete!");
        }

        Ok(())
    }
}

fn relay_stderr<R: Read>(stderr: R) {
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        tracing::warn!("{}", line);
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> Option<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Failed to wait for tag script: {}", err);
                return None;
            }
        }
    }
}
