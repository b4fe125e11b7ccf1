//! In-memory device used by transfer and install tests.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{RemoteDevice, command_line};

/// Writes advance in fixed chunks with a delay between them, so a paused clock controls the
/// transfer rate. Commands are recorded and answered from a prefix table.
#[derive(Debug)]
pub(crate) struct FakeDevice {
    chunk_size: usize,
    chunk_delay: Duration,
    fail_write_after: Option<u64>,
    failing_commands: Vec<&'static str>,
    slow_commands: Vec<(&'static str, Duration)>,
    outputs: Vec<(&'static str, String)>,
    files: Mutex<HashMap<String, u64>>,
    log: Mutex<Vec<String>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            chunk_size: 50_000,
            chunk_delay: Duration::from_millis(100),
            fail_write_after: None,
            failing_commands: Vec::new(),
            slow_commands: Vec::new(),
            outputs: Vec::new(),
            files: Mutex::default(),
            log: Mutex::default(),
        }
    }
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn chunks(mut self, size: usize, delay: Duration) -> Self {
        self.chunk_size = size;
        self.chunk_delay = delay;
        self
    }

    /// Fails the write once at least `bytes` have been stored.
    pub(crate) fn fail_write_after(mut self, bytes: u64) -> Self {
        self.fail_write_after = Some(bytes);
        self
    }

    /// Commands whose line starts with `prefix` fail.
    pub(crate) fn fail_command(mut self, prefix: &'static str) -> Self {
        self.failing_commands.push(prefix);
        self
    }

    /// Commands whose line starts with `prefix` take `delay` to answer.
    pub(crate) fn slow_command(mut self, prefix: &'static str, delay: Duration) -> Self {
        self.slow_commands.push((prefix, delay));
        self
    }

    /// Commands whose line starts with `prefix` print `output`. Others print `Success`.
    pub(crate) fn respond(mut self, prefix: &'static str, output: &str) -> Self {
        self.outputs.push((prefix, output.to_string()));
        self
    }

    /// Every write and command, in order, as `write <path>` or the command line.
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn file_size(&self, path: &str) -> Option<u64> {
        self.files.lock().unwrap().get(path).copied()
    }
}

#[async_trait]
impl RemoteDevice for FakeDevice {
    async fn stat_size(&self, path: &str) -> Result<u64> {
        match self.file_size(path) {
            Some(size) => Ok(size),
            None => bail!("stat: '{path}': No such file or directory"),
        }
    }

    async fn write_file(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        _mode: u32,
    ) -> Result<()> {
        self.log.lock().unwrap().push(format!("write {path}"));
        // the file appears with the first chunk, like a real push
        self.files.lock().unwrap().remove(path);
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            tokio::time::sleep(self.chunk_delay).await;
            let n = source.read(&mut buf).await?;
            if n == 0 {
                self.files.lock().unwrap().entry(path.to_string()).or_default();
                return Ok(());
            }
            let stored = {
                let mut files = self.files.lock().unwrap();
                let size = files.entry(path.to_string()).or_default();
                *size += n as u64;
                *size
            };
            if self.fail_write_after.is_some_and(|limit| stored >= limit) {
                bail!("device disconnected");
            }
        }
    }

    async fn run_command(&self, command: &str, args: &[String]) -> Result<String> {
        let line = command_line(command, args);
        self.log.lock().unwrap().push(line.clone());
        if let Some((_, delay)) = self.slow_commands.iter().find(|(p, _)| line.starts_with(p)) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_commands.iter().any(|p| line.starts_with(p)) {
            bail!("device offline");
        }
        if command == "rm" {
            for path in args.iter().filter(|a| !a.starts_with('-')) {
                self.files.lock().unwrap().remove(path);
            }
        }
        let output = self.outputs.iter().find(|(p, _)| line.starts_with(p)).map(|(_, o)| o.clone());
        Ok(output.unwrap_or_else(|| "Success\n".to_string()))
    }
}
