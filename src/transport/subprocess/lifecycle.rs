//! Starting and stopping the agent process

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{CoreError, Result};

use super::command;
use super::config::STDERR_TAIL_LINES;
use super::transport::SubprocessTransport;

/// Time a process gets to exit after its input is closed
const EXIT_GRACE: Duration = Duration::from_secs(5);

impl SubprocessTransport {
    pub(super) async fn start_impl(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if let Some(cwd) = &self.config.cwd
            && !cwd.is_dir()
        {
            return Err(CoreError::transport(format!(
                "Working directory does not exist: {}",
                cwd.display()
            )));
        }

        let mut child = command::build(&self.program, &self.config)
            .spawn()
            .map_err(|e| {
                CoreError::runtime(format!(
                    "Failed to start agent runtime {}: {e}",
                    self.program.display()
                ))
            })?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(CoreError::transport("Agent runtime stdio is not piped"));
        };

        // Drained continuously so the child never blocks on a full pipe.
        let tail = self.stderr_tail.clone();
        let label = self.config.label.clone();
        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("[{label}] agent stderr: {line}");
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }));

        log::debug!(
            "[{}] started {} (pid {:?})",
            self.config.label,
            self.program.display(),
            child.id()
        );
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        self.running = true;
        Ok(())
    }

    pub(super) async fn shutdown_impl(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        // End of input is the agent's signal to exit.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        self.stdout = None;

        if let Some(mut reader) = self.reader_task.take() {
            // The reader owns the child; aborting it drops (and kills) the child.
            if tokio::time::timeout(EXIT_GRACE, &mut reader).await.is_err() {
                log::warn!("[{}] agent runtime did not exit, killing it", self.config.label);
                reader.abort();
            }
        }
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    log::warn!("[{}] agent runtime did not exit, killing it", self.config.label);
                    let _ = child.kill().await;
                }
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }

    pub(super) fn drop_impl(&mut self) {
        self.stdin = None;
        for task in [self.reader_task.take(), self.stderr_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}
