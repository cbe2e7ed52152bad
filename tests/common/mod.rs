#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::process::Command;

use runall::{ProcessRunner, ResolvedTask, RunOptions, Sink};


/// Runs each task's script body with `sh -c`, passing argv as `$@`.
pub struct Shell {
    dir: PathBuf,
    scripts: HashMap<String, String>,
}

impl Shell {
    pub fn new(dir: &Path, scripts: &[(&str, &str)]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            scripts: scripts
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
        }
    }
}

impl ProcessRunner for Shell {
    fn command(&self, task: &ResolvedTask) -> Command {
        let body = self.scripts.get(&task.name).cloned().unwrap_or_default();
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(body)
            .arg("sh")
            .args(&task.argv)
            .current_dir(&self.dir);
        command
    }
}


/// An in-memory writer shared between a sink and the test.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl AsyncWrite for Capture {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}


/// Options that run `scripts` from `dir` with output captured.
pub fn options(dir: &Path, scripts: &[(&str, &str)], stdout: &Capture, stderr: &Capture) -> RunOptions {
    RunOptions {
        task_list: Some(scripts.iter().map(|(name, _)| name.to_string()).collect()),
        cwd: Some(dir.to_path_buf()),
        stdout: Some(Sink::new(stdout.clone())),
        stderr: Some(Sink::new(stderr.clone())),
        ..RunOptions::default()
    }
}


pub fn read(dir: &Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap_or_default()
}
