use std::fmt;
use std::io::IsTerminal;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::manifest::Manifest;
use crate::plans::{Group, GroupMode, RunPlan};
use crate::tasks::{quote_arg, ResolvedTask};


const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[39m";


type Writer = Box<dyn AsyncWrite + Send + Unpin>;


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SinkKind {
    Stdout,
    Stderr,
    Custom,
}


/// A destination for task output, shared by every task of a run.
///
/// Writes go through one lock so labeled lines from concurrent tasks never
/// interleave within a line.
#[derive(Clone)]
pub struct Sink {
    kind: SinkKind,
    state: Arc<Mutex<SinkState>>,
}

struct SinkState {
    writer: Writer,
    at_line_start: bool,
    last_label: Option<String>,
}

impl Sink {
    pub fn stdout() -> Self {
        Self::with_kind(SinkKind::Stdout, Box::new(tokio::io::stdout()))
    }

    pub fn stderr() -> Self {
        Self::with_kind(SinkKind::Stderr, Box::new(tokio::io::stderr()))
    }

    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::with_kind(SinkKind::Custom, Box::new(writer))
    }

    fn with_kind(kind: SinkKind, writer: Writer) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(SinkState {
                writer,
                at_line_start: true,
                last_label: None,
            })),
        }
    }

    /// Whether children may write to this sink directly.
    pub fn is_inheritable(&self) -> bool {
        self.kind != SinkKind::Custom
    }

    pub fn is_terminal(&self) -> bool {
        match self.kind {
            SinkKind::Stdout => std::io::stdout().is_terminal(),
            SinkKind::Stderr => std::io::stderr().is_terminal(),
            SinkKind::Custom => false,
        }
    }

    pub async fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.at_line_start = bytes.ends_with(b"\n");
        state.last_label = None;
        state.writer.write_all(bytes).await?;
        state.writer.flush().await
    }

    /// Writes one line (or trailing fragment) behind `prefix`.
    ///
    /// When another task left a fragment without a newline, a newline is
    /// inserted first so every line carries exactly one prefix.
    pub async fn write_labeled(&self, prefix: &str, line: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        let mut bytes = Vec::with_capacity(prefix.len() + line.len() + 1);
        let continues = !state.at_line_start && state.last_label.as_deref() == Some(prefix);
        if !continues {
            if !state.at_line_start {
                bytes.push(b'\n');
            }
            bytes.extend_from_slice(prefix.as_bytes());
        }
        bytes.extend_from_slice(line);

        state.at_line_start = line.ends_with(b"\n");
        state.last_label = Some(prefix.to_string());
        state.writer.write_all(&bytes).await?;
        state.writer.flush().await
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sink").field("kind", &self.kind).finish()
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stream {
    Stdout,
    Stderr,
}


/// Decides how each task's output reaches the run's sinks.
#[derive(Debug)]
pub struct OutputManager {
    stdout: Sink,
    stderr: Sink,
    print_label: bool,
    print_name: bool,
    aggregate_output: bool,
    label_width: usize,
    manifest: Option<Manifest>,
}

impl OutputManager {
    pub fn new(stdout: Sink, stderr: Sink) -> Self {
        Self {
            stdout,
            stderr,
            print_label: false,
            print_name: false,
            aggregate_output: false,
            label_width: 0,
            manifest: None,
        }
    }

    pub fn with_print_label(mut self, print_label: bool) -> Self {
        self.print_label = print_label;
        self
    }

    pub fn with_print_name(mut self, print_name: bool) -> Self {
        self.print_name = print_name;
        self
    }

    pub fn with_aggregate_output(mut self, aggregate_output: bool) -> Self {
        self.aggregate_output = aggregate_output;
        self
    }

    /// Package identity shown in name headers.
    pub fn with_manifest(mut self, manifest: Option<Manifest>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Pads labels to the longest task label of `plan`.
    pub fn with_labels_for(mut self, plan: &RunPlan) -> Self {
        self.label_width = plan
            .tasks()
            .map(|task| task.label().chars().count())
            .max()
            .unwrap_or(0);
        self
    }

    pub fn for_task(&self, task: &ResolvedTask, group: &Group) -> TaskOutput {
        let label = task.label();
        let prefix = self
            .print_label
            .then(|| format!("[{label:<width$}] ", width = self.label_width));
        let header = self
            .print_name
            .then(|| self.header(task, &label, self.stdout.is_terminal()));

        TaskOutput {
            prefix,
            header,
            aggregate: self.aggregate_output && group.mode == GroupMode::Parallel,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    fn header(&self, task: &ResolvedTask, label: &str, color: bool) -> String {
        let (open, close) = if color { (GRAY, RESET) } else { ("", "") };
        match &self.manifest {
            Some(manifest) => {
                let script = manifest.script(&task.name).unwrap_or_default();
                let args: Vec<String> = task.argv.iter().map(|arg| quote_arg(arg)).collect();
                format!(
                    "\n{open}> {}@{} {} {}{close}\n{open}> {} {}{close}\n\n",
                    manifest.name,
                    manifest.version,
                    task.name,
                    manifest.path.display(),
                    script,
                    args.join(" "),
                )
            }
            None => format!("\n{open}> {label}{close}\n\n"),
        }
    }
}


/// Output handling for one running task.
#[derive(Debug)]
pub struct TaskOutput {
    prefix: Option<String>,
    header: Option<String>,
    aggregate: bool,
    stdout: Sink,
    stderr: Sink,
}

impl TaskOutput {
    /// Stdio for the child: inherited when output passes through untouched.
    pub fn stdio(&self) -> (Stdio, Stdio) {
        let raw = self.prefix.is_none();
        let stdout = if raw && !self.aggregate && self.stdout.is_inheritable() {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };
        let stderr = if raw && self.stderr.is_inheritable() {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };
        (stdout, stderr)
    }

    /// Prints the name header unless it is held back with aggregated output.
    pub async fn start(&self) -> std::io::Result<()> {
        match &self.header {
            Some(header) if !self.aggregate => self.stdout.write(header.as_bytes()).await,
            _ => Ok(()),
        }
    }

    /// Copies one child stream to its sink until end of file.
    ///
    /// Aggregated stdout is returned instead of written.
    pub async fn forward<R: AsyncRead + Unpin>(
        &self,
        reader: Option<R>,
        stream: Stream,
    ) -> std::io::Result<Vec<u8>> {
        let Some(reader) = reader else {
            return Ok(vec![]);
        };
        let sink = match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        };
        let buffered = stream == Stream::Stdout && self.aggregate;
        let mut held = vec![];

        match &self.prefix {
            Some(prefix) => {
                let mut reader = BufReader::new(reader);
                let mut line = vec![];
                loop {
                    line.clear();
                    if reader.read_until(b'\n', &mut line).await? == 0 {
                        break;
                    }
                    if buffered {
                        held.extend_from_slice(prefix.as_bytes());
                        held.extend_from_slice(&line);
                    } else {
                        sink.write_labeled(prefix, &line).await?;
                    }
                }
                if buffered && !held.is_empty() && !held.ends_with(b"\n") {
                    held.push(b'\n');
                }
            }
            None if buffered => {
                let mut reader = reader;
                reader.read_to_end(&mut held).await?;
            }
            None => {
                let mut reader = reader;
                let mut chunk = vec![0; 8192];
                loop {
                    let read = reader.read(&mut chunk).await?;
                    if read == 0 {
                        break;
                    }
                    sink.write(&chunk[..read]).await?;
                }
            }
        }
        Ok(held)
    }

    /// Writes held-back output as one contiguous block.
    pub async fn finish(&self, held: Vec<u8>) -> std::io::Result<()> {
        if !self.aggregate {
            return Ok(());
        }
        let mut block = self.header.clone().unwrap_or_default().into_bytes();
        block.extend(held);
        self.stdout.write(&block).await
    }
}
