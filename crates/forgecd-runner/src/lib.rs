//! Transport-agnostic command streaming over a shared stdout stream,
//! delimited by sentinel markers (spec §4.1), plus the three backends that
//! construct a runner (spec §4.2).

pub mod docker;
pub mod error;
pub mod kubernetes;
pub mod ssh;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

pub use docker::{DockerClientManager, DockerTransport};
pub use error::{Result, RunnerError};
pub use kubernetes::KubernetesTransport;
pub use ssh::SshTransport;

/// Fixed 20-byte high-entropy terminators (spec §4.1) chosen so collisions
/// with real command output are negligible.
const OUT_TERM: &str = "xK7pQ2mZ9vT4wL6sR1cJ";
const ERR_TERM: &str = "bN3hY8fD5gA0eU2iO6qW";

/// Events reported while running a command list (`OnCmd`/`OnOut` in spec
/// §4.1), delivered over a channel rather than a synchronous callback so the
/// executor can persist them without blocking the runner's read loop.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Cmd { cmd: String, idx: usize, total: usize },
    Out(String),
}

/// Backend-specific writer/reader pair plus teardown (spec §4.1: "It is
/// constructed with a writer and a reader, plus backend-specific teardown").
#[async_trait]
pub trait RunnerTransport: Send {
    fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin);
    fn reader(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin);

    /// Invoked exactly once by `Runner::shutdown`.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Drives a `RunnerTransport` through a build's steps.
pub struct Runner<T: RunnerTransport> {
    transport: T,
}

impl<T: RunnerTransport> Runner<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Executes `commands` in order. Before each command, emits
    /// `RunnerEvent::Cmd`; for each output line, `RunnerEvent::Out`. Returns
    /// `Ok(())` once all commands complete, `Err(RunnerError::BuildFailed)`
    /// on the first non-zero command, or a transport error (spec §4.1).
    pub async fn run(
        &mut self,
        commands: &[String],
        events: &mpsc::UnboundedSender<RunnerEvent>,
    ) -> Result<()> {
        let total = commands.len();
        for (idx, cmd) in commands.iter().enumerate() {
            let _ = events.send(RunnerEvent::Cmd {
                cmd: cmd.clone(),
                idx,
                total,
            });

            let wrapped = format!("{cmd} 2>&1 && echo '{OUT_TERM}' || echo '{ERR_TERM}'\n");
            let writer = self.transport.writer();
            writer
                .write_all(wrapped.as_bytes())
                .await
                .map_err(|e| RunnerError::Transport(e.to_string()))?;
            writer
                .flush()
                .await
                .map_err(|e| RunnerError::Transport(e.to_string()))?;

            loop {
                let mut buf = Vec::new();
                let n = self
                    .transport
                    .reader()
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|e| RunnerError::Transport(e.to_string()))?;
                if n == 0 {
                    return Err(RunnerError::Transport(
                        "stream closed before terminator".to_string(),
                    ));
                }
                let line = strip_control_prefix(trim_newline(&buf));
                let line = String::from_utf8_lossy(line);
                let line = line.trim();

                if line == OUT_TERM {
                    break;
                }
                if line == ERR_TERM {
                    return Err(RunnerError::BuildFailed);
                }
                let _ = events.send(RunnerEvent::Out(line.to_string()));
            }
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.transport.shutdown().await
    }
}

/// A `Runner` over one of the three concrete backends (spec §4.2). The
/// Binder picks the variant at construction time; the Executor only ever
/// sees this enum, not the concrete transport, since a build's commands run
/// identically regardless of backend (spec §4.1: "works identically across
/// SSH shell channels, Docker attach connections, and Kubernetes exec
/// streams").
pub enum AnyRunner {
    Ssh(Runner<SshTransport>),
    Docker(Runner<DockerTransport>),
    Kubernetes(Runner<KubernetesTransport>),
}

impl AnyRunner {
    pub async fn run(
        &mut self,
        commands: &[String],
        events: &mpsc::UnboundedSender<RunnerEvent>,
    ) -> Result<()> {
        match self {
            AnyRunner::Ssh(r) => r.run(commands, events).await,
            AnyRunner::Docker(r) => r.run(commands, events).await,
            AnyRunner::Kubernetes(r) => r.run(commands, events).await,
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            AnyRunner::Ssh(r) => r.shutdown().await,
            AnyRunner::Docker(r) => r.shutdown().await,
            AnyRunner::Kubernetes(r) => r.shutdown().await,
        }
    }
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && (buf[end - 1] == b'\n' || buf[end - 1] == b'\r') {
        end -= 1;
    }
    &buf[..end]
}

/// Strips a leading SSH control byte (`0x01` followed by 7 padding bytes)
/// if present (spec §4.1).
fn strip_control_prefix(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= 8 && bytes[0] == 0x01 {
        &bytes[8..]
    } else {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{split, AsyncReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    struct FakeTransport {
        writer: WriteHalf<DuplexStream>,
        reader: BufReader<ReadHalf<DuplexStream>>,
    }

    #[async_trait]
    impl RunnerTransport for FakeTransport {
        fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
            &mut self.writer
        }

        fn reader(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin) {
            &mut self.reader
        }

        async fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Spawns a fake remote end that echoes `transcript` back every time it
    /// receives a write (enough to exercise one command's framing per call).
    fn fake(transcript: &'static str) -> FakeTransport {
        let (local, mut remote) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let _ = remote.read(&mut buf).await;
            let _ = remote.write_all(transcript.as_bytes()).await;
            // `remote` drops here, closing this half so the local side sees
            // EOF once the transcript has been drained.
        });
        let (read_half, write_half) = split(local);
        FakeTransport {
            writer: write_half,
            reader: BufReader::new(read_half),
        }
    }

    #[test]
    fn strip_control_prefix_removes_eight_bytes() {
        let mut prefixed = vec![1u8, 0, 0, 0, 0, 0, 0, 0];
        prefixed.extend_from_slice(b"hello");
        assert_eq!(strip_control_prefix(&prefixed), b"hello");
        assert_eq!(strip_control_prefix(b"hello"), b"hello");
    }

    #[tokio::test]
    async fn successful_commands_emit_output_in_order() {
        let transcript: &'static str = Box::leak(format!("hi\n{OUT_TERM}\n").into_boxed_str());
        let transport = fake(transcript);
        let mut runner = Runner::new(transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let commands = vec!["echo hi".to_string()];
        let result = runner.run(&commands, &tx).await;
        assert!(result.is_ok());
        drop(tx);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(matches!(events[0], RunnerEvent::Cmd { idx: 0, total: 1, .. }));
        assert!(matches!(&events[1], RunnerEvent::Out(line) if line == "hi"));
    }

    #[tokio::test]
    async fn error_terminator_yields_build_failed() {
        let transcript: &'static str = Box::leak(format!("{ERR_TERM}\n").into_boxed_str());
        let transport = fake(transcript);
        let mut runner = Runner::new(transport);
        let (tx, _rx) = mpsc::unbounded_channel();
        let commands = vec!["false".to_string()];
        let result = runner.run(&commands, &tx).await;
        assert!(matches!(result, Err(RunnerError::BuildFailed)));
    }

    #[tokio::test]
    async fn eof_without_terminator_is_a_transport_error() {
        let transport = fake("no terminator here\n");
        let mut runner = Runner::new(transport);
        let (tx, _rx) = mpsc::unbounded_channel();
        let commands = vec!["echo hi".to_string()];
        let result = runner.run(&commands, &tx).await;
        assert!(matches!(result, Err(RunnerError::Transport(_))));
    }
}
