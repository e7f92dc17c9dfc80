use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use orbit_core::error::{OrbitError, Result};
use orbit_core::event::{EngineEvent, EventBus, OutputStream};
use orbit_core::session::{SessionContext, build_search_path};

use super::gateway::{ProcessGateway, ProcessOutput, ProcessRequest};
use super::terminate::terminate_child;

const READ_CHUNK_BYTES: usize = 4096;
/// How long readers may keep draining pipes after the child was killed.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs the real program with `tokio::process`.
pub struct SystemProcessGateway {
    bus: EventBus,
    extra_paths: Vec<PathBuf>,
    kill_grace: Duration,
}

impl SystemProcessGateway {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            extra_paths: Vec::new(),
            kill_grace: Duration::from_secs(2),
        }
    }

    pub fn with_extra_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.extra_paths = paths;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    fn build_command(&self, request: &ProcessRequest, context: &SessionContext) -> Command {
        let inherited = std::env::var("PATH").ok();
        let search_path =
            build_search_path(&context.working_dir, &self.extra_paths, inherited.as_deref());

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&context.working_dir)
            .env("PATH", search_path)
            .envs(&context.env)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so termination reaches grandchildren too.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    fn pump<R>(
        &self,
        reader: Option<R>,
        stream: OutputStream,
        operation_id: Option<String>,
    ) -> Option<JoinHandle<Vec<u8>>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut reader = reader?;
        let bus = self.bus.clone();
        Some(tokio::spawn(async move {
            let mut collected = Vec::new();
            let mut decoder = Utf8Carry::default();
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            let publish = |chunk: String| {
                bus.publish(EngineEvent::OutputChunk {
                    operation_id: operation_id.clone(),
                    stream,
                    chunk,
                });
            };
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        collected.extend_from_slice(&buf[..n]);
                        if let Some(chunk) = decoder.push(&buf[..n]) {
                            publish(chunk);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("[Gateway] {:?} read ended: {}", stream, e);
                        break;
                    }
                }
            }
            if let Some(chunk) = decoder.finish() {
                publish(chunk);
            }
            collected
        }))
    }
}

#[async_trait]
impl ProcessGateway for SystemProcessGateway {
    fn is_simulated(&self) -> bool {
        false
    }

    async fn run(
        &self,
        request: ProcessRequest,
        context: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput> {
        let started = Instant::now();
        let mut cmd = self.build_command(&request, context);

        tracing::debug!(
            operation_id = request.operation_id.as_deref().unwrap_or(""),
            "[Gateway] Spawning {} {:?} in {:?}",
            request.program,
            request.args,
            context.working_dir
        );

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!("[Gateway] Failed to spawn {}: {}", request.program, e);
            OrbitError::spawn(&request.program, describe_spawn_error(&e))
        })?;
        let pid = child.id();

        self.bus.publish(EngineEvent::ProcessStarted {
            operation_id: request.operation_id.clone(),
            program: request.program.clone(),
            pid,
        });

        let stdin_task = match (request.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
                // A child that exits without reading stdin yields BrokenPipe.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!("[Gateway] stdin write ended early: {}", e);
                }
                let _ = stdin.shutdown().await;
            })),
            _ => None,
        };

        let stdout_task = self.pump(
            child.stdout.take(),
            OutputStream::Stdout,
            request.operation_id.clone(),
        );
        let stderr_task = self.pump(
            child.stderr.take(),
            OutputStream::Stderr,
            request.operation_id.clone(),
        );

        let (status, killed) = tokio::select! {
            status = child.wait() => (status.ok(), false),
            _ = cancel.cancelled() => {
                tracing::info!(
                    operation_id = request.operation_id.as_deref().unwrap_or(""),
                    "[Gateway] Cancellation requested, terminating pid {:?}",
                    pid
                );
                (terminate_child(&mut child, self.kill_grace).await, true)
            }
        };

        if let Some(task) = stdin_task {
            task.abort();
        }
        let stdout = collect(stdout_task, killed).await;
        let stderr = collect(stderr_task, killed).await;

        let exit_code = status.and_then(|s| s.code());
        let duration = started.elapsed();

        self.bus.publish(EngineEvent::ProcessExited {
            operation_id: request.operation_id.clone(),
            exit_code,
            duration_ms: duration.as_millis() as u64,
        });

        Ok(ProcessOutput {
            success: !killed && status.map(|s| s.success()).unwrap_or(false),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            duration,
            pid,
            simulated: false,
            killed,
        })
    }
}

/// Decodes a byte stream into text chunks without splitting a character
/// across two chunks. An incomplete trailing sequence is held back until the
/// next read completes it.
#[derive(Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let ready = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end: keep it for the next read.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // Invalid bytes are not going to become valid; decode lossily.
            Err(_) => self.pending.len(),
        };
        if ready == 0 {
            return None;
        }
        let rest = self.pending.split_off(ready);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        Some(text)
    }

    /// Flushes whatever is left once the stream ended.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>, killed: bool) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    if !killed {
        return task.await.unwrap_or_default();
    }
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut task).await {
        Ok(bytes) => bytes.unwrap_or_default(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}

fn describe_spawn_error(err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => {
            "executable not found. Make sure it is installed and on PATH, \
             or set `cli.program` to its full path"
                .to_string()
        }
        std::io::ErrorKind::PermissionDenied => {
            "permission denied. Check the executable bit and that this \
             environment allows spawning processes"
                .to_string()
        }
        _ => err.to_string(),
    }
}
