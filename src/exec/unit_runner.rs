// src/exec/unit_runner.rs

//! Process runner behind a single local unit.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::exec::local::LocalState;
use crate::exec::unit::UnitSpec;
use crate::types::Phase;

/// Run the unit's process, capturing output and reporting phases.
///
/// - The unit moves to `Running` once the process has been spawned and to
///   `Succeeded`/`Failed` when it exits.
/// - If the cancel channel fires (unit deleted), the child is killed and no
///   terminal phase is reported; the delete already produced an event.
/// - If `active_deadline_seconds` elapses first, the child is killed and the
///   unit is marked `Failed`.
pub(crate) async fn run_unit(
    local: Arc<LocalState>,
    spec: UnitSpec,
    output: Arc<Mutex<Vec<u8>>>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let name = spec.name.clone();
    let namespace = spec.namespace.clone();
    match run_unit_inner(&local, spec, &output, cancel_rx).await {
        Ok(Some(phase)) => local.set_phase(&name, &namespace, phase),
        Ok(None) => {}
        Err(err) => {
            error!(unit = %name, error = %err, "unit execution error");
            append(&output, format!("{err:#}\n").as_bytes());
            local.set_phase(&name, &namespace, Phase::Failed);
        }
    }
}

fn append(output: &Mutex<Vec<u8>>, bytes: &[u8]) {
    output
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend_from_slice(bytes);
}

fn capture<R>(reader: Option<R>, output: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let reader = reader?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut guard = output.lock().unwrap_or_else(PoisonError::into_inner);
            guard.extend_from_slice(line.as_bytes());
            guard.push(b'\n');
        }
    }))
}

async fn deadline(seconds: Option<i64>) {
    match seconds {
        Some(s) if s > 0 => tokio::time::sleep(Duration::from_secs(s as u64)).await,
        _ => std::future::pending::<()>().await,
    }
}

async fn run_unit_inner(
    local: &LocalState,
    spec: UnitSpec,
    output: &Arc<Mutex<Vec<u8>>>,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<Phase>> {
    let (program, args) = spec
        .container
        .command
        .split_first()
        .context("container command is empty")?;

    info!(
        unit = %spec.name,
        image = %spec.container.image,
        program = %program,
        "starting unit process"
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.annotations {
        cmd.env(env_key(key), value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for unit '{}'", spec.name))?;

    local.set_pid(&spec.name, &spec.namespace, child.id());
    local.set_phase(&spec.name, &spec.namespace, Phase::Running);

    let stdout = capture(child.stdout.take(), Arc::clone(output));
    let stderr = capture(child.stderr.take(), Arc::clone(output));

    let phase = tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of unit '{}'", spec.name))?;
            let code = status.code().unwrap_or(-1);
            info!(
                unit = %spec.name,
                exit_code = code,
                success = status.success(),
                "unit process exited"
            );
            Some(if status.success() { Phase::Succeeded } else { Phase::Failed })
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(unit = %spec.name, "unit deleted; killing process");
                    if let Err(e) = child.kill().await {
                        warn!(unit = %spec.name, error = %e, "failed to kill unit process");
                    }
                }
                Err(e) => {
                    debug!(unit = %spec.name, error = %e, "cancel channel closed");
                }
            }
            None
        }

        _ = deadline(spec.active_deadline_seconds) => {
            warn!(
                unit = %spec.name,
                deadline_secs = spec.active_deadline_seconds.unwrap_or_default(),
                "unit exceeded its active deadline; killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(unit = %spec.name, error = %e, "failed to kill unit process");
            }
            append(output, b"active deadline exceeded\n");
            Some(Phase::Failed)
        }
    };

    local.set_pid(&spec.name, &spec.namespace, None);

    // Drain the pipes before reporting a terminal phase so the last lines are
    // readable once observers see it.
    for handle in [stdout, stderr].into_iter().flatten() {
        if let Err(e) = handle.await {
            debug!(unit = %spec.name, error = %e, "output reader task ended abnormally");
        }
    }

    Ok(phase)
}

/// `podflow/execution-date` becomes `PODFLOW_EXECUTION_DATE`.
fn env_key(annotation: &str) -> String {
    annotation
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
