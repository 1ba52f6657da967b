//! Packet I/O facade: the single choke point over the native demux/mux
//! library (`spec.md` §4.1).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Everything outside this module manipulates only the opaque
//! `InputContext`/`OutputContext`/`PacketHandle` types below; `av::native`
//! is the only code that calls into `ffmpeg_next`.

mod native;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ffmpeg_next as ffmpeg;
use tokio::sync::Notify;

use crate::error::AppError;

/// `format_hint` values the facade understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Rtsp,
    Concat,
    Mp4,
}

impl FormatHint {
    fn as_str(self) -> &'static str {
        match self {
            FormatHint::Rtsp => "rtsp",
            FormatHint::Concat => "concat",
            FormatHint::Mp4 => "mp4",
        }
    }
}

/// An opaque native demuxer handle. Cheaply cloneable; every clone refers to
/// the same underlying resource.
#[derive(Clone)]
pub struct InputContext {
    inner: Arc<Mutex<Option<ffmpeg::format::context::Input>>>,
    closed: Arc<AtomicBool>,
}

/// An opaque native muxer handle, with the write-completion bookkeeping
/// `close_output` needs (`spec.md` §4.2, "Concurrent writers").
#[derive(Clone)]
pub struct OutputContext {
    inner: Arc<Mutex<Option<ffmpeg::format::context::Output>>>,
    closed: Arc<AtomicBool>,
    gate: Arc<WriteGate>,
}

impl OutputContext {
    /// Registers one writer activity as in-flight against this output.
    /// Call this synchronously, before spawning the task that will perform
    /// the write — see [`WriteGuard`].
    pub fn enter_write(&self) -> WriteGuard {
        self.gate.enter();
        WriteGuard {
            gate: self.gate.clone(),
        }
    }
}

/// A packet borrowed from the native layer. Released exactly once: either by
/// being consumed by `write_packet`, or implicitly by `Drop` when a caller
/// discards it without writing (e.g. a loop that breaks after reaching its
/// frame quota).
pub struct PacketHandle {
    packet: ffmpeg::Packet,
    stream_index: usize,
}

/// The outcome of one `read_packet` poll.
pub enum ReadOutcome {
    Packet(PacketHandle),
    Empty,
    End,
}

/// Tracks outstanding writer activities against one output so
/// `close_output` can wait for them to finish before invoking the native
/// close (`spec.md` §5, "The close-output activity blocks on the
/// write-completion counter reaching zero").
#[derive(Default)]
pub struct WriteGate {
    count: AtomicUsize,
    notify: Notify,
}

impl WriteGate {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Blocks until every writer that has called `enter` has also called
    /// `exit`.
    pub async fn wait_idle(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// Proof that one writer activity has been counted against an output's
/// gate. Dropping it (normally at the end of the spawned writer task)
/// decrements the counter.
///
/// Must be acquired with [`OutputContext::enter_write`] *before* the writer
/// activity is spawned onto the executor — incrementing the counter from
/// inside the spawned task would leave a window where a concurrent
/// `close_output` observes an idle gate before the writer has even started
/// (`spec.md` §5, "a per-snapshot write-completion counter is incremented
/// before the writer starts native work").
pub struct WriteGuard {
    gate: Arc<WriteGate>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

/// Opens a demuxer input. `format_hint` is `"rtsp"` or `"concat"`.
pub async fn open_input(format_hint: FormatHint, url: String) -> Result<InputContext, AppError> {
    let hint = format_hint.as_str();
    let ctx = tokio::task::spawn_blocking(move || native::open_input(hint, &url))
        .await
        .map_err(|e| AppError::NativeOpenFailed(format!("open_input join error: {e}")))??;

    Ok(InputContext {
        inner: Arc::new(Mutex::new(Some(ctx))),
        closed: Arc::new(AtomicBool::new(false)),
    })
}

/// Opens an MP4 output whose stream layout is copied from `input`.
pub async fn open_output(url: String, input: &InputContext) -> Result<OutputContext, AppError> {
    let input = input.clone();
    let octx = tokio::task::spawn_blocking(move || {
        let guard = input.inner.lock().unwrap();
        let ictx = guard
            .as_ref()
            .ok_or_else(|| AppError::NativeOpenFailed("input already closed".into()))?;
        native::open_output(FormatHint::Mp4.as_str(), &url, ictx)
    })
    .await
    .map_err(|e| AppError::NativeOpenFailed(format!("open_output join error: {e}")))??;

    Ok(OutputContext {
        inner: Arc::new(Mutex::new(Some(octx))),
        closed: Arc::new(AtomicBool::new(false)),
        gate: Arc::new(WriteGate::default()),
    })
}

/// Reads one packet from `input`.
pub async fn read_packet(input: &InputContext) -> ReadOutcome {
    let input = input.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut guard = input.inner.lock().unwrap();
        match guard.as_mut() {
            Some(ictx) => native::read_packet(ictx),
            None => native::ReadOutcome::End,
        }
    })
    .await
    .unwrap_or(native::ReadOutcome::End);

    match outcome {
        native::ReadOutcome::Packet(packet, stream_index) => ReadOutcome::Packet(PacketHandle {
            packet,
            stream_index,
        }),
        native::ReadOutcome::Empty => ReadOutcome::Empty,
        native::ReadOutcome::End => ReadOutcome::End,
    }
}

/// Writes `pkt` to `output`, consuming it. Callers that dispatch this as a
/// concurrent writer activity must hold an [`OutputContext::enter_write`]
/// guard for the duration of the call, acquired before spawning — see
/// `CameraWorker::take_snapshot`.
pub async fn write_packet(
    input: &InputContext,
    output: &OutputContext,
    pkt: PacketHandle,
) -> Result<(), AppError> {
    let input = input.clone();
    let output = output.clone();
    tokio::task::spawn_blocking(move || {
        let in_guard = input.inner.lock().unwrap();
        let ictx = in_guard
            .as_ref()
            .ok_or_else(|| AppError::NativeIoFailed("input already closed".into()))?;
        let mut out_guard = output.inner.lock().unwrap();
        let octx = out_guard
            .as_mut()
            .ok_or_else(|| AppError::NativeIoFailed("output already closed".into()))?;
        native::write_packet(ictx, octx, pkt.packet, pkt.stream_index)
    })
    .await
    .map_err(|e| AppError::NativeIoFailed(format!("write_packet join error: {e}")))?
}

/// Closes `input`. Idempotent.
pub async fn close_input(input: &InputContext) {
    if input.closed.swap(true, Ordering::SeqCst) {
        return;
    }
    let input = input.clone();
    let _ = tokio::task::spawn_blocking(move || {
        if let Some(ctx) = input.inner.lock().unwrap().take() {
            native::close_input(ctx);
        }
    })
    .await;
}

/// Waits for `output`'s write-completion counter to drain, then closes it.
/// Idempotent.
pub async fn close_output(output: &OutputContext) -> Result<(), AppError> {
    output.gate.wait_idle().await;

    if output.closed.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let output = output.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(ctx) = output.inner.lock().unwrap().take() {
            native::close_output(ctx)
        } else {
            Ok(())
        }
    })
    .await
    .map_err(|e| AppError::NativeIoFailed(format!("close_output join error: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn write_gate_blocks_until_writers_drain() {
        let gate = Arc::new(WriteGate::default());
        gate.enter();
        gate.enter();

        let gate_clone = gate.clone();
        let waiter = tokio::spawn(async move {
            gate_clone.wait_idle().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.exit();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.exit();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn write_gate_idle_with_no_writers_returns_immediately() {
        let gate = WriteGate::default();
        gate.wait_idle().await;
    }

    #[tokio::test]
    async fn write_guard_is_counted_before_the_writer_task_is_spawned() {
        let gate = Arc::new(WriteGate::default());
        gate.enter();
        let guard = WriteGuard { gate: gate.clone() };

        // The guard already counts against the gate even though no task
        // holding it has run yet; a concurrent close must see a non-idle
        // gate at this point, not an idle one.
        let gate_clone = gate.clone();
        let waiter = tokio::spawn(async move { gate_clone.wait_idle().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
