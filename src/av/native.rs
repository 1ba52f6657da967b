//! The only module allowed to call into `ffmpeg_next`.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! `spec.md` §4.1 treats the native demux/mux library as a fixed,
//! FFI-shaped dependency and specifies only how the core uses it. This
//! module is that boundary: every other part of the crate goes through
//! `av::{open_input, open_output, read_packet, write_packet, close_input,
//! close_output}` in `av/mod.rs` and never touches `ffmpeg_next` directly.
//!
//! All functions here are synchronous — `ffmpeg_next`'s demux/mux calls are
//! blocking FFI calls, exactly like the `av_read_frame`/`av_write_frame`
//! pair the original C implementation wraps. Callers run these on the
//! blocking thread pool (`tokio::task::spawn_blocking`); see `worker.rs`.

use ffmpeg_next as ffmpeg;

use crate::error::AppError;

/// Opens a demuxer input.
///
/// `format_hint` is `"rtsp"` or `"concat"`, per `spec.md` §4.1. RTSP
/// sessions are opened over TCP (matching the original's request for a
/// reliable transport for short-lived snapshot sessions); concat inputs are
/// opened with `safe=0` since the descriptor file references sibling paths
/// by relative name.
pub fn open_input(format_hint: &str, url: &str) -> Result<ffmpeg::format::context::Input, AppError> {
    let mut opts = ffmpeg::Dictionary::new();
    match format_hint {
        "rtsp" => {
            opts.set("rtsp_transport", "tcp");
            ffmpeg::format::input_with_dictionary(&url, opts)
                .map_err(|e| AppError::NativeOpenFailed(format!("open_input(rtsp, {url}): {e}")))
        }
        "concat" => {
            opts.set("safe", "0");
            ffmpeg::format::input_as_with(&url, "concat", opts)
                .map_err(|e| AppError::NativeOpenFailed(format!("open_input(concat, {url}): {e}")))
        }
        other => Err(AppError::InvalidInput(format!(
            "unsupported input format hint: {other}"
        ))),
    }
}

/// Opens an MP4 muxer output whose stream layout is copied from `input`.
pub fn open_output(
    format_hint: &str,
    url: &str,
    input: &ffmpeg::format::context::Input,
) -> Result<ffmpeg::format::context::Output, AppError> {
    if format_hint != "mp4" {
        return Err(AppError::InvalidInput(format!(
            "unsupported output format hint: {format_hint}"
        )));
    }

    let mut octx = ffmpeg::format::output_as(&url, "mp4")
        .map_err(|e| AppError::NativeOpenFailed(format!("open_output(mp4, {url}): {e}")))?;

    for in_stream in input.streams() {
        let mut out_stream = octx
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| AppError::NativeOpenFailed(format!("add_stream: {e}")))?;
        out_stream.set_parameters(in_stream.parameters());
        // Zero the codec tag so the muxer picks one matching the output
        // container, as the FFmpeg `remux.c` example does.
        unsafe {
            (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
        }
    }

    octx.write_header()
        .map_err(|e| AppError::NativeOpenFailed(format!("write_header: {e}")))?;

    Ok(octx)
}

/// One packet read from an input, tagged with the outcome the caller should
/// act on (`spec.md` §4.1: `Packet`, `Empty`, or `End`).
pub enum ReadOutcome {
    Packet(ffmpeg::Packet, usize),
    Empty,
    End,
}

/// Reads one packet. `Empty` means the demuxer yielded nothing usable this
/// poll (a zero-sized or side-data-only packet); `End` means the stream is
/// over.
pub fn read_packet(input: &mut ffmpeg::format::context::Input) -> ReadOutcome {
    let mut packet = ffmpeg::Packet::empty();
    match packet.read(input) {
        Ok(..) => {
            if packet.data().map(|d| d.is_empty()).unwrap_or(true) {
                ReadOutcome::Empty
            } else {
                let stream_index = packet.stream();
                ReadOutcome::Packet(packet, stream_index)
            }
        }
        Err(ffmpeg::Error::Eof) => ReadOutcome::End,
        Err(_) => ReadOutcome::Empty,
    }
}

/// Writes one packet to `output`, rescaling its timestamps from `input`'s
/// stream time base to the matching output stream's time base.
pub fn write_packet(
    input: &ffmpeg::format::context::Input,
    output: &mut ffmpeg::format::context::Output,
    mut packet: ffmpeg::Packet,
    stream_index: usize,
) -> Result<(), AppError> {
    let in_tb = input
        .stream(stream_index)
        .map(|s| s.time_base())
        .unwrap_or(ffmpeg::Rational(1, 1));
    let out_tb = output
        .stream(stream_index)
        .map(|s| s.time_base())
        .unwrap_or(in_tb);

    packet.rescale_ts(in_tb, out_tb);
    packet.set_position(-1);
    packet.set_stream(stream_index);

    packet
        .write_interleaved(output)
        .map_err(|e| AppError::NativeIoFailed(format!("write_packet: {e}")))
}

/// Closes an input. Idempotent when called through `av::close_input`.
pub fn close_input(_input: ffmpeg::format::context::Input) {
    // Dropping the context releases the native resources.
}

/// Closes an output, writing the trailer first. Idempotent when called
/// through `av::close_output`.
pub fn close_output(mut output: ffmpeg::format::context::Output) -> Result<(), AppError> {
    output
        .write_trailer()
        .map_err(|e| AppError::NativeIoFailed(format!("write_trailer: {e}")))
}
