//! ffmpeg-backed decoding and encoding.
//!
//! Frames travel as packed rgb24 over the child's stdin/stdout. Children are
//! killed and reaped on drop so no decoder or encoder outlives its owner.

use serde::Deserialize;
use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use super::{Frame, FrameRate, FrameSink, FrameSource, VideoError, VideoInfo};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Check whether the ffmpeg binary can be executed
pub fn ffmpeg_available() -> bool {
    Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Read stream properties with ffprobe
pub fn probe(path: &Path) -> Result<VideoInfo, VideoError> {
    let output = Command::new(FFPROBE)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| VideoError::Spawn {
            program: FFPROBE,
            source,
        })?;

    if !output.status.success() {
        return Err(VideoError::Probe(format!(
            "Could not open video file {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(json: &[u8]) -> Result<VideoInfo, VideoError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| VideoError::Probe(e.to_string()))?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| VideoError::Probe("No video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VideoError::Probe("Video stream has no dimensions".to_string())),
    };

    // r_frame_rate is the container's base rate; fall back to the average for odd streams
    let frame_rate = [stream.r_frame_rate, stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|s| s.parse::<FrameRate>().ok())
        .find(FrameRate::is_valid)
        .unwrap_or_else(|| {
            warn!("Video frame rate unavailable, assuming {}", FrameRate::default());
            FrameRate::default()
        });

    let frame_count = stream.nb_frames.and_then(|n| n.parse::<u64>().ok());

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        frame_count,
    })
}

/// ffmpeg child in its own process group, so a terminal Ctrl+C reaches only
/// this process and the driver decides how to stop
fn ffmpeg_command() -> Command {
    let mut command = Command::new(FFMPEG);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

/// Decoder arguments. Frames keep the stored orientation so their size
/// matches what `probe` reported; rotation metadata is ignored.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        [
            "-map", "0:v:0", "-vsync", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24",
            "pipe:1",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut stderr = stderr;
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    })
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Decodes a container file into rgb24 frames
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    info: VideoInfo,
    frame_bytes: usize,
    next_number: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let info = probe(path)?;
        info!(
            "Video info: {}x{}, {} fps, {:?} frames",
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count
        );

        let mut child = ffmpeg_command()
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| VideoError::Spawn {
                program: FFMPEG,
                source,
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                reap(&mut child);
                return Err(VideoError::Decode("ffmpeg stdout unavailable".to_string()));
            }
        };
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            stdout,
            stderr,
            frame_bytes: info.width as usize * info.height as usize * 3,
            info,
            next_number: 1,
            finished: false,
        })
    }

    fn finish_stream(&mut self) -> Result<(), VideoError> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(VideoError::Decode(format!("ffmpeg exited with {}: {}", status, stderr)));
        }
        debug!("Decoder finished after {} frames", self.next_number - 1);
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VideoError::Decode(e.to_string())),
            }
        }

        if filled == 0 {
            self.finish_stream()?;
            return Ok(None);
        }
        if filled < buf.len() {
            self.finish_stream()?;
            return Err(VideoError::Decode(format!(
                "Truncated frame {}: got {} of {} bytes",
                self.next_number,
                filled,
                buf.len()
            )));
        }

        let number = self.next_number;
        self.next_number += 1;
        Frame::from_rgb24(number, self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| VideoError::Decode(format!("Frame {} has invalid size", number)))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        reap(&mut self.child);
    }
}

/// Encodes rgb24 frames into a container file
pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
    finished: bool,
}

impl FfmpegSink {
    /// Start an encoder writing `path` with the same size and rate as `info`
    pub fn create(path: &Path, info: &VideoInfo, codec: &str) -> Result<Self, VideoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let size = format!("{}x{}", info.width, info.height);
        let rate = info.frame_rate.to_string();

        let mut child = ffmpeg_command()
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size, "-r", &rate, "-i", "pipe:0", "-c:v", codec])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| VideoError::Spawn {
                program: FFMPEG,
                source,
            })?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(drain_stderr);

        debug!("Encoder started: {:?} ({} @ {} fps, {})", path, size, rate, codec);

        Ok(Self {
            child,
            stdin,
            stderr,
            path: path.to_path_buf(),
            width: info.width,
            height: info.height,
            frames_written: 0,
            finished: false,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(VideoError::Encode(format!(
                "Frame {} is {}x{}, encoder expects {}x{}",
                frame.number,
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VideoError::Encode("Encoder already closed".to_string()))?;
        stdin
            .write_all(frame.as_rgb24())
            .map_err(|e| VideoError::Encode(format!("Failed to write frame {}: {}", frame.number, e)))?;

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        // Closing stdin signals end of input
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            let _ = std::fs::remove_file(&self.path);
            return Err(VideoError::Encode(format!("ffmpeg exited with {}: {}", status, stderr)));
        }

        info!("Wrote {} frames to {:?}", self.frames_written, self.path);
        Ok(())
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        drop(self.stdin.take());
        reap(&mut self.child);
        let _ = join_stderr(self.stderr.take());
        if std::fs::remove_file(&self.path).is_ok() {
            debug!("Removed partial output {:?}", self.path);
        }
    }

    fn output_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.abort();
    }
}
