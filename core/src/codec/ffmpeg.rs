//! ffmpeg subprocess codec (libx265, 8-bit grayscale).
//!
//! Encoding hands ffmpeg the staged PNG sequence; decoding asks ffmpeg for
//! raw `gray` frames on stdout and slices them `width * height` bytes at a
//! time. Read-ahead is bounded by the pipe buffer plus
//! [`PREFETCH_FRAMES`] frames of buffered reader capacity.

use std::ffi::OsString;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use super::{FrameSequence, FrameStream, LOSSLESS_QUALITY, VideoCodec};
use crate::error::{PclError, Result};
use crate::planes::Plane;

/// Environment variable overriding the ffmpeg executable.
pub const FFMPEG_ENV_VAR: &str = "PCLVID_FFMPEG";

/// Frames buffered ahead of the consumer while decoding.
pub const PREFETCH_FRAMES: usize = 2;

/// Resolve the ffmpeg executable: explicit path, then `PCLVID_FFMPEG`, then `PATH`.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(FFMPEG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    which::which("ffmpeg").map_err(|e| {
        PclError::Config(format!(
            "ffmpeg executable not found ({e}); install ffmpeg, set {FFMPEG_ENV_VAR}, or use the lz4 codec"
        ))
    })
}

/// External ffmpeg codec.
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    executable: PathBuf,
    preset: String,
}

impl FfmpegCodec {
    pub const ID: &'static str = "ffmpeg-libx265";
    pub const EXTENSION: &'static str = "mp4";

    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            preset: "ultrafast".to_string(),
        }
    }

    /// x265 speed preset (`ultrafast` by default).
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command-line arguments for encoding `frames` into `output`.
    pub fn encode_args(&self, frames: &FrameSequence, frame_rate: f64, quality: u32, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-framerate".into(),
            format!("{frame_rate}").into(),
            "-start_number".into(),
            "0".into(),
            "-i".into(),
            frames.pattern().into_os_string(),
            "-pix_fmt".into(),
            "gray".into(),
            "-c:v".into(),
            "libx265".into(),
            "-preset".into(),
            self.preset.clone().into(),
            "-qp".into(),
            quality.to_string().into(),
        ];

        if quality == LOSSLESS_QUALITY {
            args.extend(["-x265-params".into(), "lossless=1".into()]);
        }

        args.extend(["-y".into(), output.as_os_str().to_os_string()]);
        args
    }

    /// Command-line arguments for decoding `stream` to raw gray frames on stdout.
    pub fn decode_args(&self, stream: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            stream.as_os_str().to_os_string(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "gray".into(),
            "pipe:1".into(),
        ]
    }
}

impl VideoCodec for FfmpegCodec {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn stream_extension(&self) -> &'static str {
        Self::EXTENSION
    }

    fn encode(&self, frames: &FrameSequence, frame_rate: f64, quality: u32, output: &Path) -> Result<()> {
        if frames.is_empty() {
            return Err(PclError::encode(frames.stream(), "no frames staged"));
        }

        let args = self.encode_args(frames, frame_rate, quality, output);
        tracing::debug!("{}: {} {:?}", frames.stream(), self.executable.display(), args);

        let result = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PclError::encode(frames.stream(), format!("failed to run ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PclError::encode(
                frames.stream(),
                format!("ffmpeg exited with {}: {}", result.status, stderr.trim()),
            ));
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(PclError::encode(frames.stream(), "ffmpeg produced no output")),
        }
    }

    fn decode(&self, stream: &Path, width: u32, height: u32) -> Result<FrameStream> {
        let name = stream.display().to_string();
        let frame_len = width as usize * height as usize;
        if frame_len == 0 {
            return Err(PclError::decode(name, "zero-sized frames"));
        }

        let mut child = Command::new(&self.executable)
            .args(self.decode_args(stream))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PclError::decode(name.clone(), format!("failed to run ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PclError::decode(name.clone(), "ffmpeg stdout unavailable"))?;

        Ok(Box::new(FfmpegFrameStream {
            name,
            child,
            stdout: BufReader::with_capacity(frame_len * PREFETCH_FRAMES, stdout),
            width,
            height,
            frame_len,
            finished: false,
        }))
    }
}

/// Raw frames read from a running ffmpeg decoder.
struct FfmpegFrameStream {
    name: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frame_len: usize,
    finished: bool,
}

impl FfmpegFrameStream {
    /// Fill `buf` completely; returns the number of bytes read before EOF.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Kill and reap the child without looking at its exit status.
    fn stop(&mut self) {
        self.finished = true;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Reap the child after EOF and turn a failed exit into an error.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| PclError::decode(self.name.clone(), e))?;
        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        Err(PclError::decode(
            self.name.clone(),
            format!("ffmpeg exited with {status}: {}", stderr.trim()),
        ))
    }
}

impl Iterator for FfmpegFrameStream {
    type Item = Result<Plane>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut frame = vec![0u8; self.frame_len];
        let filled = match self.fill(&mut frame) {
            Ok(filled) => filled,
            Err(e) => {
                self.stop();
                return Some(Err(PclError::decode(self.name.clone(), e)));
            }
        };

        if filled == 0 {
            return self.finish().err().map(Err);
        }
        if filled < self.frame_len {
            let _ = self.finish();
            return Some(Err(PclError::decode(
                self.name.clone(),
                format!("truncated frame ({filled} of {} bytes)", self.frame_len),
            )));
        }

        Some(Plane::new(self.width, self.height, frame))
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        if !self.finished {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(dir: &Path) -> FrameSequence {
        FrameSequence::create("range_ch0", dir.join("ch0"), 4, 4).unwrap()
    }

    #[test]
    fn test_lossless_args() {
        let dir = tempfile::tempdir().unwrap();
        let codec = FfmpegCodec::new(PathBuf::from("ffmpeg"));
        let args = codec.encode_args(&sequence(dir.path()), 2.5, 0, Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-framerate") + 1], "2.5");
        assert_eq!(args[pos("-pix_fmt") + 1], "gray");
        assert_eq!(args[pos("-c:v") + 1], "libx265");
        assert_eq!(args[pos("-preset") + 1], "ultrafast");
        assert_eq!(args[pos("-qp") + 1], "0");
        assert_eq!(args[pos("-x265-params") + 1], "lossless=1");
        assert!(args[pos("-i") + 1].ends_with("%08d.png"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_lossy_args_skip_lossless_flag() {
        let dir = tempfile::tempdir().unwrap();
        let codec = FfmpegCodec::new(PathBuf::from("ffmpeg")).with_preset("medium");
        let args = codec.encode_args(&sequence(dir.path()), 10.0, 25, Path::new("out.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert!(!args.iter().any(|a| a == "-x265-params"));
        assert!(args.windows(2).any(|w| w[0] == "-qp" && w[1] == "25"));
        assert!(args.windows(2).any(|w| w[0] == "-preset" && w[1] == "medium"));
    }

    #[test]
    fn test_decode_args_emit_raw_gray() {
        let codec = FfmpegCodec::new(PathBuf::from("ffmpeg"));
        let args: Vec<String> = codec
            .decode_args(Path::new("range_ch0.mp4"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "rawvideo"));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "gray"));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[cfg(unix)]
    #[test]
    fn test_stopped_stream_reaps_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut stream = FfmpegFrameStream {
            name: "range_ch0.mp4".to_string(),
            child,
            stdout: BufReader::new(stdout),
            width: 2,
            height: 2,
            frame_len: 4,
            finished: false,
        };

        stream.stop();
        assert!(stream.finished);
        assert!(stream.child.try_wait().unwrap().is_some());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_explicit_executable_wins() {
        let path = locate_ffmpeg(Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))).unwrap();
        assert_eq!(path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_missing_executable_is_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = sequence(dir.path());
        frames.push(Plane::new(4, 4, vec![0; 16]).unwrap()).unwrap();

        let codec = FfmpegCodec::new(dir.path().join("no-such-ffmpeg"));
        let err = codec
            .encode(&frames, 10.0, 0, &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, PclError::EncodeFailure { .. }));
    }

    #[test]
    fn test_empty_sequence_is_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let codec = FfmpegCodec::new(PathBuf::from("ffmpeg"));
        let err = codec
            .encode(&sequence(dir.path()), 10.0, 0, &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, PclError::EncodeFailure { .. }));
    }
}
