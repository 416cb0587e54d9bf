use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::{RecorderError, Result};
use crate::types::{RecorderConfig, TranscodeMode};

const STOP_WAIT: Duration = Duration::from_secs(5);

/// Owns one FFmpeg subprocess at a time and the command-line construction
/// for every transcode mode / encoder combination. `StreamRecorder` and
/// `MotionRecorder` both drive an instance of this with their own
/// rotation/event policy layered on top.
pub struct RecorderBase {
    config: RecorderConfig,
    child: Option<Child>,
    current_path: Option<PathBuf>,
}

impl RecorderBase {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            child: None,
            current_path: None,
        }
    }

    /// Verifies `ffmpeg` is on PATH and the configured encoder is one it
    /// reports supporting. Called once per camera before recording starts;
    /// failure disables that camera's recording feature rather than
    /// panicking.
    pub fn probe_encoder(encoder: &str) -> Result<()> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| RecorderError::EncoderNotAvailable("ffmpeg not found on PATH".into()))?;

        if encoder.is_empty() || encoder == "copy" {
            return Ok(());
        }

        let output = Command::new(&ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()
            .map_err(|e| RecorderError::EncoderNotAvailable(e.to_string()))?;

        let text = String::from_utf8_lossy(&output.stdout);
        if text.contains(encoder) {
            Ok(())
        } else {
            Err(RecorderError::EncoderNotAvailable(format!(
                "encoder '{encoder}' not reported by `ffmpeg -encoders`"
            )))
        }
    }

    pub fn is_recording(&self) -> bool {
        self.child.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn start(&mut self, out_path: PathBuf) -> Result<()> {
        if self.child.is_some() {
            return Err(RecorderError::AlreadyRunning);
        }

        let args = build_ffmpeg_args(&self.config, &out_path);
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        // Give ffmpeg a moment to fail fast (bad device, bad encoder args)
        // before we commit to this process.
        std::thread::sleep(Duration::from_millis(100));
        if let Some(status) = child.try_wait()? {
            return Err(RecorderError::ProcessExited(format!(
                "ffmpeg exited immediately with {status}"
            )));
        }

        info!(path = %out_path.display(), "recorder started");
        self.child = Some(child);
        self.current_path = Some(out_path);
        Ok(())
    }

    /// Writes one encoded frame to the subprocess stdin. On broken pipe the
    /// process handle is dropped and cleared; the caller's next rotation or
    /// event start will open a fresh process.
    pub fn write_frame(&mut self, bytes: &[u8]) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        let Some(stdin) = child.stdin.as_mut() else {
            return;
        };
        if let Err(e) = stdin.write_all(bytes) {
            warn!(error = %e, "ffmpeg stdin write failed, closing recorder");
            self.force_clear();
        }
    }

    /// Closes stdin (signals EOF) and waits up to 5s for a clean exit.
    /// Returns the path that was just closed, if any, so the caller can
    /// schedule a background transcode.
    pub fn stop(&mut self) -> Option<PathBuf> {
        let mut child = self.child.take()?;
        let path = self.current_path.take();

        drop(child.stdin.take());

        let deadline = Instant::now() + STOP_WAIT;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!("ffmpeg did not exit within 5s, sending SIGTERM");
                        let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
                        let _ = child.wait();
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!(error = %e, "error waiting on ffmpeg process");
                    break;
                }
            }
        }

        path
    }

    fn force_clear(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.current_path = None;
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}

impl Drop for RecorderBase {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_ffmpeg_args(config: &RecorderConfig, out_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "mjpeg".into(),
        "-framerate".into(),
        config.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-r".into(),
        config.fps.to_string(),
    ];

    match config.mode {
        TranscodeMode::KeepMjpeg | TranscodeMode::AviThenTranscode => {
            args.push("-c:v".into());
            args.push("copy".into());
        }
        TranscodeMode::LiveH264 => {
            args.extend(encoder_args(&config.encoder, config.bitrate_kbps));
        }
    }

    args.push(out_path.to_string_lossy().into_owned());
    args
}

fn encoder_args(encoder: &str, bitrate_kbps: u32) -> Vec<String> {
    match encoder {
        "h264_vaapi" => vec![
            "-vaapi_device".into(),
            "/dev/dri/renderD128".into(),
            "-vf".into(),
            "format=nv12,hwupload".into(),
            "-c:v".into(),
            "h264_vaapi".into(),
            "-b:v".into(),
            format!("{bitrate_kbps}k"),
        ],
        "h264_v4l2m2m" => vec![
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:v".into(),
            "h264_v4l2m2m".into(),
            "-b:v".into(),
            format!("{bitrate_kbps}k"),
        ],
        "h264_qsv" => vec![
            "-c:v".into(),
            "h264_qsv".into(),
            "-preset".into(),
            "veryfast".into(),
            "-b:v".into(),
            format!("{bitrate_kbps}k"),
        ],
        other => vec![
            "-c:v".into(),
            other.to_string(),
            "-preset".into(),
            "ultrafast".into(),
            "-b:v".into(),
            format!("{bitrate_kbps}k"),
        ],
    }
}

fn transcode_args(encoder: &str, bitrate_kbps: u32, input: &Path, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];
    args.extend(encoder_args(encoder, bitrate_kbps));
    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Converts a just-closed AVI recording to MP4 using the same encoder
/// flags as live mode-2 recording, then deletes the source file. Runs on a
/// detached, fire-and-forget thread; not joined by the caller.
pub fn spawn_transcode(avi_path: PathBuf, encoder: String, bitrate_kbps: u32) {
    std::thread::spawn(move || {
        let mp4_path = avi_path.with_extension("mp4");
        let args = transcode_args(&encoder, bitrate_kbps, &avi_path, &mp4_path);
        match Command::new("ffmpeg").args(&args).status() {
            Ok(status) if status.success() => {
                if let Err(e) = fs::remove_file(&avi_path) {
                    warn!(path = %avi_path.display(), error = %e, "failed to remove source avi after transcode");
                }
                info!(path = %mp4_path.display(), "background transcode complete");
            }
            Ok(status) => warn!(?status, path = %avi_path.display(), "transcode exited non-zero"),
            Err(e) => warn!(error = %e, path = %avi_path.display(), "failed to launch transcode"),
        }
    });
}

/// Appends a `(n)` suffix before the extension until `dir/candidate` does
/// not already exist, matching the source's collision policy exactly.
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let base = dir.join(format!("{stem}.{ext}"));
    if !base.exists() {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}({n}).{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Deletes recording files under `dir` with the tracked extensions whose
/// mtime is older than `max_days * 86400` seconds.
pub fn sweep_retention(dir: &Path, max_days: u32) {
    let cutoff = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .saturating_sub(max_days as u64 * 86_400);

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !matches!(ext, "avi" | "mp4" | "mkv" | "ts") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let mtime = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if mtime < cutoff {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "retention sweep failed to remove file");
            } else {
                info!(path = %path.display(), "retention sweep removed expired recording");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_mode0_uses_copy() {
        let cfg = RecorderConfig {
            output_dir: "/tmp".into(),
            max_days_to_save: 1,
            mode: TranscodeMode::KeepMjpeg,
            encoder: String::new(),
            bitrate_kbps: 0,
            fps: 10,
        };
        let args = build_ffmpeg_args(&cfg, Path::new("/tmp/out.avi"));
        assert!(args.windows(2).any(|w| w == ["-c:v".to_string(), "copy".to_string()]));
    }

    #[test]
    fn build_args_mode2_vaapi_includes_device() {
        let cfg = RecorderConfig {
            output_dir: "/tmp".into(),
            max_days_to_save: 1,
            mode: TranscodeMode::LiveH264,
            encoder: "h264_vaapi".into(),
            bitrate_kbps: 2000,
            fps: 10,
        };
        let args = build_ffmpeg_args(&cfg, Path::new("/tmp/out.mp4"));
        assert!(args.iter().any(|a| a == "/dev/dri/renderD128"));
        assert!(args.iter().any(|a| a == "2000k"));
    }

    #[test]
    fn unique_path_suffixes_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cam.avi");
        fs::write(&base, b"x").unwrap();
        let first = unique_path(dir.path(), "cam", "avi");
        assert_eq!(first, dir.path().join("cam(1).avi"));
        fs::write(&first, b"x").unwrap();
        let second = unique_path(dir.path(), "cam", "avi");
        assert_eq!(second, dir.path().join("cam(2).avi"));
    }

    #[test]
    fn retention_sweep_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let recent = dir.path().join("recent.avi");
        fs::write(&recent, b"x").unwrap();
        sweep_retention(dir.path(), 30);
        assert!(recent.exists());
    }
}
