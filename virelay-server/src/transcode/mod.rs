//! FFmpeg-backed HLS packaging.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use virelay_config::TranscodeSettings;

/// Packages uploaded media into an HLS rendition by driving the `ffmpeg`
/// binary.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
    segment_seconds: u32,
}

impl Transcoder {
    pub fn new(settings: &TranscodeSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            segment_seconds: settings.segment_seconds,
        }
    }

    /// Package `src` into `out_dir` as a segmented HLS playlist.
    ///
    /// With `key_info`, segments are encrypted; the key-info file format is
    /// ffmpeg's own (key URI, key path, IV).
    pub async fn package_hls(
        &self,
        src: &Path,
        out_dir: &Path,
        key_info: Option<&Path>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .context("Failed to create packaging output directory")?;

        let playlist = out_dir.join("playlist.m3u8");
        let segment_template = out_dir.join("seg_%05d.ts");

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(src)
            .args(["-codec", "copy", "-start_number", "0"])
            .args(["-hls_time", &self.segment_seconds.to_string()])
            .args(["-hls_list_size", "0"]);
        if let Some(key_info) = key_info {
            cmd.arg("-hls_key_info_file").arg(key_info);
        }
        cmd.arg("-hls_segment_filename")
            .arg(&segment_template)
            .args(["-f", "hls"])
            .arg(&playlist)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        info!(src = %src.display(), out = %out_dir.display(), "packaging HLS rendition");
        let mut child = cmd.spawn().context("Failed to spawn ffmpeg")?;

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await.unwrap_or(None) {
                debug!("ffmpeg: {line}");
            }
        }

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        if !status.success() {
            bail!("ffmpeg packaging failed with {status}");
        }
        Ok(())
    }
}
