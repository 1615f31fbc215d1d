use crate::cancel::CancelFlag;
use crate::compositor::{OverlayDescriptor, RenderRequest, Transition};
use crate::engine::{Canvas, EncodeParams, MediaEngine};
use crate::fitter::Segment;
use crate::source::ClipHandle;
use crate::{logi, logok};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    cmd.kill_on_drop(true);

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        return Err(anyhow::anyhow!("Command failed: {:?}: {}", args, tail));
    }

    Ok(())
}

fn ffmpeg_base() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn secs(v: f64) -> String {
    format!("{:.3}", v)
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("Invalid dimensions for {}", path.display()));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// Scale to cover the canvas, then center-crop.
fn cover_filter(canvas: Canvas) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}",
        w = canvas.width,
        h = canvas.height,
        fps = canvas.fps
    )
}

fn intermediate_codec_args() -> Vec<String> {
    ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Value quoted for use inside a filtergraph option.
fn filter_quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "/")
        .replace('\'', "'\\''")
        .replace(':', "\\:");
    format!("'{escaped}'")
}

pub async fn ffmpeg_color_clip(out: &Path, canvas: Canvas, color: &str, duration: f64) -> Result<()> {
    let mut args = ffmpeg_base();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c={}:s={}x{}:r={}:d={}",
            color,
            canvas.width,
            canvas.height,
            canvas.fps,
            secs(duration)
        ),
    ]);
    args.extend(intermediate_codec_args());
    args.push(out.display().to_string());
    run_cmd(&args).await
}

/// Normalizes one segment: loop the source as needed, seek to the
/// in-point, play `play_seconds`, fit to the canvas. Audio is dropped.
pub async fn ffmpeg_render_segment(
    segment: &Segment,
    play_seconds: f64,
    canvas: Canvas,
    out: &Path,
) -> Result<()> {
    let loops = segment.loops_with_tail((play_seconds - segment.out_duration).max(0.0));
    let mut args = ffmpeg_base();
    args.extend([
        "-stream_loop".to_string(),
        loops.saturating_sub(1).to_string(),
        "-i".to_string(),
        segment.source.locator.display().to_string(),
        "-ss".to_string(),
        secs(segment.in_point),
        "-t".to_string(),
        secs(play_seconds),
        "-vf".to_string(),
        cover_filter(canvas),
        "-an".to_string(),
    ]);
    args.extend(intermediate_codec_args());
    args.push(out.display().to_string());
    run_cmd(&args).await?;
    Ok(())
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<()> {
    let mut args = ffmpeg_base();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        out_mp4.display().to_string(),
    ]);
    run_cmd(&args).await
}

/// Offsets at which each crossfade starts: the running sum of the played
/// durations, so fades begin exactly on window boundaries.
fn xfade_offsets(play: &[f64]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(play.len().saturating_sub(1));
    let mut acc = 0.0;
    for d in play.iter().take(play.len().saturating_sub(1)) {
        acc += d;
        offsets.push(acc);
    }
    offsets
}

fn xfade_graph(offsets: &[f64], fade: f64) -> String {
    let mut graph = Vec::with_capacity(offsets.len());
    let mut prev = "[0:v]".to_string();
    for (i, offset) in offsets.iter().enumerate() {
        let label = format!("[x{}]", i + 1);
        graph.push(format!(
            "{prev}[{}:v]xfade=transition=fade:duration={}:offset={}{label}",
            i + 1,
            secs(fade),
            secs(*offset)
        ));
        prev = label;
    }
    graph.join(";")
}

pub async fn ffmpeg_xfade_videos(inputs: &[PathBuf], play: &[f64], fade: f64, out_mp4: &Path) -> Result<()> {
    let offsets = xfade_offsets(play);
    let mut args = ffmpeg_base();
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        xfade_graph(&offsets, fade),
        "-map".to_string(),
        format!("[x{}]", offsets.len()),
    ]);
    args.extend(intermediate_codec_args());
    args.push(out_mp4.display().to_string());
    run_cmd(&args).await
}

fn drawtext_filters(overlays: &[OverlayDescriptor], text_files: &[Vec<PathBuf>]) -> Vec<String> {
    let mut filters = Vec::new();
    for (overlay, files) in overlays.iter().zip(text_files) {
        let style = &overlay.visual.style;
        let line_height = style.line_height();
        let end = overlay.start + overlay.duration;
        for (i, file) in files.iter().enumerate() {
            let mut f = format!(
                "drawtext=textfile={}:expansion=none:fontsize={}:fontcolor={}:borderw={}:bordercolor={}:x=(w-text_w)/2:y={}:enable='between(t,{},{})'",
                filter_quote(&file.display().to_string()),
                style.font_size,
                style.color,
                style.stroke_width,
                style.stroke_color,
                style.top + i as u32 * line_height,
                secs(overlay.start),
                secs(end)
            );
            if let Some(font) = &style.font_file {
                f.push_str(&format!(":fontfile={}", filter_quote(&font.display().to_string())));
            }
            filters.push(f);
        }
    }
    filters
}

fn final_graph(drawtext: &[String], with_music: bool, music_volume: f64) -> String {
    let video = if drawtext.is_empty() {
        "[0:v]null[v]".to_string()
    } else {
        format!("[0:v]{}[v]", drawtext.join(","))
    };
    let audio = if with_music {
        format!(
            "[1:a]volume=1.0[a0];[2:a]volume={:.3}[a1];[a0][a1]amix=inputs=2:duration=first:dropout_transition=2:normalize=0[a]",
            music_volume
        )
    } else {
        "[1:a]anull[a]".to_string()
    };
    format!("{video};{audio}")
}

fn final_args(
    background: &Path,
    request: &RenderRequest,
    graph_file: &Path,
    encode: &EncodeParams,
    out: &Path,
) -> Vec<String> {
    let mut args = ffmpeg_base();
    args.extend([
        "-i".to_string(),
        background.display().to_string(),
        "-i".to_string(),
        request.narration.path.display().to_string(),
    ]);
    if let Some(music) = &request.background_music {
        args.extend([
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            music.display().to_string(),
        ]);
    }
    args.extend([
        "-filter_complex_script".to_string(),
        graph_file.display().to_string(),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-t".to_string(),
        secs(request.narration.duration),
        "-r".to_string(),
        request.canvas.fps.to_string(),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        encode.preset.clone(),
        "-threads".to_string(),
        encode.threads.to_string(),
        "-c:a".to_string(),
        encode.audio_codec.clone(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);
    args
}

/// Segments shorter than one frame are folded into their predecessor.
fn playback_plan(segments: &[Segment], fps: u32) -> Vec<(&Segment, f64)> {
    let frame = 1.0 / fps.max(1) as f64;
    let mut plan: Vec<(&Segment, f64)> = Vec::with_capacity(segments.len());
    for seg in segments {
        if seg.out_duration < frame {
            if let Some(last) = plan.last_mut() {
                last.1 += seg.out_duration;
                continue;
            }
        }
        plan.push((seg, seg.out_duration));
    }
    plan
}

/// Effective crossfade: never longer than half of the shortest segment,
/// and below one frame it degrades to a cut.
fn effective_fade(transition: Transition, play: &[f64], fps: u32) -> f64 {
    let Transition::Crossfade { seconds } = transition else {
        return 0.0;
    };
    let shortest = play.iter().cloned().fold(f64::INFINITY, f64::min);
    let fade = seconds.min(shortest / 2.0);
    if play.len() < 2 || fade < 1.0 / fps.max(1) as f64 {
        return 0.0;
    }
    fade
}

pub struct FfmpegEngine {
    work_dir: PathBuf,
}

impl FfmpegEngine {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    async fn build_background(
        &self,
        request: &RenderRequest,
        work: &Path,
        cancel: &CancelFlag,
    ) -> Result<PathBuf> {
        let plan = playback_plan(&request.timeline.segments, request.canvas.fps);
        if plan.is_empty() {
            anyhow::bail!("timeline has no segments");
        }
        let play: Vec<f64> = plan.iter().map(|(_, d)| *d).collect();
        let fade = effective_fade(request.transition, &play, request.canvas.fps);

        let mut rendered = Vec::with_capacity(plan.len());
        for (i, (segment, seconds)) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            let tail = if i + 1 < plan.len() { fade } else { 0.0 };
            let out = work.join(format!("seg_{:03}.mp4", i));
            logi(format!(
                "Rendering segment {}/{}: {} @{:.2}s for {:.2}s (x{})",
                i + 1,
                plan.len(),
                segment.source.locator.display(),
                segment.in_point,
                seconds,
                segment.loops
            ));
            ffmpeg_render_segment(segment, seconds + tail, request.canvas, &out)
                .await
                .with_context(|| format!("segment {} render failed", i + 1))?;
            rendered.push(out);
        }

        if rendered.len() == 1 {
            return Ok(rendered.remove(0));
        }
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }

        let background = work.join("background.mp4");
        if fade > 0.0 {
            logi(format!("Joining {} segments with {:.2}s crossfades", rendered.len(), fade));
            ffmpeg_xfade_videos(&rendered, &play, fade, &background).await?;
        } else {
            let list = work.join("concat_list.txt");
            let mut body = String::new();
            for path in &rendered {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                body.push_str(&format!("file '{}'\n", name));
            }
            fs::write(&list, body).await?;
            logi(format!("Concatenating {} segments", rendered.len()));
            ffmpeg_concat_videos(&list, &background).await?;
        }
        Ok(background)
    }

    async fn write_text_files(&self, overlays: &[OverlayDescriptor], work: &Path) -> Result<Vec<Vec<PathBuf>>> {
        let mut all = Vec::with_capacity(overlays.len());
        for (i, overlay) in overlays.iter().enumerate() {
            let mut files = Vec::with_capacity(overlay.visual.lines.len());
            for (j, line) in overlay.visual.lines.iter().enumerate() {
                let path = work.join(format!("caption_{:03}_{}.txt", i, j));
                fs::write(&path, line.as_bytes()).await?;
                files.push(path);
            }
            all.push(files);
        }
        Ok(all)
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, locator: &Path) -> Result<ClipHandle> {
        let (w, h) = ffprobe_video_dimensions(locator).await?;
        let duration = ffprobe_duration_seconds(locator).await?;
        Ok(ClipHandle::new(locator, duration, w, h)?)
    }

    async fn audio_duration(&self, path: &Path) -> Result<f64> {
        ffprobe_duration_seconds(path).await
    }

    async fn synthesize_color(
        &self,
        out: &Path,
        canvas: Canvas,
        color: &str,
        duration: f64,
    ) -> Result<ClipHandle> {
        let dir = out.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).await?;
        let tmp = tempfile::Builder::new()
            .prefix(".synth-")
            .suffix(".mp4")
            .tempfile_in(dir)?
            .into_temp_path();
        ffmpeg_color_clip(&tmp, canvas, color, duration).await?;
        tmp.persist(out).map_err(|e| e.error)?;
        Ok(ClipHandle::new(out, duration, canvas.width, canvas.height)?)
    }

    async fn render(&self, request: &RenderRequest, cancel: &CancelFlag) -> Result<PathBuf> {
        fs::create_dir_all(&self.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.work_dir)
            .context("Failed to create render work directory")?;

        let background = self.build_background(request, work.path(), cancel).await?;
        logok(format!("Background track ready: {}", background.display()));
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }

        let text_files = self
            .write_text_files(&request.timeline.overlays, work.path())
            .await?;
        let drawtext = drawtext_filters(&request.timeline.overlays, &text_files);
        let graph = final_graph(
            &drawtext,
            request.background_music.is_some(),
            request.music_volume,
        );
        let graph_file = work.path().join("final_graph.txt");
        fs::write(&graph_file, graph).await?;

        let out_dir = request
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(out_dir).await?;
        let tmp_out = tempfile::Builder::new()
            .prefix(".render-")
            .suffix(".mp4")
            .tempfile_in(out_dir)?
            .into_temp_path();

        logi(format!(
            "Compositing {} overlay(s) + narration -> {}",
            request.timeline.overlays.len(),
            request.output.display()
        ));
        let args = final_args(&background, request, &graph_file, &request.encode, &tmp_out);
        run_cmd(&args).await?;

        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        tmp_out.persist(&request.output).map_err(|e| e.error)?;
        Ok(request.output.clone())
    }
}
