// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/input/video_source.rs - 视频输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 视频输入源模块
//!
//! 通过 ffmpeg 命令行工具将视频解码为 rgb24 原始帧流，经管道逐帧读取。
//! 惰性解码：只有迭代到下一帧时才会消费管道；丢弃输入源即终止 ffmpeg
//! 子进程，剩余帧不再解码。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具。

use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Frame, FrameSource};
use crate::error::{PipelineError, Result};

/// ffprobe 输出的 JSON 结构
#[derive(Debug, Deserialize)]
struct ProbeOutput {
  streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
  codec_type: String,
  width: Option<u32>,
  height: Option<u32>,
  r_frame_rate: Option<String>,
  avg_frame_rate: Option<String>,
  nb_frames: Option<String>,
  duration: Option<String>,
}

/// 视频元信息
#[derive(Debug, Clone)]
pub struct VideoMeta {
  /// 视频宽度
  pub width: u32,
  /// 视频高度
  pub height: u32,
  /// 帧率
  pub fps: f64,
  /// 总帧数（如果容器记录了该信息）
  pub frame_count: Option<u64>,
}

/// 解析帧率字符串（如 "30/1" 或 "29.97"）
fn parse_frame_rate(s: &str) -> Option<f64> {
  if let Some((num, den)) = s.split_once('/') {
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den > 0.0 {
      return Some(num / den);
    }
    return None;
  }
  s.parse().ok()
}

/// 使用 ffprobe 探测视频元信息
pub fn probe_video(path: &Path) -> Result<VideoMeta> {
  which::which("ffprobe")
    .map_err(|_| PipelineError::UnsupportedMedia("未找到 ffprobe (请确保已安装)".to_string()))?;

  let output = Command::new("ffprobe")
    .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
    .arg(path)
    .stdin(Stdio::null())
    .output()?;

  if !output.status.success() {
    return Err(PipelineError::UnsupportedMedia(format!(
      "ffprobe 无法打开视频 {}: {}",
      path.display(),
      String::from_utf8_lossy(&output.stderr).trim()
    )));
  }

  let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
    .map_err(|e| PipelineError::UnsupportedMedia(format!("ffprobe 输出解析失败: {}", e)))?;

  let stream = probe
    .streams
    .iter()
    .find(|s| s.codec_type == "video")
    .ok_or_else(|| {
      PipelineError::UnsupportedMedia(format!("视频 {} 中没有视频流", path.display()))
    })?;

  let width = stream.width.unwrap_or(0);
  let height = stream.height.unwrap_or(0);
  if width == 0 || height == 0 {
    return Err(PipelineError::UnsupportedMedia(format!(
      "视频 {} 的尺寸无效",
      path.display()
    )));
  }

  let fps = stream
    .avg_frame_rate
    .as_deref()
    .or(stream.r_frame_rate.as_deref())
    .and_then(parse_frame_rate)
    .filter(|f| *f > 0.0)
    .unwrap_or(25.0);

  // 优先使用容器记录的帧数，否则按时长估算
  let frame_count = stream
    .nb_frames
    .as_deref()
    .and_then(|n| n.parse::<u64>().ok())
    .or_else(|| {
      stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .map(|d| (d * fps).round() as u64)
    })
    .filter(|n| *n > 0);

  debug!(
    "视频元信息: {}x{} @ {:.2} fps, 帧数 {:?}",
    width, height, fps, frame_count
  );

  Ok(VideoMeta {
    width,
    height,
    fps,
    frame_count,
  })
}

/// 视频输入源
///
/// 持有 ffmpeg 解码子进程，按时间顺序逐帧读取。
pub struct VideoSource {
  /// ffmpeg 子进程
  child: Child,
  /// 子进程标准输出（rgb24 原始帧流）
  stdout: ChildStdout,
  /// 视频元信息
  meta: VideoMeta,
  /// 帧索引
  frame_index: u64,
  /// 是否结束
  finished: bool,
}

impl VideoSource {
  /// 创建一个新的视频输入源
  pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let meta = probe_video(path)?;

    which::which("ffmpeg")
      .map_err(|_| PipelineError::UnsupportedMedia("未找到 ffmpeg (请确保已安装)".to_string()))?;

    let mut child = Command::new("ffmpeg")
      .arg("-v")
      .arg("error")
      .arg("-i")
      .arg(path)
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("pipe:1")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()?;

    let stdout = child.stdout.take().ok_or_else(|| {
      PipelineError::UnsupportedMedia("无法获取 ffmpeg 输出管道".to_string())
    })?;

    Ok(Self {
      child,
      stdout,
      meta,
      frame_index: 0,
      finished: false,
    })
  }

  /// 从管道读取一帧原始数据
  ///
  /// 返回 Ok(None) 表示流正常结束；首字节之后中断视为该帧损坏。
  fn read_raw_frame(&mut self) -> Result<Option<Vec<u8>>> {
    let frame_size = (self.meta.width * self.meta.height * 3) as usize;
    let mut buf = vec![0u8; frame_size];
    let mut filled = 0usize;

    while filled < frame_size {
      match self.stdout.read(&mut buf[filled..]) {
        Ok(0) => {
          if filled == 0 {
            return Ok(None);
          }
          return Err(PipelineError::CorruptFrame {
            index: self.frame_index,
            reason: format!("帧数据不完整 ({}/{} 字节)", filled, frame_size),
          });
        }
        Ok(n) => filled += n,
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
        Err(e) => {
          return Err(PipelineError::CorruptFrame {
            index: self.frame_index,
            reason: format!("读取帧数据失败: {}", e),
          });
        }
      }
    }

    Ok(Some(buf))
  }
}

impl Iterator for VideoSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.read_raw_frame() {
      Ok(Some(data)) => {
        let image = match RgbImage::from_raw(self.meta.width, self.meta.height, data) {
          Some(img) => img,
          None => {
            let index = self.frame_index;
            self.frame_index += 1;
            return Some(Err(PipelineError::CorruptFrame {
              index,
              reason: "无法创建 RGB 图像".to_string(),
            }));
          }
        };

        let timestamp_ms = (self.frame_index as f64 * 1000.0 / self.meta.fps) as u64;
        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms,
        };

        self.frame_index += 1;
        Some(Ok(frame))
      }
      Ok(None) => {
        self.finished = true;
        // 检查解码器退出状态，失败时记录但不再追加错误
        if let Ok(status) = self.child.wait() {
          if !status.success() {
            warn!("ffmpeg 解码进程非正常退出: {}", status);
          }
        }
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

impl FrameSource for VideoSource {
  fn width(&self) -> u32 {
    self.meta.width
  }

  fn height(&self) -> u32 {
    self.meta.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.meta.fps)
  }

  fn frame_count(&self) -> Option<u64> {
    self.meta.frame_count
  }
}

impl Drop for VideoSource {
  fn drop(&mut self) {
    // 提前终止时杀掉解码进程，释放媒体句柄
    if !self.finished {
      let _ = self.child.kill();
    }
    let _ = self.child.wait();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_frame_rates() {
    assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
    assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
    assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
    assert!(parse_frame_rate("0/0").is_none());
  }

  #[test]
  fn missing_file_is_unsupported_media() {
    if which::which("ffprobe").is_err() {
      eprintln!("跳过: 未安装 ffprobe");
      return;
    }
    assert!(matches!(
      VideoSource::new("/no/such/clip.mp4"),
      Err(PipelineError::UnsupportedMedia(_))
    ));
  }
}
