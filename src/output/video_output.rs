// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/output/video_output.rs - 视频输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 视频输出模块
//!
//! 标注后的帧先以 PNG 序列缓冲到临时目录，完成时由 ffmpeg 命令行
//! 工具编码为 H.264 MP4（yuv420p，常见播放器均可解码）。临时目录
//! 随写入器一同释放，任务被取消或失败时不留任何残余文件。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::process::Command;

use image::RgbImage;
use tempfile::TempDir;
use tracing::{error, info};

use super::ArtifactWriter;
use crate::error::{PipelineError, Result};
use crate::store::ArtifactPayload;

const MIN_FPS: f64 = 1.0;
const MAX_FPS: f64 = 120.0;

/// 视频输出
///
/// 帧按写入顺序编号，跳过的输入帧不在输出中占位，因此输出视频的
/// 帧时间戳严格递增且与输入顺序一致。
pub struct VideoOutput {
  /// 帧缓冲临时目录
  temp_dir: TempDir,
  /// 已缓冲的帧数
  frame_count: u64,
  /// 输出帧率
  fps: f64,
}

impl VideoOutput {
  /// 创建一个新的视频输出
  pub fn new(fps: f64) -> Result<Self> {
    let fps = fps.clamp(MIN_FPS, MAX_FPS);
    let temp_dir = tempfile::Builder::new().prefix("xunxiong-frames-").tempdir()?;

    Ok(Self {
      temp_dir,
      frame_count: 0,
      fps,
    })
  }
}

impl ArtifactWriter for VideoOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
    let frame_path = self
      .temp_dir
      .path()
      .join(format!("frame_{:06}.png", self.frame_count));
    image.save(&frame_path)?;
    self.frame_count += 1;
    Ok(())
  }

  fn finish(self: Box<Self>) -> Result<ArtifactPayload> {
    if self.frame_count == 0 {
      return Err(PipelineError::Encode("没有帧可以编码为视频".to_string()));
    }

    which::which("ffmpeg")
      .map_err(|_| PipelineError::Encode("未找到 ffmpeg (请确保已安装)".to_string()))?;

    let output_file = tempfile::Builder::new()
      .prefix("xunxiong-artifact-")
      .suffix(".mp4")
      .tempfile()?;

    info!(
      "开始编码视频: {} 帧 @ {} fps -> {}",
      self.frame_count,
      self.fps,
      output_file.path().display()
    );

    // 使用 ffmpeg 将帧序列编码为 MP4
    let output = Command::new("ffmpeg")
      .arg("-y") // 覆盖已存在的文件
      .arg("-loglevel")
      .arg("error") // 减少日志输出
      .arg("-framerate")
      .arg(self.fps.to_string())
      .arg("-i")
      .arg(self.temp_dir.path().join("frame_%06d.png"))
      .arg("-c:v")
      .arg("libx264") // 使用 H.264 编码
      .arg("-pix_fmt")
      .arg("yuv420p") // 兼容性格式
      .arg("-preset")
      .arg("fast") // 编码速度预设
      .arg("-crf")
      .arg("23") // 质量参数（0-51，越小质量越好）
      .arg(output_file.path())
      .output()?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      error!("ffmpeg 错误: {}", stderr);
      return Err(PipelineError::Encode(format!("ffmpeg 失败: {}", stderr)));
    }

    info!("视频编码成功: {}", output_file.path().display());
    // temp_dir 随 self 释放，帧缓冲自动清理
    Ok(ArtifactPayload::VideoFile(output_file))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn encodes_playable_mp4() {
    if which::which("ffmpeg").is_err() {
      eprintln!("跳过: 未安装 ffmpeg");
      return;
    }

    let mut writer = Box::new(VideoOutput::new(10.0).unwrap());
    for i in 0..5u8 {
      let image = RgbImage::from_pixel(32, 32, Rgb([i * 40, 0, 0]));
      writer.write_frame(&image).unwrap();
    }

    let payload = (writer as Box<dyn ArtifactWriter>).finish().unwrap();
    let ArtifactPayload::VideoFile(file) = payload else {
      panic!("视频制品应为文件载荷");
    };

    let metadata = std::fs::metadata(file.path()).unwrap();
    assert!(metadata.len() > 0);
  }

  #[test]
  fn finish_without_frames_fails() {
    let writer = Box::new(VideoOutput::new(25.0).unwrap());
    assert!(matches!(
      (writer as Box<dyn ArtifactWriter>).finish(),
      Err(PipelineError::Encode(_))
    ));
  }

  #[test]
  fn fps_is_clamped_to_valid_range() {
    let writer = VideoOutput::new(0.0).unwrap();
    assert_eq!(writer.fps, MIN_FPS);
    let writer = VideoOutput::new(500.0).unwrap();
    assert_eq!(writer.fps, MAX_FPS);
  }
}
