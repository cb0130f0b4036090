// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/output/mod.rs - 输出模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod image_output;
mod video_output;

use image::RgbImage;

pub use image_output::ImageOutput;
pub use video_output::VideoOutput;

use crate::error::Result;
use crate::media::MediaKind;
use crate::store::ArtifactPayload;

/// 制品写入器 trait
///
/// 逐帧累积标注后的输出：图片为单帧缓冲，视频为增量重编码。
/// `finish` 消费写入器并产出最终编码的制品载荷；中途丢弃写入器
/// 即放弃输出，临时资源随之释放。
pub trait ArtifactWriter: Send {
  /// 写入一帧（帧按严格递增的顺序到达）
  fn write_frame(&mut self, image: &RgbImage) -> Result<()>;

  /// 完成编码并产出制品载荷
  fn finish(self: Box<Self>) -> Result<ArtifactPayload>;
}

/// 根据媒体类型创建制品写入器
pub fn create_writer(kind: MediaKind, fps: Option<f64>) -> Result<Box<dyn ArtifactWriter>> {
  match kind {
    MediaKind::Image => Ok(Box::new(ImageOutput::new())),
    MediaKind::Video => Ok(Box::new(VideoOutput::new(fps.unwrap_or(25.0))?)),
  }
}
