// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/input/mod.rs - 输入源模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod image_source;
mod video_source;

use image::RgbImage;

pub use image_source::ImageSource;
pub use video_source::VideoSource;

use crate::error::Result;
use crate::media::{MediaInput, MediaKind};

/// 帧数据
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引（图片恒为 0）
  pub index: u64,
  /// 时间戳（毫秒，图片恒为 0）
  pub timestamp_ms: u64,
}

/// 输入源 trait
///
/// 输入源是一个惰性的有限帧序列：图片输入恰好产出一帧，视频输入按
/// 时间顺序逐帧产出。序列不可回退，重新处理需重新打开；提前丢弃
/// 输入源即终止解码，剩余帧不再解码。
pub trait FrameSource: Iterator<Item = Result<Frame>> {
  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率（如果适用）
  fn fps(&self) -> Option<f64>;

  /// 获取总帧数（如果已知）
  fn frame_count(&self) -> Option<u64>;
}

/// 根据媒体输入打开对应的输入源
pub fn open_source(media: &MediaInput) -> Result<Box<dyn FrameSource + Send>> {
  match media.kind {
    MediaKind::Image => Ok(Box::new(ImageSource::new(&media.path)?)),
    MediaKind::Video => Ok(Box::new(VideoSource::new(&media.path)?)),
  }
}
