// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/input/image_source.rs - 图片输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, RgbImage};

use super::{Frame, FrameSource};
use crate::error::{PipelineError, Result};

/// 图片输入源
///
/// 恰好产出一帧后结束。
pub struct ImageSource {
  /// 图片数据
  image: Option<RgbImage>,
  /// 图片宽度
  width: u32,
  /// 图片高度
  height: u32,
}

impl ImageSource {
  /// 创建一个新的图片输入源
  pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let img = ImageReader::open(path)
      .map_err(|e| PipelineError::UnsupportedMedia(format!("无法打开图片文件 {}: {}", path.display(), e)))?
      .decode()
      .map_err(|e| PipelineError::UnsupportedMedia(format!("无法解码图片文件 {}: {}", path.display(), e)))?
      .to_rgb8();

    let width = img.width();
    let height = img.height();

    Ok(Self {
      image: Some(img),
      width,
      height,
    })
  }
}

impl Iterator for ImageSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| {
      Ok(Frame {
        image,
        index: 0,
        timestamp_ms: 0,
      })
    })
  }
}

impl FrameSource for ImageSource {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }

  fn frame_count(&self) -> Option<u64> {
    Some(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_exactly_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let mut source = ImageSource::new(&path).unwrap();
    assert_eq!(source.width(), 8);
    assert_eq!(source.height(), 6);
    assert_eq!(source.frame_count(), Some(1));

    let frame = source.next().unwrap().unwrap();
    assert_eq!(frame.index, 0);
    assert_eq!(frame.timestamp_ms, 0);
    assert!(source.next().is_none());
  }

  #[test]
  fn missing_file_is_unsupported_media() {
    assert!(matches!(
      ImageSource::new("/no/such/file.png"),
      Err(PipelineError::UnsupportedMedia(_))
    ));
  }
}
