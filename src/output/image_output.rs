// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/output/image_output.rs - 图片输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use super::ArtifactWriter;
use crate::error::{PipelineError, Result};
use crate::store::ArtifactPayload;

/// 图片输出
///
/// 缓冲单帧，完成时编码为 PNG 字节。
pub struct ImageOutput {
  /// 待编码的帧
  frame: Option<RgbImage>,
}

impl Default for ImageOutput {
  fn default() -> Self {
    Self::new()
  }
}

impl ImageOutput {
  /// 创建一个新的图片输出
  pub fn new() -> Self {
    Self { frame: None }
  }
}

impl ArtifactWriter for ImageOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
    self.frame = Some(image.clone());
    Ok(())
  }

  fn finish(self: Box<Self>) -> Result<ArtifactPayload> {
    let frame = self
      .frame
      .ok_or_else(|| PipelineError::Encode("没有帧可以编码为图片".to_string()))?;

    let mut bytes = Cursor::new(Vec::new());
    frame.write_to(&mut bytes, ImageFormat::Png)?;

    Ok(ArtifactPayload::Bytes(bytes.into_inner()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn encodes_png_bytes() {
    let mut writer = Box::new(ImageOutput::new());
    let image = RgbImage::from_pixel(16, 16, Rgb([200, 100, 50]));
    writer.write_frame(&image).unwrap();

    let payload = (writer as Box<dyn ArtifactWriter>).finish().unwrap();
    let ArtifactPayload::Bytes(bytes) = payload else {
      panic!("图片制品应为字节载荷");
    };

    // PNG 魔数
    assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);

    // 解码回原图验证内容
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded.as_raw(), image.as_raw());
  }

  #[test]
  fn finish_without_frame_fails() {
    let writer = Box::new(ImageOutput::new());
    assert!(matches!(
      (writer as Box<dyn ArtifactWriter>).finish(),
      Err(PipelineError::Encode(_))
    ));
  }
}
