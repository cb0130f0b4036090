// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/model/blob.rs - 内置色块检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 内置的确定性色块检测器
//!
//! 不依赖外部模型文件，对三原色主导的连通区域打分，使流水线可以
//! 在没有真实模型的环境下端到端运行。真实的检测后端通过
//! [`Detector`](super::Detector) trait 接入。

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};

use super::{Detection, Detector};
use crate::error::Result;

/// 三原色通道标签
const CHANNEL_LABELS: [&str; 3] = ["red", "green", "blue"];

/// 色块检测器
///
/// 对每个原色通道构建主导掩码（该通道超出其余两个通道 margin 以上），
/// 做连通域分析，输出每个足够大区域的边界框。得分为区域面积占整幅
/// 图像面积比例的平方根，结果按（标签、y、x）排序，保证同一输入的
/// 输出完全一致。
pub struct BlobDetector {
  /// 通道主导判定余量
  margin: u8,
  /// 最小连通域面积（像素）
  min_area: u32,
}

impl Default for BlobDetector {
  fn default() -> Self {
    Self {
      margin: 64,
      min_area: 64,
    }
  }
}

impl BlobDetector {
  /// 创建一个新的色块检测器
  pub fn new(margin: u8, min_area: u32) -> Self {
    Self { margin, min_area }
  }

  /// 构建某个通道的主导掩码
  fn channel_mask(&self, image: &RgbImage, channel: usize) -> GrayImage {
    let margin = self.margin as i16;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
      let p = image.get_pixel(x, y).0;
      let value = p[channel] as i16;
      let others = [p[(channel + 1) % 3] as i16, p[(channel + 2) % 3] as i16];
      if value >= others[0] + margin && value >= others[1] + margin {
        Luma([255u8])
      } else {
        Luma([0u8])
      }
    })
  }

  /// 在掩码上做连通域分析并输出边界框
  fn blobs_in_mask(&self, mask: &GrayImage, label: &str) -> Vec<Detection> {
    let labelled = connected_components(mask, Connectivity::Four, Luma([0u8]));

    // 每个连通域的包围盒与面积: (min_x, min_y, max_x, max_y, area)
    let mut boxes: std::collections::BTreeMap<u32, (u32, u32, u32, u32, u32)> =
      std::collections::BTreeMap::new();

    for (x, y, pixel) in labelled.enumerate_pixels() {
      let component = pixel.0[0];
      if component == 0 {
        continue;
      }
      let entry = boxes.entry(component).or_insert((x, y, x, y, 0));
      entry.0 = entry.0.min(x);
      entry.1 = entry.1.min(y);
      entry.2 = entry.2.max(x);
      entry.3 = entry.3.max(y);
      entry.4 += 1;
    }

    let image_area = (mask.width() * mask.height()) as f32;
    boxes
      .into_values()
      .filter(|(_, _, _, _, area)| *area >= self.min_area)
      .map(|(min_x, min_y, max_x, max_y, area)| Detection {
        label: label.to_string(),
        confidence: (area as f32 / image_area).sqrt().min(1.0),
        x: min_x as f32,
        y: min_y as f32,
        width: (max_x - min_x + 1) as f32,
        height: (max_y - min_y + 1) as f32,
      })
      .collect()
  }
}

impl Detector for BlobDetector {
  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
    let mut detections = Vec::new();

    for (channel, label) in CHANNEL_LABELS.iter().enumerate() {
      let mask = self.channel_mask(image, channel);
      detections.extend(self.blobs_in_mask(&mask, label));
    }

    // 确定性输出顺序
    detections.sort_by(|a, b| {
      (&a.label, a.y as u32, a.x as u32).cmp(&(&b.label, b.y as u32, b.x as u32))
    });

    Ok(detections)
  }

  fn name(&self) -> &str {
    "blob"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  /// 灰底上画一个红色方块
  fn red_square_image() -> RgbImage {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
    for y in 10..30 {
      for x in 20..40 {
        image.put_pixel(x, y, Rgb([255, 0, 0]));
      }
    }
    image
  }

  #[test]
  fn finds_red_square() {
    let detector = BlobDetector::default();
    let detections = detector.detect(&red_square_image()).unwrap();

    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(det.label, "red");
    assert_eq!(det.x, 20.0);
    assert_eq!(det.y, 10.0);
    assert_eq!(det.width, 20.0);
    assert_eq!(det.height, 20.0);
    assert!(det.confidence > 0.0 && det.confidence <= 1.0);
  }

  #[test]
  fn is_deterministic() {
    let detector = BlobDetector::default();
    let image = red_square_image();

    let first = detector.detect(&image).unwrap();
    let second = detector.detect(&image).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
      assert_eq!(a.label, b.label);
      assert_eq!(a.confidence, b.confidence);
      assert_eq!((a.x, a.y, a.width, a.height), (b.x, b.y, b.width, b.height));
    }
  }

  #[test]
  fn ignores_small_blobs() {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
    // 4 像素的小色块，低于最小面积
    for y in 0..2 {
      for x in 0..2 {
        image.put_pixel(x, y, Rgb([0, 255, 0]));
      }
    }

    let detector = BlobDetector::default();
    assert!(detector.detect(&image).unwrap().is_empty());
  }
}
