// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/annotate.rs - 检测结果标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::model::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
/// 调色板大小
const PALETTE_SIZE: usize = 16;

/// 标注器
///
/// 纯函数式绘制：输入帧与检测结果，输出带边框与标签的新帧，不持有
/// 共享可变状态，可在独立帧上并发调用。相同的（帧，检测结果）输入
/// 产生逐字节一致的输出。
pub struct Annotator {
  /// 字体
  font: FontArc,
  /// 字体大小
  font_scale: PxScale,
  /// 边界框调色板
  colors: Vec<Rgb<u8>>,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new()
  }
}

impl Annotator {
  /// 创建一个新的标注器
  pub fn new() -> Self {
    // 使用内置的默认字体数据
    let font_data = include_bytes!("../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    // 生成均匀分布的调色板
    let colors: Vec<Rgb<u8>> = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        Self::hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  /// HSV 转 RGB
  fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
      (c, x, 0.0)
    } else if h < 120.0 {
      (x, c, 0.0)
    } else if h < 180.0 {
      (0.0, c, x)
    } else if h < 240.0 {
      (0.0, x, c)
    } else if h < 300.0 {
      (x, 0.0, c)
    } else {
      (c, 0.0, x)
    };

    Rgb([
      ((r + m) * 255.0) as u8,
      ((g + m) * 255.0) as u8,
      ((b + m) * 255.0) as u8,
    ])
  }

  /// 标签到调色板下标的确定性映射
  fn color_for(&self, label: &str) -> Rgb<u8> {
    let hash = label
      .bytes()
      .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    self.colors[hash % self.colors.len()]
  }

  /// 渲染一帧
  ///
  /// 置信度过滤在上游（任务执行器）完成，此处绘制收到的全部结果。
  pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut output = image.clone();
    for detection in detections {
      self.draw_detection(&mut output, detection);
    }
    output
  }

  /// 在图像上绘制一个检测框与标签
  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let color = self.color_for(&detection.label);

    let x = detection.x.max(0.0).min(w - 1.0) as i32;
    let y = detection.y.max(0.0).min(h - 1.0) as i32;
    let width = detection.width.min(w - x as f32) as u32;
    let height = detection.height.min(h - y as f32) as u32;

    if width == 0 || height == 0 {
      return;
    }

    // 绘制边界框
    let rect = Rect::at(x, y).of_size(width, height);
    draw_hollow_rect_mut(image, rect, color);

    // 绘制第二个边框以增加可见度
    if width > 2 && height > 2 {
      let inner_rect = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(image, inner_rect, color);
    }

    // 创建标签文本
    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let text_color = Rgb([255u8, 255u8, 255u8]); // 白色文本

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let text_height = LABEL_TEXT_HEIGHT;

    // 标签背景位于边框上方，空间不足时移到框内
    let label_x = x;
    let label_y = (y - text_height).max(0);
    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    let label_height = text_height as u32;

    // 仅在标签有空间时绘制
    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);

      draw_text_mut(
        image,
        text_color,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        &self.font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_detection() -> Detection {
    Detection {
      label: "red".to_string(),
      confidence: 0.9,
      x: 8.0,
      y: 8.0,
      width: 16.0,
      height: 16.0,
    }
  }

  #[test]
  fn render_does_not_mutate_input() {
    let annotator = Annotator::new();
    let image = RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]));
    let before = image.clone();

    let _ = annotator.render(&image, &[sample_detection()]);
    assert_eq!(image.as_raw(), before.as_raw());
  }

  #[test]
  fn render_is_byte_identical_for_same_input() {
    let annotator = Annotator::new();
    let image = RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]));
    let detections = [sample_detection()];

    let first = annotator.render(&image, &detections);
    let second = annotator.render(&image, &detections);
    assert_eq!(first.as_raw(), second.as_raw());
  }

  #[test]
  fn render_changes_pixels_when_detections_present() {
    let annotator = Annotator::new();
    let image = RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]));

    let annotated = annotator.render(&image, &[sample_detection()]);
    assert_ne!(annotated.as_raw(), image.as_raw());

    // 没有检测结果时输出与输入一致
    let untouched = annotator.render(&image, &[]);
    assert_eq!(untouched.as_raw(), image.as_raw());
  }

  #[test]
  fn out_of_bounds_boxes_are_clamped() {
    let annotator = Annotator::new();
    let image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
    let detection = Detection {
      label: "red".to_string(),
      confidence: 0.5,
      x: -10.0,
      y: -10.0,
      width: 100.0,
      height: 100.0,
    };

    // 不应 panic
    let _ = annotator.render(&image, &[detection]);
  }
}
