// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/media.rs - 媒体输入定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// 支持的图片扩展名
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];
/// 支持的视频扩展名
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "wmv", "flv"];

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  /// 静态图片
  Image,
  /// 视频文件
  Video,
}

impl std::fmt::Display for MediaKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MediaKind::Image => write!(f, "图片"),
      MediaKind::Video => write!(f, "视频"),
    }
  }
}

/// 媒体输入
///
/// 由调用方（UI 层）在文件被接受后创建并交给流水线，创建后不可变。
#[derive(Debug, Clone)]
pub struct MediaInput {
  /// 媒体类型
  pub kind: MediaKind,
  /// 源文件路径
  pub path: PathBuf,
  /// 视频总帧数（如果已知；图片恒为 Some(1)）
  pub frame_count: Option<u64>,
}

impl MediaInput {
  /// 根据扩展名嗅探媒体类型并创建媒体输入
  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let kind = sniff_kind(path).ok_or_else(|| {
      PipelineError::UnsupportedMedia(format!("无法识别的媒体格式: {}", path.display()))
    })?;

    let frame_count = match kind {
      MediaKind::Image => Some(1),
      MediaKind::Video => None,
    };

    Ok(Self {
      kind,
      path: path.to_path_buf(),
      frame_count,
    })
  }
}

/// 根据扩展名判断媒体类型
fn sniff_kind(path: &Path) -> Option<MediaKind> {
  let ext = path.extension()?.to_str()?.to_lowercase();

  if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
    return Some(MediaKind::Image);
  }
  if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
    return Some(MediaKind::Video);
  }

  None
}
