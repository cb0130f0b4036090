// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;

/// Xunxiong 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入媒体路径
  /// 支持格式:
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.gif, *.webp
  /// - 视频: *.mp4, *.avi, *.mov, *.mkv, *.wmv, *.flv
  #[arg(long, value_name = "SOURCE")]
  pub input: PathBuf,

  /// 输出文件路径（图片输出 PNG，视频输出 MP4）
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 仅保留指定类别（可多次指定，缺省保留全部类别）
  #[arg(long = "class", value_name = "LABEL")]
  pub classes: Vec<String>,

  /// 工作线程数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub workers: usize,

  /// 损坏帧比例容忍上限 (0.0 - 1.0)
  #[arg(long, default_value = "0.3", value_name = "RATIO")]
  pub corrupt_tolerance: f32,

  /// 提交任务前预先加载模型
  #[arg(long)]
  pub eager_load: bool,
}
