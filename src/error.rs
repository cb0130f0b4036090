// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/error.rs - 流水线错误类型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

/// 流水线统一返回类型
pub type Result<T> = std::result::Result<T, PipelineError>;

/// 流水线错误分类
///
/// 错误分为两个层级：
/// - 帧级错误（`CorruptFrame`、`Inference`）由任务执行器吸收，
///   以跳帧的方式恢复，并计入任务诊断信息；
/// - 任务级错误（其余各项）使任务进入 Failed 状态，但不影响
///   其他正在执行的任务。
#[derive(Error, Debug)]
pub enum PipelineError {
  /// 模型加载失败（致命，进程无法服务任何任务）
  #[error("模型加载失败: {0}")]
  ModelLoad(String),

  /// 单帧推理失败（可恢复，允许重试一次）
  #[error("推理失败: {0}")]
  Inference(String),

  /// 无法打开的媒体容器或编码格式
  #[error("不支持的媒体: {0}")]
  UnsupportedMedia(String),

  /// 单帧解码失败（可恢复，跳帧处理）
  #[error("帧 {index} 损坏: {reason}")]
  CorruptFrame { index: u64, reason: String },

  /// 输出编码失败
  #[error("输出编码失败: {0}")]
  Encode(String),

  /// 制品仓库中不存在请求的任务制品
  #[error("未找到任务 {0} 的制品")]
  NotFound(crate::job::JobId),

  /// I/O 错误
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),

  /// 图像编解码错误
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
}

impl PipelineError {
  /// 该错误是否为帧级错误（可通过跳帧恢复）
  pub fn is_frame_level(&self) -> bool {
    matches!(
      self,
      PipelineError::CorruptFrame { .. } | PipelineError::Inference(_)
    )
  }
}
