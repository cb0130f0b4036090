// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/config.rs - 流水线配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::BTreeSet;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
/// 默认损坏帧容忍比例（超出后任务失败）
pub const DEFAULT_CORRUPT_FRAME_TOLERANCE: f32 = 0.3;
/// 默认工作线程数
pub const DEFAULT_WORKER_POOL_SIZE: usize = 2;

/// 制品仓库淘汰策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionPolicy {
  /// 不淘汰，制品保留至显式清除或会话结束
  None,
  /// LRU 淘汰，最多保留 capacity 个制品
  Lru { capacity: usize },
}

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 置信度阈值，低于该值的检测结果被丢弃（0.0 - 1.0）
  pub confidence_threshold: f32,
  /// 保留的类别集合，None 表示保留全部类别
  pub classes: Option<BTreeSet<String>>,
  /// 工作线程数（>= 1），限制同时执行的任务数量
  pub worker_pool_size: usize,
  /// 制品仓库淘汰策略
  pub artifact_eviction: EvictionPolicy,
  /// 损坏帧容忍比例（0.0 - 1.0），跳帧比例超出后任务失败
  pub corrupt_frame_tolerance: f32,
  /// 是否在流水线启动时立即加载模型（否则首次推理时加载）
  pub eager_model_load: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      classes: None,
      worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
      artifact_eviction: EvictionPolicy::None,
      corrupt_frame_tolerance: DEFAULT_CORRUPT_FRAME_TOLERANCE,
      eager_model_load: false,
    }
  }
}

impl PipelineConfig {
  /// 判断某个类别是否被保留
  pub fn keeps_class(&self, label: &str) -> bool {
    match &self.classes {
      Some(set) => set.contains(label),
      None => true,
    }
  }

  /// 判断某个检测结果是否通过置信度与类别过滤
  pub fn keeps_detection(&self, detection: &crate::model::Detection) -> bool {
    detection.confidence >= self.confidence_threshold && self.keeps_class(&detection.label)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;

  fn detection(label: &str, confidence: f32) -> Detection {
    Detection {
      label: label.to_string(),
      confidence,
      x: 0.0,
      y: 0.0,
      width: 10.0,
      height: 10.0,
    }
  }

  #[test]
  fn threshold_filters_low_confidence() {
    let config = PipelineConfig {
      confidence_threshold: 0.5,
      ..Default::default()
    };
    assert!(!config.keeps_detection(&detection("bear", 0.4)));
    assert!(config.keeps_detection(&detection("bear", 0.9)));
  }

  #[test]
  fn class_filter_restricts_labels() {
    let config = PipelineConfig {
      classes: Some(["bear".to_string()].into_iter().collect()),
      ..Default::default()
    };
    assert!(config.keeps_detection(&detection("bear", 0.9)));
    assert!(!config.keeps_detection(&detection("person", 0.9)));
  }

  #[test]
  fn default_keeps_all_classes() {
    let config = PipelineConfig::default();
    assert!(config.keeps_class("anything"));
  }
}
