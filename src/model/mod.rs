// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/model/mod.rs - 模型适配层
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod blob;

use std::sync::Mutex;

use image::RgbImage;
use tracing::info;

pub use blob::BlobDetector;

use crate::error::{PipelineError, Result};

/// 检测结果
///
/// 坐标为帧像素坐标系，置信度为模型原始得分（未经过滤）。
#[derive(Debug, Clone)]
pub struct Detection {
  /// 类别标签
  pub label: String,
  /// 置信度（0.0 - 1.0）
  pub confidence: f32,
  /// 边界框左上角 x 坐标
  pub x: f32,
  /// 边界框左上角 y 坐标
  pub y: f32,
  /// 边界框宽度
  pub width: f32,
  /// 边界框高度
  pub height: f32,
}

/// 检测器 trait
///
/// 纯打分函数：输入一帧，输出零或多个检测结果，不做置信度过滤，
/// 过滤由调用方（任务执行器）按配置完成。
pub trait Detector: Send {
  /// 对单帧图像运行检测
  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;

  /// 检测器名称（用于日志）
  fn name(&self) -> &str;
}

/// 检测器加载函数
pub type DetectorLoader = Box<dyn FnOnce() -> Result<Box<dyn Detector>> + Send>;

/// 模型适配器内部状态
enum AdapterState {
  /// 尚未加载
  Unloaded(Option<DetectorLoader>),
  /// 已加载
  Loaded(Box<dyn Detector>),
  /// 加载失败（错误对所有后续调用重放）
  Poisoned(String),
}

/// 模型适配器
///
/// 进程级共享的检测器句柄：模型恰好加载一次（默认在首次推理时，
/// 也可通过 [`ModelAdapter::warm_up`] 在启动时预加载），并在内部
/// 串行化并发的打分调用，调用方无需自行协调。
pub struct ModelAdapter {
  state: Mutex<AdapterState>,
}

impl ModelAdapter {
  /// 创建惰性加载的模型适配器
  pub fn lazy(loader: DetectorLoader) -> Self {
    Self {
      state: Mutex::new(AdapterState::Unloaded(Some(loader))),
    }
  }

  /// 从已构建的检测器创建模型适配器
  pub fn with_detector(detector: Box<dyn Detector>) -> Self {
    Self {
      state: Mutex::new(AdapterState::Loaded(detector)),
    }
  }

  /// 立即加载模型（用于启动时预加载）
  pub fn warm_up(&self) -> Result<()> {
    let mut state = self.state.lock().expect("模型适配器锁中毒");
    Self::ensure_loaded(&mut state)?;
    Ok(())
  }

  /// 对单帧图像运行检测
  ///
  /// 首次调用触发模型加载；加载失败是致命错误，会对之后的每次
  /// 调用重放 [`PipelineError::ModelLoad`]。
  pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
    let mut state = self.state.lock().expect("模型适配器锁中毒");
    let detector = Self::ensure_loaded(&mut state)?;
    detector.detect(image)
  }

  fn ensure_loaded(state: &mut AdapterState) -> Result<&mut Box<dyn Detector>> {
    if let AdapterState::Unloaded(loader) = state {
      let loader = loader.take().expect("检测器加载函数已被消费");
      match loader() {
        Ok(detector) => {
          info!("模型加载完成: {}", detector.name());
          *state = AdapterState::Loaded(detector);
        }
        Err(e) => {
          let reason = e.to_string();
          *state = AdapterState::Poisoned(reason.clone());
          return Err(PipelineError::ModelLoad(reason));
        }
      }
    }

    match state {
      AdapterState::Loaded(detector) => Ok(detector),
      AdapterState::Poisoned(reason) => Err(PipelineError::ModelLoad(reason.clone())),
      AdapterState::Unloaded(_) => unreachable!(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  struct CountingDetector {
    calls: Arc<AtomicUsize>,
  }

  impl Detector for CountingDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(vec![])
    }

    fn name(&self) -> &str {
      "counting"
    }
  }

  #[test]
  fn loads_exactly_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let loads_inner = loads.clone();
    let calls_inner = calls.clone();

    let adapter = ModelAdapter::lazy(Box::new(move || {
      loads_inner.fetch_add(1, Ordering::SeqCst);
      Ok(Box::new(CountingDetector { calls: calls_inner }) as Box<dyn Detector>)
    }));

    let image = RgbImage::new(4, 4);
    adapter.detect(&image).unwrap();
    adapter.detect(&image).unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn load_failure_is_replayed() {
    let adapter = ModelAdapter::lazy(Box::new(|| {
      Err(PipelineError::ModelLoad("坏掉的模型文件".to_string()))
    }));

    let image = RgbImage::new(4, 4);
    assert!(matches!(
      adapter.detect(&image),
      Err(PipelineError::ModelLoad(_))
    ));
    // 第二次调用重放同样的错误，而不是重新加载
    assert!(matches!(
      adapter.detect(&image),
      Err(PipelineError::ModelLoad(_))
    ));
  }

  #[test]
  fn warm_up_loads_eagerly() {
    let loads = Arc::new(AtomicUsize::new(0));
    let loads_inner = loads.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = calls.clone();

    let adapter = ModelAdapter::lazy(Box::new(move || {
      loads_inner.fetch_add(1, Ordering::SeqCst);
      Ok(Box::new(CountingDetector { calls: calls_inner }) as Box<dyn Detector>)
    }));

    adapter.warm_up().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
  }
}
