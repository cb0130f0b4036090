// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/store.rs - 制品仓库
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::EvictionPolicy;
use crate::error::{PipelineError, Result};
use crate::job::JobId;
use crate::media::MediaKind;

/// 制品载荷
///
/// 图片制品为内存中的 PNG 字节；视频制品为临时 MP4 文件，文件的
/// 生命周期与制品一致，制品被清除或淘汰时文件随之删除。
pub enum ArtifactPayload {
  /// 内存编码字节（PNG）
  Bytes(Vec<u8>),
  /// 临时视频文件（MP4）
  VideoFile(NamedTempFile),
}

impl ArtifactPayload {
  /// 读取制品的完整字节
  pub fn bytes(&self) -> Result<Vec<u8>> {
    match self {
      ArtifactPayload::Bytes(bytes) => Ok(bytes.clone()),
      ArtifactPayload::VideoFile(file) => Ok(std::fs::read(file.path())?),
    }
  }

  /// 制品文件路径（仅视频制品）
  pub fn path(&self) -> Option<&Path> {
    match self {
      ArtifactPayload::Bytes(_) => None,
      ArtifactPayload::VideoFile(file) => Some(file.path()),
    }
  }
}

/// 结果制品
///
/// 仅在任务 Completed 时创建，不可变。
pub struct ResultArtifact {
  /// 所属任务标识
  pub job_id: JobId,
  /// 制品类型（与媒体输入一致）
  pub kind: MediaKind,
  /// 编码载荷
  pub payload: ArtifactPayload,
  /// 创建时间
  pub created_at: DateTime<Utc>,
}

impl ResultArtifact {
  /// 创建一个新的结果制品
  pub fn new(job_id: JobId, kind: MediaKind, payload: ArtifactPayload) -> Self {
    Self {
      job_id,
      kind,
      payload,
      created_at: Utc::now(),
    }
  }
}

/// 仓库内部状态
struct StoreInner {
  /// 制品表
  artifacts: HashMap<JobId, Arc<ResultArtifact>>,
  /// LRU 访问顺序（最久未用在前）
  order: Vec<JobId>,
}

/// 制品仓库
///
/// 会话级存储：持有已完成任务的制品直至显式清除、LRU 淘汰或进程
/// 结束。内部互斥锁串行化来自多个工作线程与下载方的并发访问。
pub struct ArtifactStore {
  inner: Mutex<StoreInner>,
  policy: EvictionPolicy,
}

impl Default for ArtifactStore {
  fn default() -> Self {
    Self::new(EvictionPolicy::None)
  }
}

impl ArtifactStore {
  /// 创建一个新的制品仓库
  pub fn new(policy: EvictionPolicy) -> Self {
    Self {
      inner: Mutex::new(StoreInner {
        artifacts: HashMap::new(),
        order: Vec::new(),
      }),
      policy,
    }
  }

  /// 存入制品
  ///
  /// 同一任务的重复存入是幂等覆盖。仅由任务执行器在任务 Completed
  /// 时调用。
  pub fn put(&self, artifact: ResultArtifact) {
    let mut inner = self.inner.lock().expect("制品仓库锁中毒");
    let job_id = artifact.job_id;

    inner.order.retain(|id| *id != job_id);
    inner.order.push(job_id);
    inner.artifacts.insert(job_id, Arc::new(artifact));
    debug!("{} 的制品已入库", job_id);

    // 按策略淘汰最久未用的制品
    if let EvictionPolicy::Lru { capacity } = self.policy {
      while inner.artifacts.len() > capacity.max(1) {
        let oldest = inner.order.remove(0);
        inner.artifacts.remove(&oldest);
        info!("按 LRU 策略淘汰 {} 的制品", oldest);
      }
    }
  }

  /// 获取制品
  ///
  /// 任务未完成或制品已清除时返回 [`PipelineError::NotFound`]。
  pub fn get(&self, job_id: JobId) -> Result<Arc<ResultArtifact>> {
    let mut inner = self.inner.lock().expect("制品仓库锁中毒");

    let artifact = inner
      .artifacts
      .get(&job_id)
      .cloned()
      .ok_or(PipelineError::NotFound(job_id))?;

    // 刷新访问顺序
    inner.order.retain(|id| *id != job_id);
    inner.order.push(job_id);

    Ok(artifact)
  }

  /// 清除制品
  ///
  /// 清除不存在的制品是空操作而非错误。
  pub fn clear(&self, job_id: JobId) {
    let mut inner = self.inner.lock().expect("制品仓库锁中毒");
    if inner.artifacts.remove(&job_id).is_some() {
      inner.order.retain(|id| *id != job_id);
      debug!("{} 的制品已清除", job_id);
    }
  }

  /// 当前持有的制品数量
  pub fn len(&self) -> usize {
    self.inner.lock().expect("制品仓库锁中毒").artifacts.len()
  }

  /// 仓库是否为空
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn artifact(id: u64) -> ResultArtifact {
    ResultArtifact::new(
      JobId(id),
      MediaKind::Image,
      ArtifactPayload::Bytes(vec![id as u8]),
    )
  }

  #[test]
  fn put_then_get() {
    let store = ArtifactStore::default();
    store.put(artifact(1));

    let got = store.get(JobId(1)).unwrap();
    assert_eq!(got.payload.bytes().unwrap(), vec![1]);
  }

  #[test]
  fn get_missing_is_not_found() {
    let store = ArtifactStore::default();
    assert!(matches!(
      store.get(JobId(9)),
      Err(PipelineError::NotFound(_))
    ));
  }

  #[test]
  fn put_is_idempotent_overwrite() {
    let store = ArtifactStore::default();
    store.put(artifact(1));
    store.put(ResultArtifact::new(
      JobId(1),
      MediaKind::Image,
      ArtifactPayload::Bytes(vec![42]),
    ));

    assert_eq!(store.len(), 1);
    assert_eq!(store.get(JobId(1)).unwrap().payload.bytes().unwrap(), vec![42]);
  }

  #[test]
  fn clear_is_idempotent() {
    let store = ArtifactStore::default();
    store.put(artifact(1));

    store.clear(JobId(1));
    assert!(store.get(JobId(1)).is_err());

    // 重复清除与清除不存在的制品都是空操作
    store.clear(JobId(1));
    store.clear(JobId(404));
  }

  #[test]
  fn lru_evicts_least_recently_used() {
    let store = ArtifactStore::new(EvictionPolicy::Lru { capacity: 2 });
    store.put(artifact(1));
    store.put(artifact(2));

    // 访问 1，使 2 成为最久未用
    store.get(JobId(1)).unwrap();
    store.put(artifact(3));

    assert!(store.get(JobId(2)).is_err());
    assert!(store.get(JobId(1)).is_ok());
    assert!(store.get(JobId(3)).is_ok());
    assert_eq!(store.len(), 2);
  }
}
