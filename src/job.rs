// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/job.rs - 任务状态机
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::media::MediaInput;

/// 非 Completed 状态下帧进度的上限，剩余部分留给收尾编码
const FINALIZE_PROGRESS_CAP: f32 = 0.99;

/// 任务标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "job-{:06}", self.0)
  }
}

/// 任务状态
///
/// 状态转移单向：Pending → Running → {Completed, Failed, Cancelled}，
/// 终止状态不可再变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
  /// 等待调度
  Pending,
  /// 正在处理
  Running,
  /// 全部帧处理完成，制品已入库
  Completed,
  /// 不可恢复错误，附带人类可读的原因
  Failed { reason: String },
  /// 被显式取消
  Cancelled,
}

impl JobStatus {
  /// 是否为终止状态
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      JobStatus::Completed | JobStatus::Failed { .. } | JobStatus::Cancelled
    )
  }
}

/// 任务
///
/// 一次对单个媒体输入的端到端检测运行。任务在提交时创建，由任务
/// 执行器独占持有直至终止。
#[derive(Debug, Clone)]
pub struct Job {
  /// 任务标识
  pub id: JobId,
  /// 媒体输入
  pub media: MediaInput,
  /// 当前状态
  pub status: JobStatus,
  /// 已处理（含跳过）的帧数
  pub frames_done: u64,
  /// 总帧数（如果已知）
  pub frames_total: Option<u64>,
  /// 跳过的帧索引（诊断信息）
  pub skipped_frames: Vec<u64>,
  /// 创建时间
  pub created_at: DateTime<Utc>,
}

impl Job {
  /// 创建一个新的 Pending 任务
  pub fn new(id: JobId, media: MediaInput) -> Self {
    let frames_total = media.frame_count;
    Self {
      id,
      media,
      status: JobStatus::Pending,
      frames_done: 0,
      frames_total,
      skipped_frames: Vec::new(),
      created_at: Utc::now(),
    }
  }

  /// 尝试状态转移
  ///
  /// 终止状态不可离开；非法转移被忽略并返回 false。
  pub fn transition(&mut self, next: JobStatus) -> bool {
    if self.status.is_terminal() {
      warn!("{} 已处于终止状态 {:?}, 忽略转移到 {:?}", self.id, self.status, next);
      return false;
    }
    self.status = next;
    true
  }

  /// 当前进度（0.0 - 1.0）
  ///
  /// 进度随帧处理单调不减，恰在 Completed 时到达 1.0。全部帧处理完
  /// 之后还有收尾编码，因此非 Completed 状态的帧进度封顶在 1.0 以下，
  /// Failed 或仍在收尾的任务不会报告满进度。
  pub fn progress(&self) -> f32 {
    if self.status == JobStatus::Completed {
      return 1.0;
    }
    match self.frames_total {
      Some(total) if total > 0 => {
        (self.frames_done as f32 / total as f32).min(FINALIZE_PROGRESS_CAP)
      }
      _ => 0.0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::media::MediaInput;

  fn image_job() -> Job {
    Job::new(JobId(1), MediaInput::from_path("a.png").unwrap())
  }

  #[test]
  fn terminal_states_are_absorbing() {
    let mut job = image_job();
    assert!(job.transition(JobStatus::Running));
    assert!(job.transition(JobStatus::Cancelled));
    // 终止后不可再转移
    assert!(!job.transition(JobStatus::Completed));
    assert_eq!(job.status, JobStatus::Cancelled);
  }

  #[test]
  fn progress_reaches_one_only_at_completed() {
    let mut job = image_job();
    assert_eq!(job.frames_total, Some(1));
    assert_eq!(job.progress(), 0.0);

    job.transition(JobStatus::Running);
    job.frames_done = 1;
    // 帧处理完后仍有收尾编码，不报满进度
    assert!(job.progress() > 0.0 && job.progress() < 1.0);

    job.transition(JobStatus::Completed);
    assert_eq!(job.progress(), 1.0);
  }

  #[test]
  fn failed_job_never_reports_full_progress() {
    let mut job = image_job();
    job.frames_total = Some(3);
    job.transition(JobStatus::Running);
    job.frames_done = 3;
    job.transition(JobStatus::Failed {
      reason: "损坏帧比例超出容忍".to_string(),
    });
    assert!(job.progress() < 1.0);
  }

  #[test]
  fn completed_progress_is_exactly_one() {
    let mut job = image_job();
    job.transition(JobStatus::Running);
    job.transition(JobStatus::Completed);
    assert_eq!(job.progress(), 1.0);
  }

  #[test]
  fn unknown_total_reports_zero_until_done() {
    let mut job = Job::new(JobId(2), MediaInput::from_path("b.mp4").unwrap());
    job.frames_total = None;
    job.transition(JobStatus::Running);
    job.frames_done = 42;
    assert_eq!(job.progress(), 0.0);
  }

  #[test]
  fn job_id_display() {
    assert_eq!(JobId(7).to_string(), "job-000007");
  }
}
