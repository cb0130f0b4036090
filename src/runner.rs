// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/runner.rs - 任务执行器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 任务执行器模块
//!
//! 对每个提交的媒体输入编排 输入源 → 模型适配器 → 标注器 → 制品
//! 写入器 的逐帧处理，跟踪进度并支持取消。提交是非阻塞的：任务
//! 进入队列后由固定大小的工作线程池消费，调用方（UI 层）通过
//! `status` / `progress` 轮询，永远不会被检测工作阻塞。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::input::{FrameSource, open_source};
use crate::job::{Job, JobId, JobStatus};
use crate::media::MediaInput;
use crate::model::ModelAdapter;
use crate::output::create_writer;
use crate::store::{ArtifactStore, ResultArtifact};

/// 队列中的待处理任务
struct WorkItem {
  /// 任务标识
  job_id: JobId,
  /// 媒体输入
  media: MediaInput,
  /// 调用方注入的输入源（None 表示按媒体类型打开）
  source: Option<Box<dyn FrameSource + Send>>,
}

/// 任务执行器
///
/// UI 层只需要 `submit` / `status` / `progress` / `cancel` / `download`
/// 五个调用，永远不直接接触输入源、模型适配器或标注器。
pub struct JobRunner {
  /// 流水线配置
  config: Arc<PipelineConfig>,
  /// 模型适配器（全部任务共享只读）
  adapter: Arc<ModelAdapter>,
  /// 制品仓库
  store: Arc<ArtifactStore>,
  /// 任务表
  jobs: Arc<Mutex<HashMap<JobId, Job>>>,
  /// 取消标志表
  cancel_flags: Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>,
  /// 任务队列发送端
  work_tx: Option<mpsc::Sender<WorkItem>>,
  /// 工作线程
  workers: Vec<JoinHandle<()>>,
  /// 任务标识计数器
  next_id: AtomicU64,
}

impl JobRunner {
  /// 创建一个新的任务执行器并启动工作线程池
  pub fn new(config: PipelineConfig, adapter: ModelAdapter) -> Result<Self> {
    let store = Arc::new(ArtifactStore::new(config.artifact_eviction.clone()));
    Self::with_store(config, adapter, store)
  }

  /// 使用外部制品仓库创建任务执行器
  pub fn with_store(
    config: PipelineConfig,
    adapter: ModelAdapter,
    store: Arc<ArtifactStore>,
  ) -> Result<Self> {
    let adapter = Arc::new(adapter);
    if config.eager_model_load {
      adapter.warm_up()?;
    }

    let pool_size = config.worker_pool_size.max(1);
    let config = Arc::new(config);
    let jobs: Arc<Mutex<HashMap<JobId, Job>>> = Arc::new(Mutex::new(HashMap::new()));
    let cancel_flags: Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>> =
      Arc::new(Mutex::new(HashMap::new()));

    let (work_tx, work_rx) = mpsc::channel::<WorkItem>();
    let work_rx = Arc::new(Mutex::new(work_rx));

    let mut workers = Vec::with_capacity(pool_size);
    for worker_index in 0..pool_size {
      let work_rx = work_rx.clone();
      let worker = Worker {
        config: config.clone(),
        adapter: adapter.clone(),
        annotator: Annotator::new(),
        store: store.clone(),
        jobs: jobs.clone(),
        cancel_flags: cancel_flags.clone(),
      };

      let handle = std::thread::Builder::new()
        .name(format!("xunxiong-worker-{}", worker_index))
        .spawn(move || {
          loop {
            // 仅在等待队列时持锁
            let item = { work_rx.lock().expect("任务队列锁中毒").recv() };
            match item {
              Ok(item) => worker.run_job(item),
              Err(_) => break, // 队列关闭，线程退出
            }
          }
        })?;
      workers.push(handle);
    }

    info!("任务执行器已启动: {} 个工作线程", pool_size);

    Ok(Self {
      config,
      adapter,
      store,
      jobs,
      cancel_flags,
      work_tx: Some(work_tx),
      workers,
      next_id: AtomicU64::new(1),
    })
  }

  /// 提交一个媒体输入
  ///
  /// 立即返回任务标识，不等待处理开始或结束。
  pub fn submit(&self, media: MediaInput) -> Result<JobId> {
    self.enqueue(media, None)
  }

  /// 提交一个媒体输入并注入自定义输入源
  ///
  /// 用于调用方自带帧序列的场景（实时流、合成帧等）。
  pub fn submit_source(
    &self,
    media: MediaInput,
    source: Box<dyn FrameSource + Send>,
  ) -> Result<JobId> {
    self.enqueue(media, Some(source))
  }

  fn enqueue(
    &self,
    media: MediaInput,
    source: Option<Box<dyn FrameSource + Send>>,
  ) -> Result<JobId> {
    let job_id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
    let job = Job::new(job_id, media.clone());

    self.jobs.lock().expect("任务表锁中毒").insert(job_id, job);
    self
      .cancel_flags
      .lock()
      .expect("取消标志锁中毒")
      .insert(job_id, Arc::new(AtomicBool::new(false)));

    let tx = self
      .work_tx
      .as_ref()
      .ok_or_else(|| PipelineError::Encode("任务执行器已关闭".to_string()))?;
    tx.send(WorkItem {
      job_id,
      media,
      source,
    })
    .map_err(|_| PipelineError::Encode("任务队列已关闭".to_string()))?;

    debug!("{} 已提交", job_id);
    Ok(job_id)
  }

  /// 查询任务状态（非阻塞，终止后仍可查询）
  pub fn status(&self, job_id: JobId) -> Result<Job> {
    self
      .jobs
      .lock()
      .expect("任务表锁中毒")
      .get(&job_id)
      .cloned()
      .ok_or(PipelineError::NotFound(job_id))
  }

  /// 查询任务进度（0.0 - 1.0，非阻塞）
  pub fn progress(&self, job_id: JobId) -> Result<f32> {
    Ok(self.status(job_id)?.progress())
  }

  /// 请求取消任务
  ///
  /// Pending 任务立即转为 Cancelled；Running 任务在下一个帧边界
  /// 停止。对终止状态的任务是空操作。
  pub fn cancel(&self, job_id: JobId) {
    let mut jobs = self.jobs.lock().expect("任务表锁中毒");
    let Some(job) = jobs.get_mut(&job_id) else {
      return;
    };

    match job.status {
      JobStatus::Pending => {
        job.transition(JobStatus::Cancelled);
        info!("{} 在排队时被取消", job_id);
      }
      JobStatus::Running => {
        if let Some(flag) = self.cancel_flags.lock().expect("取消标志锁中毒").get(&job_id) {
          flag.store(true, Ordering::SeqCst);
          info!("{} 收到取消请求", job_id);
        }
      }
      _ => {}
    }
  }

  /// 下载任务制品
  ///
  /// 任务未完成或制品已清除时返回 [`PipelineError::NotFound`]。
  pub fn download(&self, job_id: JobId) -> Result<Arc<ResultArtifact>> {
    self.store.get(job_id)
  }

  /// 制品仓库句柄（用于显式清除）
  pub fn store(&self) -> &Arc<ArtifactStore> {
    &self.store
  }

  /// 流水线配置
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 模型适配器句柄
  pub fn adapter(&self) -> &Arc<ModelAdapter> {
    &self.adapter
  }

  /// 等待指定任务进入终止状态（轮询，测试与 CLI 使用）
  pub fn wait_terminal(&self, job_id: JobId, poll: std::time::Duration) -> Result<Job> {
    loop {
      let job = self.status(job_id)?;
      if job.status.is_terminal() {
        return Ok(job);
      }
      std::thread::sleep(poll);
    }
  }
}

impl Drop for JobRunner {
  fn drop(&mut self) {
    // 关闭队列并等待工作线程退出
    drop(self.work_tx.take());
    for handle in self.workers.drain(..) {
      let _ = handle.join();
    }
  }
}

/// 工作线程上下文
struct Worker {
  config: Arc<PipelineConfig>,
  adapter: Arc<ModelAdapter>,
  annotator: Annotator,
  store: Arc<ArtifactStore>,
  jobs: Arc<Mutex<HashMap<JobId, Job>>>,
  cancel_flags: Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>,
}

/// 单个任务的执行结果
enum JobOutcome {
  Completed(ResultArtifact),
  Cancelled,
  Failed(String),
}

impl Worker {
  /// 更新任务表中的任务
  fn with_job<F: FnOnce(&mut Job)>(&self, job_id: JobId, f: F) {
    if let Some(job) = self.jobs.lock().expect("任务表锁中毒").get_mut(&job_id) {
      f(job);
    }
  }

  /// 取出任务的取消标志
  fn cancel_flag(&self, job_id: JobId) -> Arc<AtomicBool> {
    self
      .cancel_flags
      .lock()
      .expect("取消标志锁中毒")
      .get(&job_id)
      .cloned()
      .unwrap_or_else(|| Arc::new(AtomicBool::new(false)))
  }

  /// 执行一个任务
  fn run_job(&self, item: WorkItem) {
    let job_id = item.job_id;

    // 排队期间可能已被取消
    let mut already_terminal = false;
    self.with_job(job_id, |job| {
      if job.status.is_terminal() {
        already_terminal = true;
      } else {
        job.transition(JobStatus::Running);
      }
    });
    if already_terminal {
      self.release(job_id);
      return;
    }

    info!("{} 开始处理 {} ({})", job_id, item.media.path.display(), item.media.kind);

    let outcome = self.process(job_id, item);

    match outcome {
      JobOutcome::Completed(artifact) => {
        // 制品先入库，再公布 Completed，保证 Completed 任务总能下载
        self.store.put(artifact);
        self.with_job(job_id, |job| {
          if let Some(total) = job.frames_total {
            job.frames_done = job.frames_done.max(total);
          }
          job.transition(JobStatus::Completed);
        });
        info!("{} 处理完成", job_id);
      }
      JobOutcome::Cancelled => {
        self.with_job(job_id, |job| {
          job.transition(JobStatus::Cancelled);
        });
        info!("{} 已取消，部分结果已丢弃", job_id);
      }
      JobOutcome::Failed(reason) => {
        self.with_job(job_id, |job| {
          job.transition(JobStatus::Failed {
            reason: reason.clone(),
          });
        });
        warn!("{} 失败: {}", job_id, reason);
      }
    }

    self.release(job_id);
  }

  /// 释放任务的取消标志
  fn release(&self, job_id: JobId) {
    self.cancel_flags.lock().expect("取消标志锁中毒").remove(&job_id);
  }

  /// 逐帧处理主循环
  ///
  /// 输入源与制品写入器都是作用域内获取的资源，任何退出路径
  /// （完成、失败、取消）都会随返回释放它们。
  fn process(&self, job_id: JobId, item: WorkItem) -> JobOutcome {
    let cancel = self.cancel_flag(job_id);
    let kind = item.media.kind;

    // 打开输入源
    let mut source = match item.source {
      Some(source) => source,
      None => match open_source(&item.media) {
        Ok(source) => source,
        Err(e) => return JobOutcome::Failed(e.to_string()),
      },
    };

    // 总帧数在打开输入源后才可知
    let frames_total = source.frame_count();
    self.with_job(job_id, |job| {
      job.frames_total = job.frames_total.or(frames_total);
    });

    // 创建制品写入器
    let mut writer = match create_writer(kind, source.fps()) {
      Ok(writer) => writer,
      Err(e) => return JobOutcome::Failed(e.to_string()),
    };

    let mut frames_seen = 0u64;
    let mut skipped = 0u64;

    loop {
      // 取消检查：每个帧边界至少一次
      if cancel.load(Ordering::SeqCst) {
        return JobOutcome::Cancelled;
      }

      let frame = match source.next() {
        Some(frame) => frame,
        None => break,
      };

      frames_seen += 1;

      match frame {
        Ok(frame) => {
          // 推理，对单帧失败重试一次
          let detections = match self.detect_with_retry(&frame.image) {
            Ok(detections) => detections,
            Err(DetectOutcome::SkipFrame(reason)) => {
              skipped += 1;
              warn!("{} 第 {} 帧推理失败，跳过: {}", job_id, frame.index, reason);
              self.with_job(job_id, |job| {
                job.skipped_frames.push(frame.index);
                job.frames_done += 1;
              });
              if let Some(reason) = self.tolerance_exceeded(skipped, frames_total) {
                return JobOutcome::Failed(reason);
              }
              continue;
            }
            Err(DetectOutcome::Fatal(reason)) => return JobOutcome::Failed(reason),
          };

          // 置信度与类别过滤在此处完成，标注器只收到要绘制的结果
          let kept: Vec<_> = detections
            .into_iter()
            .filter(|d| self.config.keeps_detection(d))
            .collect();

          let annotated = self.annotator.render(&frame.image, &kept);
          if let Err(e) = writer.write_frame(&annotated) {
            return JobOutcome::Failed(format!("写入输出失败: {}", e));
          }

          self.with_job(job_id, |job| {
            job.frames_done += 1;
          });
        }
        Err(e) if e.is_frame_level() => {
          // 损坏帧：跳过并计入进度与诊断
          skipped += 1;
          let index = match &e {
            PipelineError::CorruptFrame { index, .. } => *index,
            _ => frames_seen - 1,
          };
          warn!("{} 第 {} 帧损坏，跳过: {}", job_id, index, e);
          self.with_job(job_id, |job| {
            job.skipped_frames.push(index);
            job.frames_done += 1;
          });
          if let Some(reason) = self.tolerance_exceeded(skipped, frames_total) {
            return JobOutcome::Failed(reason);
          }
        }
        Err(e) => return JobOutcome::Failed(e.to_string()),
      }
    }

    // 总帧数未知时在结尾用实际帧数校验损坏比例
    if let Some(reason) = self.tolerance_exceeded(skipped, Some(frames_seen)) {
      return JobOutcome::Failed(reason);
    }

    // 总帧数未知的输入源到此刻才能确定总数
    self.with_job(job_id, |job| {
      if job.frames_total.is_none() {
        job.frames_total = Some(frames_seen);
      }
    });

    match writer.finish() {
      Ok(payload) => JobOutcome::Completed(ResultArtifact::new(job_id, kind, payload)),
      Err(e) => JobOutcome::Failed(format!("制品编码失败: {}", e)),
    }
  }

  /// 判断跳帧比例是否超出容忍
  ///
  /// 总帧数未知时不做中途判断，结尾用实际帧数再校验一次。
  fn tolerance_exceeded(&self, skipped: u64, total: Option<u64>) -> Option<String> {
    let total = total.filter(|t| *t > 0)?;
    let ratio = skipped as f32 / total as f32;
    if ratio > self.config.corrupt_frame_tolerance {
      Some(format!(
        "损坏帧比例 {:.0}% 超出容忍上限 {:.0}%",
        ratio * 100.0,
        self.config.corrupt_frame_tolerance * 100.0
      ))
    } else {
      None
    }
  }

  /// 推理并在单帧失败时重试一次
  fn detect_with_retry(
    &self,
    image: &image::RgbImage,
  ) -> std::result::Result<Vec<crate::model::Detection>, DetectOutcome> {
    match self.adapter.detect(image) {
      Ok(detections) => Ok(detections),
      Err(PipelineError::Inference(first)) => {
        debug!("推理失败，重试一次: {}", first);
        match self.adapter.detect(image) {
          Ok(detections) => Ok(detections),
          Err(PipelineError::Inference(second)) => Err(DetectOutcome::SkipFrame(second)),
          Err(e) => Err(DetectOutcome::Fatal(e.to_string())),
        }
      }
      // 模型加载失败在调用处暴露，属任务级错误
      Err(e) => Err(DetectOutcome::Fatal(e.to_string())),
    }
  }
}

/// 推理失败的处理决定
enum DetectOutcome {
  /// 跳过该帧（计入诊断）
  SkipFrame(String),
  /// 任务级失败
  Fatal(String),
}
