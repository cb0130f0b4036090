// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xunxiong::{
  Detector, JobRunner, JobStatus, MediaInput, ModelAdapter, PipelineConfig, model::BlobDetector,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input.display());
  info!("输出文件: {}", args.output.display());
  info!("置信度阈值: {}", args.confidence);

  let media = MediaInput::from_path(&args.input).context("无法识别输入媒体")?;
  info!("媒体类型: {}", media.kind);

  let config = PipelineConfig {
    confidence_threshold: args.confidence,
    classes: if args.classes.is_empty() {
      None
    } else {
      Some(args.classes.iter().cloned().collect::<BTreeSet<_>>())
    },
    worker_pool_size: args.workers,
    corrupt_frame_tolerance: args.corrupt_tolerance,
    eager_model_load: args.eager_load,
    ..PipelineConfig::default()
  };

  let adapter =
    ModelAdapter::lazy(Box::new(|| Ok(Box::new(BlobDetector::default()) as Box<dyn Detector>)));
  let runner = Arc::new(JobRunner::new(config, adapter).context("任务执行器启动失败")?);

  let job_id = runner.submit(media)?;
  info!("{} 已提交", job_id);

  // Ctrl-C 取消当前任务
  {
    let runner = runner.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，取消任务...");
      runner.cancel(job_id);
      std::thread::spawn(|| {
        std::thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法注册 Ctrl-C 处理器")?;
  }

  // 轮询进度直到终止
  let mut last_percent = -1i32;
  let job = loop {
    let job = runner.status(job_id)?;
    if job.status.is_terminal() {
      break job;
    }
    let percent = (job.progress() * 100.0) as i32;
    if percent != last_percent {
      info!("处理进度: {}%", percent);
      last_percent = percent;
    }
    std::thread::sleep(Duration::from_millis(200));
  };

  match job.status {
    JobStatus::Completed => {
      if !job.skipped_frames.is_empty() {
        warn!("跳过了 {} 个损坏帧: {:?}", job.skipped_frames.len(), job.skipped_frames);
      }
      let artifact = runner.download(job_id)?;
      match artifact.payload.path() {
        Some(path) => {
          std::fs::copy(path, &args.output).context("复制视频制品失败")?;
        }
        None => {
          std::fs::write(&args.output, artifact.payload.bytes()?).context("写入图片制品失败")?;
        }
      }
      info!("处理完成，结果已写入 {}", args.output.display());
      Ok(())
    }
    JobStatus::Cancelled => {
      warn!("任务已取消，未生成输出");
      Ok(())
    }
    JobStatus::Failed { reason } => bail!("任务失败: {}", reason),
    _ => unreachable!("终止状态检查已保证"),
  }
}
