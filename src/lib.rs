// 该文件是 Xunxiong （寻熊） 项目的一部分。
// src/lib.rs - 库入口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! Xunxiong （寻熊）
//!
//! 面向图片与视频的目标检测流水线：接受媒体输入，逐帧运行
//! 检测模型，把检测框与标签绘制到帧上，并将结果编码为可下载
//! 的制品。任务异步执行，支持进度查询与取消。

pub mod annotate;
pub mod config;
pub mod error;
pub mod input;
pub mod job;
pub mod media;
pub mod model;
pub mod output;
pub mod runner;
pub mod store;

pub use annotate::Annotator;
pub use config::{EvictionPolicy, PipelineConfig};
pub use error::{PipelineError, Result};
pub use input::{Frame, FrameSource};
pub use job::{Job, JobId, JobStatus};
pub use media::{MediaInput, MediaKind};
pub use model::{Detection, Detector, ModelAdapter};
pub use runner::JobRunner;
pub use store::{ArtifactPayload, ArtifactStore, ResultArtifact};
