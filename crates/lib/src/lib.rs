//! # coursesync: Offline-First Course Sync
//!
//! This crate keeps an e-learning client usable with poor connectivity. Course
//! content is downloaded into a local embedded store, writes (progress, quiz
//! attempts, forum posts, AI-tutor questions) are committed locally first and
//! staged in an outbox, and the outbox is replayed against the remote server
//! when connectivity returns.
//!
//! The main entry point is [`OfflineClient`], which wires together the
//! [`LocalStore`], [`ConnectivityMonitor`], [`ContentDownloader`],
//! [`SyncEngine`] and [`AiResponseCache`].

pub mod ai_cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod downloader;
pub mod errors;
pub mod media;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

pub use ai_cache::AiResponseCache;
pub use client::{BackgroundTasks, OfflineClient};
pub use config::SyncConfig;
pub use connectivity::ConnectivityMonitor;
pub use downloader::{ContentDownloader, CourseVerification, DownloadReport};
pub use errors::{
    ClearError, ConfigError, DownloadError, MediaError, RemoteError, StoreError, SyncError,
};
pub use media::MediaCache;
pub use remote::{HttpRemoteApi, RemoteApi};
pub use store::LocalStore;
pub use sync::{DrainReport, PermanentFailureHook, SyncEngine};
pub use types::*;
