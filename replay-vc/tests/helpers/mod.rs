//! Test Helper Utilities
//!
//! Shared utilities for testing replay-vc

#![allow(dead_code)]

pub mod audio_generator;
pub mod mocks;

pub use audio_generator::{generate_test_wav, read_wav_frames, AudioConfig};
pub use mocks::{
    test_runner, CopyFetcher, CountingSeparator, EchoLoader, EchoModel, FlatEstimator,
    NoFetcher,
};

use std::time::Duration;

use replay_vc::models::Job;
use replay_vc::services::JobLifecycleManager;

/// Poll until the job reaches a terminal status
pub async fn wait_terminal(manager: &JobLifecycleManager, job_id: &str) -> Job {
    for _ in 0..1000 {
        if let Some(job) = manager.snapshot(job_id) {
            if job.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal status", job_id);
}

/// Poll until the job is processing
pub async fn wait_processing(manager: &JobLifecycleManager, job_id: &str) {
    for _ in 0..1000 {
        if let Ok(status) = manager.status(job_id) {
            if status == replay_vc::models::JobStatus::Processing {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never started", job_id);
}
