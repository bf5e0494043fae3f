//! End-to-end job lifecycle tests over mock capabilities

mod helpers;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use helpers::{
    generate_test_wav, read_wav_frames, test_runner, wait_processing, wait_terminal,
    AudioConfig, CopyFetcher, CountingSeparator, EchoLoader,
};
use replay_common::events::{EventBus, ReplayEvent};
use replay_common::fingerprint::file_fingerprint;
use replay_vc::capabilities::DirectoryModelLoader;
use replay_vc::models::{ConversionRequest, JobStatus, OutputFormat};
use replay_vc::services::{
    ConversionJobRunner, FfmpegLocation, JobExecutor, JobLifecycleManager,
};

fn start(executor: Arc<dyn JobExecutor>, output: &Path) -> JobLifecycleManager {
    JobLifecycleManager::start(executor, EventBus::new(100), output.to_path_buf())
}

fn source(dir: &TempDir, name: &str, config: &AudioConfig) -> PathBuf {
    generate_test_wav(&dir.path().join("input").join(name), config).unwrap()
}

fn vocals_only(source: &Path, output: &Path) -> ConversionRequest {
    let mut request = ConversionRequest::new(source.display().to_string());
    request.output_directory = Some(output.to_path_buf());
    request.options.vocals_only = true;
    request
}

fn full_conversion(source: &Path, output: &Path, model_dir: &Path) -> ConversionRequest {
    let mut request = ConversionRequest::new(source.display().to_string());
    request.output_directory = Some(output.to_path_buf());
    request.model_path = Some(model_dir.to_path_buf());
    request.options.output_format = OutputFormat::Wav;
    request
}

#[tokio::test]
async fn test_pre_stemmed_vocals_only_returns_vocals_unmodified() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "vocals.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let separator = CountingSeparator::new();
    let loader = EchoLoader::new(16000);
    let manager = start(
        Arc::new(test_runner(separator.clone(), loader.clone())),
        &out,
    );

    let mut request = vocals_only(&input, &out);
    request.options.pre_stemmed = true;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let output = job.artifacts.output.clone().unwrap();
    assert_eq!(Some(output.clone()), job.artifacts.vocals);
    assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
    assert_eq!(separator.calls(), 0);
    assert_eq!(loader.loads(), 0);
    assert_eq!(job.message, "Complete!");
    assert_eq!(job.song_hash.as_deref().map(str::len), Some(16));
}

#[tokio::test]
async fn test_second_job_reuses_cached_separation() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let separator = CountingSeparator::new();
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let first = manager.submit(vocals_only(&input, &out)).unwrap();
    let second = manager.submit(vocals_only(&input, &out)).unwrap();
    let first = wait_terminal(&manager, &first).await;
    let second = wait_terminal(&manager, &second).await;

    assert_eq!(first.status, JobStatus::Completed, "error: {:?}", first.error);
    assert_eq!(second.status, JobStatus::Completed, "error: {:?}", second.error);
    assert_eq!(separator.calls(), 1);
    assert_eq!(first.artifacts.output, second.artifacts.output);
    let vocals = first.artifacts.vocals.unwrap();
    assert!(vocals.starts_with(out.join("stems").join("UVRMDXNETVocFT")));
    assert!(first.artifacts.instrumentals.unwrap().ends_with("no_vocals.wav"));
}

#[tokio::test]
async fn test_full_conversion_writes_final_mix() {
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "song.wav",
        &AudioConfig {
            duration_seconds: 3.0,
            sample_rate: 44100,
            channels: 2,
            ..Default::default()
        },
    );
    let out = dir.path().join("out");
    let model_dir = dir.path().join("models/narrator");
    std::fs::create_dir_all(&model_dir).unwrap();
    let separator = CountingSeparator::new();
    let loader = EchoLoader::new(16000);
    let manager = start(
        Arc::new(test_runner(separator.clone(), loader.clone())),
        &out,
    );

    let id = manager
        .submit(full_conversion(&input, &out, &model_dir))
        .unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(loader.loads(), 1);
    assert_eq!(separator.calls(), 1);

    let converted = job.artifacts.converted_vocals.clone().unwrap();
    assert_eq!(
        converted,
        out.join(&id).join("audio-outputs").join("converted_vocals.wav")
    );
    let (_, converted_rate, _) = read_wav_frames(&converted);
    assert_eq!(converted_rate, 16000);

    let output = job.artifacts.output.clone().unwrap();
    assert_eq!(output, out.join(&id).join("final.wav"));
    // Instrumental length and layout govern the mix
    assert_eq!(read_wav_frames(&output), (3 * 44100, 44100, 2));

    // Pitch curve cached beside the vocal stem
    let stem_dir = job.artifacts.vocals.unwrap().parent().unwrap().to_path_buf();
    let cached: Vec<_> = std::fs::read_dir(&stem_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "f0"))
        .collect();
    assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn test_pre_stemmed_conversion_exports_vocal_alone() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "acapella.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let model_dir = dir.path().join("model");
    std::fs::create_dir_all(&model_dir).unwrap();
    let separator = CountingSeparator::new();
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let mut request = full_conversion(&input, &out, &model_dir);
    request.options.pre_stemmed = true;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(separator.calls(), 0);
    assert!(job.artifacts.instrumentals.is_none());
    let converted = read_wav_frames(&job.artifacts.converted_vocals.unwrap());
    let output = read_wav_frames(&job.artifacts.output.unwrap());
    assert_eq!(converted, output);
}

#[tokio::test]
async fn test_mp3_output_without_ffmpeg_is_a_dependency_error() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let model_dir = dir.path().join("model");
    std::fs::create_dir_all(&model_dir).unwrap();
    let manager = start(
        Arc::new(test_runner(CountingSeparator::new(), EchoLoader::new(16000))),
        &out,
    );

    let mut request = full_conversion(&input, &out, &model_dir);
    request.options.output_format = OutputFormat::Mp3_320k;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Errored);
    assert!(job.error.unwrap().contains("ffmpeg not found"));
    // Fails before any file is written
    assert!(!out.join("originals").exists());
}

#[tokio::test]
async fn test_model_directory_without_weights_errors() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let model_dir = dir.path().join("empty-model");
    std::fs::create_dir_all(&model_dir).unwrap();
    let runner = ConversionJobRunner::new(
        CountingSeparator::new(),
        Arc::new(DirectoryModelLoader),
        Arc::new(helpers::NoFetcher),
    )
    .with_ffmpeg(FfmpegLocation::Disabled);
    let manager = start(Arc::new(runner), &out);

    let id = manager
        .submit(full_conversion(&input, &out, &model_dir))
        .unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Errored);
    assert!(job.error.unwrap().starts_with("No model files found"));
    // Stems from the failed run stay on disk for a retry
    assert!(job.artifacts.vocals.unwrap().is_file());
}

#[tokio::test]
async fn test_stop_before_dequeue_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let untouched = dir.path().join("untouched");
    let separator = CountingSeparator::slow(Duration::from_millis(300));
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let running = manager.submit(vocals_only(&input, &out)).unwrap();
    let queued = manager.submit(vocals_only(&input, &untouched)).unwrap();
    assert_eq!(manager.request_stop(&queued), Some(true));
    assert_eq!(manager.request_stop(&queued), Some(true));

    let queued = wait_terminal(&manager, &queued).await;
    assert_eq!(queued.status, JobStatus::Stopped);
    assert_eq!(queued.message, "Job stopped");
    assert!(!untouched.exists());

    let running = wait_terminal(&manager, &running).await;
    assert_eq!(running.status, JobStatus::Completed);
    assert_eq!(separator.calls(), 1);
}

#[tokio::test]
async fn test_stop_during_separation_keeps_stems_for_retry() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let model_dir = dir.path().join("model");
    std::fs::create_dir_all(&model_dir).unwrap();
    let separator = CountingSeparator::slow(Duration::from_millis(300));
    let loader = EchoLoader::new(16000);
    let manager = start(
        Arc::new(test_runner(separator.clone(), loader.clone())),
        &out,
    );

    let id = manager
        .submit(full_conversion(&input, &out, &model_dir))
        .unwrap();
    wait_processing(&manager, &id).await;
    manager.request_stop(&id);
    let stopped = wait_terminal(&manager, &id).await;

    assert_eq!(stopped.status, JobStatus::Stopped);
    assert!(stopped.error.is_none());
    assert_eq!(loader.loads(), 0);
    assert!(!out.join(&id).exists());

    let retry = manager
        .submit(full_conversion(&input, &out, &model_dir))
        .unwrap();
    let retry = wait_terminal(&manager, &retry).await;
    assert_eq!(retry.status, JobStatus::Completed, "error: {:?}", retry.error);
    assert_eq!(separator.calls(), 1);
}

#[tokio::test]
async fn test_jobs_complete_in_submission_order() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let manager = start(
        Arc::new(test_runner(CountingSeparator::new(), EchoLoader::new(16000))),
        &out,
    );
    let mut events = manager.event_bus().subscribe();

    let mut submitted = Vec::new();
    for (i, frequency) in [220.0, 330.0, 440.0].into_iter().enumerate() {
        let input = source(
            &dir,
            &format!("song{}.wav", i),
            &AudioConfig {
                frequency,
                duration_seconds: 1.0,
                ..Default::default()
            },
        );
        submitted.push(manager.submit(vocals_only(&input, &out)).unwrap());
    }

    let mut completed = Vec::new();
    while completed.len() < submitted.len() {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("event before timeout")
            .unwrap();
        match event {
            ReplayEvent::JobCompleted { job_id, .. } => completed.push(job_id),
            ReplayEvent::JobFailed { error, .. } => panic!("job failed: {}", error),
            _ => {}
        }
    }
    assert_eq!(completed, submitted);

    let listed: Vec<_> = manager.list().into_iter().map(|j| j.job_id).collect();
    assert_eq!(listed, submitted);
}

#[tokio::test]
async fn test_clear_queued_job_skips_it() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let other = dir.path().join("other");
    let separator = CountingSeparator::slow(Duration::from_millis(200));
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let running = manager.submit(vocals_only(&input, &out)).unwrap();
    let queued = manager.submit(vocals_only(&input, &other)).unwrap();
    assert!(manager.clear(&queued));
    assert!(!manager.clear(&queued));
    assert!(manager.snapshot(&queued).is_none());

    wait_terminal(&manager, &running).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!other.exists());
    assert_eq!(separator.calls(), 1);
    assert_eq!(manager.list().len(), 1);
}

#[tokio::test]
async fn test_clear_running_job_lets_it_finish() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let separator = CountingSeparator::slow(Duration::from_millis(200));
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );
    let mut events = manager.event_bus().subscribe();

    let id = manager.submit(vocals_only(&input, &out)).unwrap();
    wait_processing(&manager, &id).await;
    assert!(manager.clear(&id));
    assert!(manager.status(&id).is_err());

    // The worker moves on to the next job once the cleared one finishes
    let next = manager.submit(vocals_only(&input, &out)).unwrap();
    let next = wait_terminal(&manager, &next).await;
    assert_eq!(next.status, JobStatus::Completed);
    assert_eq!(separator.calls(), 1);
    assert!(manager.snapshot(&id).is_none());

    let mut saw_cleared = false;
    while let Ok(event) = events.try_recv() {
        if let ReplayEvent::JobCleared { job_id, .. } = event {
            saw_cleared |= job_id == id;
        }
    }
    assert!(saw_cleared);
}

#[tokio::test]
async fn test_panicking_separator_does_not_stall_the_queue() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let separator = CountingSeparator::new();
    separator.panic_next.store(true, Ordering::SeqCst);
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let crashed = manager.submit(vocals_only(&input, &out)).unwrap();
    let healthy = manager.submit(vocals_only(&input, &out)).unwrap();

    let crashed = wait_terminal(&manager, &crashed).await;
    assert_eq!(crashed.status, JobStatus::Errored);
    let error = crashed.error.unwrap();
    assert!(error.contains("Worker panicked"), "{}", error);
    assert!(error.contains("separator crashed"), "{}", error);

    let healthy = wait_terminal(&manager, &healthy).await;
    assert_eq!(healthy.status, JobStatus::Completed);
    assert_eq!(separator.calls(), 2);
}

#[tokio::test]
async fn test_de_echo_runs_second_pass_on_vocal_copy() {
    let dir = TempDir::new().unwrap();
    let input = source(&dir, "song.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let separator = CountingSeparator::new();
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let mut request = vocals_only(&input, &out);
    request.options.de_echo_de_reverb = true;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(separator.calls(), 2);
    let pre_deecho = job.artifacts.pre_deecho_vocals.clone().unwrap();
    assert!(pre_deecho.starts_with(out.join("stems")));
    let copy = out
        .join("stems")
        .join("vocals_copies")
        .join(format!("{}.wav", file_fingerprint(&pre_deecho).unwrap()));
    assert!(copy.is_file());
    let vocals = job.artifacts.vocals.unwrap();
    assert!(vocals.starts_with(out.join("stems").join("UVRDeEchoDeReverbbyFoxJoy")));
    assert_eq!(job.artifacts.output, Some(vocals));
}

#[tokio::test]
async fn test_de_echo_follows_each_sample_window() {
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "long.wav",
        &AudioConfig {
            duration_seconds: 40.0,
            frequency: 331.7,
            ..Default::default()
        },
    );
    let out = dir.path().join("out");
    let separator = CountingSeparator::new();
    let manager = start(
        Arc::new(test_runner(separator.clone(), EchoLoader::new(16000))),
        &out,
    );

    let mut jobs = Vec::new();
    for start_time in [0.0, 7.0] {
        let mut request = vocals_only(&input, &out);
        request.options.de_echo_de_reverb = true;
        request.options.sample_mode = true;
        request.options.sample_mode_start_time = start_time;
        let id = manager.submit(request).unwrap();
        jobs.push(wait_terminal(&manager, &id).await);
    }

    for job in &jobs {
        assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
        let sample = job.artifacts.input_path.clone().unwrap();
        let output = job.artifacts.output.clone().unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&sample).unwrap());
    }
    assert_ne!(jobs[0].artifacts.output, jobs[1].artifacts.output);
    assert_eq!(separator.calls(), 4);
}

#[tokio::test]
async fn test_sample_mode_cuts_thirty_seconds() {
    let dir = TempDir::new().unwrap();
    let input = source(
        &dir,
        "long.wav",
        &AudioConfig {
            duration_seconds: 40.0,
            sample_rate: 44100,
            ..Default::default()
        },
    );
    let out = dir.path().join("out");
    let manager = start(
        Arc::new(test_runner(CountingSeparator::new(), EchoLoader::new(16000))),
        &out,
    );

    let mut request = vocals_only(&input, &out);
    request.options.pre_stemmed = true;
    request.options.sample_mode = true;
    request.options.sample_mode_start_time = 5.0;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let output = job.artifacts.output.unwrap();
    let expected_name = format!("sample_{}_5.wav", job.song_hash.unwrap());
    assert_eq!(output, out.join("originals").join(expected_name));
    assert_eq!(read_wav_frames(&output), (30 * 44100, 44100, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_source_is_downloaded_first() {
    let dir = TempDir::new().unwrap();
    let local = source(&dir, "remote.wav", &AudioConfig::default());
    let out = dir.path().join("out");
    let fetcher = Arc::new(CopyFetcher {
        source: local.clone(),
        calls: AtomicUsize::new(0),
    });
    let runner = ConversionJobRunner::new(
        CountingSeparator::new(),
        EchoLoader::new(16000),
        fetcher.clone(),
    )
    .with_ffmpeg(FfmpegLocation::Disabled);
    let manager = start(Arc::new(runner), &out);

    let mut request = ConversionRequest::new("https://example.com/media/track.wav");
    request.output_directory = Some(out.clone());
    request.options.vocals_only = true;
    request.options.pre_stemmed = true;
    let id = manager.submit(request).unwrap();
    let job = wait_terminal(&manager, &id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(out.join("downloads").join("track.wav").is_file());
    assert_eq!(job.track_name, "track");
    let input_path = job.artifacts.input_path.unwrap();
    assert!(input_path.starts_with(out.join("originals")));
}
