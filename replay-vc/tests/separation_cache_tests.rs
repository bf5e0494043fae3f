//! Separation cache under concurrency and across restarts

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::time::Duration;

use tempfile::TempDir;

use replay_vc::cache::SeparationCache;
use replay_vc::capabilities::{find_stem_model, SeparationError, StemModel, StemPaths};

fn model() -> &'static StemModel {
    find_stem_model("UVR-MDX-NET Voc FT").unwrap()
}

fn source_in(dir: &Path) -> std::path::PathBuf {
    let source = dir.join("song.wav");
    std::fs::write(&source, b"audio").unwrap();
    source
}

fn write_stems(paths: &StemPaths) -> Result<(), SeparationError> {
    std::fs::write(&paths.primary, b"vocals")?;
    if let Some(secondary) = &paths.secondary {
        std::fs::write(secondary, b"backing")?;
    }
    Ok(())
}

#[test]
fn test_concurrent_requests_compute_once() {
    let dir = TempDir::new().unwrap();
    let source = source_in(dir.path());
    let stems = dir.path().join("stems");
    let cache = SeparationCache::default();
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(8);

    let results: Vec<StemPaths> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache
                        .separate_or_reuse(&source, &stems, "song", model(), |paths| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            write_stems(paths)
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_different_output_dirs_compute_independently() {
    let dir = TempDir::new().unwrap();
    let source = source_in(dir.path());
    let cache = SeparationCache::default();
    let calls = AtomicUsize::new(0);
    let run = |paths: &StemPaths| {
        calls.fetch_add(1, Ordering::SeqCst);
        write_stems(paths)
    };

    let a = cache
        .separate_or_reuse(&source, &dir.path().join("a"), "song", model(), run)
        .unwrap();
    let b = cache
        .separate_or_reuse(&source, &dir.path().join("b"), "song", model(), run)
        .unwrap();

    assert_ne!(a.primary, b.primary);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_fresh_cache_reuses_stems_on_disk() {
    let dir = TempDir::new().unwrap();
    let source = source_in(dir.path());
    let stems = dir.path().join("stems");

    SeparationCache::default()
        .separate_or_reuse(&source, &stems, "song", model(), write_stems)
        .unwrap();

    // New instance, as after a service restart
    let restarted = SeparationCache::default();
    let paths = restarted
        .separate_or_reuse(&source, &stems, "song", model(), |_| {
            Err(SeparationError::Failed("separator should not run".into()))
        })
        .unwrap();
    assert_eq!(std::fs::read(&paths.primary).unwrap(), b"vocals");
}

#[test]
fn test_missing_secondary_stem_recomputes() {
    let dir = TempDir::new().unwrap();
    let source = source_in(dir.path());
    let stems = dir.path().join("stems");
    let cache = SeparationCache::default();
    let calls = AtomicUsize::new(0);
    let run = |paths: &StemPaths| {
        calls.fetch_add(1, Ordering::SeqCst);
        write_stems(paths)
    };

    let paths = cache
        .separate_or_reuse(&source, &stems, "song", model(), run)
        .unwrap();
    std::fs::remove_file(paths.secondary.as_ref().unwrap()).unwrap();

    cache
        .separate_or_reuse(&source, &stems, "song", model(), run)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(SeparationCache::is_complete(&paths));
}

#[test]
fn test_lock_table_stays_bounded() {
    let dir = TempDir::new().unwrap();
    let cache = SeparationCache::new(2);

    for i in 0..6 {
        let source = dir.path().join(format!("song{}.wav", i));
        std::fs::write(&source, b"audio").unwrap();
        let track = format!("song{}", i);
        cache
            .separate_or_reuse(&source, &dir.path().join("stems"), &track, model(), write_stems)
            .unwrap();
        assert!(cache.lock_count() <= 2);
    }
}

#[test]
fn test_separator_failure_propagates() {
    let dir = TempDir::new().unwrap();
    let source = source_in(dir.path());

    let err = SeparationCache::default()
        .separate_or_reuse(&source, &dir.path().join("stems"), "song", model(), |_| {
            Err(SeparationError::Unavailable("no backend".into()))
        })
        .unwrap_err();
    assert!(matches!(err, SeparationError::Unavailable(_)));
}
