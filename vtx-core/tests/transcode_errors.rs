//! Taxonomy coverage for the orchestrator's validation and input
//! resolution paths. Nothing here requires ffmpeg: tier bounds are checked
//! before the encoder preflight and input validation never spawns anything.

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vtx_core::error::{codes, ErrorKind};
use vtx_core::{OutputType, QualityTier, TranscodeOptions, Transcoder};

fn tier(width: u32, height: u32) -> QualityTier {
    QualityTier::new(width, height, "800k", "856k", "1200k", "64k")
}

async fn run_with(options: TranscodeOptions) -> vtx_core::StructuredError {
    let transcoder = Transcoder::new(options, None).unwrap();
    transcoder
        .run(&CancellationToken::new())
        .await
        .expect_err("run must fail")
}

#[tokio::test]
async fn missing_input_yields_file_not_found() {
    let dir = TempDir::new().unwrap();
    let options = TranscodeOptions::new(
        dir.path().join("nope.mp4").to_string_lossy().to_string(),
        dir.path().join("out"),
    );
    let err = run_with(options).await;
    assert_eq!(err.kind, ErrorKind::FileNotFound);
    assert_eq!(err.code, codes::FILE_NOT_FOUND);
}

#[tokio::test]
async fn directory_input_is_invalid_format_not_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let input_dir = dir.path().join("movie.mp4");
    std::fs::create_dir(&input_dir).unwrap();

    let options = TranscodeOptions::new(
        input_dir.to_string_lossy().to_string(),
        dir.path().join("out"),
    );
    let err = run_with(options).await;
    assert_eq!(err.kind, ErrorKind::InvalidFormat);
    assert_eq!(err.code, codes::INVALID_FILE_FORMAT);
}

#[tokio::test]
async fn unsupported_extension_has_its_own_code() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"plain text").unwrap();

    let options =
        TranscodeOptions::new(input.to_string_lossy().to_string(), dir.path().join("out"));
    let err = run_with(options).await;
    assert_eq!(err.kind, ErrorKind::InvalidFormat);
    assert_eq!(err.code, codes::UNSUPPORTED_FILE_FORMAT);
}

#[tokio::test]
async fn empty_input_reads_as_corrupted() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.mp4");
    std::fs::write(&input, b"").unwrap();

    let options =
        TranscodeOptions::new(input.to_string_lossy().to_string(), dir.path().join("out"));
    let err = run_with(options).await;
    assert_eq!(err.kind, ErrorKind::InvalidFormat);
    assert_eq!(err.code, codes::CORRUPTED_FILE);
}

#[tokio::test]
async fn ladder_bound_violations_are_distinguishable_by_code() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.mp4");
    std::fs::write(&input, b"dummy video content").unwrap();

    for (bad_tier, expected_code) in [
        (tier(0, 360), codes::INVALID_RESOLUTION),
        (tier(640, 0), codes::INVALID_RESOLUTION),
        (tier(7800, 2160), codes::RESOLUTION_TOO_HIGH),
        (tier(3840, 4800), codes::RESOLUTION_TOO_HIGH),
        (tier(100, 90), codes::RESOLUTION_TOO_LOW),
    ] {
        let options =
            TranscodeOptions::new(input.to_string_lossy().to_string(), dir.path().join("out"))
                .with_output_type(OutputType::Hls)
                .with_resolutions(vec![bad_tier.clone()]);
        let err = run_with(options).await;
        assert_eq!(err.kind, ErrorKind::UnsupportedResolution);
        assert_eq!(
            err.code, expected_code,
            "tier {}x{} misclassified",
            bad_tier.width, bad_tier.height
        );
    }
}

#[test]
fn construction_rejects_missing_paths() {
    let err = Transcoder::new(TranscodeOptions::new("", "out"), None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.code, 1);

    let err = Transcoder::new(TranscodeOptions::new("in.mp4", ""), None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.code, 2);
}

#[test]
fn remote_input_without_a_fetcher_fails_at_construction() {
    let options = TranscodeOptions::new("https://example.com/video.mp4", "out");
    let err = Transcoder::with_deps(options, None, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.code, 3);

    // streaming mode has no use for the fetcher
    let options =
        TranscodeOptions::new("https://example.com/video.mp4", "out").with_stream_from_url(true);
    assert!(Transcoder::with_deps(options, None, None).is_ok());
}

#[tokio::test]
async fn pre_cancelled_run_fails_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.mp4");
    std::fs::write(&input, b"dummy video content").unwrap();
    let output = dir.path().join("out");

    let options = TranscodeOptions::new(input.to_string_lossy().to_string(), &output);
    let transcoder = Transcoder::new(options, None).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = transcoder.run(&cancel).await.unwrap_err();
    assert!(err.message.contains("cancelled"));
    assert!(!output.exists());
}
