mod helpers;

use std::time::Duration;

use helpers::fakes::{FakeToolchain, RemuxBehavior, STORAGE_BASE_URL};
use helpers::{mp4_upload, synthetic_mp4, Harness};
use tokio_util::sync::CancellationToken;
use tubely_core::{AppError, ErrorMetadata};
use tubely_processing::{
    IngestErrorKind, IngestStage, IngestState, ProcessingError, ProbeError, RemuxError,
    UploadedAsset,
};
use uuid::Uuid;

fn key_of(url: &str) -> &str {
    url.strip_prefix(STORAGE_BASE_URL)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap()
}

#[tokio::test]
async fn landscape_upload_is_published_under_landscape() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;
    let data = synthetic_mp4(4096);

    let committed = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&data))
        .await
        .unwrap();

    let url = committed.video_url.clone().unwrap();
    let key = key_of(&url);
    assert!(key.starts_with("landscape/"), "unexpected key {}", key);
    assert!(key.ends_with(".mp4"));

    let object = harness.storage.object(key).unwrap();
    assert_eq!(object.data, data);
    assert_eq!(object.content_type, "video/mp4");

    let stored = harness.stored(video.id).await;
    assert_eq!(stored.video_url.as_deref(), Some(url.as_str()));
    assert_eq!(stored.id, video.id);
    assert_eq!(stored.user_id, owner);

    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn orientation_selects_key_prefix() {
    for (width, height, prefix) in [(1080, 1920, "portrait/"), (1000, 1000, "other/")] {
        let harness = Harness::new(FakeToolchain::with_geometry(width, height));
        let owner = Uuid::new_v4();
        let video = harness.seed_video(owner).await;

        let committed = harness
            .service
            .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(512)))
            .await
            .unwrap();

        let url = committed.video_url.unwrap();
        assert!(key_of(&url).starts_with(prefix), "{} for {}x{}", url, width, height);
    }
}

#[tokio::test]
async fn storage_failure_leaves_record_untouched() {
    let harness = Harness::new(FakeToolchain::landscape());
    harness.storage.fail_uploads();

    let owner = Uuid::new_v4();
    let mut video = harness.seed_video(owner).await;
    video.video_url = Some("https://cdn.tubely.test/landscape/previous.mp4".to_string());
    harness.videos.inner().insert(video.clone()).await;

    let err = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(1024)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), IngestStage::Uploading);
    assert!(matches!(err.kind(), IngestErrorKind::Storage(_)));

    let stored = harness.stored(video.id).await;
    assert_eq!(stored, video);
    assert!(harness.storage.keys().is_empty());
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn persistence_failure_keeps_uploaded_object() {
    let harness = Harness::new(FakeToolchain::landscape());
    harness.videos.fail_updates();

    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let err = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(1024)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), IngestStage::Committing);
    assert!(matches!(err.kind(), IngestErrorKind::Persistence(_)));

    // The object is not rolled back.
    assert_eq!(harness.storage.keys().len(), 1);
    assert_eq!(harness.stored(video.id).await.video_url, None);
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn commit_keeps_fields_written_during_the_run() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let mut run = harness
        .pipeline
        .start(video.clone(), mp4_upload(&synthetic_mp4(1024)));
    while run.state().name() != "uploaded" {
        assert!(!run.step().await.is_terminal());
    }
    let key = match run.state() {
        IngestState::Uploaded(key) => key.to_string(),
        other => panic!("unexpected state {:?}", other),
    };

    // Another writer touches the record while the upload is in flight.
    let mut edited = harness.stored(video.id).await;
    edited.thumbnail_url = Some("https://cdn.tubely.test/thumb.png".to_string());
    edited.title = "renamed".to_string();
    harness.videos.inner().insert(edited).await;

    assert_eq!(run.step().await.name(), "committed");

    let stored = harness.stored(video.id).await;
    assert_eq!(
        stored.thumbnail_url.as_deref(),
        Some("https://cdn.tubely.test/thumb.png")
    );
    assert_eq!(stored.title, "renamed");
    assert_eq!(
        stored.video_url,
        Some(format!("{}/{}", STORAGE_BASE_URL, key))
    );
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn ownership_change_during_the_run_blocks_the_commit() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let mut run = harness
        .pipeline
        .start(video.clone(), mp4_upload(&synthetic_mp4(1024)));
    while run.state().name() != "uploaded" {
        run.step().await;
    }

    let mut transferred = harness.stored(video.id).await;
    transferred.user_id = Uuid::new_v4();
    harness.videos.inner().insert(transferred).await;

    match run.step().await {
        IngestState::Failed(err) => {
            assert_eq!(err.stage(), IngestStage::Committing);
            assert!(matches!(err.kind(), IngestErrorKind::Unauthorized));
        }
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(harness.stored(video.id).await.video_url, None);
    assert_eq!(harness.storage.keys().len(), 1);
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn same_upload_lands_under_the_same_orientation() {
    let harness = Harness::new(FakeToolchain::with_geometry(1080, 1920));
    let owner = Uuid::new_v4();
    let data = synthetic_mp4(2048);

    let mut keys = Vec::new();
    for _ in 0..2 {
        let video = harness.seed_video(owner).await;
        let committed = harness
            .service
            .upload_video(video.id, owner, mp4_upload(&data))
            .await
            .unwrap();
        keys.push(key_of(&committed.video_url.unwrap()).to_string());
    }

    assert!(keys.iter().all(|k| k.starts_with("portrait/")), "{:?}", keys);
    assert_ne!(keys[0], keys[1]);
    for key in &keys {
        assert_eq!(harness.storage.object(key).unwrap().data, data);
    }
}

#[tokio::test]
async fn no_temp_files_survive_any_outcome() {
    struct Case {
        name: &'static str,
        toolchain: FakeToolchain,
        fail_storage: bool,
        fail_updates: bool,
        stage: Option<IngestStage>,
    }

    let cases = vec![
        Case {
            name: "success",
            toolchain: FakeToolchain::landscape(),
            fail_storage: false,
            fail_updates: false,
            stage: None,
        },
        Case {
            name: "remux exits non-zero",
            toolchain: FakeToolchain::landscape().remuxing(RemuxBehavior::Fail),
            fail_storage: false,
            fail_updates: false,
            stage: Some(IngestStage::Remuxing),
        },
        Case {
            name: "remux writes nothing",
            toolchain: FakeToolchain::landscape().remuxing(RemuxBehavior::Empty),
            fail_storage: false,
            fail_updates: false,
            stage: Some(IngestStage::Remuxing),
        },
        Case {
            name: "probe fails",
            toolchain: FakeToolchain::failing_probe(),
            fail_storage: false,
            fail_updates: false,
            stage: Some(IngestStage::Classifying),
        },
        Case {
            name: "no streams",
            toolchain: FakeToolchain::without_streams(),
            fail_storage: false,
            fail_updates: false,
            stage: Some(IngestStage::Classifying),
        },
        Case {
            name: "storage fails",
            toolchain: FakeToolchain::landscape(),
            fail_storage: true,
            fail_updates: false,
            stage: Some(IngestStage::Uploading),
        },
        Case {
            name: "commit fails",
            toolchain: FakeToolchain::landscape(),
            fail_storage: false,
            fail_updates: true,
            stage: Some(IngestStage::Committing),
        },
    ];

    for case in cases {
        let harness = Harness::new(case.toolchain);
        if case.fail_storage {
            harness.storage.fail_uploads();
        }
        if case.fail_updates {
            harness.videos.fail_updates();
        }
        let owner = Uuid::new_v4();
        let video = harness.seed_video(owner).await;

        let result = harness
            .service
            .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(2048)))
            .await;

        assert_eq!(
            result.as_ref().err().map(|e| e.stage()),
            case.stage,
            "{}",
            case.name
        );
        assert!(
            harness.leftover_files().is_empty(),
            "{}: leaked {:?}",
            case.name,
            harness.leftover_files()
        );
    }
}

#[tokio::test]
async fn empty_remux_output_is_a_processing_failure() {
    let harness = Harness::new(FakeToolchain::landscape().remuxing(RemuxBehavior::Empty));
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let err = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(256)))
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind(),
        IngestErrorKind::Processing(ProcessingError::Remux(RemuxError::OutputEmpty { .. }))
    ));
    assert!(harness.storage.keys().is_empty());
}

#[tokio::test]
async fn missing_streams_is_reported_not_classified_as_other() {
    let harness = Harness::new(FakeToolchain::without_streams());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let err = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(256)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), IngestStage::Classifying);
    assert!(matches!(
        err.kind(),
        IngestErrorKind::Processing(ProcessingError::Probe(ProbeError::NoStreams))
    ));
    assert!(harness.storage.keys().is_empty());

    let app: AppError = err.into();
    assert_eq!(app.http_status_code(), 400);
}

#[tokio::test]
async fn stepping_visits_every_state_in_order() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let mut run = harness
        .pipeline
        .start(video.clone(), mp4_upload(&synthetic_mp4(1024)));
    assert_eq!(run.state().name(), "received");

    let mut seen = Vec::new();
    while !run.state().is_terminal() {
        let name = run.step().await.name();
        seen.push(name);

        if name == "remuxed" {
            let paths = run.artifact_paths();
            assert_eq!(paths.len(), 2);
            assert!(paths.iter().all(|p| p.exists()));
        }
    }

    assert_eq!(
        seen,
        vec!["staged", "remuxed", "classified", "uploaded", "committed"]
    );
    assert!(run.artifact_paths().is_empty());

    // Terminal states do not move.
    assert_eq!(run.step().await.name(), "committed");
    match run.state() {
        IngestState::Committed(committed) => assert_eq!(committed.id, video.id),
        other => panic!("unexpected state {:?}", other),
    }
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn dropping_a_run_midway_removes_its_files() {
    let harness = Harness::new(FakeToolchain::landscape());
    let video = harness.seed_video(Uuid::new_v4()).await;

    let mut run = harness
        .pipeline
        .start(video, mp4_upload(&synthetic_mp4(1024)));
    run.step().await;
    run.step().await;
    assert_eq!(run.state().name(), "remuxed");
    assert_eq!(harness.leftover_files().len(), 2);

    drop(run);
    assert!(harness.leftover_files().is_empty());
}

#[tokio::test]
async fn cancellation_stops_the_run_and_cleans_up() {
    let harness = Harness::new(FakeToolchain::landscape().remuxing(RemuxBehavior::Hang));
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = harness
        .service
        .upload_video_until_cancelled(video.id, owner, mp4_upload(&synthetic_mp4(1024)), token)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), IngestStage::Remuxing);
    assert!(matches!(err.kind(), IngestErrorKind::Cancelled));
    assert!(harness.leftover_files().is_empty());
    assert_eq!(harness.stored(video.id).await.video_url, None);
}

#[tokio::test]
async fn oversized_uploads_are_rejected() {
    let harness = Harness::with_limit(FakeToolchain::landscape(), 1024);
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    // Undeclared length: caught while copying.
    let err = harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(4096)))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), IngestStage::Staging);
    assert!(matches!(
        err.kind(),
        IngestErrorKind::PayloadTooLarge { limit_bytes: 1024 }
    ));
    assert!(harness.leftover_files().is_empty());

    // Declared length: caught before staging.
    let upload = mp4_upload(&synthetic_mp4(4096)).with_content_length(4096);
    let err = harness
        .service
        .upload_video(video.id, owner, upload)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), IngestErrorKind::PayloadTooLarge { .. }));

    // Exactly at the limit is fine.
    harness
        .service
        .upload_video(video.id, owner, mp4_upload(&synthetic_mp4(1024)))
        .await
        .unwrap();
}

#[tokio::test]
async fn only_the_owner_may_upload() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let err = harness
        .service
        .upload_video(video.id, Uuid::new_v4(), mp4_upload(&synthetic_mp4(128)))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), IngestStage::Admission);
    assert!(matches!(err.kind(), IngestErrorKind::Unauthorized));
    assert!(harness.leftover_files().is_empty());
    assert!(harness.storage.keys().is_empty());
}

#[tokio::test]
async fn unknown_video_is_not_found() {
    let harness = Harness::new(FakeToolchain::landscape());
    let missing = Uuid::new_v4();

    let err = harness
        .service
        .upload_video(missing, Uuid::new_v4(), mp4_upload(&synthetic_mp4(128)))
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), IngestErrorKind::NotFound(id) if *id == missing));
    let app: AppError = err.into();
    assert_eq!(app.http_status_code(), 404);
}

#[tokio::test]
async fn content_type_must_be_mp4() {
    let harness = Harness::new(FakeToolchain::landscape());
    let owner = Uuid::new_v4();
    let video = harness.seed_video(owner).await;

    let upload = UploadedAsset::new(
        "video/quicktime",
        std::io::Cursor::new(synthetic_mp4(128)),
    );
    let err = harness
        .service
        .upload_video(video.id, owner, upload)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        IngestErrorKind::UnsupportedContentType(ct) if ct == "video/quicktime"
    ));
    assert!(!harness.staging.path().join("uploads").exists());

    // The pipeline re-checks on its own.
    let upload = UploadedAsset::new("image/png", std::io::Cursor::new(vec![1, 2, 3]));
    let err = harness
        .pipeline
        .ingest(video.clone(), upload)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), IngestStage::Staging);
    assert!(matches!(
        err.kind(),
        IngestErrorKind::UnsupportedContentType(_)
    ));

    // Parameters and case do not matter.
    let upload = UploadedAsset::new(
        "Video/MP4; codecs=avc1",
        std::io::Cursor::new(synthetic_mp4(128)),
    );
    harness
        .service
        .upload_video(video.id, owner, upload)
        .await
        .unwrap();
}
