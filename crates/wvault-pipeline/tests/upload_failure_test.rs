//! Partial and total provider failure, and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use wvault_core::config::PipelineConfig;
use wvault_core::{SecurityLevel, VaultError};
use wvault_pipeline::EncryptionPipeline;

use common::{pipelines, ready_session, set_of, MapProvider};

#[tokio::test]
async fn partial_failure_still_succeeds() {
    let sessions = ready_session().await;
    let good = Arc::new(MapProvider::new("good"));
    let bad = Arc::new(MapProvider::refusing("bad"));
    let (up, down) = pipelines(&sessions, set_of(&[bad.clone(), good.clone()]), &PipelineConfig::default());
    let cancel = CancellationToken::new();

    let result = up
        .upload("a.txt", b"partial failure payload", SecurityLevel::Standard, &cancel)
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.successful_providers, 1);
    assert_eq!(result.total_providers, 2);
    assert_eq!(result.provider_failures.len(), 1);
    assert_eq!(result.provider_failures[0].provider, "bad");

    // Download falls back past the provider that never stored it.
    let downloaded = down.download(&result.record, &cancel).await.unwrap();
    assert_eq!(downloaded.data, b"partial failure payload");
}

#[tokio::test]
async fn total_failure_is_an_error() {
    let sessions = ready_session().await;
    let (up, _) = pipelines(
        &sessions,
        set_of(&[
            Arc::new(MapProvider::refusing("a")),
            Arc::new(MapProvider::refusing("b")),
        ]),
        &PipelineConfig::default(),
    );

    let err = up
        .upload("a.txt", b"payload", SecurityLevel::Standard, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        VaultError::UploadFailed { attempted, failures } => {
            assert_eq!(attempted, 2);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("expected UploadFailed, got {other:?}"),
    }
    assert!(sessions.has_key(SecurityLevel::Standard));
}

#[tokio::test]
async fn proof_failure_without_inline_is_an_error() {
    let sessions = ready_session().await;
    let config = PipelineConfig {
        inline_critical_bytes: false,
        ..Default::default()
    };
    let up = EncryptionPipeline::new(sessions, set_of(&[Arc::new(MapProvider::new("content"))]), &config)
        .with_proof_providers(set_of(&[Arc::new(MapProvider::refusing("proofs"))]));

    let err = up
        .upload("a.txt", b"payload", SecurityLevel::Sensitive, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::UploadFailed { attempted: 1, .. }));
}

#[tokio::test]
async fn no_critical_bytes_destination_is_a_config_error() {
    let sessions = ready_session().await;
    let config = PipelineConfig {
        inline_critical_bytes: false,
        ..Default::default()
    };
    let content = Arc::new(MapProvider::new("content"));
    let (up, _) = pipelines(&sessions, set_of(&[content.clone()]), &config);

    let err = up
        .upload("a.txt", b"payload", SecurityLevel::Standard, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Config(_)));
    assert_eq!(content.calls(), 0);
}

#[tokio::test]
async fn already_cancelled_does_nothing() {
    let sessions = ready_session().await;
    let provider = Arc::new(MapProvider::new("content"));
    let (up, _) = pipelines(&sessions, set_of(&[provider.clone()]), &PipelineConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = up
        .upload("a.txt", b"payload", SecurityLevel::Standard, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, VaultError::Cancelled);
    assert_eq!(provider.calls(), 0);
    assert!(sessions.has_key(SecurityLevel::Standard));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_network_leg() {
    let sessions = ready_session().await;
    let slow = Arc::new(MapProvider::slow("slow", Duration::from_secs(3600)));
    let (up, _) = pipelines(&sessions, set_of(&[slow.clone()]), &PipelineConfig::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = up
        .upload("a.txt", b"payload", SecurityLevel::Maximum, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, VaultError::Cancelled);
    assert_eq!(slow.object_count(), 0);
    assert!(sessions.has_key(SecurityLevel::Maximum));
    assert_eq!(sessions.session_snapshot().levels, SecurityLevel::ALL.to_vec());
}
