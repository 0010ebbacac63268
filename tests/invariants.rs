//! Batch Invariant Tests
//!
//! Failure isolation, naming, cleanup and pre-flight guarantees.

mod common;

use std::path::Path;

use common::{notifier, FakeCompositor, FakeFetcher, FakeMailer, Workspace};
use logobatch_core::{
    AssetCatalog, BatchDriver, BatchError, ClientError, ClientOutcome, ClientRecord,
    NotificationOutcome, SlugRegistry,
};

fn client(name: &str, email: &str) -> ClientRecord {
    let url = format!("https://logos.test/{}.png", name.replace(' ', "-"));
    let record = ClientRecord::new(name, url);
    if email.is_empty() {
        record
    } else {
        record.with_email(email)
    }
}

#[tokio::test]
async fn invariant_one_failed_download_does_not_stop_the_batch() {
    let ws = Workspace::new(&["mug.png", "lid.png"], &[], &[]);
    let clients = vec![
        client("Acme", "acme@test.io"),
        client("Bolt", "bolt@test.io"),
        client("Crux", "crux@test.io"),
    ];
    let fetcher = FakeFetcher::default().fail_on(&clients[1].logo_url);
    let mailer = FakeMailer::default();
    let driver = BatchDriver::new(
        ws.pipeline(fetcher, FakeCompositor::default()),
        Some(notifier(mailer.clone())),
    );

    let report = driver.run(&clients, &ws.catalog()).await.unwrap();

    assert_eq!(report.clients.len(), 3);
    assert_eq!(report.failed(), 1);
    assert!(report.client("Bolt").unwrap().is_failed());
    assert_eq!(mailer.recipients(), ["acme@test.io", "crux@test.io"]);
    let outputs = ws.output_files();
    assert_eq!(outputs.len(), 4);
    for prefix in ["Acme_", "Crux_"] {
        assert_eq!(outputs.iter().filter(|n| n.starts_with(prefix)).count(), 2);
    }
    assert!(ws.output_files().iter().all(|n| !n.starts_with("Bolt")));
}

#[tokio::test]
async fn invariant_composition_failure_aborts_only_that_client() {
    let ws = Workspace::new(&["mug.png", "lid.png"], &[], &[]);
    let clients = vec![client("Acme", ""), client("Bolt", "")];
    // Call 2 is Acme's second product.
    let compositor = FakeCompositor::failing_on_call(2);
    let driver = BatchDriver::new(ws.pipeline(FakeFetcher::default(), compositor.clone()), None);

    let report = driver.run(&clients, &ws.catalog()).await.unwrap();

    let acme = report.client("Acme").unwrap();
    match &acme.outcome {
        ClientOutcome::Failed { error } => assert!(error.contains("Composition failed")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!report.client("Bolt").unwrap().is_failed());
    // Acme: 2 calls (second fails), Bolt: 2 calls.
    assert_eq!(compositor.calls(), 4);
}

#[tokio::test]
async fn invariant_staged_logo_removed_after_failure() {
    let ws = Workspace::new(&["mug.png", "lid.png"], &[], &[]);
    let fetcher = FakeFetcher::default();
    let pipeline = ws.pipeline(fetcher.clone(), FakeCompositor::failing_on_call(2));
    pipeline.prepare().await.unwrap();

    let mut slugs = SlugRegistry::new();
    let acme = client("Acme Co", "");
    let result = pipeline
        .process_client(&acme, &slugs.assign(&acme.name), &ws.catalog())
        .await;

    assert!(matches!(result, Err(ClientError::Composition { .. })));
    let staged = fetcher.staged.lock().unwrap().clone();
    assert_eq!(staged.len(), 1);
    assert!(staged[0].ends_with("Acme_Co_logo.png"));
    assert!(!staged[0].exists());
    assert!(ws.staged_files().is_empty());
}

#[tokio::test]
async fn invariant_staged_logo_removed_after_success() {
    let ws = Workspace::new(&["mug.png"], &[], &[]);
    let pipeline = ws.pipeline(FakeFetcher::default(), FakeCompositor::default());
    pipeline.prepare().await.unwrap();

    let artifacts = pipeline
        .process_client(&client("Acme", ""), "Acme", &ws.catalog())
        .await
        .unwrap();

    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].index, 1);
    assert_eq!(std::fs::read(&artifacts[0].path).unwrap(), b"composed:mug.png");
    assert!(ws.staged_files().is_empty());
}

#[tokio::test]
async fn invariant_missing_email_is_not_an_error() {
    let ws = Workspace::new(&["mug.png"], &[], &[]);
    let clients = vec![client("Acme", ""), client("Bolt", "bolt@test.io")];
    let mailer = FakeMailer::default();
    let driver = BatchDriver::new(
        ws.pipeline(FakeFetcher::default(), FakeCompositor::default()),
        Some(notifier(mailer.clone())),
    );

    let report = driver.run(&clients, &ws.catalog()).await.unwrap();

    assert_eq!(report.failed(), 0);
    match &report.client("Acme").unwrap().outcome {
        ClientOutcome::Completed {
            artifacts,
            notification,
        } => {
            assert_eq!(artifacts.len(), 1);
            assert!(matches!(notification, NotificationOutcome::Skipped));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(mailer.recipients(), ["bolt@test.io"]);
}

#[tokio::test]
async fn invariant_delivery_failure_keeps_artifacts() {
    let ws = Workspace::new(&["mug.png"], &[], &["flyer.jpg"]);
    let clients = vec![client("Acme", "acme@test.io"), client("Bolt", "bolt@test.io")];
    let mailer = FakeMailer::default().reject("acme@test.io");
    let driver = BatchDriver::new(
        ws.pipeline(FakeFetcher::default(), FakeCompositor::default()),
        Some(notifier(mailer.clone())),
    );

    let report = driver.run(&clients, &ws.catalog()).await.unwrap();

    assert_eq!(report.failed(), 0);
    match &report.client("Acme").unwrap().outcome {
        ClientOutcome::Completed { notification, .. } => {
            assert!(matches!(notification, NotificationOutcome::Failed { .. }))
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(ws.output_files().contains(&"Acme_mug_1.png".to_string()));

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let names: Vec<_> = sent[0].attachments.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, ["Bolt_mug_1.png", "flyer.jpg"]);
}

#[tokio::test]
async fn invariant_empty_catalog_is_fatal_before_any_client() {
    let ws = Workspace::new(&[], &[], &["flyer.png"]);
    let compositor = FakeCompositor::default();
    let fetcher = FakeFetcher::default();
    let driver = BatchDriver::new(ws.pipeline(fetcher.clone(), compositor.clone()), None);

    let err = driver
        .run(&[client("Acme", "")], &AssetCatalog::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::EmptyCatalog));
    assert_eq!(compositor.calls(), 0);
    assert!(fetcher.staged.lock().unwrap().is_empty());
    assert!(AssetCatalog::load(&ws.layout).is_err());
}

#[tokio::test]
async fn invariant_whitespace_variants_get_distinct_files() {
    let ws = Workspace::new(&["mug.png"], &[], &[]);
    let clients = vec![client("Acme Co", ""), client("Acme  Co", ""), client("Acme/Co", ""), client("Acme:Co", "")];
    let driver = BatchDriver::new(ws.pipeline(FakeFetcher::default(), FakeCompositor::default()), None);

    let report = driver.run(&clients, &ws.catalog()).await.unwrap();

    let slugs: Vec<_> = report.clients.iter().map(|c| c.slug.as_str()).collect();
    assert_eq!(slugs, ["Acme_Co", "Acme__Co", "Acme-Co", "Acme-Co-2"]);
    assert_eq!(
        ws.output_files(),
        ["Acme-Co-2_mug_1.png", "Acme-Co_mug_1.png", "Acme_Co_mug_1.png", "Acme__Co_mug_1.png"]
    );
}

#[tokio::test]
async fn invariant_mask_is_sent_with_matching_product() {
    let ws = Workspace::new(&["mug.png", "cap.png"], &["mug_mask.png", "tumbler_mask.png"], &[]);
    let compositor = FakeCompositor::default();
    let pipeline = ws.pipeline(FakeFetcher::default(), compositor.clone());
    pipeline.prepare().await.unwrap();

    let artifacts = pipeline
        .process_client(&client("Acme", ""), "Acme", &ws.catalog())
        .await
        .unwrap();

    for artifact in &artifacts {
        let stem = artifact.product.file_stem().unwrap().to_string_lossy().into_owned();
        match stem.as_str() {
            "mug" => assert_eq!(
                artifact.mask.as_deref().and_then(Path::file_name).unwrap(),
                "mug_mask.png"
            ),
            _ => assert!(artifact.mask.is_none()),
        }
        assert!(artifact.path.file_name().unwrap().to_string_lossy().starts_with("Acme_"));
        assert_eq!(artifact.sha256.len(), 64);
    }

    let requests = compositor.requests.lock().unwrap();
    for request in requests.iter() {
        assert_eq!(request.overlay.bytes, b"logo-bytes");
        match request.base.file_name.as_str() {
            "mug.png" => {
                assert_eq!(request.mask.as_ref().unwrap().file_name, "mug_mask.png");
                assert!(request.instruction.contains("masked region"));
            }
            _ => {
                assert!(request.mask.is_none());
                assert!(request.instruction.contains("center of the product"));
            }
        }
    }
}

#[tokio::test]
async fn invariant_unwritable_staging_is_fatal_before_any_client() {
    let ws = Workspace::new(&["mug.png"], &[], &[]);
    std::fs::write(&ws.layout.staging_dir, b"not a directory").unwrap();
    let fetcher = FakeFetcher::default();
    let driver = BatchDriver::new(ws.pipeline(fetcher.clone(), FakeCompositor::default()), None);

    let err = driver.run(&[client("Acme", "")], &ws.catalog()).await.unwrap_err();

    match err {
        BatchError::Workspace(ClientError::Io { path, .. }) => assert_eq!(path, ws.layout.staging_dir),
        other => panic!("expected workspace error, got {other:?}"),
    }
    assert!(fetcher.staged.lock().unwrap().is_empty());
}
