//! Device synchronization against an in-memory store

mod helpers;

use helpers::memory_store::CATEGORY;
use helpers::{gradient_image, png_bytes, solid_image, test_layout, MemoryArtStore, UploadFault};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tvart_common::FolderLayout;
use tvart_ingest::device::FolderArtStore;
use tvart_ingest::models::{ArtFile, ArtSet, ResizePolicy};
use tvart_ingest::services::reconciler::delete_all;
use tvart_ingest::services::{ReconcileError, Reconciler};

const THRESHOLD: f32 = 0.06;

fn reconciler(store: Arc<MemoryArtStore>, layout: &FolderLayout) -> Reconciler {
    Reconciler::new(store, layout.clone(), CATEGORY, THRESHOLD, 3).with_retry_delay(Duration::ZERO)
}

fn artworks() -> Vec<DynamicImage> {
    vec![
        gradient_image(640, 360, [230, 40, 30], [250, 220, 60]),
        gradient_image(640, 360, [10, 30, 120], [60, 200, 220]),
        solid_image(640, 360, [30, 140, 40]),
    ]
}

/// One set whose artworks already have ready files
fn ready_set(layout: &FolderLayout, images: &[DynamicImage]) -> ArtSet {
    let mut set = ArtSet::new(layout.root.join("set.json"), ResizePolicy::Scale);
    for (i, image) in images.iter().enumerate() {
        let name = format!("art{}_scaled.png", i);
        std::fs::write(layout.ready.join(&name), png_bytes(image)).unwrap();
        let mut art = ArtFile::new(format!("https://example.com/art{}.png", i));
        art.ready_file = Some(name);
        set.art.push(art);
    }
    set.save().unwrap();
    set
}

#[tokio::test]
async fn test_first_sync_uploads_everything() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks())];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, 3);
    assert_eq!(report.matched, 0);
    assert!(report.deleted.is_empty());
    assert!(report.is_complete());

    let saved = ArtSet::load(sets[0].path()).unwrap();
    for art in &saved.art {
        assert!(art.remote_content_id.is_some());
        assert!(art.remote_thumbnail_hash.is_some());
    }
    assert_eq!(store.selected(), saved.art[2].remote_content_id);
    assert_eq!(store.mattes(), vec![None::<String>; 3], "device matte off for every upload");
}

/// Syncing an unchanged set twice uploads nothing the second time
#[tokio::test]
async fn test_second_sync_matches_without_upload() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks())];
    let cancel = CancellationToken::new();
    let sync = reconciler(store.clone(), &layout);

    sync.sync(&mut sets, &cancel).await.unwrap();
    let ids: Vec<_> = sets[0].art.iter().map(|a| a.remote_content_id.clone()).collect();
    let calls = store.upload_calls();

    let report = sync.sync(&mut sets, &cancel).await.unwrap();
    assert_eq!(report.matched, 3);
    assert_eq!(report.uploaded, 0);
    assert!(report.deleted.is_empty());
    assert_eq!(store.upload_calls(), calls);

    let again: Vec<_> = sets[0].art.iter().map(|a| a.remote_content_id.clone()).collect();
    assert_eq!(ids, again);
}

#[tokio::test]
async fn test_lost_digest_is_rematched_perceptually() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks())];
    let cancel = CancellationToken::new();
    let sync = reconciler(store.clone(), &layout);
    sync.sync(&mut sets, &cancel).await.unwrap();

    // Given: the manifest lost every cached id and digest
    for art in sets[0].art.iter_mut() {
        art.remote_content_id = None;
        art.remote_thumbnail_hash = None;
    }
    let calls = store.upload_calls();

    let report = sync.sync(&mut sets, &cancel).await.unwrap();
    assert_eq!(report.matched, 3);
    assert_eq!(report.uploaded, 0);
    assert_eq!(store.upload_calls(), calls);
    assert!(sets[0].art.iter().all(|a| a.remote_thumbnail_hash.is_some()));
}

/// A regenerated ready file is uploaded even though its old digest is cached
#[tokio::test]
async fn test_changed_ready_file_is_not_matched_by_old_digest() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks())];
    let cancel = CancellationToken::new();
    let sync = reconciler(store.clone(), &layout);
    sync.sync(&mut sets, &cancel).await.unwrap();
    let old_id = sets[0].art[0].remote_content_id.clone().unwrap();

    // Given: the first artwork now has a different ready file, digest untouched
    std::fs::write(
        layout.ready.join("art0_cropped.png"),
        png_bytes(&solid_image(640, 360, [255, 255, 255])),
    )
    .unwrap();
    sets[0].art[0].ready_file = Some("art0_cropped.png".to_string());
    assert!(sets[0].art[0].remote_thumbnail_hash.is_some());

    let report = sync.sync(&mut sets, &cancel).await.unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.matched, 2);
    assert_eq!(report.deleted, vec![old_id.clone()]);
    let art = &sets[0].art[0];
    assert!(art.remote_content_id.is_some());
    assert_ne!(art.remote_content_id.as_deref(), Some(old_id.as_str()));
    assert_eq!(art.remote_ready_file.as_deref(), Some("art0_cropped.png"));
}

#[tokio::test]
async fn test_orphans_are_deleted() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let orphan = store.insert(png_bytes(&solid_image(640, 360, [250, 250, 250])));
    let mut sets = vec![ready_set(&layout, &artworks()[..1])];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.deleted, vec![orphan.clone()]);
    assert_eq!(report.uploaded, 1);
    assert!(!store.ids().contains(&orphan));
    assert_eq!(store.ids().len(), 1);
}

#[tokio::test]
async fn test_transient_upload_errors_are_retried() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    store.push_faults(&[UploadFault::Transient, UploadFault::Transient]);
    let mut sets = vec![ready_set(&layout, &artworks()[..1])];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, 1);
    assert!(report.failed.is_empty());
    assert_eq!(store.upload_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_item() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    store.push_faults(&[UploadFault::Transient; 3]);
    let mut sets = vec![ready_set(&layout, &artworks()[..2])];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "https://example.com/art0.png");
    assert_eq!(report.uploaded, 1);
    assert!(sets[0].art[0].remote_content_id.is_none());
    assert!(sets[0].art[1].remote_content_id.is_some());
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_rejected_upload_aborts_sync() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    store.push_faults(&[UploadFault::Rejected]);
    let mut sets = vec![ready_set(&layout, &artworks()[..2])];

    let result = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await;

    match result {
        Err(ReconcileError::Upload { url, .. }) => assert_eq!(url, "https://example.com/art0.png"),
        other => panic!("expected upload error, got {:?}", other.map(|r| r.uploaded)),
    }
    assert_eq!(store.upload_calls(), 1, "non-transient errors are not retried");
}

#[tokio::test]
async fn test_shared_ready_file_uploaded_once() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut first = ready_set(&layout, &artworks()[..1]);
    let mut second = ArtSet::new(layout.root.join("other.json"), ResizePolicy::Scale);
    let mut copy = ArtFile::new("https://mirror.example.com/art0.png");
    copy.ready_file = first.art[0].ready_file.clone();
    second.art.push(copy);
    first.save().unwrap();
    let mut sets = vec![first, second];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(store.upload_calls(), 1);
    assert_eq!(
        sets[0].art[0].remote_content_id,
        sets[1].art[0].remote_content_id
    );
}

#[tokio::test]
async fn test_items_without_ready_file_are_skipped() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut set = ready_set(&layout, &artworks()[..1]);
    set.art.push(ArtFile::new("https://example.com/pending.png"));
    let mut sets = vec![set];

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.uploaded, 1);
}

#[tokio::test]
async fn test_cancelled_sync_stops_before_uploading() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks())];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = reconciler(store.clone(), &layout)
        .sync(&mut sets, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.uploaded, 0);
    assert_eq!(store.upload_calls(), 0);
}

#[tokio::test]
async fn test_delete_all_clears_device_and_manifest() {
    let (_dir, layout) = test_layout();
    let store = Arc::new(MemoryArtStore::new());
    let mut sets = vec![ready_set(&layout, &artworks()[..2])];
    reconciler(store.clone(), &layout)
        .sync(&mut sets, &CancellationToken::new())
        .await
        .unwrap();

    let deleted = delete_all(store.as_ref(), CATEGORY, &mut sets).await.unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(store.ids().is_empty());

    let saved = ArtSet::load(sets[0].path()).unwrap();
    assert!(saved.art.iter().all(|a| a.remote_content_id.is_none()));
}

/// The directory-backed store round-trips through a full sync
#[tokio::test]
async fn test_folder_store_sync_is_stable() {
    let (dir, layout) = test_layout();
    let store = Arc::new(FolderArtStore::new(dir.path().join("tv"), CATEGORY));
    let mut sets = vec![ready_set(&layout, &artworks())];
    let cancel = CancellationToken::new();
    let sync = Reconciler::new(store.clone(), layout.clone(), CATEGORY, THRESHOLD, 3);

    let first = sync.sync(&mut sets, &cancel).await.unwrap();
    assert_eq!(first.uploaded, 3);

    let second = sync.sync(&mut sets, &cancel).await.unwrap();
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.matched, 3);
    assert!(second.deleted.is_empty());
    assert!(layout.thumbs.join("MY_F0001.jpg").is_file());
}
