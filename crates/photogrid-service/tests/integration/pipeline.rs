use std::sync::Arc;

use bytes::Bytes;

use photogrid_service::config::Config;
use photogrid_service::download::ImageDownloader;
use photogrid_service::pipeline::{ImagePipeline, SlotId};
use photogrid_test as test;

use crate::utils::{RecordingRender, TestFetch, local_reference, settle, wait_for};

fn test_config() -> Config {
    Config {
        max_concurrent_fetches: 4,
        ..Default::default()
    }
}

const SLOT_A: SlotId = SlotId(0);
const SLOT_B: SlotId = SlotId(1);

/// A fresh request fetches the photo once, displays it, and populates the
/// cache.
#[tokio::test]
async fn test_fetch_and_display() {
    test::setup();

    let server = test::image_server();
    let render = RecordingRender::default();
    let downloader = ImageDownloader::new(Default::default());
    let pipeline = ImagePipeline::new(&test_config(), downloader, Arc::new(render.clone()));

    pipeline.request(SLOT_A, &test::photo_reference(7, &server));

    wait_for("slot A to display", || render.displayed(SLOT_A).is_some()).await;
    assert_eq!(render.displayed(SLOT_A).unwrap(), test::image_bytes(7));
    assert_eq!(
        pipeline.cache().get(7.into()),
        Some(Bytes::from(test::image_bytes(7)))
    );
    assert_eq!(pipeline.in_flight_fetches(), 0);

    // a second slot asking for the same photo is served synchronously from
    // the cache, without going to the server again
    pipeline.request(SLOT_B, &test::photo_reference(7, &server));
    assert_eq!(render.displayed(SLOT_B).unwrap(), test::image_bytes(7));

    assert_eq!(server.accesses(), 1);
}

/// Concurrent requests for the same photo are coalesced onto a single fetch,
/// and every slot still gets its delivery.
#[tokio::test]
async fn test_deduplicates_concurrent_requests() {
    test::setup();

    let (fetch, gate) = TestFetch::gated();
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline.request(SLOT_A, &local_reference(7));
    pipeline.request(SLOT_B, &local_reference(7));

    wait_for("the fetch to start", || fetch.calls() == 1).await;
    assert_eq!(pipeline.in_flight_fetches(), 1);

    gate.open();

    wait_for("both slots to display", || {
        render.displayed(SLOT_A).is_some() && render.displayed(SLOT_B).is_some()
    })
    .await;

    assert_eq!(render.displayed(SLOT_A).unwrap(), test::image_bytes(7));
    assert_eq!(render.displayed(SLOT_B).unwrap(), test::image_bytes(7));
    assert_eq!(fetch.calls(), 1);
}

/// A cache hit delivers synchronously and never invokes the fetch capability.
#[tokio::test]
async fn test_cache_hit_short_circuits() {
    test::setup();

    let fetch = TestFetch::open();
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline
        .cache()
        .insert(7.into(), Bytes::from_static(b"already here"));

    pipeline.request(SLOT_A, &local_reference(7));

    // delivered synchronously, no task was created
    assert_eq!(
        render.displayed(SLOT_A).unwrap(),
        Bytes::from_static(b"already here")
    );
    assert_eq!(pipeline.in_flight_fetches(), 0);
    assert_eq!(fetch.calls(), 0);
}

/// Cancelling the only interested slot aborts the fetch: no delivery and no
/// cache write, even though the remote call itself ran to completion.
#[tokio::test]
async fn test_cancel_aborts_fetch() {
    test::setup();

    let (fetch, gate) = TestFetch::gated();
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline.request(SLOT_A, &local_reference(7));
    wait_for("the fetch to start", || fetch.calls() == 1).await;

    pipeline.cancel(SLOT_A);
    gate.open();

    wait_for("the fetch to finish", || pipeline.in_flight_fetches() == 0).await;
    settle().await;

    assert!(render.displays().is_empty());
    assert_eq!(pipeline.cache().get(7.into()), None);

    // cancelling again, or cancelling a slot that never requested anything,
    // is a no-op
    pipeline.cancel(SLOT_A);
    pipeline.cancel(SlotId(99));
}

/// Rebinding a slot before its fetch completes discards the stale delivery;
/// the slot only ever shows the photo it is currently bound to.
#[tokio::test]
async fn test_rebind_discards_stale_delivery() {
    test::setup();

    let (fetch, gate) = TestFetch::gated();
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline.request(SLOT_A, &local_reference(7));
    wait_for("the fetch to start", || fetch.calls() == 1).await;

    // the cell is reused for another photo while photo 7 is still loading
    pipeline.request(SLOT_A, &local_reference(9));
    assert_eq!(render.clears(), vec![SLOT_A]);

    gate.open();

    wait_for("slot A to display", || render.displayed(SLOT_A).is_some()).await;
    settle().await;

    // only photo 9 ever shows up in the slot
    assert_eq!(render.displayed(SLOT_A).unwrap(), test::image_bytes(9));
    assert_eq!(
        render.displays(),
        vec![(SLOT_A, Bytes::from(test::image_bytes(9)))]
    );
}

/// Detaching one slot keeps a fetch alive that another slot still waits for,
/// and the payload is cached even though the original requester is long gone.
#[tokio::test]
async fn test_shared_fetch_survives_rebind() {
    test::setup();

    let (fetch, gate) = TestFetch::gated();
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline.request(SLOT_A, &local_reference(7));
    pipeline.request(SLOT_B, &local_reference(7));
    wait_for("the fetch to start", || fetch.calls() == 1).await;

    // slot A moves on, slot B still wants photo 7
    pipeline.request(SLOT_A, &local_reference(9));

    gate.open();

    wait_for("both slots to display", || {
        render.displayed(SLOT_A).is_some() && render.displayed(SLOT_B).is_some()
    })
    .await;

    assert_eq!(render.displayed(SLOT_B).unwrap(), test::image_bytes(7));
    assert_eq!(render.displayed(SLOT_A).unwrap(), test::image_bytes(9));

    // the payload of the abandoned requester still benefits future requests
    assert_eq!(
        pipeline.cache().get(7.into()),
        Some(Bytes::from(test::image_bytes(7)))
    );
    assert_eq!(fetch.calls(), 2);
}

/// A failing fetch leaves no trace: no delivery, no cache entry, and later
/// requests for the same photo start over.
#[tokio::test]
async fn test_failed_fetch() {
    test::setup();

    let (fetch, gate) = TestFetch::gated();
    let fetch = fetch.failing(3);
    let render = RecordingRender::default();
    let pipeline = ImagePipeline::new(&test_config(), fetch.clone(), Arc::new(render.clone()));

    pipeline.request(SLOT_A, &local_reference(3));
    wait_for("the fetch to start", || fetch.calls() == 1).await;
    gate.open();

    wait_for("the fetch to finish", || pipeline.in_flight_fetches() == 0).await;
    settle().await;

    assert!(render.displays().is_empty());
    assert_eq!(pipeline.cache().get(3.into()), None);

    // failures are not negative-cached; a new request fetches again
    pipeline.request(SLOT_A, &local_reference(3));
    wait_for("the retry to start", || fetch.calls() == 2).await;
}

/// End to end against a real HTTP server: an error response is surfaced as a
/// failure, not as a payload.
#[tokio::test]
async fn test_server_error_end_to_end() {
    test::setup();

    let server = test::image_server();
    let render = RecordingRender::default();
    let downloader = ImageDownloader::new(Default::default());
    let pipeline = ImagePipeline::new(&test_config(), downloader, Arc::new(render.clone()));

    let mut reference = test::photo_reference(3, &server);
    reference.img_src = server.url("/respond_statuscode/500/3.jpg");

    pipeline.request(SLOT_A, &reference);
    assert_eq!(pipeline.in_flight_fetches(), 1);

    wait_for("the fetch to finish", || pipeline.in_flight_fetches() == 0).await;
    settle().await;

    assert_eq!(server.accesses(), 1);
    assert!(render.displays().is_empty());
    assert_eq!(pipeline.cache().get(3.into()), None);
}
