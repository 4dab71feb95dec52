use photogrid_service::config::{DownloadTimeouts, InMemoryCacheConfig};
use photogrid_service::download::{FetchError, RoverClient};
use photogrid_test as test;

fn test_client(server: &test::Server) -> RoverClient {
    RoverClient::new(
        test::api_config(server),
        DownloadTimeouts::default(),
        &InMemoryCacheConfig::default(),
    )
}

#[tokio::test]
async fn test_fetch_manifest() {
    test::setup();

    let server = test::image_server();
    let client = test_client(&server);

    let rover = client.rover("curiosity").await.unwrap();

    assert_eq!(rover.name, "curiosity");
    assert_eq!(rover.max_sol, 1000);
    assert_eq!(rover.sol_description(25).unwrap().total_photos, 10);
    assert!(rover.sol_description(26).is_none());
}

#[tokio::test]
async fn test_list_photos_is_cached() {
    test::setup();

    let server = test::image_server();
    let client = test_client(&server);

    let photos = client.list_photos("curiosity", 1000).await.unwrap();
    assert_eq!(photos.len(), 3);
    assert_eq!(photos[0].id.0, 101);
    assert!(photos[0].img_src.path().ends_with("/photos/101.jpg"));

    // the second listing for the same sol is served from the index cache
    let again = client.list_photos("curiosity", 1000).await.unwrap();
    assert_eq!(again.len(), 3);

    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_listing_errors_are_not_sticky() {
    test::setup();

    let server = test::image_server();
    let mut config = test::api_config(&server);
    config.url = server.url("/respond_statuscode/503/api/");
    let client = RoverClient::new(
        config,
        DownloadTimeouts::default(),
        &InMemoryCacheConfig::default(),
    );

    let result = client.list_photos("curiosity", 1000).await;
    assert!(matches!(result, Err(FetchError::Download(_))));

    // a failed listing is retried on the next request instead of being
    // served from the index cache
    let result = client.list_photos("curiosity", 1000).await;
    assert!(matches!(result, Err(FetchError::Download(_))));

    assert_eq!(server.accesses(), 2);
}
