//! End-to-end restore scenarios against an HTTP fixture and a temp project.

use librestore::provider::{CdnjsProvider, FileSystemProvider};
use librestore::{
    CacheService, ErrorCode, HostInteraction, LibraryGoalState, Manifest, OperationResult,
    Provider, ProviderRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const JQUERY_METADATA: &str = r#"{
    "name": "jquery",
    "assets": [
        {"version": "3.1.1", "files": ["jquery.js", "jquery.min.js", "jquery.slim.js"]}
    ]
}"#;

struct Fixture {
    project: TempDir,
    registry: ProviderRegistry,
    _server: MockServer,
}

/// A project directory wired to a mock cdnjs endpoint serving jquery 3.1.1.
async fn fixture() -> Fixture {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/libraries/jquery"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JQUERY_METADATA))
        .mount(&server)
        .await;
    for file in ["jquery.js", "jquery.min.js", "jquery.slim.js"] {
        Mock::given(method("GET"))
            .and(path(format!("/ajax/libs/jquery/3.1.1/{}", file)))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("/* {} */", file)),
            )
            .mount(&server)
            .await;
    }

    let project = TempDir::new().unwrap();
    let host = Arc::new(HostInteraction::new(
        project.path(),
        project.path().join(".cache"),
    ));
    let cache = Arc::new(CacheService::new().unwrap());

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CdnjsProvider::with_base_urls(
        Arc::clone(&host),
        Arc::clone(&cache),
        server.uri(),
        format!("{}/ajax/libs", server.uri()),
    )));
    registry.register(Arc::new(FileSystemProvider::new(host)));

    Fixture {
        project,
        registry,
        _server: server,
    }
}

fn goal_states(results: &[OperationResult<LibraryGoalState>]) -> Vec<LibraryGoalState> {
    results.iter().filter_map(|r| r.result.clone()).collect()
}

#[tokio::test]
async fn scenario_a_restores_exactly_the_requested_files() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js", "jquery.min.js"]
        }]}"#,
    )
    .unwrap();

    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(Manifest::files_written(&results), 2);
    assert_eq!(
        std::fs::read_to_string(fx.project.path().join("lib/jquery.js")).unwrap(),
        "/* jquery.js */"
    );
    assert!(fx.project.path().join("lib/jquery.min.js").exists());
    // The file that was not requested is not materialized
    assert!(!fx.project.path().join("lib/jquery.slim.js").exists());
}

#[tokio::test]
async fn scenario_b_traversing_entry_fails_without_disturbing_others() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [
            {
                "provider": "cdnjs",
                "library": "jquery@3.1.1",
                "destination": "lib",
                "files": ["jquery.js", "jquery.min.js"]
            },
            {
                "provider": "filesystem",
                "library": "../path/to/file.txt",
                "destination": "lib"
            }
        ]}"#,
    )
    .unwrap();

    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].errors.len(), 1);
    assert_eq!(results[1].errors[0].code, ErrorCode::InvalidLibraryId);
    assert_eq!(Manifest::files_written(&results), 2);
}

#[tokio::test]
async fn scenario_c_missing_metadata_file_is_nonfatal() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js", "no-such-file.js"]
        }]}"#,
    )
    .unwrap();

    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;

    assert!(!results[0].success);
    assert_eq!(results[0].errors.len(), 1);
    assert_eq!(results[0].errors[0].code, ErrorCode::FileNotFound);
    assert!(results[0].errors[0].message.contains("no-such-file.js"));
    // The valid file still installs
    assert!(fx.project.path().join("lib/jquery.js").exists());
    assert!(!fx.project.path().join("lib/no-such-file.js").exists());
}

#[tokio::test]
async fn restoring_unchanged_manifest_twice_is_up_to_date() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js", "jquery.min.js"]
        }]}"#,
    )
    .unwrap();

    let first = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;
    assert!(first[0].success && !first[0].up_to_date);
    let mtime = std::fs::metadata(fx.project.path().join("lib/jquery.js"))
        .unwrap()
        .modified()
        .unwrap();

    let prior = goal_states(&first);
    let second = manifest
        .restore(&fx.registry, Some(&prior), &CancellationToken::new())
        .await;
    assert!(second[0].success);
    assert!(second[0].up_to_date);
    assert_eq!(Manifest::files_written(&second), 0);

    let mtime_after = std::fs::metadata(fx.project.path().join("lib/jquery.js"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(mtime, mtime_after);
}

#[tokio::test]
async fn changing_the_file_set_cleans_up_stale_files() {
    let fx = fixture().await;
    let before = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js", "jquery.min.js"]
        }]}"#,
    )
    .unwrap();
    let first = before
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;
    assert!(first[0].success);

    let after = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.min.js", "jquery.slim.js"]
        }]}"#,
    )
    .unwrap();
    let prior = goal_states(&first);
    let second = after
        .restore(&fx.registry, Some(&prior), &CancellationToken::new())
        .await;

    assert!(second[0].success);
    assert!(!fx.project.path().join("lib/jquery.js").exists());
    assert!(fx.project.path().join("lib/jquery.min.js").exists());
    assert!(fx.project.path().join("lib/jquery.slim.js").exists());
}

#[tokio::test]
async fn hand_edited_files_are_never_overwritten() {
    let fx = fixture().await;
    std::fs::create_dir_all(fx.project.path().join("lib")).unwrap();
    std::fs::write(fx.project.path().join("lib/jquery.js"), "/* my edits */").unwrap();

    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js"]
        }]}"#,
    )
    .unwrap();
    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;

    assert!(results[0].success);
    assert_eq!(Manifest::files_written(&results), 0);
    assert_eq!(
        std::fs::read_to_string(fx.project.path().join("lib/jquery.js")).unwrap(),
        "/* my edits */"
    );
}

#[tokio::test]
async fn files_written_excludes_non_clobbered_files() {
    let fx = fixture().await;
    std::fs::create_dir_all(fx.project.path().join("lib")).unwrap();
    std::fs::write(fx.project.path().join("lib/jquery.js"), "/* my edits */").unwrap();

    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js", "jquery.min.js"]
        }]}"#,
    )
    .unwrap();
    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;

    assert!(results[0].success);
    // Only jquery.min.js was missing; the skipped file does not count
    assert_eq!(Manifest::files_written(&results), 1);
    assert!(fx.project.path().join("lib/jquery.min.js").exists());
}

#[tokio::test]
async fn default_provider_and_destination_apply() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{
            "defaultProvider": "cdnjs",
            "defaultDestination": "wwwroot/lib",
            "libraries": [{"library": "jquery@3.1.1", "files": ["jquery.js"]}]
        }"#,
    )
    .unwrap();

    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;
    assert!(results[0].success);
    assert!(fx.project.path().join("wwwroot/lib/jquery.js").exists());
}

#[tokio::test]
async fn unknown_version_fails_resolution() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@9.9.9",
            "destination": "lib"
        }]}"#,
    )
    .unwrap();

    let results = manifest
        .restore(&fx.registry, None, &CancellationToken::new())
        .await;
    assert!(!results[0].success);
    assert_eq!(results[0].errors[0].code, ErrorCode::InvalidLibraryId);
}

/// Provider used to pin down mid-batch cancellation: one library succeeds and
/// then cancels the shared token, the other waits for the token and reports
/// cancellation the way a cooperative provider would.
struct CancellingProvider {
    token: CancellationToken,
}

#[async_trait::async_trait]
impl Provider for CancellingProvider {
    fn id(&self) -> &str {
        "cancelling"
    }

    fn uses_default_identifier(&self) -> bool {
        true
    }

    async fn resolve(
        &self,
        state: &librestore::LibraryInstallationState,
        _cancel: &CancellationToken,
    ) -> Result<LibraryGoalState, librestore::Error> {
        Ok(LibraryGoalState {
            provider_id: "cancelling".to_string(),
            library_id: state.library_id.clone(),
            identifier: None,
            destination: state.destination_path.clone(),
            files: vec![],
        })
    }

    async fn install(
        &self,
        state: &librestore::LibraryInstallationState,
        _previous: Option<&LibraryGoalState>,
        cancel: &CancellationToken,
    ) -> OperationResult<LibraryGoalState> {
        if state.library_id == "first@1" {
            let goal = self.resolve(state, cancel).await.unwrap();
            let result = OperationResult::succeeded(goal);
            self.token.cancel();
            return result;
        }
        cancel.cancelled().await;
        OperationResult::cancelled()
    }
}

#[tokio::test]
async fn cancellation_mid_batch_keeps_completed_outcomes() {
    init_tracing();
    let token = CancellationToken::new();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CancellingProvider {
        token: token.clone(),
    }));

    let manifest = Manifest::from_json(
        r#"{"libraries": [
            {"provider": "cancelling", "library": "first@1", "destination": "lib"},
            {"provider": "cancelling", "library": "second@1", "destination": "lib"}
        ]}"#,
    )
    .unwrap();

    let results = manifest.restore(&registry, None, &token).await;

    assert!(results[0].success);
    assert!(results[1].cancelled);
    assert!(results[1].errors.is_empty());
    assert!(results[1].result.is_none());
}

#[tokio::test]
async fn already_cancelled_token_cancels_every_entry() {
    let fx = fixture().await;
    let manifest = Manifest::from_json(
        r#"{"libraries": [
            {"provider": "cdnjs", "library": "jquery@3.1.1", "destination": "lib"},
            {"provider": "filesystem", "library": "vendor", "destination": "lib"}
        ]}"#,
    )
    .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let results = manifest.restore(&fx.registry, None, &token).await;

    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(result.cancelled);
        assert!(result.errors.is_empty());
    }
    assert!(!fx.project.path().join("lib/jquery.js").exists());
}

#[tokio::test]
async fn cancellation_during_failing_fetch_reports_cancelled() {
    init_tracing();
    let server = MockServer::start().await;
    // The metadata request fails slowly; the token is cancelled while it is
    // still in flight
    Mock::given(method("GET"))
        .and(path("/libraries/jquery"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(250)))
        .mount(&server)
        .await;

    let project = TempDir::new().unwrap();
    let host = Arc::new(HostInteraction::new(
        project.path(),
        project.path().join(".cache"),
    ));
    let cache = Arc::new(CacheService::new().unwrap());
    let provider = CdnjsProvider::with_base_urls(
        host,
        cache,
        server.uri(),
        format!("{}/ajax/libs", server.uri()),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let entry = librestore::LibraryInstallationState {
        provider_id: "cdnjs".to_string(),
        library_id: "jquery@3.1.1".to_string(),
        destination_path: "lib".to_string(),
        files: None,
    };
    let result = provider.install(&entry, None, &token).await;
    canceller.await.unwrap();

    assert!(result.cancelled);
    assert!(!result.success);
    assert!(result.errors.is_empty());
    assert!(result.result.is_none());
}

#[tokio::test]
async fn metadata_is_fetched_once_across_restores() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/libraries/jquery"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JQUERY_METADATA))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/libs/jquery/3.1.1/jquery.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("/* jquery.js */"))
        .expect(1)
        .mount(&server)
        .await;

    let project = TempDir::new().unwrap();
    let host = Arc::new(HostInteraction::new(
        project.path(),
        project.path().join(".cache"),
    ));
    let cache = Arc::new(CacheService::new().unwrap());
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CdnjsProvider::with_base_urls(
        host,
        cache,
        server.uri(),
        format!("{}/ajax/libs", server.uri()),
    )));

    let manifest = Manifest::from_json(
        r#"{"libraries": [{
            "provider": "cdnjs",
            "library": "jquery@3.1.1",
            "destination": "lib",
            "files": ["jquery.js"]
        }]}"#,
    )
    .unwrap();

    let first = manifest
        .restore(&registry, None, &CancellationToken::new())
        .await;
    assert!(first[0].success);
    // Metadata comes from the cache and the existing file is not re-fetched
    let second = manifest
        .restore(&registry, None, &CancellationToken::new())
        .await;
    assert!(second[0].success);
    assert!(second[0].up_to_date);
}

#[tokio::test]
async fn search_ranks_by_match_position() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/libraries"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"results": [
                {"name": "requirejs"},
                {"name": "jquery-ui"},
                {"name": "jquery"},
                {"name": "backbone.js"}
            ], "total": 4}"#,
        ))
        .mount(&server)
        .await;

    let project = TempDir::new().unwrap();
    let host = Arc::new(HostInteraction::new(
        project.path(),
        project.path().join(".cache"),
    ));
    let cache = Arc::new(CacheService::new().unwrap());
    let provider = CdnjsProvider::with_base_urls(
        host,
        cache,
        server.uri(),
        format!("{}/ajax/libs", server.uri()),
    );

    let set = provider.search("jquery").await.unwrap();
    let names: Vec<&str> = set
        .completions
        .iter()
        .map(|c| c.display_text.as_str())
        .collect();
    assert_eq!(names, vec!["jquery", "jquery-ui"]);
}
