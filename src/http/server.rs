use log::{debug, error, info};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{path::Path, sync::Arc};

use crate::{
    app::Services,
    blob::BlobStore,
    config::HttpConfig,
    domain::track::{TrackDescriptor, filename_for_query},
    http::error::ApiError,
};

const TOKEN_PATH: &str = "/api/token";
const DOWNLOAD_PATH: &str = "/api/download";
const DOWNLOAD_ALL_PATH: &str = "/api/download-all";

const MISSING_CODE: &str = "Missing code or redirectUri";
const MISSING_QUERY: &str = "Missing query parameter";
const INVALID_TRACKS: &str = "Missing or invalid tracks parameter";

pub struct HttpServer {
    services: Arc<Services>,
    pub config: HttpConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    code: Option<String>,
    redirect_uri: Option<String>,
}

#[derive(Deserialize)]
struct DownloadRequest {
    query: Option<String>,
}

#[derive(Deserialize)]
struct BatchRequest {
    tracks: Option<Vec<TrackDescriptor>>,
}

#[derive(Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize, Deserialize)]
struct UrlResponse {
    url: String,
}

impl HttpServer {
    pub fn new(services: Services, config: HttpConfig) -> Self {
        Self {
            services: Arc::new(services),
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let url = request.url();
        let result = match (request.method(), url.as_str()) {
            ("POST", TOKEN_PATH) => self.handle_token(request),
            ("POST", DOWNLOAD_PATH) => self.handle_download(request),
            ("POST", DOWNLOAD_ALL_PATH) => self.handle_download_all(request),
            (_, TOKEN_PATH | DOWNLOAD_PATH | DOWNLOAD_ALL_PATH) => Err(ApiError::MethodNotAllowed),
            _ => Err(ApiError::NotFound),
        };

        let response = result.unwrap_or_else(|e| {
            if e.status_code() >= 500 {
                error!("{} {} failed: {:?}", request.method(), url, e);
            }
            e.into_response()
        });

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    /// Parses the JSON body; anything unreadable is a 400 with `message`.
    fn read_json<T: DeserializeOwned>(request: &Request, message: &str) -> Result<T, ApiError> {
        rouille::input::json_input(request).map_err(|e| {
            debug!("rejecting body of {}: {e}", request.url());
            ApiError::BadRequest(message.to_string())
        })
    }

    fn blob_store(&self) -> Result<&Arc<dyn BlobStore>, ApiError> {
        self.services
            .blob_store
            .as_ref()
            .map_err(|e| ApiError::from(e.clone()))
    }

    fn handle_token(&self, request: &Request) -> Result<Response, ApiError> {
        let body: TokenRequest = Self::read_json(request, MISSING_CODE)?;
        let (Some(code), Some(redirect_uri)) = (non_empty(body.code), non_empty(body.redirect_uri))
        else {
            return Err(ApiError::BadRequest(MISSING_CODE.into()));
        };

        let exchanger = self
            .services
            .token_exchanger
            .as_ref()
            .map_err(|e| ApiError::from(e.clone()))?;

        let token = exchanger.exchange(&code, &redirect_uri)?;
        info!("Token exchange successful");

        Ok(Response::json(&TokenResponse {
            access_token: token.access_token.expose().to_string(),
        }))
    }

    fn handle_download(&self, request: &Request) -> Result<Response, ApiError> {
        let body: DownloadRequest = Self::read_json(request, MISSING_QUERY)?;
        let query = non_empty(body.query).ok_or_else(|| ApiError::BadRequest(MISSING_QUERY.into()))?;
        let store = self.blob_store()?;

        let payload = self.services.fetcher.fetch_track(&query)?;

        let filename = filename_for_query(&query);
        let base_path = format!(
            "{}/{}",
            self.services.track_prefix.trim_end_matches('/'),
            filename
        );
        let bytes = payload.into_bytes();
        let path = self.services.batch.naming.path_for(&base_path, &bytes);

        let url = store
            .put(&path, bytes, &mime_for_track(Path::new(&filename)))
            .map_err(|e| ApiError::internal("Failed to download track", e.to_string()))?;

        Ok(Response::json(&UrlResponse { url }))
    }

    fn handle_download_all(&self, request: &Request) -> Result<Response, ApiError> {
        let body: BatchRequest = Self::read_json(request, INVALID_TRACKS)?;
        let tracks = body
            .tracks
            .filter(|tracks| !tracks.is_empty())
            .ok_or_else(|| ApiError::BadRequest(INVALID_TRACKS.into()))?;
        let store = self.blob_store()?;

        let published = self
            .services
            .archiver()
            .build_archive(&tracks, store.as_ref())?;
        info!(
            "Archive with {} tracks published at {}",
            published.entries, published.url
        );

        Ok(Response::json(&UrlResponse { url: published.url }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Content type of an uploaded track, guessed from its extension.
fn mime_for_track(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::{ZipArchiveWriter, batch::BatchSettings},
        blob::PublishNaming,
        config::{BLOB_READ_WRITE_TOKEN, ConfigError, SPOTIFY_CLIENT_SECRET},
        fetch::{Fetcher, RetryPolicy, RetrySettings, SourceError},
        http::error::ErrorBody,
        pacing::Sleeper,
        spotify::auth::TokenExchanger,
        testing::{
            EventLog, FakeTokenExchanger, RecordingBlobStore, RecordingSleeper, ScriptedSource,
            read_zip,
        },
    };

    struct TestServer {
        server: HttpServer,
        log: EventLog,
        store: Arc<RecordingBlobStore>,
    }

    fn create_server(source: ScriptedSource, log: EventLog) -> TestServer {
        let store = Arc::new(RecordingBlobStore::new(log.clone()));
        let blob_store: Arc<dyn BlobStore> = store.clone();
        let exchanger: Arc<dyn TokenExchanger> = Arc::new(FakeTokenExchanger::new(log.clone(), "good-code"));
        create_server_with(source, log, store, Ok(blob_store), Ok(exchanger))
    }

    fn create_server_with(
        source: ScriptedSource,
        log: EventLog,
        store: Arc<RecordingBlobStore>,
        blob_store: Result<Arc<dyn BlobStore>, ConfigError>,
        token_exchanger: Result<Arc<dyn TokenExchanger>, ConfigError>,
    ) -> TestServer {
        let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new(log.clone()));
        let retry = RetrySettings {
            policy: RetryPolicy::RateLimitOnly,
            ..Default::default()
        };
        let services = Services {
            fetcher: Arc::new(Fetcher::new(Box::new(source), retry, Arc::clone(&sleeper))),
            writer: Arc::new(ZipArchiveWriter),
            sleeper,
            batch: BatchSettings {
                naming: PublishNaming {
                    content_addressed: false,
                },
                ..Default::default()
            },
            track_prefix: "tracks".to_string(),
            blob_store,
            token_exchanger,
        };

        TestServer {
            server: HttpServer::new(
                services,
                HttpConfig {
                    bind_addr: "127.0.0.1".to_string(),
                    port: 8080,
                    client_timeout_secs: 5,
                },
            ),
            log,
            store,
        }
    }

    fn create_default_server() -> TestServer {
        let log = EventLog::default();
        create_server(ScriptedSource::new(log.clone()), log)
    }

    fn post_json(url: &str, body: &str) -> Request {
        Request::fake_http(
            "POST",
            url,
            vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body.as_bytes().to_vec(),
        )
    }

    // --------------------------------------------------
    // ✅ BATCH DOWNLOAD
    // --------------------------------------------------

    #[test]
    fn test_download_all_success() -> anyhow::Result<()> {
        let t = create_default_server();

        let request = post_json(
            DOWNLOAD_ALL_PATH,
            r#"{"tracks":[{"name":"A","artist":"B"},{"name":"C","artist":"D"}]}"#,
        );
        let response = t.server.handle_request(&request);

        assert_eq!(response.status_code, 200);
        let body: UrlResponse = parse_json_response(response)?;
        assert_eq!(body.url, "https://blob.test/playlists/playlist.zip");

        assert_eq!(
            t.log.events(),
            vec!["fetch:A B", "sleep:1000", "fetch:C D", "put:playlists/playlist.zip"]
        );
        let stored = t.store.stored();
        let names: Vec<_> = read_zip(stored[0].bytes.clone())?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["A - B.mp3", "C - D.mp3"]);
        Ok(())
    }

    // --------------------------------------------------
    // ❌ BATCH VALIDATION
    // --------------------------------------------------

    #[test]
    fn test_download_all_rejects_missing_or_empty_tracks() -> anyhow::Result<()> {
        for body in [
            r#"{}"#,
            r#"{"tracks":[]}"#,
            r#"{"tracks":"A - B"}"#,
            r#"{"tracks":[{"name":"A"}]}"#,
            "not json",
        ] {
            let t = create_default_server();

            let response = t.server.handle_request(&post_json(DOWNLOAD_ALL_PATH, body));

            assert_eq!(response.status_code, 400, "body {body:?}");
            let err: ErrorBody = parse_json_response(response)?;
            assert_eq!(err.error, INVALID_TRACKS);
            assert!(t.log.events().is_empty(), "external calls made for {body:?}");
        }
        Ok(())
    }

    #[test]
    fn test_download_all_fetch_failure_is_500_without_upload() -> anyhow::Result<()> {
        let log = EventLog::default();
        let source = ScriptedSource::new(log.clone()).then_err(SourceError::NoMatch("A B".into()));
        let t = create_server(source, log);

        let response = t.server.handle_request(&post_json(
            DOWNLOAD_ALL_PATH,
            r#"{"tracks":[{"name":"A","artist":"B"},{"name":"C","artist":"D"}]}"#,
        ));

        assert_eq!(response.status_code, 500);
        let err: ErrorBody = parse_json_response(response)?;
        assert_eq!(err.error, "Failed to create ZIP file");
        let details = err.details.unwrap_or_default().to_string();
        assert!(details.contains("no match found"), "details: {details}");

        assert_eq!(t.log.count_prefix("put:"), 0);
        assert_eq!(t.log.events(), vec!["fetch:A B"]);
        Ok(())
    }

    #[test]
    fn test_download_all_without_blob_token_is_config_error() -> anyhow::Result<()> {
        let log = EventLog::default();
        let store = Arc::new(RecordingBlobStore::new(log.clone()));
        let exchanger: Arc<dyn TokenExchanger> = Arc::new(FakeTokenExchanger::new(log.clone(), "x"));
        let t = create_server_with(
            ScriptedSource::new(log.clone()),
            log,
            store,
            Err(ConfigError::MissingEnv(vec![BLOB_READ_WRITE_TOKEN])),
            Ok(exchanger),
        );

        let response = t.server.handle_request(&post_json(
            DOWNLOAD_ALL_PATH,
            r#"{"tracks":[{"name":"A","artist":"B"}]}"#,
        ));

        assert_eq!(response.status_code, 500);
        let err: ErrorBody = parse_json_response(response)?;
        assert!(err.error.starts_with("Server configuration error"));
        assert!(t.log.events().is_empty());
        Ok(())
    }

    // --------------------------------------------------
    // SINGLE DOWNLOAD
    // --------------------------------------------------

    #[test]
    fn test_download_single_track() -> anyhow::Result<()> {
        let t = create_default_server();

        let response = t.server.handle_request(&post_json(
            DOWNLOAD_PATH,
            r#"{"query":"Blinding Lights The Weeknd"}"#,
        ));

        assert_eq!(response.status_code, 200);
        let body: UrlResponse = parse_json_response(response)?;
        assert_eq!(
            body.url,
            "https://blob.test/tracks/Blinding Lights The Weeknd.mp3"
        );

        let stored = t.store.stored();
        assert_eq!(stored[0].content_type, "audio/mpeg");
        assert_eq!(stored[0].bytes, b"Blinding Lights The Weeknd");
        Ok(())
    }

    #[test]
    fn test_download_missing_query() -> anyhow::Result<()> {
        for body in [r#"{}"#, r#"{"query":"   "}"#, r#"{"query":null}"#] {
            let t = create_default_server();

            let response = t.server.handle_request(&post_json(DOWNLOAD_PATH, body));

            assert_eq!(response.status_code, 400);
            let err: ErrorBody = parse_json_response(response)?;
            assert_eq!(err.error, MISSING_QUERY);
            assert!(t.log.events().is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_download_failure_after_retries() -> anyhow::Result<()> {
        let log = EventLog::default();
        let source = ScriptedSource::new(log.clone())
            .then_err(SourceError::RateLimited)
            .then_err(SourceError::RateLimited)
            .then_err(SourceError::RateLimited);
        let t = create_server(source, log);

        let response = t
            .server
            .handle_request(&post_json(DOWNLOAD_PATH, r#"{"query":"q"}"#));

        assert_eq!(response.status_code, 500);
        let err: ErrorBody = parse_json_response(response)?;
        assert_eq!(err.error, "Failed to download track");
        assert_eq!(t.log.sleeps_ms(), vec![1000, 2000]);
        assert_eq!(t.log.count_prefix("put:"), 0);
        Ok(())
    }

    // --------------------------------------------------
    // TOKEN EXCHANGE
    // --------------------------------------------------

    #[test]
    fn test_token_exchange_success() -> anyhow::Result<()> {
        let t = create_default_server();

        let response = t.server.handle_request(&post_json(
            TOKEN_PATH,
            r#"{"code":"good-code","redirectUri":"http://localhost:5173/"}"#,
        ));

        assert_eq!(response.status_code, 200);
        let body: TokenResponse = parse_json_response(response)?;
        assert_eq!(body.access_token, "token-for-good-code");
        assert_eq!(
            t.log.events(),
            vec!["exchange:good-code:http://localhost:5173/"]
        );
        Ok(())
    }

    #[test]
    fn test_token_exchange_missing_fields() -> anyhow::Result<()> {
        for body in [r#"{"code":"good-code"}"#, r#"{"redirectUri":"http://x/"}"#, "{}"] {
            let t = create_default_server();

            let response = t.server.handle_request(&post_json(TOKEN_PATH, body));

            assert_eq!(response.status_code, 400);
            let err: ErrorBody = parse_json_response(response)?;
            assert_eq!(err.error, MISSING_CODE);
            assert!(t.log.events().is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_token_exchange_rejected_passes_provider_error_through() -> anyhow::Result<()> {
        let t = create_default_server();

        let response = t.server.handle_request(&post_json(
            TOKEN_PATH,
            r#"{"code":"stale-code","redirectUri":"http://localhost:5173/"}"#,
        ));

        assert_eq!(response.status_code, 500);
        let err: ErrorBody = parse_json_response(response)?;
        assert_eq!(err.error, "Failed to exchange token");
        assert_eq!(
            err.details,
            Some(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            }))
        );
        Ok(())
    }

    #[test]
    fn test_token_exchange_without_credentials_is_config_error() -> anyhow::Result<()> {
        let log = EventLog::default();
        let store = Arc::new(RecordingBlobStore::new(log.clone()));
        let blob_store: Arc<dyn BlobStore> = store.clone();
        let t = create_server_with(
            ScriptedSource::new(log.clone()),
            log,
            store,
            Ok(blob_store),
            Err(ConfigError::MissingEnv(vec![SPOTIFY_CLIENT_SECRET])),
        );

        let response = t.server.handle_request(&post_json(
            TOKEN_PATH,
            r#"{"code":"good-code","redirectUri":"http://localhost:5173/"}"#,
        ));

        assert_eq!(response.status_code, 500);
        let err: ErrorBody = parse_json_response(response)?;
        assert_eq!(
            err.error,
            "Server configuration error: Missing environment variables"
        );
        let details = err.details.unwrap_or_default().to_string();
        assert!(details.contains(SPOTIFY_CLIENT_SECRET));
        assert!(t.log.events().is_empty());
        Ok(())
    }

    // --------------------------------------------------
    // ROUTING
    // --------------------------------------------------

    #[test]
    fn test_non_post_is_method_not_allowed() {
        for path in [TOKEN_PATH, DOWNLOAD_PATH, DOWNLOAD_ALL_PATH] {
            for method in ["GET", "PUT", "DELETE"] {
                let t = create_default_server();

                let request = Request::fake_http(method, path, vec![], vec![]);
                let response = t.server.handle_request(&request);

                assert_eq!(response.status_code, 405, "{method} {path}");
                assert!(t.log.events().is_empty());
            }
        }
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let t = create_default_server();

        let response = t.server.handle_request(&post_json("/api/nope", "{}"));

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn test_mime_for_track() {
        assert_eq!(mime_for_track(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_for_track(Path::new("Song - Artist.MP3")), "audio/mpeg");
        assert_eq!(mime_for_track(Path::new("a.bin")), "application/octet-stream");
    }
}
