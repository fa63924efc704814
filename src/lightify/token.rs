use std::{ffi::OsString, io, path::PathBuf, sync::Arc, time::Duration};

use log::{error, info, warn};
use serde::Deserialize;
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};

use crate::{
    error::{Error, Result},
    protocols::https::{mk_form_post_request, HyperHttpsClient},
    settings::LightifySettings,
};

/// Persisted OAuth2 refresh token, stored as the raw contents of a file.
#[derive(Clone, Debug)]
pub struct RefreshTokenFile {
    path: PathBuf,
}

impl RefreshTokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn read(&self) -> Result<String> {
        let contents = tokio::fs::read(&self.path).await?;
        let contents = String::from_utf8(contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8: {}", self.path.display(), e),
            )
        })?;
        let token = contents.trim().to_string();

        if token.is_empty() {
            return Err(Error::Persistence(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} does not contain a refresh token", self.path.display()),
            )));
        }

        Ok(token)
    }

    /// Sibling file the new token is written to before it replaces the
    /// current one.
    fn staging_path(&self) -> PathBuf {
        let mut path = OsString::from(self.path.as_os_str());
        path.push(".tmp");
        PathBuf::from(path)
    }

    /// Replaces the stored token. The file is only readable by its owner and
    /// the previous token stays in place if writing fails.
    pub async fn write(&self, token: &str) -> Result<()> {
        let staging_path = self.staging_path();

        // Permissions only apply to newly created files
        let _ = tokio::fs::remove_file(&staging_path).await;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&staging_path).await?;
        file.write_all(token.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&staging_path, &self.path).await?;

        Ok(())
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct TokenPair {
    access_token: String,
    refresh_token: String,
}

/// Owns the Lightify access token and keeps it fresh.
///
/// Cloning is cheap and every clone observes the same access token.
#[derive(Clone)]
pub struct TokenManager {
    settings: LightifySettings,
    https_client: HyperHttpsClient,
    store: RefreshTokenFile,
    access_token: Arc<watch::Sender<Arc<str>>>,
}

impl TokenManager {
    /// Exchanges the persisted refresh token for the first access token.
    pub async fn init(
        settings: &LightifySettings,
        https_client: &HyperHttpsClient,
    ) -> Result<TokenManager> {
        let (access_token, _) = watch::channel(Arc::from(""));

        let token_manager = TokenManager {
            settings: settings.clone(),
            https_client: https_client.clone(),
            store: RefreshTokenFile::new(&settings.token_path),
            access_token: Arc::new(access_token),
        };

        token_manager.refresh().await?;

        Ok(token_manager)
    }

    pub fn current_access_token(&self) -> Arc<str> {
        self.access_token.borrow().clone()
    }

    /// Rotates the token pair. The current access token is kept if any step
    /// fails.
    pub async fn refresh(&self) -> Result<()> {
        let refresh_token = self.store.read().await?;
        let tokens = self.exchange(&refresh_token).await?;

        // Lightify invalidates the old refresh token as soon as a new one has
        // been issued
        self.store.write(&tokens.refresh_token).await?;
        self.access_token
            .send_replace(Arc::from(tokens.access_token.as_str()));

        info!("Refreshed Lightify access token");

        Ok(())
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair> {
        let uri = format!("{}/oauth2/access_token", self.settings.api_url).parse()?;

        let form = [
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response: TokenResponse =
            match mk_form_post_request(&self.https_client, &uri, &form).await {
                Ok(response) => response,
                Err(Error::Status { status, body }) if status.is_client_error() => {
                    return Err(Error::Auth(format!(
                        "token endpoint responded with {}: {}",
                        status, body
                    )))
                }
                Err(e) => return Err(e),
            };

        match response {
            TokenResponse {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                ..
            } if !access_token.is_empty() && !refresh_token.is_empty() => Ok(TokenPair {
                access_token,
                refresh_token,
            }),
            TokenResponse {
                error,
                error_description,
                ..
            } => Err(Error::Auth(format!(
                "token endpoint did not issue a token pair (error: {}, description: {})",
                error.as_deref().unwrap_or("none"),
                error_description.as_deref().unwrap_or("none")
            ))),
        }
    }

    /// Refreshes the token pair every `period`, starting one `period` from now.
    ///
    /// A failed refresh is not retried before the next scheduled run. `period`
    /// must not be zero, see `LightifySettings::token_refresh_interval`.
    pub fn start_refresh_loop(&self, period: Duration) -> JoinHandle<()> {
        let token_manager = self.clone();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);

            loop {
                interval.tick().await;

                match token_manager.refresh().await {
                    Ok(()) => {}
                    Err(e @ Error::Auth(_)) => {
                        error!(
                            "Failed to refresh Lightify access token, re-authorize and store a new refresh token in {}: {}",
                            token_manager.settings.token_path.display(),
                            e
                        );
                    }
                    Err(e) => {
                        warn!(
                            "Failed to refresh Lightify access token, next attempt in {:?}: {}",
                            period, e
                        );
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::lightify::testing::{mk_test_settings, temp_token_path, token_response};

    #[tokio::test]
    async fn init_exchanges_and_rotates_refresh_token() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .and(body_string_contains("client_id=client"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(token_response("access-1", "refresh-2"))
            .expect(1)
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();

        assert_eq!(&*token_manager.current_access_token(), "access-1");

        let stored = RefreshTokenFile::new(&settings.token_path).read().await.unwrap();
        assert_eq!(stored, "refresh-2");
    }

    #[tokio::test]
    async fn init_fails_without_request_when_token_file_is_missing() {
        let server = MockServer::start().await;
        let mut settings = mk_test_settings(&server, "unused");
        settings.token_path = temp_token_path();

        Mock::given(method("POST"))
            .respond_with(token_response("access-1", "refresh-2"))
            .expect(0)
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let result = TokenManager::init(&settings, &https_client).await;

        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn rejected_exchange_is_auth_error() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "expired");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let result = TokenManager::init(&settings, &https_client).await;

        assert!(matches!(result, Err(Error::Auth(_))));

        // Nothing new was issued, so the stored token must stay in place
        let stored = RefreshTokenFile::new(&settings.token_path).read().await.unwrap();
        assert_eq!(stored, "expired");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_access_token() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-1", "refresh-2"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token revoked"
            })))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();

        let result = token_manager.refresh().await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(&*token_manager.current_access_token(), "access-1");
    }

    #[tokio::test]
    async fn malformed_token_response_is_decode_error() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let result = TokenManager::init(&settings, &https_client).await;

        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn refreshed_token_is_visible_to_all_clones() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-1", "refresh-2"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .and(body_string_contains("refresh_token=refresh-2"))
            .respond_with(token_response("access-2", "refresh-3"))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();
        let observer = token_manager.clone();

        token_manager.refresh().await.unwrap();

        assert_eq!(&*observer.current_access_token(), "access-2");

        let stored = RefreshTokenFile::new(&settings.token_path).read().await.unwrap();
        assert_eq!(stored, "refresh-3");
    }

    #[tokio::test]
    async fn refresh_loop_replaces_token_on_schedule() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-1", "refresh-2"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-2", "refresh-3"))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();

        let handle = token_manager.start_refresh_loop(Duration::from_millis(50));

        let mut refreshed = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if &*token_manager.current_access_token() == "access-2" {
                refreshed = true;
                break;
            }
        }

        handle.abort();
        assert!(refreshed);
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_access_token() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-1", "refresh-2"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-2", "refresh-3"))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();

        // The stored token stays readable, but the replacement can not be written
        let store = RefreshTokenFile::new(&settings.token_path);
        std::fs::create_dir(store.staging_path()).unwrap();

        let result = token_manager.refresh().await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(&*token_manager.current_access_token(), "access-1");
        assert_eq!(store.read().await.unwrap(), "refresh-2");
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_is_network_error() {
        let server = MockServer::start().await;
        let settings = mk_test_settings(&server, "refresh-1");

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(token_response("access-1", "refresh-2"))
            .mount(&server)
            .await;

        let https_client = crate::protocols::https::mk_hyper_https_client(&settings).unwrap();
        let token_manager = TokenManager::init(&settings, &https_client).await.unwrap();

        let token_manager = TokenManager {
            settings: LightifySettings {
                api_url: "http://127.0.0.1:1".to_string(),
                ..settings.clone()
            },
            ..token_manager
        };

        let result = token_manager.refresh().await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(&*token_manager.current_access_token(), "access-1");

        let stored = RefreshTokenFile::new(&settings.token_path).read().await.unwrap();
        assert_eq!(stored, "refresh-2");
    }

    #[tokio::test]
    async fn non_utf8_token_file_is_persistence_error() {
        let path = temp_token_path();
        std::fs::write(&path, [0x72, 0x65, 0xff, 0xfe]).unwrap();

        let result = RefreshTokenFile::new(&path).read().await;

        match result {
            Err(Error::Persistence(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected persistence error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stored_token_is_trimmed() {
        let path = temp_token_path();
        std::fs::write(&path, "refresh-1\n").unwrap();

        let token = RefreshTokenFile::new(&path).read().await.unwrap();

        assert_eq!(token, "refresh-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn written_token_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_token_path();
        std::fs::write(&path, "refresh-1").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = RefreshTokenFile::new(&path);
        store.write("refresh-2").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.read().await.unwrap(), "refresh-2");
        assert!(!store.staging_path().exists());
    }
}
