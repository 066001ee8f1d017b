//! Gateway server: configuration, state, builder, and the axum router.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use cardfile_auth::{
    AccountLifecycle, AvatarLookup, ConfirmationMailer, CredentialStore, FixedWindowGate,
    Gravatar, RateLimiterGate, TokenService, TracingMailer, lifecycle::RatePolicy,
};
use cardfile_contacts::ContactStore;
use cardfile_core::Config;
use cardfile_core::config::{AuthSettings, RateLimitSettings};

use crate::GatewayError;
use crate::middleware::{ClientThrottle, throttle};
use crate::routes;
use crate::store::{SledAccountStore, SledContactStore};

/// Request timeout applied to every route.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Data directory for persistent storage.
    pub data_dir: PathBuf,
    /// Authentication settings.
    pub auth: AuthSettings,
    /// Rate-limit policy.
    pub limits: RateLimitSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GatewayConfig {
    /// Derive the gateway configuration from the loaded application config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.server.port,
            bind_address: config.server.bind_address.clone(),
            cors: config.server.cors,
            data_dir: config.server.data_dir.clone(),
            auth: config.auth.clone().with_env_overrides(),
            limits: config.limits.clone(),
        }
    }
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Account lifecycle controller.
    pub lifecycle: Arc<AccountLifecycle>,
    /// Contact store.
    pub contacts: Arc<dyn ContactStore>,
    /// Rate-limit gate consulted by the contact routes.
    pub gate: Arc<dyn RateLimiterGate>,
    /// Coarse per-client throttle.
    pub throttle: Arc<ClientThrottle>,
    /// Rate-limit policy.
    pub limits: RateLimitSettings,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: AppState,
}

/// Builder for constructing a [`Gateway`] with its dependencies.
///
/// This is the composition root: every collaborator the identity core needs
/// is constructed (or injected) here and passed down explicitly. Omitted
/// pieces get production defaults — sled stores under the data directory,
/// the Gravatar lookup, the tracing mail dispatcher.
pub struct GatewayBuilder {
    config: GatewayConfig,
    credential_store: Option<Arc<dyn CredentialStore>>,
    contact_store: Option<Arc<dyn ContactStore>>,
    gate: Option<Arc<dyn RateLimiterGate>>,
    avatars: Option<Arc<dyn AvatarLookup>>,
    mailer: Option<Arc<dyn ConfirmationMailer>>,
    tokens: Option<Arc<TokenService>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            credential_store: None,
            contact_store: None,
            gate: None,
            avatars: None,
            mailer: None,
            tokens: None,
        }
    }

    /// Set the gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a credential store (defaults to sled under the data dir).
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Inject a contact store (defaults to sled under the data dir).
    #[must_use]
    pub fn with_contact_store(mut self, store: Arc<dyn ContactStore>) -> Self {
        self.contact_store = Some(store);
        self
    }

    /// Inject a rate-limit gate (defaults to the in-process fixed window).
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn RateLimiterGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Inject an avatar lookup (defaults to Gravatar).
    #[must_use]
    pub fn with_avatar_lookup(mut self, avatars: Arc<dyn AvatarLookup>) -> Self {
        self.avatars = Some(avatars);
        self
    }

    /// Inject a confirmation-mail dispatcher (defaults to tracing-backed).
    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn ConfirmationMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Inject a token service (defaults to one built from the configured or
    /// auto-generated secret).
    #[must_use]
    pub fn with_token_service(mut self, tokens: Arc<TokenService>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Assemble the gateway.
    ///
    /// # Errors
    ///
    /// Returns error when default stores cannot be opened or the signing
    /// secret is unusable.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;

        let (credential_store, contact_store) = match (self.credential_store, self.contact_store) {
            (Some(accounts), Some(contacts)) => (accounts, contacts),
            (accounts, contacts) => {
                // The sled database is opened once and shared by both trees.
                std::fs::create_dir_all(&config.data_dir)?;
                let db = sled::open(config.data_dir.join("cardfile"))
                    .map_err(|e| GatewayError::Storage(format!("failed to open database: {e}")))?;

                let accounts: Arc<dyn CredentialStore> = match accounts {
                    Some(store) => store,
                    None => Arc::new(
                        SledAccountStore::with_db(&db)
                            .map_err(|e| GatewayError::Storage(e.to_string()))?,
                    ),
                };
                let contacts: Arc<dyn ContactStore> = match contacts {
                    Some(store) => store,
                    None => Arc::new(
                        SledContactStore::with_db(db)
                            .map_err(|e| GatewayError::Storage(e.to_string()))?,
                    ),
                };
                (accounts, contacts)
            }
        };

        let tokens = match self.tokens {
            Some(tokens) => tokens,
            None => {
                let secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
                    tracing::info!("Generated new JWT secret");
                    TokenService::generate_hex_secret()
                });
                Arc::new(
                    TokenService::from_hex_secret(
                        &secret,
                        config.auth.access_expiry(),
                        config.auth.refresh_expiry(),
                        config.auth.confirm_expiry(),
                    )
                    .map_err(|e| GatewayError::Config(e.to_string()))?,
                )
            }
        };

        let gate = self.gate.unwrap_or_else(|| Arc::new(FixedWindowGate::new()));
        let avatars = self.avatars.unwrap_or_else(|| Arc::new(Gravatar::new()));
        let mailer = self.mailer.unwrap_or_else(|| Arc::new(TracingMailer::new()));

        let lifecycle = Arc::new(AccountLifecycle::new(
            credential_store,
            tokens,
            gate.clone(),
            avatars,
            mailer,
            RatePolicy {
                requests: config.limits.auth_requests,
                window: config.limits.auth_window(),
            },
        ));

        let state = AppState {
            lifecycle,
            contacts: contact_store,
            gate,
            throttle: Arc::new(ClientThrottle::new(config.limits.client_requests_per_minute)),
            limits: config.limits.clone(),
        };

        Ok(Gateway { config, state })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// The assembled router, exposed for in-process testing.
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health))
            .merge(routes::api_router())
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                throttle,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

        if self.config.cors {
            router = router.layer(CorsLayer::permissive());
        }

        router.with_state(self.state.clone())
    }

    /// The shared state, exposed for in-process testing.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        tracing::info!("Cardfile API listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn health() -> &'static str {
    "OK"
}
