#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqtail::app::{app, AppState};
use reqtail::auth::{generate_jwt, Claims};
use reqtail::config::{AppConfig, SecurityConfig};
use reqtail::observability::{MemorySink, Observability};

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub sink: Arc<MemorySink>,
    pub observability: Arc<Observability>,
    pub security: SecurityConfig,
}

impl TestServer {
    /// Serve the full router in-process on a free port, logging into memory.
    pub async fn spawn(config: AppConfig) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let sink = Arc::new(MemorySink::new());
        let state = AppState::from_config(&config, sink.clone());
        let observability = Arc::clone(&state.observability);
        let router = app(state);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind {}", base_url))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await;
        });

        let server = Self {
            port,
            base_url,
            sink,
            observability,
            security: config.security.clone(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            // /health is excluded from the request log, so probing leaves the sink empty
            if let Ok(resp) = client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Bearer token for a member of `slug`, signed with this server's secret.
    pub fn member_token(&self, user_id: &str, slug: &str) -> Result<String> {
        let claims = Claims::new(user_id, "member", &self.security)
            .with_email(format!("{}@example.com", user_id))
            .with_org(format!("org-{}", slug), slug, "owner");
        Ok(generate_jwt(&claims, &self.security)?)
    }

    /// Bearer token for `user_id` acting under an admin's impersonation.
    pub fn impersonated_token(&self, user_id: &str, slug: &str, admin_id: &str) -> Result<String> {
        let claims = Claims::new(user_id, "member", &self.security)
            .with_org(format!("org-{}", slug), slug, "member")
            .impersonated_by(admin_id);
        Ok(generate_jwt(&claims, &self.security)?)
    }
}

/// Production sampling with the random bucket switched off, so only errors
/// and slow requests are kept. Production ships no secret; tests set their own.
pub fn production_config() -> AppConfig {
    let mut config = AppConfig::production();
    config.sampling.sample_rate = 0.0;
    config.security.jwt_secret = "reqtail-production-test-secret".to_string();
    config
}

pub fn development_config() -> AppConfig {
    AppConfig::development()
}

/// Token signed with an unrelated secret.
pub fn foreign_token(user_id: &str) -> Result<String> {
    let security = SecurityConfig {
        jwt_secret: "some-other-deployment".to_string(),
        jwt_expiry_hours: 1,
    };
    Ok(generate_jwt(&Claims::new(user_id, "member", &security), &security)?)
}
