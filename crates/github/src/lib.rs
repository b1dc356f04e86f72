pub mod webhook;

use anyhow::{Context, Result};
use jsonwebtoken::EncodingKey;
use octocrab::{
    Octocrab,
    models::{AppId, InstallationId},
};
use scanbot_core::config::{GitHubConfig, WelcomeIssueConfig};

use crate::webhook::NewInstallation;

/// GitHub App credentials. Clients are created per use since installation events are rare.
#[derive(Clone)]
pub struct GitHubApp {
    app_id: AppId,
    key: EncodingKey,
    welcome: WelcomeIssueConfig,
}

impl GitHubApp {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let pem = config.app.private_key_pem()?;
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .context("Failed to parse GitHub App private key")?;
        Ok(Self::with_key(config.app.id, key, config.welcome_issue.clone()))
    }

    pub fn with_key(app_id: u64, key: EncodingKey, welcome: WelcomeIssueConfig) -> Self {
        Self { app_id: AppId(app_id), key, welcome }
    }

    fn app_client(&self) -> Result<Octocrab> {
        Octocrab::builder()
            .app(self.app_id, self.key.clone())
            .build()
            .context("Failed to create GitHub client")
    }

    /// Exchange the app credentials for an installation access token.
    pub async fn installation_client(&self, installation_id: InstallationId) -> Result<Octocrab> {
        let (client, _token) = self
            .app_client()?
            .installation_and_token(installation_id)
            .await
            .with_context(|| {
                format!("Failed to fetch access token for installation {installation_id}")
            })?;
        Ok(client)
    }

    /// Open the welcome issue on the first repository of a new installation.
    pub async fn welcome(&self, installation: &NewInstallation) -> Result<()> {
        let installation_id = installation.id;
        let Some(repository) = installation.repositories.first() else {
            tracing::warn!("Installation {installation_id} created with no repositories");
            return Ok(());
        };
        let (owner, repo) = repository
            .split_once('/')
            .with_context(|| format!("Invalid repository name {repository}"))?;
        let client = self.installation_client(installation_id).await?;
        let issue = client
            .issues(owner, repo)
            .create(&self.welcome.title)
            .body(&self.welcome.body)
            .send()
            .await
            .with_context(|| format!("Failed to open welcome issue on {repository}"))?;
        tracing::info!("Opened welcome issue #{} on {repository}", issue.number);
        Ok(())
    }
}
