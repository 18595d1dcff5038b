use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const ANILIST_AUTHORIZE_URL: &str = "https://anilist.co/api/v2/oauth/authorize";
const ANILIST_TOKEN_URL: &str = "https://anilist.co/api/v2/oauth/token";
const ANILIST_USERINFO_URL: &str = "https://graphql.anilist.co";

const VIEWER_QUERY: &str = r#"
query {
  Viewer {
    id
    name
    avatar { large medium }
    options { titleLanguage }
    mediaListOptions { scoreFormat }
  }
}
"#;

/// Static description of an OAuth code-grant provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub authorization_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scope: String,
    pub callback_url: String,
    #[serde(skip)]
    pub client_id: String,
}

impl ProviderDescriptor {
    pub fn authorize_redirect(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.authorization_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.callback_url),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state)
        )
    }
}

/// Raw token payload from the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Provider profile mapped onto local session fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;
    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<ProviderProfile>;
}

#[derive(Debug, Clone)]
pub struct AniListProvider {
    client: Client,
    descriptor: ProviderDescriptor,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AniListViewer {
    pub id: i64,
    pub name: String,
    pub avatar: Option<Avatar>,
    pub options: Option<ViewerOptions>,
    pub media_list_options: Option<MediaListOptions>,
}

#[derive(Debug, Deserialize)]
pub struct Avatar {
    pub large: Option<String>,
    pub medium: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerOptions {
    pub title_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListOptions {
    pub score_format: Option<String>,
}

impl From<AniListViewer> for ProviderProfile {
    fn from(viewer: AniListViewer) -> Self {
        ProviderProfile {
            id: viewer.id.to_string(),
            name: viewer.name,
            image: viewer.avatar.and_then(|a| a.large.or(a.medium)),
        }
    }
}

impl AniListProvider {
    pub fn new(client_id: &str, client_secret: &str, public_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(format!("anistream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build AniList OAuth client")?;
        Ok(Self {
            client,
            descriptor: ProviderDescriptor {
                id: "anilist".to_string(),
                name: "AniList".to_string(),
                kind: "oauth".to_string(),
                authorization_url: ANILIST_AUTHORIZE_URL.to_string(),
                token_url: ANILIST_TOKEN_URL.to_string(),
                userinfo_url: ANILIST_USERINFO_URL.to_string(),
                scope: String::new(),
                callback_url: format!(
                    "{}/api/auth/callback/anilist",
                    public_url.trim_end_matches('/')
                ),
                client_id: client_id.to_string(),
            },
            client_secret: client_secret.to_string(),
        })
    }

    /// Point token exchange and user info at other hosts.
    pub fn with_endpoints(mut self, token_url: &str, userinfo_url: &str) -> Self {
        self.descriptor.token_url = token_url.to_string();
        self.descriptor.userinfo_url = userinfo_url.to_string();
        self
    }
}

#[async_trait]
impl OAuthProvider for AniListProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let body = json!({
            "grant_type": "authorization_code",
            "client_id": self.descriptor.client_id,
            "client_secret": self.client_secret,
            "redirect_uri": self.descriptor.callback_url,
            "code": code,
        });

        let res = self
            .client
            .post(&self.descriptor.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .context("AniList token request failed")?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .context("Failed to read AniList token body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "AniList token HTTP error (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }
        serde_json::from_slice(&bytes).context("Failed to parse AniList token JSON")
    }

    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<ProviderProfile> {
        #[derive(Deserialize)]
        struct GraphQlResponse {
            data: Option<Data>,
            errors: Option<Vec<GraphQlError>>,
        }

        #[derive(Deserialize)]
        struct GraphQlError {
            message: String,
        }

        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Viewer")]
            viewer: Option<AniListViewer>,
        }

        let res = self
            .client
            .post(&self.descriptor.userinfo_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(&tokens.access_token)
            .json(&json!({ "query": VIEWER_QUERY }))
            .send()
            .await
            .context("AniList viewer request failed")?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .context("Failed to read AniList viewer body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "AniList viewer HTTP error (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }

        let parsed: GraphQlResponse =
            serde_json::from_slice(&bytes).context("Failed to parse AniList viewer JSON")?;
        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let msg = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!("AniList viewer GraphQL error: {}", msg));
        }

        parsed
            .data
            .and_then(|d| d.viewer)
            .map(ProviderProfile::from)
            .ok_or_else(|| anyhow!("AniList returned no viewer"))
    }
}
