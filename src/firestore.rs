use std::{
    fs,
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, anyhow};
use chrono::{SecondsFormat, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    reading::Reading,
    store::{RemoteStore, new_document_id},
};

pub const API_BASE: &str = "https://firestore.googleapis.com/v1";
pub const SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub const TOKEN_LIFETIME_SECS: i64 = 3600;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Re-mint slightly before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credential file {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credential file {path:?}"))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct Firestore {
    agent: ureq::Agent,
    account: ServiceAccount,
    key: EncodingKey,
    token: Mutex<Option<AccessToken>>,
}

impl Firestore {
    pub fn new(account: ServiceAccount) -> Result<Self, anyhow::Error> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .context("Failed to load service account private key")?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();

        Ok(Self {
            agent,
            account,
            key,
            token: Mutex::new(None),
        })
    }

    // No network here: the first token is minted by the first `add`.
    pub fn connect(credentials: &Path) -> Result<Self, anyhow::Error> {
        let account = ServiceAccount::from_file(credentials)?;
        Self::new(account)
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    fn access_token(&self) -> Result<String, anyhow::Error> {
        let mut token = self
            .token
            .lock()
            .map_err(|_| anyhow!("Access token lock poisoned"))?;

        if let Some(t) = token.as_ref()
            && Instant::now() < t.expires_at
        {
            return Ok(t.value.clone());
        }

        let fresh = self.fetch_token()?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    fn fetch_token(&self) -> Result<AccessToken, anyhow::Error> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: SCOPE,
            aud: &self.account.token_uri,
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();
        let assertion =
            jsonwebtoken::encode(&header, &claims, &self.key).context("Failed to sign JWT")?;

        let response: TokenResponse = self
            .agent
            .post(&self.account.token_uri)
            .send_form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .map_err(describe)?
            .into_json()
            .context("Failed to decode token response")?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

impl RemoteStore for Firestore {
    fn add(&self, collection: &str, reading: &Reading) -> Result<String, anyhow::Error> {
        let token = self
            .access_token()
            .context("Failed to authenticate with Firestore")?;
        let document_id = new_document_id(&mut rand::thread_rng());
        let url = collection_url(&self.account.project_id, collection);

        self.agent
            .post(&url)
            .query("documentId", &document_id)
            .set("Authorization", &format!("Bearer {token}"))
            .send_json(document(reading))
            .map_err(describe)?;

        Ok(document_id)
    }
}

pub fn collection_url(project_id: &str, collection: &str) -> String {
    format!("{API_BASE}/projects/{project_id}/databases/(default)/documents/{collection}")
}

pub fn document(reading: &Reading) -> Value {
    json!({
        "fields": {
            "timestamp": {
                "timestampValue": reading
                    .timestamp
                    .and_utc()
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            },
            "device_id": { "stringValue": reading.device_id },
            "pm25": { "doubleValue": reading.pm25 },
            "pm10": { "doubleValue": reading.pm10 },
            "temperature": { "doubleValue": reading.temperature },
            "humidity": { "doubleValue": reading.humidity },
        }
    })
}

fn describe(e: ureq::Error) -> anyhow::Error {
    match e {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("HTTP {code}: {}", body.trim())
        }
        ureq::Error::Transport(t) => anyhow!("Transport error: {t}"),
    }
}

// Valid key, but nothing listens on the discard port.
#[cfg(test)]
pub(crate) fn offline_account() -> ServiceAccount {
    ServiceAccount {
        project_id: "aqi-demo".to_string(),
        client_email: "simulator@aqi-demo.iam.gserviceaccount.com".to_string(),
        private_key: include_str!("testdata/service_account_key.pem").to_string(),
        private_key_id: Some("test-key".to_string()),
        token_uri: "http://127.0.0.1:9/token".to_string(),
    }
}
