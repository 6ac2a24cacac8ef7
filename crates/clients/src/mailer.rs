use anyhow::{anyhow, Result};

use crowdnest_platform::{EmailMessage, Mailer};

/// Sends mail through a transactional-mail HTTP API (form POST with basic auth).
#[derive(Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    /// `None` unless `MAIL_API_URL`, `MAIL_API_KEY` and `MAIL_FROM` are all set.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("MAIL_API_URL").ok()?;
        let api_key = std::env::var("MAIL_API_KEY").ok()?;
        let from = std::env::var("MAIL_FROM").ok()?;
        Some(Self::new(&api_url, &api_key, &from))
    }
}

#[async_trait::async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let form = [
            ("from", self.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.body.as_str()),
        ];

        let response = self.http
            .post(&self.api_url)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| anyhow!("mail API request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("mail API returned {}: {}", status, body));
        }
        Ok(())
    }
}
