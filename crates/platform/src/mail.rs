use std::sync::Arc;
use std::time::Duration;

use crowdnest_common::{retry, RetryPolicy};
use tokio::sync::mpsc;

use crate::auth::{EmailPurpose, TokenService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Used when no mail transport is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        tracing::info!("[LogMailer] to={} subject={:?} (not delivered)", message.to, message.subject);
        Ok(())
    }
}

/// Producer side of the outgoing mail queue. Enqueueing never fails the
/// caller; a closed queue is only logged.
#[derive(Clone)]
pub struct EmailQueue {
    tx: mpsc::UnboundedSender<EmailMessage>,
    tokens: TokenService,
    frontend_url: String,
}

pub struct EmailWorker {
    rx: mpsc::UnboundedReceiver<EmailMessage>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
}

impl EmailQueue {
    pub fn new(tokens: TokenService, frontend_url: &str, mailer: Arc<dyn Mailer>) -> (Self, EmailWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            tokens,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        };
        let worker = EmailWorker { rx, mailer, policy: RetryPolicy::new(3, Duration::from_secs(1)) };
        (queue, worker)
    }

    pub fn enqueue(&self, message: EmailMessage) {
        if let Err(e) = self.tx.send(message) {
            tracing::error!("[EmailQueue::enqueue] queue closed, dropping mail to {}", e.0.to);
        }
    }

    pub fn enqueue_verification(&self, email: &str, username: &str) {
        match self.tokens.issue_email_token(EmailPurpose::VerifyEmail, email) {
            Ok(token) => self.enqueue(EmailMessage {
                to: email.to_string(),
                subject: "Verify your email".to_string(),
                body: format!(
                    "Hi {},\n\nPlease verify your email address by opening the link below (valid for 24 hours):\n{}/verify-email?token={}\n",
                    username, self.frontend_url, token
                ),
            }),
            Err(e) => tracing::error!("[EmailQueue::enqueue_verification] failed to issue token for {}: {}", email, e),
        }
    }

    pub fn enqueue_password_reset(&self, email: &str) {
        match self.tokens.issue_email_token(EmailPurpose::ResetPassword, email) {
            Ok(token) => self.enqueue(EmailMessage {
                to: email.to_string(),
                subject: "Reset your password".to_string(),
                body: format!(
                    "A password reset was requested for this account. Open the link below within 1 hour to choose a new password:\n{}/reset-password?token={}\n\nIf you did not request this, ignore this email.\n",
                    self.frontend_url, token
                ),
            }),
            Err(e) => tracing::error!("[EmailQueue::enqueue_password_reset] failed to issue token for {}: {}", email, e),
        }
    }
}

impl EmailWorker {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drains the queue until every `EmailQueue` handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("[EmailWorker] started");
        while let Some(message) = self.rx.recv().await {
            self.deliver(message).await;
        }
        tracing::info!("[EmailWorker] queue closed, stopping");
    }

    async fn deliver(&self, message: EmailMessage) -> bool {
        let mailer = &self.mailer;
        let outgoing = &message;
        match retry(self.policy, |_| true, || mailer.send(outgoing)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "[EmailWorker] dead-lettered mail to={} subject={:?} after {} attempts: {}",
                    message.to, message.subject, self.policy.max_attempts, e
                );
                false
            }
        }
    }
}
