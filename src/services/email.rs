use crate::config::email::{app_url_from_env, EmailConfig};
use anyhow::{anyhow, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

/// Which code-bearing mail to send; each has its own wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    Verification,
    PasswordChange,
    AccountDeletion,
}

fn code_message(purpose: CodePurpose, username: &str, code: &str, minutes: i64) -> (String, String) {
    match purpose {
        CodePurpose::Verification => (
            "Your Tachyon verification code".to_string(),
            format!(
                "Hi {username},\n\n\
Your verification code is: {code}\n\n\
Enter it on the verification page to activate your account. \
The code expires in {minutes} minutes.\n\n\
If you did not create an account, you can ignore this email."
            ),
        ),
        CodePurpose::PasswordChange => (
            "Confirm your password change".to_string(),
            format!(
                "Hi {username},\n\n\
Someone (hopefully you) asked to change the password on your Tachyon account.\n\n\
Your confirmation code is: {code}\n\n\
The code expires in {minutes} minutes. If this was not you, ignore this email \
and your password will stay as it is."
            ),
        ),
        CodePurpose::AccountDeletion => (
            "Confirm your account deletion".to_string(),
            format!(
                "Hi {username},\n\n\
We received a request to permanently delete your Tachyon account and all of its \
tasks and notes.\n\n\
Your confirmation code is: {code}\n\n\
The code expires in {minutes} minutes. If this was not you, ignore this email \
and consider changing your password."
            ),
        ),
    }
}

fn reset_link_message(username: &str, link: &str, minutes: i64) -> (String, String) {
    let body = format!(
        "Hi {username},\n\n\
A password reset was requested for your account.\n\n\
Open the link below to choose a new password:\n\n\
{link}\n\n\
This link expires in {minutes} minutes. If you did not request this, \
you can safely ignore this email."
    );
    ("Reset your password".to_string(), body)
}

fn due_reminder_message(
    username: &str,
    task: &str,
    due_date: chrono::NaiveDate,
    app_url: &str,
) -> (String, String) {
    let subject = format!("Reminder: \"{task}\" is due tomorrow");
    let body = format!(
        "Hi {username},\n\n\
This is a reminder that your task \"{task}\" is due on {}.\n\n\
Open Tachyon to review it: {app_url}\n",
        due_date.format("%B %-d, %Y")
    );
    (subject, body)
}

#[derive(Clone)]
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: Option<String>,
    app_url: String,
}

impl EmailService {
    /// Build from environment variables. If SMTP is not configured, sending
    /// is skipped and reported as success.
    pub fn from_env() -> Self {
        match EmailConfig::from_env() {
            Some(cfg) => Self::from_config(cfg),
            None => Self::disabled(app_url_from_env()),
        }
    }

    pub fn from_config(cfg: EmailConfig) -> Self {
        let creds = Credentials::new(cfg.smtp_username.clone(), cfg.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host).map(|builder| {
            builder
                .port(cfg.smtp_port)
                .credentials(creds)
                .timeout(Some(Duration::from_secs(cfg.timeout_secs)))
                .build()
        });

        match transport {
            Ok(t) => Self {
                transport: Some(t),
                from_address: Some(cfg.from_address),
                app_url: cfg.app_url,
            },
            Err(e) => {
                tracing::warn!("Failed to build SMTP transport: {e}");
                Self::disabled(cfg.app_url)
            }
        }
    }

    pub fn disabled(app_url: String) -> Self {
        Self {
            transport: None,
            from_address: None,
            app_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={}", self.app_url, token)
    }

    pub async fn send_verification_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
        minutes: i64,
    ) -> Result<()> {
        self.send_code(CodePurpose::Verification, to, username, code, minutes)
            .await
    }

    pub async fn send_password_change_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
        minutes: i64,
    ) -> Result<()> {
        self.send_code(CodePurpose::PasswordChange, to, username, code, minutes)
            .await
    }

    pub async fn send_account_deletion_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
        minutes: i64,
    ) -> Result<()> {
        self.send_code(CodePurpose::AccountDeletion, to, username, code, minutes)
            .await
    }

    pub async fn send_password_reset_link(
        &self,
        to: &str,
        username: &str,
        token: &str,
        minutes: i64,
    ) -> Result<()> {
        let (subject, body) = reset_link_message(username, &self.reset_link(token), minutes);
        self.send_email(to, username, &subject, &body).await
    }

    pub async fn send_due_reminder(
        &self,
        to: &str,
        username: &str,
        task: &str,
        due_date: chrono::NaiveDate,
    ) -> Result<()> {
        let (subject, body) = due_reminder_message(username, task, due_date, &self.app_url);
        self.send_email(to, username, &subject, &body).await
    }

    async fn send_code(
        &self,
        purpose: CodePurpose,
        to: &str,
        username: &str,
        code: &str,
        minutes: i64,
    ) -> Result<()> {
        let (subject, body) = code_message(purpose, username, code, minutes);
        self.send_email(to, username, &subject, &body).await
    }

    async fn send_email(&self, to: &str, display_name: &str, subject: &str, body: &str) -> Result<()> {
        let (transport, from_address) = match (&self.transport, &self.from_address) {
            (Some(t), Some(f)) => (t, f),
            _ => {
                tracing::debug!("SMTP not configured, skipping email to {to}");
                return Ok(());
            }
        };

        let from_mailbox = from_address
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", from_address, e))?;
        let address = to
            .parse::<Address>()
            .map_err(|e| anyhow!("Invalid to address '{}': {}", to, e))?;
        let to_mailbox = Mailbox::new(Some(display_name.to_string()), address);

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        transport.send(email).await?;
        tracing::info!("Email sent to {to}: {subject}");
        Ok(())
    }
}
