use anyhow::{Context as _, anyhow};
use serde::Serialize;

use crate::domain::repository::MailPort;
use crate::domain::types::VerificationEmail;
use crate::error::RegistryError;

const SUBJECT: &str = "Your event verification code";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoEmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendEmailBody {
    sender: BrevoEmailAddress,
    to: Vec<BrevoEmailAddress>,
    subject: String,
    html_content: String,
    text_content: String,
}

/// Transactional mail through the Brevo v3 HTTP API.
#[derive(Clone)]
pub struct BrevoMailer {
    pub client: reqwest::Client,
    pub api_url: String,
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

impl BrevoMailer {
    fn body(&self, email: &VerificationEmail) -> BrevoSendEmailBody {
        BrevoSendEmailBody {
            sender: BrevoEmailAddress {
                email: self.sender_email.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![BrevoEmailAddress {
                email: email.to.as_str().to_owned(),
                name: Some(email.recipient_name.clone()),
            }],
            subject: SUBJECT.to_owned(),
            html_content: render_html(email),
            text_content: render_text(email),
        }
    }
}

impl MailPort for BrevoMailer {
    async fn send_verification_email(
        &self,
        email: &VerificationEmail,
    ) -> Result<(), RegistryError> {
        let resp = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&self.body(email))
            .send()
            .await
            .context("send verification email")
            .map_err(RegistryError::External)?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(to = %email.to, "verification email sent");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RegistryError::External(anyhow!(
            "mail api rejected message (status={status}): {body}"
        )))
    }
}

fn render_text(email: &VerificationEmail) -> String {
    let mut text = format!(
        "Hi {name},\n\n\
         Someone using the chat account \"{display}\" asked to link it to this registration.\n\
         Your verification code is {code}. It expires in {minutes} minutes.\n\n\
         If this wasn't you, you can ignore this message.\n",
        name = email.recipient_name,
        display = email.display_name,
        code = email.code,
        minutes = email.expires_in_minutes,
    );
    if let Some(organizer) = &email.organizer_email {
        text.push_str(&format!("\nQuestions? Contact the organizers at {organizer}.\n"));
    }
    text
}

fn render_html(email: &VerificationEmail) -> String {
    let mut html = format!(
        "<p>Hi {name},</p>\
         <p>Someone using the chat account <b>{display}</b> asked to link it to this registration.</p>\
         <p>Your verification code is <b>{code}</b>. It expires in {minutes} minutes.</p>\
         <p>If this wasn't you, you can ignore this message.</p>",
        name = escape_html(&email.recipient_name),
        display = escape_html(&email.display_name),
        code = email.code,
        minutes = email.expires_in_minutes,
    );
    if let Some(organizer) = &email.organizer_email {
        html.push_str(&format!(
            "<p>Questions? Contact the organizers at {}.</p>",
            escape_html(organizer)
        ));
    }
    html
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
