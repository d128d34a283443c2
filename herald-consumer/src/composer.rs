//! Turns events into emails.
//!
//! Composition is pure: the same event and settings always produce the same
//! message, and nothing here touches the network.

use std::fmt::Write;

use herald_common::{Message, MessageError};
use serde::Deserialize;

use crate::event::{ApplicationSubmitted, Event, UserRegistered};

/// Branding and links used in composed emails
///
/// ```ron
/// app: (
///     name: "JobHub",
///     url: "https://jobhub.com",
///     token_expiry_hours: 48,
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "defaults::name")]
    pub name: String,

    #[serde(default = "defaults::logo_url")]
    pub logo_url: String,

    /// Base of every link back into the application
    #[serde(default = "defaults::url")]
    pub url: String,

    #[serde(default = "defaults::support_url")]
    pub support_url: String,

    #[serde(default = "defaults::unsubscribe_url")]
    pub unsubscribe_url: String,

    #[serde(default = "defaults::privacy_url")]
    pub privacy_url: String,

    /// How long a verification link stays valid, as stated in the email
    ///
    /// Default: 24 hours
    #[serde(default = "defaults::token_expiry_hours")]
    pub token_expiry_hours: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: defaults::name(),
            logo_url: defaults::logo_url(),
            url: defaults::url(),
            support_url: defaults::support_url(),
            unsubscribe_url: defaults::unsubscribe_url(),
            privacy_url: defaults::privacy_url(),
            token_expiry_hours: defaults::token_expiry_hours(),
        }
    }
}

impl AppConfig {
    fn link(&self, path: &str) -> String {
        format!("{}{path}", self.url.trim_end_matches('/'))
    }
}

/// Build the email for `event`.
///
/// # Errors
///
/// Returns a [`MessageError`] if the event's address is not a single valid
/// mailbox. Retrying will not help.
pub fn compose(event: &Event, app: &AppConfig) -> Result<Message, MessageError> {
    match event {
        Event::UserRegistered(event) => verification(event, app),
        Event::ApplicationSubmitted(event) => application_submitted(event, app),
    }
}

fn verification(event: &UserRegistered, app: &AppConfig) -> Result<Message, MessageError> {
    let subject = format!("Verify Your Email Address - Welcome to {}!", app.name);
    let link = app.link(&format!("/verify-email?token={}", event.verification_token));
    let greeting = event.first_name.as_deref().unwrap_or("there");

    let mut body = header(app, &format!("Verify Your Email - {}", app.name));
    let _ = write!(
        body,
        r#"<h1>Welcome to {name}!</h1>
<p>Hi <strong>{greeting}</strong>,</p>
<p>Thanks for signing up. Please confirm your email address to activate your account.</p>
<p><a class="cta" href="{link}">Verify Email Address</a></p>
<p>Or paste this link into your browser:<br><code>{link}</code></p>
<p>This link expires in {hours} hours. If you did not create an account, you can ignore this email.</p>
<p>Need help? <a href="{support}">Contact support</a>.</p>
"#,
        name = escape(&app.name),
        greeting = escape(greeting),
        link = escape(&link),
        hours = app.token_expiry_hours,
        support = escape(&app.support_url),
    );
    body.push_str(&footer(app));

    Message::new(&event.email, subject, body, &event.user_id)
}

fn application_submitted(
    event: &ApplicationSubmitted,
    app: &AppConfig,
) -> Result<Message, MessageError> {
    let subject = format!(
        "🎉 Application Submitted! {} at {}",
        event.job_title, event.company_name
    );
    let link = app.link(&format!("/my-applications/{}", event.application_id));
    let greeting = event.applicant_name.as_deref().unwrap_or("there");

    let mut body = header(app, &format!("Application Submitted - {}", app.name));
    let _ = write!(
        body,
        r#"<h1>Application Submitted!</h1>
<p>Congratulations <strong>{greeting}</strong>,</p>
<p>Your application for <strong>{job}</strong> at <strong>{company}</strong> has been received.</p>
"#,
        greeting = escape(greeting),
        job = escape(&event.job_title),
        company = escape(&event.company_name),
    );
    if let Some(applied) = &event.applied_date {
        let _ = writeln!(body, "<p>Applied on: {}</p>", escape(applied));
    }
    let _ = write!(
        body,
        r#"<p><a class="cta" href="{link}">View Application Status</a></p>
<p>We will let you know as soon as the employer reviews your application. Good luck!</p>
"#,
        link = escape(&link),
    );
    body.push_str(&footer(app));

    Message::new(&event.applicant_email, subject, body, &event.user_id)
}

fn header(app: &AppConfig, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
</head>
<body>
<div class="container">
<img class="logo" src="{logo}" alt="{name}">
"#,
        title = escape(title),
        logo = escape(&app.logo_url),
        name = escape(&app.name),
    )
}

fn footer(app: &AppConfig) -> String {
    format!(
        r#"<hr>
<p class="footer">&copy; {name}. <a href="{unsubscribe}">Unsubscribe</a> | <a href="{privacy}">Privacy Policy</a></p>
</div>
</body>
</html>
"#,
        name = escape(&app.name),
        unsubscribe = escape(&app.unsubscribe_url),
        privacy = escape(&app.privacy_url),
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

mod defaults {
    pub fn name() -> String {
        "JobHub".to_string()
    }

    pub fn logo_url() -> String {
        "https://jobhub.com/logo.png".to_string()
    }

    pub fn url() -> String {
        "http://localhost:3000".to_string()
    }

    pub fn support_url() -> String {
        "http://localhost:3000/support".to_string()
    }

    pub fn unsubscribe_url() -> String {
        "http://localhost:3000/unsubscribe".to_string()
    }

    pub fn privacy_url() -> String {
        "http://localhost:3000/privacy".to_string()
    }

    pub const fn token_expiry_hours() -> u32 {
        24
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn user(email: &str) -> Event {
        Event::UserRegistered(UserRegistered {
            user_id: "u1".to_string(),
            email: email.to_string(),
            verification_token: "t1".to_string(),
            first_name: Some("Ada".to_string()),
        })
    }

    fn application() -> ApplicationSubmitted {
        ApplicationSubmitted {
            application_id: "app-7".to_string(),
            user_id: "u2".to_string(),
            applicant_email: "grace@example.com".to_string(),
            job_title: "Rust Engineer".to_string(),
            company_name: "Acme & Co".to_string(),
            applicant_name: Some("Grace".to_string()),
            applied_date: Some("2024-05-01".to_string()),
            job_id: Some(42),
            company_id: None,
            status: None,
        }
    }

    #[test]
    fn verification_email() {
        let message = compose(&user("a@b.com"), &AppConfig::default()).unwrap();

        assert_eq!(message.recipient(), "a@b.com");
        assert_eq!(message.correlation_id(), "u1");
        assert_eq!(
            message.subject(),
            "Verify Your Email Address - Welcome to JobHub!"
        );
        assert!(
            message
                .body()
                .contains("http://localhost:3000/verify-email?token=t1")
        );
        assert!(message.body().contains("<strong>Ada</strong>"));
        assert!(message.body().contains("expires in 24 hours"));
    }

    #[test]
    fn verification_uses_app_settings() {
        let app = AppConfig {
            name: "Hirely".to_string(),
            url: "https://hirely.example/".to_string(),
            token_expiry_hours: 48,
            ..AppConfig::default()
        };

        let message = compose(&user("a@b.com"), &app).unwrap();

        assert_eq!(
            message.subject(),
            "Verify Your Email Address - Welcome to Hirely!"
        );
        assert!(
            message
                .body()
                .contains("https://hirely.example/verify-email?token=t1")
        );
        assert!(message.body().contains("expires in 48 hours"));
    }

    #[test]
    fn application_email() {
        let event = Event::ApplicationSubmitted(application());

        let message = compose(&event, &AppConfig::default()).unwrap();

        assert_eq!(message.recipient(), "grace@example.com");
        assert_eq!(message.correlation_id(), "u2");
        assert_eq!(
            message.subject(),
            "🎉 Application Submitted! Rust Engineer at Acme & Co"
        );
        assert!(
            message
                .body()
                .contains("http://localhost:3000/my-applications/app-7")
        );
        assert!(message.body().contains("Acme &amp; Co"));
        assert!(message.body().contains("Applied on: 2024-05-01"));
    }

    #[test]
    fn missing_names_fall_back_to_generic_greeting() {
        let event = Event::ApplicationSubmitted(ApplicationSubmitted {
            applicant_name: None,
            applied_date: None,
            ..application()
        });

        let message = compose(&event, &AppConfig::default()).unwrap();
        assert!(message.body().contains("<strong>there</strong>"));
        assert!(!message.body().contains("Applied on"));
    }

    #[test]
    fn invalid_recipient_fails_composition() {
        assert!(matches!(
            compose(&user("not an address"), &AppConfig::default()),
            Err(MessageError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn markup_in_event_fields_is_escaped() {
        let event = Event::UserRegistered(UserRegistered {
            first_name: Some("<script>".to_string()),
            ..match user("a@b.com") {
                Event::UserRegistered(event) => event,
                Event::ApplicationSubmitted(_) => unreachable!(),
            }
        });

        let message = compose(&event, &AppConfig::default()).unwrap();
        assert!(message.body().contains("&lt;script&gt;"));
        assert!(!message.body().contains("<script>"));
    }

    #[test]
    fn app_config_defaults_from_ron() {
        let app: AppConfig = ron::from_str("()").unwrap();
        assert_eq!(app, AppConfig::default());
        assert_eq!(app.logo_url, "https://jobhub.com/logo.png");
        assert_eq!(app.privacy_url, "http://localhost:3000/privacy");
    }
}
