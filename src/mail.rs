//! Plain-text notification mail over SMTP.
//!
//! A [`Mailer`] is built from a [`MailConfig`] and used as
//! `login`, any number of `send_mail` calls, then `logout`. Every step
//! writes a debug line to the attached [`Log`] (or `tracing` without one):
//!
//! ```text
//! login: [smtp.example.com/datakit<loader@example.com>]
//! send mail: [smtp.example.com/datakit<loader@example.com>]
//! to: [ops@example.com] subject: [nightly load] body: [47 rows loaded]
//! logout: [smtp.example.com/datakit<loader@example.com>]
//! ```

use std::fmt;
use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::stub::StubTransport;
use lettre::{Address, Message, SmtpTransport, Transport};
use tracing::Level;

use crate::error::{KitError, Result};
use crate::log::{Diag, Log};

/// SMTP submission settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    /// Login name, also the sender address.
    pub user: String,
    pub password: String,
    /// Display name of the sender.
    pub name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            name: "datakit".to_string(),
        }
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

impl MailConfig {
    /// `server/name<user>`, as written to the log.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}/{}<{}>", self.server, self.name, self.user)
    }

    /// The `From` mailbox: display name plus the login address.
    pub fn sender(&self) -> Result<Mailbox> {
        let address: Address = self
            .user
            .parse()
            .map_err(|err| KitError::Mail(format!("invalid sender address '{}': {err}", self.user)))?;
        let name = Some(self.name.clone()).filter(|name| !name.is_empty());
        Ok(Mailbox::new(name, address))
    }
}

/// A transport the mailer can log in with before sending.
pub trait MailTransport: Transport {
    /// Connect and authenticate without sending anything.
    fn check(&self) -> std::result::Result<(), String>;
}

impl MailTransport for SmtpTransport {
    fn check(&self) -> std::result::Result<(), String> {
        match self.test_connection() {
            Ok(true) => Ok(()),
            Ok(false) => Err("server did not accept the connection".to_string()),
            Err(err) => Err(err.to_string()),
        }
    }
}

impl MailTransport for StubTransport {
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

pub struct Mailer<T = SmtpTransport> {
    config: MailConfig,
    transport: T,
    log: Option<Arc<Log>>,
    logged_in: bool,
}

impl<T> fmt::Debug for Mailer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("logged_in", &self.logged_in)
            .finish_non_exhaustive()
    }
}

impl Mailer<SmtpTransport> {
    /// SMTP with STARTTLS on the configured port, authenticating as `user`.
    /// Nothing connects until [`Mailer::login`].
    pub fn smtp(config: MailConfig, log: Option<Arc<Log>>) -> Result<Self> {
        let transport = SmtpTransport::starttls_relay(&config.server)
            .map_err(|err| {
                KitError::Mail(format!("cannot set up STARTTLS for {}: {err}", config.server))
            })?
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .build();
        Ok(Self::with_transport(config, transport, log))
    }
}

impl<T> Mailer<T>
where
    T: MailTransport,
    T::Error: fmt::Display,
{
    pub const fn with_transport(config: MailConfig, transport: T, log: Option<Arc<Log>>) -> Self {
        Self {
            config,
            transport,
            log,
            logged_in: false,
        }
    }

    pub const fn config(&self) -> &MailConfig {
        &self.config
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub const fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Connect and authenticate.
    pub fn login(&mut self) -> Result<()> {
        const CONTEXT: &str = "login";
        let diag = Diag::new(self.log.as_deref());
        let target = self.config.describe();

        diag.emit(Level::DEBUG, CONTEXT, format_args!("login: [{target}]"));
        if let Err(err) = self.transport.check() {
            diag.emit(Level::ERROR, CONTEXT, format_args!("login failed: [{target}]: {err}"));
            return Err(KitError::Mail(format!("login failed [{target}]: {err}")));
        }
        self.logged_in = true;
        Ok(())
    }

    /// Send a plain-text mail. `to` may list several comma-separated
    /// recipients.
    pub fn send_mail(&self, to: &str, subject: &str, text: &str) -> Result<()> {
        const CONTEXT: &str = "send_mail";
        let diag = Diag::new(self.log.as_deref());
        let target = self.config.describe();

        if !self.logged_in {
            diag.emit(Level::ERROR, CONTEXT, format_args!("not logged in: [{target}]"));
            return Err(KitError::Mail(format!("not logged in [{target}]")));
        }

        diag.emit(Level::DEBUG, CONTEXT, format_args!("send mail: [{target}]"));
        diag.emit(
            Level::DEBUG,
            CONTEXT,
            format_args!("to: [{to}] subject: [{subject}] body: [{text}]"),
        );

        let message = self.build_message(to, subject, text)?;
        self.transport.send(&message).map_err(|err| {
            diag.emit(Level::ERROR, CONTEXT, format_args!("failed to send mail: [{to}]: {err}"));
            KitError::Mail(format!("failed to send mail to [{to}]: {err}"))
        })?;
        Ok(())
    }

    /// End the session. Logging out twice is a no-op.
    pub fn logout(&mut self) {
        if self.logged_in {
            Diag::new(self.log.as_deref()).emit(
                Level::DEBUG,
                "logout",
                format_args!("logout: [{}]", self.config.describe()),
            );
            self.logged_in = false;
        }
    }

    fn build_message(&self, to: &str, subject: &str, text: &str) -> Result<Message> {
        let recipients: Mailboxes = to
            .parse()
            .map_err(|err| KitError::Mail(format!("invalid recipient '{to}': {err}")))?;

        let mut builder = Message::builder()
            .from(self.config.sender()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in recipients {
            builder = builder.to(recipient);
        }
        builder
            .body(text.to_string())
            .map_err(|err| KitError::Mail(format!("cannot build mail to [{to}]: {err}")))
    }
}
