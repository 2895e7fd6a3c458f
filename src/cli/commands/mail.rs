//! datakit mail - Send a plain-text notification
//!
//! Logs in to the configured SMTP server, sends one mail and logs out. The
//! login, send and logout steps land in the run log.

use clap::Args;
use colored::Colorize;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::OutputFormat;
use crate::cli::output::emit_json;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct MailArgs {
    /// Recipient address; separate several with commas
    #[arg(long)]
    pub to: String,

    /// Subject line
    #[arg(long, short)]
    pub subject: String,

    /// Message body (empty when omitted)
    #[arg(long, short)]
    pub body: Option<String>,
}

pub fn run(ctx: &AppContext, args: &MailArgs) -> Result<()> {
    let mut mailer = ctx.mailer()?;
    let sent = mailer.send_mail(&args.to, &args.subject, args.body.as_deref().unwrap_or(""));
    mailer.logout();
    sent?;
    tracing::debug!(to = %args.to, "mail sent");

    match ctx.format {
        OutputFormat::Json | OutputFormat::Jsonl => emit_json(&json!({
            "sent": true,
            "to": args.to,
            "subject": args.subject,
            "server": ctx.config.mail.server,
        })),
        OutputFormat::Plain => {
            println!("{}", args.to);
            Ok(())
        }
        OutputFormat::Human => {
            println!(
                "{} {} {}",
                "Mail sent to".bold(),
                args.to.cyan(),
                format!("via {}", ctx.config.mail.server).dimmed()
            );
            Ok(())
        }
    }
}
