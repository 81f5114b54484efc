//! Transactional email templates
//!
//! Every template renders a subject, an HTML body and a plain-text body.
//! Interpolated values are HTML-escaped in the HTML body.

use uuid::Uuid;

use super::email_client::EmailMessage;
use crate::models::{InviteFailure, UploadStatus};

/// Email templates sent by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum EmailTemplate {
    /// Merchant is asked to complete their application
    MerchantInvite {
        business_name: Option<String>,
        agent_email: Option<String>,
        link: String,
    },

    /// Merchant confirmation after submission
    SubmissionReceived { legal_name: String },

    /// Agent notice after one of their merchants submits
    AgentSubmissionNotice {
        legal_name: String,
        application_id: Uuid,
        upload_status: UploadStatus,
        skipped: Vec<String>,
        failed: Vec<String>,
    },

    /// Report of invites that could not be sent, to the agent who sent them
    InviteFailureSummary { failures: Vec<InviteFailure> },
}

/// Rendered template
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailTemplate {
    /// Template name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::MerchantInvite { .. } => "merchant_invite",
            EmailTemplate::SubmissionReceived { .. } => "submission_received",
            EmailTemplate::AgentSubmissionNotice { .. } => "agent_submission_notice",
            EmailTemplate::InviteFailureSummary { .. } => "invite_failure_summary",
        }
    }

    pub fn render(&self) -> RenderedEmail {
        match self {
            EmailTemplate::MerchantInvite {
                business_name,
                agent_email,
                link,
            } => {
                let greeting = match business_name {
                    Some(name) => format!("Hello {},", name),
                    None => "Hello,".to_string(),
                };
                let sender = agent_email
                    .as_deref()
                    .map(|a| format!(" by {}", a))
                    .unwrap_or_default();

                RenderedEmail {
                    subject: "Complete your merchant application".to_string(),
                    text: format!(
                        "{}\n\nYou have been invited{} to complete your merchant application.\n\
                         Open this link to continue:\n{}\n",
                        greeting, sender, link
                    ),
                    html: format!(
                        "<p>{}</p><p>You have been invited{} to complete your merchant \
                         application.</p><p><a href=\"{}\">Continue your application</a></p>",
                        escape_html(&greeting),
                        escape_html(&sender),
                        escape_html(link)
                    ),
                }
            }

            EmailTemplate::SubmissionReceived { legal_name } => RenderedEmail {
                subject: format!("We received the application for {}", legal_name),
                text: format!(
                    "Thank you. The merchant application for {} has been received and is \
                     now in review.\n",
                    legal_name
                ),
                html: format!(
                    "<p>Thank you. The merchant application for <strong>{}</strong> has been \
                     received and is now in review.</p>",
                    escape_html(legal_name)
                ),
            },

            EmailTemplate::AgentSubmissionNotice {
                legal_name,
                application_id,
                upload_status,
                skipped,
                failed,
            } => {
                let mut text = format!(
                    "{} submitted their application.\nApplication ID: {}\nDocuments: {}\n",
                    legal_name,
                    application_id,
                    upload_status.as_str()
                );
                let mut html = format!(
                    "<p><strong>{}</strong> submitted their application.</p>\
                     <p>Application ID: {}<br>Documents: {}</p>",
                    escape_html(legal_name),
                    application_id,
                    upload_status.as_str()
                );

                if !skipped.is_empty() {
                    text.push_str(&format!("Skipped (too large): {}\n", skipped.join(", ")));
                    html.push_str(&format!(
                        "<p>Skipped (too large): {}</p>",
                        escape_html(&skipped.join(", "))
                    ));
                }
                if !failed.is_empty() {
                    text.push_str(&format!("Failed to upload: {}\n", failed.join(", ")));
                    html.push_str(&format!(
                        "<p>Failed to upload: {}</p>",
                        escape_html(&failed.join(", "))
                    ));
                }

                RenderedEmail {
                    subject: format!("New submission: {}", legal_name),
                    html,
                    text,
                }
            }

            EmailTemplate::InviteFailureSummary { failures } => {
                let text_lines: Vec<String> = failures
                    .iter()
                    .map(|f| format!("- {}: {}", f.email, f.error))
                    .collect();
                let html_items: String = failures
                    .iter()
                    .map(|f| {
                        format!(
                            "<li>{}: {}</li>",
                            escape_html(&f.email),
                            escape_html(&f.error)
                        )
                    })
                    .collect();

                RenderedEmail {
                    subject: format!("{} invitation(s) could not be sent", failures.len()),
                    text: format!(
                        "The following invitations could not be sent:\n{}\n",
                        text_lines.join("\n")
                    ),
                    html: format!(
                        "<p>The following invitations could not be sent:</p><ul>{}</ul>",
                        html_items
                    ),
                }
            }
        }
    }

    /// Message addressed to `recipient`
    pub fn to_message(&self, recipient: &str) -> EmailMessage {
        let rendered = self.render();
        EmailMessage {
            to: vec![recipient.to_string()],
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            reply_to: match self {
                EmailTemplate::MerchantInvite { agent_email, .. } => agent_email.clone(),
                _ => None,
            },
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_contains_link_and_reply_to() {
        let template = EmailTemplate::MerchantInvite {
            business_name: Some("Acme & Sons".to_string()),
            agent_email: Some("agent@x.com".to_string()),
            link: "https://apply.example.com/apply/123".to_string(),
        };

        let message = template.to_message("m@x.com");
        assert_eq!(message.to, vec!["m@x.com".to_string()]);
        assert_eq!(message.reply_to.as_deref(), Some("agent@x.com"));
        assert!(message.text.contains("https://apply.example.com/apply/123"));
        assert!(message.html.contains("Acme &amp; Sons"));
    }

    #[test]
    fn test_failure_summary_lists_each_failure() {
        let template = EmailTemplate::InviteFailureSummary {
            failures: vec![
                InviteFailure {
                    email: "a@x.com".to_string(),
                    error: "bounced".to_string(),
                },
                InviteFailure {
                    email: "b@x.com".to_string(),
                    error: "<rejected>".to_string(),
                },
            ],
        };

        let rendered = template.render();
        assert_eq!(rendered.subject, "2 invitation(s) could not be sent");
        assert!(rendered.text.contains("- a@x.com: bounced"));
        assert!(rendered.html.contains("&lt;rejected&gt;"));
    }

    #[test]
    fn test_agent_notice_mentions_partial_uploads() {
        let rendered = EmailTemplate::AgentSubmissionNotice {
            legal_name: "Acme".to_string(),
            application_id: Uuid::nil(),
            upload_status: UploadStatus::Partial,
            skipped: vec!["bank_statement".to_string()],
            failed: vec![],
        }
        .render();

        assert!(rendered.text.contains("Documents: partial"));
        assert!(rendered.text.contains("Skipped (too large): bank_statement"));
        assert!(!rendered.text.contains("Failed to upload"));
    }
}
