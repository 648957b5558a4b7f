//! SMTP delivery of status-change emails.

use anyhow::Result;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use shared::FulfillmentStatus;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();
        let from: Mailbox = config.from.parse()?;
        Ok(Self { transport, from })
    }

    pub async fn send_status_email(
        &self,
        recipient: &str,
        order_id: &str,
        status: FulfillmentStatus,
        tracking_number: Option<&str>,
    ) -> Result<()> {
        let email = status_email(order_id, status, tracking_number);
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

pub struct StatusEmail {
    pub subject: String,
    pub html: String,
}

fn tracking_line(tracking_number: Option<&str>) -> String {
    match tracking_number {
        Some(tracking) => format!("<p>Tracking number: <strong>{}</strong></p>", tracking),
        None => String::new(),
    }
}

/// Render the email for a status change. Four statuses have dedicated
/// templates; anything else gets the generic one-liner.
pub fn status_email(
    order_id: &str,
    status: FulfillmentStatus,
    tracking_number: Option<&str>,
) -> StatusEmail {
    match status {
        FulfillmentStatus::Packed => StatusEmail {
            subject: format!("Your order {} is packed", order_id),
            html: format!(
                "<h2>Good news!</h2>\
                 <p>Your order <strong>{}</strong> has been packed and will be \
                 handed to our delivery partner shortly.</p>",
                order_id
            ),
        },
        FulfillmentStatus::Shipped => StatusEmail {
            subject: format!("Your order {} has shipped", order_id),
            html: format!(
                "<h2>On its way!</h2>\
                 <p>Your order <strong>{}</strong> has shipped.</p>{}",
                order_id,
                tracking_line(tracking_number)
            ),
        },
        FulfillmentStatus::OutForDelivery => StatusEmail {
            subject: format!("Your order {} is out for delivery", order_id),
            html: format!(
                "<h2>Almost there!</h2>\
                 <p>Your order <strong>{}</strong> is out for delivery and should \
                 arrive today.</p>{}",
                order_id,
                tracking_line(tracking_number)
            ),
        },
        FulfillmentStatus::Delivered => StatusEmail {
            subject: format!("Your order {} has been delivered", order_id),
            html: format!(
                "<h2>Delivered!</h2>\
                 <p>Your order <strong>{}</strong> has been delivered. We hope \
                 you enjoy it.</p>",
                order_id
            ),
        },
        other => StatusEmail {
            subject: format!("Update on your order {}", order_id),
            html: format!(
                "<p>Your order <strong>{}</strong> is now {}.</p>",
                order_id,
                other.as_str()
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_template_includes_tracking_number() {
        let email = status_email("ORD123", FulfillmentStatus::Shipped, Some("TRK456"));
        assert!(email.subject.contains("ORD123"));
        assert!(email.subject.contains("shipped"));
        assert!(email.html.contains("TRK456"));
    }

    #[test]
    fn shipped_template_omits_tracking_line_when_absent() {
        let email = status_email("ORD123", FulfillmentStatus::Shipped, None);
        assert!(!email.html.contains("Tracking number"));
    }

    #[test]
    fn each_canned_status_has_its_own_subject() {
        let subjects: Vec<String> = [
            FulfillmentStatus::Packed,
            FulfillmentStatus::Shipped,
            FulfillmentStatus::OutForDelivery,
            FulfillmentStatus::Delivered,
        ]
        .into_iter()
        .map(|s| status_email("ORD1", s, None).subject)
        .collect();
        for pair in subjects.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn unlisted_statuses_fall_back_to_generic_template() {
        let email = status_email("ORD1", FulfillmentStatus::Cancelled, None);
        assert_eq!(email.subject, "Update on your order ORD1");
        assert!(email.html.contains("CANCELLED"));
    }
}
