//! OTP delivery over SMTP.

use crate::config::AppConfig;
use lettre::AsyncTransport;
use lettre::message::{MultiPart, SinglePart};
use std::sync::Arc;
use tracing::info;

fn otp_text_body(gpt_name: &str, otp: &str, expiry_minutes: i64) -> String {
    format!(
        "Your verification code for {gpt_name} is: {otp}\n\n\
         The code is valid for {expiry_minutes} minutes and can be used once.\n\n\
         If you did not request this code you can ignore this email."
    )
}

fn otp_html_body(gpt_name: &str, otp: &str, expiry_minutes: i64) -> String {
    format!(
        "<html><body>\
         <p>Your verification code for <strong>{gpt_name}</strong> is:</p>\
         <p style=\"font-size:24px;letter-spacing:4px\"><strong>{otp}</strong></p>\
         <p>The code is valid for {expiry_minutes} minutes and can be used once.</p>\
         <p>If you did not request this code you can ignore this email.</p>\
         </body></html>"
    )
}

/// Send an OTP email to `email`. Errors are logged, not propagated: a failed
/// delivery must not fail the verification request that triggered it.
#[tracing::instrument(skip(mailer, config, otp))]
pub async fn send_otp_email(
    mailer: &Arc<lettre::AsyncSmtpTransport<lettre::Tokio1Executor>>,
    config: &Arc<AppConfig>,
    email: &str,
    gpt_name: &str,
    otp: &str,
    expiry_secs: i64,
) {
    let expiry_minutes = (expiry_secs / 60).max(1);
    let subject = format!("Your verification code for {gpt_name}");

    let from = match config.smtp.from.parse() {
        Ok(mbox) => mbox,
        Err(e) => {
            tracing::error!(
                name = "email.send_otp.invalid_from_address",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Configured smtp.from address does not parse"
            );
            return;
        }
    };
    let to = match email.parse() {
        Ok(mbox) => mbox,
        Err(e) => {
            tracing::error!(
                name = "email.send_otp.invalid_recipient",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Recipient address does not parse"
            );
            return;
        }
    };

    let email_msg = match lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(lettre::message::header::MIME_VERSION_1_0)
        .message_id(None)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(lettre::message::header::ContentType::TEXT_PLAIN)
                        .body(otp_text_body(gpt_name, otp, expiry_minutes)),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(lettre::message::header::ContentType::TEXT_HTML)
                        .body(otp_html_body(gpt_name, otp, expiry_minutes)),
                ),
        ) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!(
                name = "email.send_otp.build_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to build OTP email"
            );
            return;
        }
    };

    if let Err(e) = mailer.send(email_msg).await {
        tracing::error!(
            name = "email.send_otp.send_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            message = "Failed to send OTP email"
        );
    } else {
        info!("Sent OTP email to {} for {}", email, gpt_name);
    }
}

/// Fire-and-forget OTP dispatch. The HTTP handler returns 202 immediately;
/// delivery happens on a background task.
pub fn dispatch_otp_email(
    mailer: Arc<lettre::AsyncSmtpTransport<lettre::Tokio1Executor>>,
    config: Arc<AppConfig>,
    email: String,
    gpt_name: String,
    otp: String,
    expiry_secs: i64,
) {
    tokio::spawn(async move {
        send_otp_email(&mailer, &config, &email, &gpt_name, &otp, expiry_secs).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_body_contains_code_and_expiry() {
        let body = otp_text_body("Travel Buddy", "12345678", 5);
        assert!(body.contains("12345678"));
        assert!(body.contains("Travel Buddy"));
        assert!(body.contains("5 minutes"));
    }

    #[test]
    fn html_body_contains_code() {
        let body = otp_html_body("Travel Buddy", "87654321", 5);
        assert!(body.contains("<strong>87654321</strong>"));
    }
}
