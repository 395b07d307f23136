//! Authenticity checks for inbound gateway callbacks. Verification runs
//! before any ledger read; a failure here must never touch a row.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};

/// Payme authenticates with HTTP Basic; only the password half of the
/// credential is meaningful and must equal the pre-shared secret. Every
/// malformed-header variant collapses into the same rejection so the
/// response leaks nothing about which part failed.
pub fn verify_payme_auth(header: Option<&str>, secret_key: &str) -> Result<(), &'static str> {
    let header = header.ok_or("missing authorization header")?;
    let encoded = header.strip_prefix("Basic ").ok_or("not basic auth")?;
    let decoded = STANDARD.decode(encoded).map_err(|_| "malformed base64")?;
    let decoded = String::from_utf8(decoded).map_err(|_| "credentials not utf-8")?;
    let (_login, password) = decoded.split_once(':').ok_or("malformed credentials")?;

    if password != secret_key {
        return Err("wrong password");
    }

    Ok(())
}

/// Click signs every callback with an MD5 over the deterministic
/// concatenation of the request fields and the shared secret.
#[allow(clippy::too_many_arguments)]
pub fn click_digest(
    click_trans_id: &str,
    service_id: &str,
    secret_key: &str,
    merchant_trans_id: &str,
    amount: &str,
    action: &str,
    sign_time: &str,
) -> String {
    let raw = format!(
        "{}{}{}{}{}{}{}",
        click_trans_id, service_id, secret_key, merchant_trans_id, amount, action, sign_time
    );
    hex::encode(Md5::digest(raw.as_bytes()))
}

#[allow(clippy::too_many_arguments)]
pub fn verify_click_signature(
    click_trans_id: &str,
    service_id: &str,
    secret_key: &str,
    merchant_trans_id: &str,
    amount: &str,
    action: &str,
    sign_time: &str,
    sign_string: &str,
) -> bool {
    click_digest(
        click_trans_id,
        service_id,
        secret_key,
        merchant_trans_id,
        amount,
        action,
        sign_time,
    ) == sign_string
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[test]
    fn accepts_correct_password_any_login() {
        assert!(verify_payme_auth(Some(&basic_header("Paycom:secret")), "secret").is_ok());
        assert!(verify_payme_auth(Some(&basic_header("anything:secret")), "secret").is_ok());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(verify_payme_auth(None, "secret").is_err());
    }

    #[test]
    fn rejects_non_basic_scheme() {
        assert!(verify_payme_auth(Some("Bearer abc"), "secret").is_err());
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(verify_payme_auth(Some("Basic !!!not-base64!!!"), "secret").is_err());
    }

    #[test]
    fn rejects_credentials_without_colon() {
        assert!(verify_payme_auth(Some(&basic_header("no-colon-here")), "secret").is_err());
    }

    #[test]
    fn rejects_wrong_password() {
        assert!(verify_payme_auth(Some(&basic_header("Paycom:wrong")), "secret").is_err());
    }

    #[test]
    fn md5_matches_reference_vector() {
        // RFC 1321 test vector
        assert_eq!(
            hex::encode(Md5::digest(b"abc")),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn click_signature_round_trips() {
        let sign = click_digest("123", "7", "click-secret", "tx-55", "15000", "1", "2023-01-01 12:00:00");

        assert!(verify_click_signature(
            "123",
            "7",
            "click-secret",
            "tx-55",
            "15000",
            "1",
            "2023-01-01 12:00:00",
            &sign,
        ));
    }

    #[test]
    fn click_signature_rejects_tampered_amount() {
        let sign = click_digest("123", "7", "click-secret", "tx-55", "15000", "1", "2023-01-01 12:00:00");

        assert!(!verify_click_signature(
            "123",
            "7",
            "click-secret",
            "tx-55",
            "99999",
            "1",
            "2023-01-01 12:00:00",
            &sign,
        ));
    }

    #[test]
    fn click_signature_depends_on_secret() {
        let sign = click_digest("123", "7", "click-secret", "tx-55", "15000", "0", "2023-01-01");
        let other = click_digest("123", "7", "other-secret", "tx-55", "15000", "0", "2023-01-01");

        assert_ne!(sign, other);
    }
}
