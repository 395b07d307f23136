use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub payments: PaymentsConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            payments: PaymentsConfig::from_env()?,
        })
    }
}

/// Merchant credentials and limits for both payment gateways.
/// Injected through `AppState` so tests can supply per-scenario secrets.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub min_topup_amount: i64,
    pub payme: PaymeConfig,
    pub click: ClickConfig,
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(PaymentsConfig {
            min_topup_amount: env::var("MIN_TOPUP_AMOUNT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            payme: PaymeConfig {
                merchant_id: env::var("PAYME_MERCHANT_ID")?,
                secret_key: env::var("PAYME_SECRET_KEY")?,
            },
            click: ClickConfig {
                merchant_id: env::var("CLICK_MERCHANT_ID")?,
                service_id: env::var("CLICK_SERVICE_ID")?,
                secret_key: env::var("CLICK_SECRET_KEY")?,
            },
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymeConfig {
    pub merchant_id: String,
    pub secret_key: String,
}

impl PaymeConfig {
    /// Payme checkout URL. The amount travels in tiyin (UZS * 100) inside a
    /// base64-encoded parameter string.
    pub fn checkout_url(&self, transaction_id: Uuid, amount: i64) -> String {
        let amount_tiyin = amount * 100;
        let params = format!(
            "m={};ac.transaction_id={};a={}",
            self.merchant_id, transaction_id, amount_tiyin
        );
        format!("https://checkout.paycom.uz/{}", STANDARD.encode(params))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickConfig {
    pub merchant_id: String,
    pub service_id: String,
    pub secret_key: String,
}

impl ClickConfig {
    /// Click checkout URL. Plain UZS amount as a query string; the internal
    /// transaction id rides along as `transaction_param`.
    pub fn checkout_url(&self, transaction_id: Uuid, amount: i64) -> String {
        format!(
            "https://my.click.uz/services/pay?service_id={}&merchant_id={}&amount={}&transaction_param={}",
            self.service_id, self.merchant_id, amount, transaction_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payments_config() -> PaymentsConfig {
        PaymentsConfig {
            min_topup_amount: 5000,
            payme: PaymeConfig {
                merchant_id: "merchant-1".to_string(),
                secret_key: "payme-secret".to_string(),
            },
            click: ClickConfig {
                merchant_id: "42".to_string(),
                service_id: "7".to_string(),
                secret_key: "click-secret".to_string(),
            },
        }
    }

    #[test]
    fn payme_checkout_url_encodes_tiyin_amount() {
        let config = payments_config();
        let id = Uuid::new_v4();
        let url = config.payme.checkout_url(id, 15000);

        let encoded = url
            .strip_prefix("https://checkout.paycom.uz/")
            .expect("checkout prefix");
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();

        assert_eq!(
            decoded,
            format!("m=merchant-1;ac.transaction_id={};a=1500000", id)
        );
    }

    #[test]
    fn click_checkout_url_uses_plain_amount() {
        let config = payments_config();
        let id = Uuid::new_v4();
        let url = config.click.checkout_url(id, 15000);

        assert!(url.starts_with("https://my.click.uz/services/pay?"));
        assert!(url.contains("service_id=7"));
        assert!(url.contains("merchant_id=42"));
        assert!(url.contains("amount=15000"));
        assert!(url.contains(&format!("transaction_param={}", id)));
    }
}
