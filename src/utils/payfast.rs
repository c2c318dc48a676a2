use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;

use crate::config::{Environment, PaymentConfig};

pub const SANDBOX_HOST: &str = "sandbox.payfast.co.za";
pub const LIVE_HOST: &str = "www.payfast.co.za";

const SANDBOX_MERCHANT_ID: &str = "10000100";
const SANDBOX_MERCHANT_KEY: &str = "46f0cd694581a";

pub const VALID_HOSTS: [&str; 4] = [
    "www.payfast.co.za",
    "sandbox.payfast.co.za",
    "w1w.payfast.co.za",
    "w2w.payfast.co.za",
];

// Characters JavaScript's encodeURIComponent leaves untouched
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_value(value: &str) -> String {
    utf8_percent_encode(value.trim(), COMPONENT)
        .to_string()
        .replace("%20", "+")
}

fn param_string<'a>(params: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    params
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// MD5 signature over the ordered, non-empty parameters plus the optional passphrase
pub fn generate_signature(params: &[(String, String)], pass_phrase: Option<&str>) -> String {
    let mut out = param_string(
        params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    if let Some(phrase) = pass_phrase {
        out.push_str(&format!("&passphrase={}", encode_value(phrase)));
    }
    hex::encode(Md5::digest(out.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct PayFastSettings {
    pub testing_mode: bool,
    pub merchant_id: String,
    pub merchant_key: String,
    pub pass_phrase: Option<String>,
    pub payment_method: Option<String>,
    pub confirmation_address: Option<String>,
    /// Front-end base for the return/cancel pages
    pub client_url: String,
    /// API base receiving the ITN callback
    pub notify_url: String,
    pub valid_hosts: Vec<String>,
}

impl PayFastSettings {
    /// Sandbox credentials and tunnel URLs in development, configured values otherwise
    pub fn from_config(config: &PaymentConfig, environment: Environment, cors_origin: &str) -> Self {
        let testing_mode = environment.is_development();
        let pick = |sandbox: &str, live: &Option<String>| {
            if testing_mode {
                sandbox.to_string()
            } else {
                live.clone().unwrap_or_default()
            }
        };

        Self {
            testing_mode,
            merchant_id: pick(SANDBOX_MERCHANT_ID, &config.merchant_id),
            merchant_key: pick(SANDBOX_MERCHANT_KEY, &config.merchant_key),
            pass_phrase: config.pass_phrase.clone(),
            payment_method: config.payment_method.clone(),
            confirmation_address: config.confirmation_address.clone(),
            client_url: if testing_mode {
                config.ngrok_client.clone()
            } else {
                cors_origin.to_string()
            },
            notify_url: if testing_mode {
                config.ngrok_server.clone()
            } else {
                config.prod_api_url.clone().unwrap_or_default()
            },
            valid_hosts: VALID_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// Order fields sent to the hosted payment page
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub payment_id: String,
    pub amount: String,
    pub order_num: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub html: String,
    pub data: Vec<(String, String)>,
    pub pf_host: String,
}

/// Outcome of the four ITN security checks
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ItnReport {
    pub valid_signature: bool,
    pub valid_ip: bool,
    pub valid_payment_data: bool,
    pub valid_server_confirmation: bool,
}

impl ItnReport {
    pub fn all_passed(&self) -> bool {
        self.valid_signature && self.valid_ip && self.valid_payment_data && self.valid_server_confirmation
    }
}

pub struct PayFast {
    settings: PayFastSettings,
    base_url: String,
    client: Client,
}

impl PayFast {
    pub fn new(settings: PayFastSettings) -> Self {
        let host = if settings.testing_mode { SANDBOX_HOST } else { LIVE_HOST };
        Self {
            base_url: format!("https://{}", host),
            settings,
            client: Client::new(),
        }
    }

    /// Point the process/validate endpoints somewhere else
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn process_url(&self) -> String {
        format!("{}/eng/process", self.base_url)
    }

    fn validate_url(&self) -> String {
        format!("{}/eng/query/validate", self.base_url)
    }

    /// Signed hidden-field form for the hosted payment page
    pub fn checkout(&self, order: &Order) -> Checkout {
        let s = &self.settings;
        let mut fields: Vec<(String, String)> = vec![
            ("merchant_id".into(), s.merchant_id.clone()),
            ("merchant_key".into(), s.merchant_key.clone()),
            ("return_url".into(), format!("{}/payment/success", s.client_url)),
            ("cancel_url".into(), format!("{}/payment/cancel", s.client_url)),
            ("notify_url".into(), format!("{}/notify", s.notify_url)),
            ("name_first".into(), order.firstname.clone()),
            ("name_last".into(), order.lastname.clone()),
            ("email_address".into(), order.email.clone()),
            ("m_payment_id".into(), order.payment_id.clone()),
            ("amount".into(), order.amount.clone()),
            ("item_name".into(), order.order_num.clone()),
            ("email_confirmation".into(), "1".into()),
            ("confirmation_address".into(), s.confirmation_address.clone().unwrap_or_default()),
            ("payment_method".into(), s.payment_method.clone().unwrap_or_default()),
        ];

        let signature = generate_signature(&fields, s.pass_phrase.as_deref());
        fields.push(("signature".into(), signature));
        fields.retain(|(_, v)| !v.is_empty());

        let mut html = format!("<form action=\"{}\" method=\"post\">", self.process_url());
        for (key, value) in &fields {
            html.push_str(&format!(
                "<input name=\"{}\" type=\"hidden\" value=\"{}\" />",
                key,
                html_escape(value.trim())
            ));
        }
        html.push_str("<button class=\"INPT INPT-submit BTN-widow\" type=\"submit\">Pay now</button></form>");

        Checkout {
            html,
            data: fields,
            pf_host: self.process_url(),
        }
    }

    /// Run the ITN checks for a payment notification
    pub async fn confirm(
        &self,
        notification: &[(String, String)],
        remote_ip: &str,
        cart_total: f64,
    ) -> ItnReport {
        let param_str = param_string(
            notification
                .iter()
                .filter(|(k, _)| k != "signature")
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let report = ItnReport {
            valid_signature: self.valid_signature(notification, &param_str),
            valid_ip: self.valid_ip(remote_ip).await,
            valid_payment_data: valid_payment_data(notification, cart_total),
            valid_server_confirmation: self.valid_server_confirmation(&param_str).await,
        };

        log::info!(
            "ITN checks: signature={} ip={} payment_data={} server_confirmation={}",
            report.valid_signature,
            report.valid_ip,
            report.valid_payment_data,
            report.valid_server_confirmation
        );
        if report.all_passed() {
            log::info!("All checks have passed, the payment is successful");
        } else {
            log::warn!("Some ITN checks have failed, check the payment manually");
        }

        report
    }

    fn valid_signature(&self, notification: &[(String, String)], param_str: &str) -> bool {
        let mut signed = param_str.to_string();
        if let Some(phrase) = &self.settings.pass_phrase {
            signed.push_str(&format!("&passphrase={}", encode_value(phrase)));
        }
        let expected = hex::encode(Md5::digest(signed.as_bytes()));
        lookup(notification, "signature") == Some(expected.as_str())
    }

    async fn valid_ip(&self, remote_ip: &str) -> bool {
        let remote: IpAddr = match remote_ip.trim().parse() {
            Ok(ip) => ip,
            Err(_) => return false,
        };

        let mut valid = HashSet::new();
        for host in &self.settings.valid_hosts {
            match tokio::net::lookup_host((host.as_str(), 443)).await {
                Ok(addrs) => valid.extend(addrs.map(|a| a.ip())),
                Err(err) => log::error!("Unable to resolve {}: {}", host, err),
            }
        }
        valid.contains(&remote)
    }

    async fn valid_server_confirmation(&self, param_str: &str) -> bool {
        let result = self
            .client
            .post(self.validate_url())
            .header("content-type", "application/x-www-form-urlencoded")
            .body(param_str.to_string())
            .send()
            .await;

        match result {
            Ok(res) => match res.text().await {
                Ok(body) => body.trim() == "VALID",
                Err(err) => {
                    log::error!("Unable to read PayFast validation: {}", err);
                    false
                }
            },
            Err(err) => {
                log::error!("PayFast validation request failed: {}", err);
                false
            }
        }
    }
}

fn valid_payment_data(notification: &[(String, String)], cart_total: f64) -> bool {
    lookup(notification, "amount_gross")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|gross| (cart_total - gross).abs() <= 0.01)
        .unwrap_or(false)
}

fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn sandbox() -> PayFastSettings {
        PayFastSettings {
            testing_mode: true,
            merchant_id: SANDBOX_MERCHANT_ID.into(),
            merchant_key: SANDBOX_MERCHANT_KEY.into(),
            pass_phrase: None,
            payment_method: None,
            confirmation_address: None,
            client_url: "http://localhost:3000".into(),
            notify_url: "http://localhost:8000/v1".into(),
            valid_hosts: vec!["localhost".into()],
        }
    }

    #[test]
    fn signature_matches_reference_digest() {
        let params = pairs(&[
            ("merchant_id", "10000100"),
            ("merchant_key", "46f0cd694581a"),
            ("amount", "100.00"),
            ("item_name", "Order #1 test"),
        ]);
        assert_eq!(
            generate_signature(&params, Some("jt7NOE43FZPn")),
            "6cf2b80e03ad769d7efccacc2a196006"
        );
        assert_eq!(generate_signature(&params, None), "2cba33b32888680160a1bc9694ddac76");
    }

    #[test]
    fn empty_values_do_not_change_signature() {
        let base = pairs(&[("merchant_id", "10000100"), ("amount", "5.00")]);
        let mut with_blank = base.clone();
        with_blank.insert(1, ("payment_method".into(), String::new()));
        assert_eq!(generate_signature(&base, None), generate_signature(&with_blank, None));
    }

    #[test]
    fn checkout_form_is_signed_and_skips_blanks() {
        let pf = PayFast::new(sandbox());
        let checkout = pf.checkout(&Order {
            firstname: "Ann".into(),
            lastname: "Lee".into(),
            email: "ann@example.com".into(),
            payment_id: "p-1".into(),
            amount: "99.90".into(),
            order_num: "Order 7".into(),
        });

        assert_eq!(checkout.pf_host, "https://sandbox.payfast.co.za/eng/process");
        assert!(checkout.html.starts_with("<form action=\"https://sandbox.payfast.co.za/eng/process\""));
        assert!(checkout.data.iter().all(|(_, v)| !v.is_empty()));
        assert!(!checkout.data.iter().any(|(k, _)| k == "payment_method"));

        let (_, signature) = checkout.data.last().unwrap();
        let unsigned: Vec<_> = checkout.data[..checkout.data.len() - 1].to_vec();
        assert_eq!(signature, &generate_signature(&unsigned, None));
        assert!(checkout
            .data
            .contains(&("return_url".to_string(), "http://localhost:3000/payment/success".to_string())));
    }

    #[test]
    fn live_settings_use_configured_merchant() {
        let config = PaymentConfig {
            merchant_id: Some("123".into()),
            merchant_key: Some("abc".into()),
            pass_phrase: None,
            payment_method: Some("cc".into()),
            confirmation_address: None,
            prod_api_url: Some("https://api.example.com/v1".into()),
            ngrok_server: "http://localhost:8000/v1".into(),
            ngrok_client: "http://localhost:3000".into(),
        };
        let live = PayFastSettings::from_config(&config, Environment::Production, "https://app.example.com");
        assert!(!live.testing_mode);
        assert_eq!(live.merchant_id, "123");
        assert_eq!(live.client_url, "https://app.example.com");
        assert_eq!(live.notify_url, "https://api.example.com/v1");

        let dev = PayFastSettings::from_config(&config, Environment::Development, "http://localhost:3000");
        assert_eq!(dev.merchant_id, SANDBOX_MERCHANT_ID);
        assert_eq!(dev.notify_url, "http://localhost:8000/v1");
    }

    #[test]
    fn amount_tolerance_is_one_cent() {
        let n = pairs(&[("amount_gross", "200.00")]);
        assert!(valid_payment_data(&n, 200.005));
        assert!(!valid_payment_data(&n, 199.98));
        assert!(!valid_payment_data(&pairs(&[]), 200.0));
    }
}
