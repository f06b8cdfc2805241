use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CurrencyError;

pub const DEFAULT_API_URL: &str = "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1";

/// Source of conversion rates from the home currency. `None` means the rate is
/// unavailable; it is never reported as `0.0`.
pub trait RateProvider {
    fn get_rate(&self, target: &str) -> impl Future<Output = Option<f64>> + Send;
}

/// One rate from the provider's daily table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    pub date: NaiveDate,
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
struct RateEnvelope {
    date: NaiveDate,
    #[serde(flatten)]
    tables: HashMap<String, Value>,
}

/// Client for the `/currencies/{code}.json` API. No caching and no retries:
/// every lookup is a fresh request.
#[derive(Debug, Clone)]
pub struct CurrencyClient {
    client: Client,
    base_url: String,
    base_currency: String,
}

impl CurrencyClient {
    pub fn new(base_url: &str, base_currency: &str, timeout: Duration) -> Result<Self, CurrencyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base_currency: base_currency.to_lowercase(),
        })
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Fetches today's table for the base currency and picks `target` out of it.
    pub async fn try_get_rate(&self, target: &str) -> Result<RateQuote, CurrencyError> {
        let url = format!("{}/currencies/{}.json", self.base_url, self.base_currency);
        debug!(%url, "fetching conversion table");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CurrencyError::Status(response.status()));
        }
        let body = response.text().await?;
        parse_rate(&body, &self.base_currency, target)
    }
}

impl RateProvider for CurrencyClient {
    async fn get_rate(&self, target: &str) -> Option<f64> {
        match self.try_get_rate(target).await {
            Ok(quote) => {
                debug!(base = %self.base_currency, target, rate = quote.rate, date = %quote.date, "conversion rate");
                Some(quote.rate)
            }
            Err(err) => {
                warn!(base = %self.base_currency, target, error = %err, "conversion rate unavailable");
                None
            }
        }
    }
}

/// Extracts `base -> target` from a provider envelope such as
/// `{"date": "2024-03-01", "eur": {"gbp": 0.85, ...}}`.
pub fn parse_rate(body: &str, base: &str, target: &str) -> Result<RateQuote, CurrencyError> {
    let base = base.to_lowercase();
    let target = target.to_lowercase();
    let mut envelope: RateEnvelope = serde_json::from_str(body)?;

    let table = match envelope.tables.remove(&base) {
        Some(Value::Object(table)) => table,
        Some(_) => {
            return Err(CurrencyError::Envelope(format!("`{base}` is not a rate table")));
        }
        None => return Err(CurrencyError::Envelope(format!("no `{base}` table"))),
    };

    let value = table.get(&target).ok_or_else(|| CurrencyError::MissingRate {
        base: base.clone(),
        target: target.clone(),
    })?;
    let rate = value
        .as_f64()
        .ok_or_else(|| CurrencyError::Envelope(format!("`{target}` rate is not a number")))?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(CurrencyError::InvalidRate { target, rate });
    }

    Ok(RateQuote {
        date: envelope.date,
        rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const SAMPLE: &str = r#"{"date": "2024-03-01", "eur": {"gbp": 0.8552, "usd": 1.0837}}"#;

    /// Serves one canned HTTP response and returns the request line it saw.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (format!("http://{addr}"), handle)
    }

    fn client(base_url: &str) -> CurrencyClient {
        CurrencyClient::new(base_url, "EUR", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_rate_picks_target() {
        let quote = parse_rate(SAMPLE, "eur", "GBP").unwrap();
        assert_eq!(quote.rate, 0.8552);
        assert_eq!(quote.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_rate_missing_target() {
        let err = parse_rate(SAMPLE, "eur", "jpy").unwrap_err();
        assert!(matches!(err, CurrencyError::MissingRate { .. }));
    }

    #[test]
    fn test_parse_rate_rejects_other_envelopes() {
        assert!(matches!(
            parse_rate(r#"{"date": "2024-03-01", "rates": {"gbp": 0.85}}"#, "eur", "gbp"),
            Err(CurrencyError::Envelope(_))
        ));
        assert!(matches!(
            parse_rate(r#"{"date": "2024-03-01", "eur": 0.85}"#, "eur", "gbp"),
            Err(CurrencyError::Envelope(_))
        ));
        assert!(matches!(
            parse_rate(r#"{"eur": {"gbp": 0.85}}"#, "eur", "gbp"),
            Err(CurrencyError::Decode(_))
        ));
        assert!(matches!(
            parse_rate("<html>oops</html>", "eur", "gbp"),
            Err(CurrencyError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_rate_rejects_zero() {
        let err = parse_rate(r#"{"date": "2024-03-01", "eur": {"gbp": 0}}"#, "eur", "gbp").unwrap_err();
        assert!(matches!(err, CurrencyError::InvalidRate { .. }));
    }

    #[tokio::test]
    async fn test_get_rate_requests_base_table() {
        let (url, server) = serve_once("200 OK", SAMPLE).await;
        let rate = client(&url).get_rate("gbp").await;
        assert_eq!(rate, Some(0.8552));
        assert_eq!(server.await.unwrap(), "GET /currencies/eur.json HTTP/1.1");
    }

    #[tokio::test]
    async fn test_get_rate_server_error_is_unavailable() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let client = client(&url);
        assert!(matches!(
            client.try_get_rate("gbp").await,
            Err(CurrencyError::Status(status)) if status.as_u16() == 503
        ));
    }

    #[tokio::test]
    async fn test_get_rate_unreachable_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert_eq!(client(&format!("http://{addr}")).get_rate("gbp").await, None);
    }

    #[tokio::test]
    async fn test_get_rate_timeout_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client =
            CurrencyClient::new(&format!("http://{addr}"), "eur", Duration::from_millis(200)).unwrap();
        assert_eq!(client.get_rate("gbp").await, None);
    }
}
