//! REST broker client: overseas-equity API with token caching, retry and a
//! shared call throttle.

use super::{BrokerClient, BrokerError, OrderReceipt, Throttle};
use crate::domain::{Decimal, Holding, LendingClass, Quote, Side, Symbol, TradeRecord, Venue};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::NaiveDate;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Safety margin subtracted from a token's advertised lifetime.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Broker client over the REST API.
///
/// All calls pace through the shared [`Throttle`] and retry transient
/// failures with exponential backoff.
#[derive(Debug)]
pub struct RestBroker {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    account_no: String,
    account_product_code: String,
    throttle: Arc<Throttle>,
    token: Mutex<Option<CachedToken>>,
}

impl RestBroker {
    pub fn new(
        base_url: String,
        app_key: String,
        app_secret: String,
        account_no: String,
        account_product_code: String,
        throttle: Arc<Throttle>,
    ) -> Self {
        RestBroker {
            client: Client::new(),
            base_url,
            app_key,
            app_secret,
            account_no,
            account_product_code,
            throttle,
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, issuing a new one when the cached token
    /// is missing or within the expiry margin.
    async fn ensure_token(&self) -> Result<String, BrokerError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.token.clone());
            }
        }

        self.throttle.pace().await;
        let url = format!("{}/oauth2/tokenP", self.base_url);
        let payload = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.app_key,
            "appsecret": self.app_secret,
        });
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BrokerError::NetworkError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BrokerError::AuthError(format!(
                "token request failed with status {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BrokerError::ParseError(e.to_string()))?;

        let token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrokerError::AuthError("missing access_token".to_string()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        debug!(expires_in, "access token refreshed");
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    /// GET with auth headers, throttled and retried on transient failures.
    async fn get_api(
        &self,
        path: &str,
        tr_id: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, BrokerError> {
        let token = self.ensure_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        retry(backoff, || async {
            self.throttle.pace().await;
            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .header("appkey", &self.app_key)
                .header("appsecret", &self.app_secret)
                .header("tr_id", tr_id)
                .header("custtype", "P")
                .query(query)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(BrokerError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(BrokerError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(BrokerError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(BrokerError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            let body = response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(BrokerError::ParseError(e.to_string())))?;
            check_api_result(&body).map_err(backoff::Error::permanent)?;
            Ok(body)
        })
        .await
    }

    /// POST with auth headers; never retried (order entry is not safely
    /// repeatable).
    async fn post_api(
        &self,
        path: &str,
        tr_id: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, BrokerError> {
        let token = self.ensure_token().await?;
        self.throttle.pace().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("appkey", &self.app_key)
            .header("appsecret", &self.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .json(&payload)
            .send()
            .await
            .map_err(|e| BrokerError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::HttpError {
                status: status.as_u16(),
                message: "order request failed".to_string(),
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BrokerError::ParseError(e.to_string()))?;
        check_api_result(&body)?;
        Ok(body)
    }
}

/// The API reports failures inside a 200 response via `rt_cd`.
fn check_api_result(body: &serde_json::Value) -> Result<(), BrokerError> {
    match body.get("rt_cd").and_then(|v| v.as_str()) {
        None | Some("0") => Ok(()),
        Some(code) => Err(BrokerError::Rejected {
            code: code.to_string(),
            message: body
                .get("msg1")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string(),
        }),
    }
}

fn field_decimal(row: &serde_json::Value, key: &str) -> Option<Decimal> {
    row.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str_canonical(s.trim()).ok())
}

fn field_i64(row: &serde_json::Value, key: &str) -> Option<i64> {
    row.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

fn field_str<'a>(row: &'a serde_json::Value, key: &str) -> &'a str {
    row.get(key).and_then(|v| v.as_str()).unwrap_or("").trim()
}

fn parse_history_row(row: &serde_json::Value) -> Result<TradeRecord, BrokerError> {
    let symbol = field_str(row, "pdno");
    if symbol.is_empty() {
        return Err(BrokerError::ParseError("missing pdno".to_string()));
    }
    let side = match field_str(row, "sll_buy_dvsn_cd") {
        "02" => Side::Buy,
        "01" => Side::Sell,
        other => {
            return Err(BrokerError::ParseError(format!(
                "invalid sll_buy_dvsn_cd: {}",
                other
            )))
        }
    };
    let quantity = field_i64(row, "ft_ccld_qty")
        .filter(|q| *q > 0)
        .ok_or_else(|| BrokerError::ParseError("invalid ft_ccld_qty".to_string()))?;
    let price = field_decimal(row, "ft_ccld_unpr3")
        .ok_or_else(|| BrokerError::ParseError("invalid ft_ccld_unpr3".to_string()))?;
    let trade_date = NaiveDate::parse_from_str(field_str(row, "ord_dt"), "%Y%m%d")
        .map_err(|e| BrokerError::ParseError(format!("invalid ord_dt: {}", e)))?;
    let venue = Venue::from_code(field_str(row, "ovrs_excg_cd"))
        .ok_or_else(|| BrokerError::ParseError("unknown ovrs_excg_cd".to_string()))?;

    let lending_class = match field_str(row, "loan_type_cd") {
        "" | "00" => LendingClass::Cash,
        _ => LendingClass::Credit,
    };
    let loan_ref = field_str(row, "loan_dt").to_string();
    let currency = {
        let c = field_str(row, "tr_crcy_cd");
        if c.is_empty() { "USD" } else { c }.to_string()
    };
    let order_no = field_str(row, "odno");

    Ok(TradeRecord::new(
        Symbol::new(symbol),
        side,
        quantity,
        price,
        trade_date,
        field_str(row, "ord_tmd").to_string(),
        lending_class,
        loan_ref,
        currency,
        venue,
        if order_no.is_empty() {
            None
        } else {
            Some(order_no)
        },
    ))
}

fn parse_holding_row(row: &serde_json::Value, snapshot_date: NaiveDate) -> Option<Holding> {
    let symbol = field_str(row, "ovrs_pdno");
    let quantity = field_i64(row, "ovrs_cblc_qty")?;
    if symbol.is_empty() || quantity <= 0 {
        return None;
    }
    Some(Holding {
        symbol: Symbol::new(symbol),
        name: field_str(row, "ovrs_item_name").to_string(),
        quantity,
        avg_cost: field_decimal(row, "pchs_avg_pric")?,
        current_price: field_decimal(row, "now_pric2").unwrap_or_else(Decimal::zero),
        purchase_amount: field_decimal(row, "frcr_pchs_amt1")?,
        valuation: field_decimal(row, "ovrs_stck_evlu_amt").unwrap_or_else(Decimal::zero),
        lending_class: match field_str(row, "loan_type_cd") {
            "" | "00" => LendingClass::Cash,
            _ => LendingClass::Credit,
        },
        currency: {
            let c = field_str(row, "tr_crcy_cd");
            if c.is_empty() { "USD" } else { c }.to_string()
        },
        venue: Venue::from_code(field_str(row, "ovrs_excg_cd")).unwrap_or(Venue::Nasdaq),
        snapshot_date,
    })
}

#[async_trait]
impl BrokerClient for RestBroker {
    async fn get_quote(&self, symbol: &Symbol, venue: Venue) -> Result<Quote, BrokerError> {
        let body = self
            .get_api(
                "/uapi/overseas-price/v1/quotations/price",
                "HHDFS00000300",
                &[
                    ("AUTH", String::new()),
                    ("EXCD", venue.code().to_string()),
                    ("SYMB", symbol.as_str().to_string()),
                ],
            )
            .await?;
        let output = body
            .get("output")
            .ok_or_else(|| BrokerError::ParseError("missing output".to_string()))?;
        Ok(Quote {
            last: field_decimal(output, "last").unwrap_or_else(Decimal::zero),
            open: field_decimal(output, "open").unwrap_or_else(Decimal::zero),
            high: field_decimal(output, "high").unwrap_or_else(Decimal::zero),
            low: field_decimal(output, "low").unwrap_or_else(Decimal::zero),
        })
    }

    async fn get_trade_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        side: Option<Side>,
    ) -> Result<Vec<TradeRecord>, BrokerError> {
        let side_code = match side {
            Some(Side::Buy) => "02",
            Some(Side::Sell) => "01",
            None => "00",
        };
        let body = self
            .get_api(
                "/uapi/overseas-stock/v1/trading/inquire-ccnl",
                "TTTS3035R",
                &[
                    ("CANO", self.account_no.clone()),
                    ("ACNT_PRDT_CD", self.account_product_code.clone()),
                    ("ORD_STRT_DT", from.format("%Y%m%d").to_string()),
                    ("ORD_END_DT", to.format("%Y%m%d").to_string()),
                    ("SLL_BUY_DVSN", side_code.to_string()),
                    ("CCLD_NCCS_DVSN", "01".to_string()),
                    ("OVRS_EXCG_CD", "%".to_string()),
                    ("PDNO", "%".to_string()),
                    ("SORT_SQN", "DS".to_string()),
                    ("CTX_AREA_FK200", String::new()),
                    ("CTX_AREA_NK200", String::new()),
                ],
            )
            .await?;

        let rows = body
            .get("output")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut trades = Vec::new();
        for row in &rows {
            match parse_history_row(row) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(error = %e, "skipping unparsable trade-history row"),
            }
        }
        Ok(trades)
    }

    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        let body = self
            .get_api(
                "/uapi/overseas-stock/v1/trading/inquire-balance",
                "TTTS3012R",
                &[
                    ("CANO", self.account_no.clone()),
                    ("ACNT_PRDT_CD", self.account_product_code.clone()),
                    ("OVRS_EXCG_CD", "NASD".to_string()),
                    ("TR_CRCY_CD", "USD".to_string()),
                    ("CTX_AREA_FK200", String::new()),
                    ("CTX_AREA_NK200", String::new()),
                ],
            )
            .await?;

        let today = crate::strategy::clock::now_exchange().date_naive();
        let rows = body
            .get("output1")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|row| parse_holding_row(row, today))
            .collect())
    }

    async fn submit_order(
        &self,
        symbol: &Symbol,
        venue: Venue,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> Result<OrderReceipt, BrokerError> {
        let tr_id = match side {
            Side::Buy => "TTTT1002U",
            Side::Sell => "TTTT1006U",
        };
        let payload = serde_json::json!({
            "CANO": self.account_no,
            "ACNT_PRDT_CD": self.account_product_code,
            "OVRS_EXCG_CD": venue.code(),
            "PDNO": symbol.as_str(),
            "ORD_QTY": quantity.to_string(),
            "OVRS_ORD_UNPR": price.to_canonical_string(),
            "ORD_SVR_DVSN_CD": "0",
            "ORD_DVSN": "00",
        });
        let body = self
            .post_api("/uapi/overseas-stock/v1/trading/order", tr_id, payload)
            .await?;

        let order_id = body
            .get("output")
            .map(|o| field_str(o, "ODNO").to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BrokerError::ParseError("missing ODNO".to_string()))?;
        Ok(OrderReceipt { order_id })
    }

    async fn get_sellable_quantity(&self, symbol: &Symbol) -> Result<i64, BrokerError> {
        let body = self
            .get_api(
                "/uapi/overseas-stock/v1/trading/inquire-balance",
                "TTTS3012R",
                &[
                    ("CANO", self.account_no.clone()),
                    ("ACNT_PRDT_CD", self.account_product_code.clone()),
                    ("OVRS_EXCG_CD", "NASD".to_string()),
                    ("TR_CRCY_CD", "USD".to_string()),
                    ("CTX_AREA_FK200", String::new()),
                    ("CTX_AREA_NK200", String::new()),
                ],
            )
            .await?;
        let rows = body
            .get("output1")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .find(|row| field_str(row, "ovrs_pdno") == symbol.as_str())
            .and_then(|row| field_i64(row, "ord_psbl_qty"))
            .unwrap_or(0))
    }

    async fn get_buying_power(&self) -> Result<Decimal, BrokerError> {
        let body = self
            .get_api(
                "/uapi/overseas-stock/v1/trading/inquire-present-balance",
                "CTRP6504R",
                &[
                    ("CANO", self.account_no.clone()),
                    ("ACNT_PRDT_CD", self.account_product_code.clone()),
                    ("WCRC_FRCR_DVSN_CD", "02".to_string()),
                    ("NATN_CD", "840".to_string()),
                    ("TR_MKET_CD", "00".to_string()),
                    ("INQR_DVSN_CD", "00".to_string()),
                ],
            )
            .await?;
        let deposit = body
            .get("output2")
            .and_then(|v| v.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| {
                field_decimal(row, "frcr_dncl_amt_2").or_else(|| field_decimal(row, "frcr_dncl_amt1"))
            })
            .unwrap_or_else(Decimal::zero);
        Ok(deposit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_api_result() {
        assert!(check_api_result(&serde_json::json!({"rt_cd": "0"})).is_ok());
        assert!(check_api_result(&serde_json::json!({})).is_ok());
        match check_api_result(&serde_json::json!({"rt_cd": "1", "msg1": "bad "})) {
            Err(BrokerError::Rejected { code, message }) => {
                assert_eq!(code, "1");
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_row() {
        let row = serde_json::json!({
            "pdno": "AAPL",
            "sll_buy_dvsn_cd": "02",
            "ft_ccld_qty": "10",
            "ft_ccld_unpr3": "185.5000",
            "ord_dt": "20260204",
            "ord_tmd": "093101",
            "ovrs_excg_cd": "NASD",
            "loan_type_cd": "00",
            "loan_dt": "",
            "tr_crcy_cd": "USD",
            "odno": "0001234"
        });
        let trade = parse_history_row(&row).unwrap();
        assert_eq!(trade.symbol, Symbol::new("AAPL"));
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.quantity, 10);
        assert_eq!(trade.trade_key, "ord:0001234");
        assert_eq!(trade.venue, Venue::Nasdaq);
    }

    #[test]
    fn test_parse_history_row_rejects_bad_side() {
        let row = serde_json::json!({
            "pdno": "AAPL",
            "sll_buy_dvsn_cd": "9",
            "ft_ccld_qty": "10",
            "ft_ccld_unpr3": "185.50",
            "ord_dt": "20260204",
            "ovrs_excg_cd": "NASD"
        });
        assert!(parse_history_row(&row).is_err());
    }

    #[test]
    fn test_parse_holding_row_skips_zero_quantity() {
        let row = serde_json::json!({
            "ovrs_pdno": "AAPL",
            "ovrs_cblc_qty": "0",
            "pchs_avg_pric": "185.50",
            "frcr_pchs_amt1": "0"
        });
        assert!(parse_holding_row(&row, "2026-02-04".parse().unwrap()).is_none());
    }

    #[test]
    fn test_parse_holding_row_full() {
        let row = serde_json::json!({
            "ovrs_pdno": "NVDA",
            "ovrs_item_name": "NVIDIA",
            "ovrs_cblc_qty": "5",
            "pchs_avg_pric": "900.10",
            "now_pric2": "950.00",
            "frcr_pchs_amt1": "4500.50",
            "ovrs_stck_evlu_amt": "4750.00",
            "ovrs_excg_cd": "NASD",
            "tr_crcy_cd": "USD"
        });
        let holding = parse_holding_row(&row, "2026-02-04".parse().unwrap()).unwrap();
        assert_eq!(holding.symbol, Symbol::new("NVDA"));
        assert_eq!(holding.quantity, 5);
        assert_eq!(
            holding.purchase_amount,
            Decimal::from_str_canonical("4500.50").unwrap()
        );
    }
}
