use serde::{Deserialize, Serialize};

/// Offset between the ripple epoch (2000-01-01) and the unix epoch.
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

pub fn ripple_to_unix(ripple_seconds: i64) -> i64 {
    ripple_seconds + RIPPLE_EPOCH_OFFSET
}

/// An amount as the ledger reports it: either drops of the native currency
/// as a bare string, or an issued-currency object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerAmount {
    Issued {
        currency: String,
        issuer: String,
        value: String,
    },
    Drops(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerTransaction {
    pub tx: Option<TxJson>,
    pub meta: Option<TxMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxJson {
    #[serde(rename = "TransactionType")]
    pub transaction_type: Option<String>,
    #[serde(rename = "Destination")]
    pub destination: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<LedgerAmount>,
    pub hash: Option<String>,
    /// Seconds since the ripple epoch.
    pub date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxMeta {
    #[serde(rename = "TransactionResult")]
    pub transaction_result: Option<String>,
    #[serde(rename = "delivered_amount", alias = "DeliveredAmount")]
    pub delivered_amount: Option<LedgerAmount>,
    #[serde(rename = "AffectedNodes", default)]
    pub affected_nodes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct AccountTxResponse {
    pub result: AccountTxResult,
}

#[derive(Debug, Deserialize)]
pub struct AccountTxResult {
    pub status: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub transactions: Vec<LedgerTransaction>,
}

/// What a transaction actually delivered, relative to the token we expect.
///
/// `Ambiguous` covers the ledger quirk where a trust-line delivery surfaces
/// as a bare drops string in some metadata shapes. We refuse to guess: the
/// caller gets an explicit outcome instead of a silent native/token call.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    /// The expected token, with its parsed amount.
    Expected(f64),
    /// A native-currency payment unrelated to the expected token.
    Native(f64),
    /// Some other issued currency.
    Other,
    /// Bare drops string but trust-line nodes touch the expected token.
    Ambiguous,
}

/// Classify the delivered amount of a transaction against the expected
/// currency/issuer pair. Prefers `meta.delivered_amount` (the authoritative
/// field after partial payments) and falls back to the submitted `Amount`.
pub fn classify_delivered(
    tx: &LedgerTransaction,
    expected_currency: &str,
    expected_issuer: Option<&str>,
) -> Delivered {
    let delivered = tx
        .meta
        .as_ref()
        .and_then(|m| m.delivered_amount.clone())
        .or_else(|| tx.tx.as_ref().and_then(|t| t.amount.clone()));

    let Some(delivered) = delivered else {
        return Delivered::Other;
    };

    match delivered {
        LedgerAmount::Issued {
            currency,
            issuer,
            value,
        } => {
            let currency_ok = currencies_match(&currency, expected_currency);
            let issuer_ok = match expected_issuer {
                Some(expected) => issuer.eq_ignore_ascii_case(expected),
                None => false,
            };
            match (currency_ok && issuer_ok, value.parse::<f64>()) {
                (true, Ok(amount)) => Delivered::Expected(amount),
                _ => Delivered::Other,
            }
        }
        LedgerAmount::Drops(drops) => {
            let Ok(drops) = drops.parse::<f64>() else {
                return Delivered::Other;
            };
            let xrp = drops / 1_000_000.0;
            if expected_issuer.is_none() && currencies_match(expected_currency, "XRP") {
                return Delivered::Expected(xrp);
            }
            let touched = tx
                .meta
                .as_ref()
                .map(|m| {
                    touches_trust_line(&m.affected_nodes, expected_currency, expected_issuer)
                })
                .unwrap_or(false);
            if touched {
                Delivered::Ambiguous
            } else {
                Delivered::Native(xrp)
            }
        }
    }
}

/// True when the metadata's state changes include a RippleState balance line
/// for the expected currency/issuer, i.e. a trust line moved even though the
/// delivered amount was reported in bare drops.
pub fn touches_trust_line(
    nodes: &[serde_json::Value],
    expected_currency: &str,
    expected_issuer: Option<&str>,
) -> bool {
    let Some(issuer) = expected_issuer else {
        return false;
    };

    nodes.iter().any(|node| {
        let entry = node
            .get("ModifiedNode")
            .or_else(|| node.get("CreatedNode"))
            .or_else(|| node.get("DeletedNode"));
        let Some(entry) = entry else { return false };

        if entry.get("LedgerEntryType").and_then(|v| v.as_str()) != Some("RippleState") {
            return false;
        }

        let fields = entry
            .get("FinalFields")
            .or_else(|| entry.get("NewFields"));
        let Some(fields) = fields else { return false };

        let currency_ok = fields
            .get("Balance")
            .and_then(|b| b.get("currency"))
            .and_then(|c| c.as_str())
            .map(|c| currencies_match(c, expected_currency))
            .unwrap_or(false);

        let issuer_ok = ["HighLimit", "LowLimit"].iter().any(|side| {
            fields
                .get(side)
                .and_then(|l| l.get("issuer"))
                .and_then(|i| i.as_str())
                .map(|i| i.eq_ignore_ascii_case(issuer))
                .unwrap_or(false)
        });

        currency_ok && issuer_ok
    })
}

/// Ledger-side form of a currency code: 3-char codes pass through, longer
/// codes become the 160-bit hex representation the ledger requires.
pub fn currency_to_ledger_code(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    if code.len() <= 3 {
        return code;
    }
    let mut hex_code = hex::encode_upper(code.as_bytes());
    while hex_code.len() < 40 {
        hex_code.push('0');
    }
    hex_code
}

/// Human form of a ledger currency field: 40-char hex codes are decoded and
/// trailing NULs stripped, anything else is uppercased as-is.
pub fn normalize_currency(code: &str) -> String {
    let code = code.trim();
    if code.len() == 40 {
        if let Ok(bytes) = hex::decode(code) {
            let text: String = bytes
                .into_iter()
                .take_while(|b| *b != 0)
                .map(|b| b as char)
                .collect();
            if !text.is_empty() && text.chars().all(|c| c.is_ascii_graphic()) {
                return text.to_ascii_uppercase();
            }
        }
    }
    code.to_ascii_uppercase()
}

pub fn currencies_match(a: &str, b: &str) -> bool {
    normalize_currency(a) == normalize_currency(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ISSUER: &str = "rXRPBIssuerAddressXXXXXXXXXXXXXXXX";

    fn tx_with(delivered: serde_json::Value, nodes: serde_json::Value) -> LedgerTransaction {
        serde_json::from_value(json!({
            "tx": {
                "TransactionType": "Payment",
                "Destination": "rDestination",
                "hash": "ABC123",
                "date": 800_000_000
            },
            "meta": {
                "TransactionResult": "tesSUCCESS",
                "delivered_amount": delivered,
                "AffectedNodes": nodes
            }
        }))
        .unwrap()
    }

    #[test]
    fn four_char_code_round_trips_through_hex() {
        let hex_code = currency_to_ledger_code("XRPB");
        assert_eq!(hex_code, "5852504200000000000000000000000000000000");
        assert_eq!(normalize_currency(&hex_code), "XRPB");
        assert!(currencies_match(&hex_code, "xrpb"));
    }

    #[test]
    fn issued_amount_matching_expected_token_classifies_as_expected() {
        let tx = tx_with(
            json!({"currency": "5852504200000000000000000000000000000000",
                   "issuer": ISSUER, "value": "502.5"}),
            json!([]),
        );
        assert_eq!(
            classify_delivered(&tx, "XRPB", Some(ISSUER)),
            Delivered::Expected(502.5)
        );
    }

    #[test]
    fn issued_amount_with_wrong_issuer_is_other() {
        let tx = tx_with(
            json!({"currency": "XRPB", "issuer": "rSomeoneElse", "value": "500"}),
            json!([]),
        );
        assert_eq!(classify_delivered(&tx, "XRPB", Some(ISSUER)), Delivered::Other);
    }

    #[test]
    fn bare_drops_with_matching_trust_line_is_ambiguous_not_native() {
        let tx = tx_with(
            json!("500000000"),
            json!([{
                "ModifiedNode": {
                    "LedgerEntryType": "RippleState",
                    "FinalFields": {
                        "Balance": {"currency": "5852504200000000000000000000000000000000",
                                    "issuer": "rrrrrrrrrrrrrrrrrrrrBZbvji", "value": "-1700"},
                        "HighLimit": {"issuer": ISSUER, "currency": "XRPB", "value": "0"},
                        "LowLimit": {"issuer": "rHolder", "currency": "XRPB", "value": "1000000"}
                    }
                }
            }]),
        );
        assert_eq!(
            classify_delivered(&tx, "XRPB", Some(ISSUER)),
            Delivered::Ambiguous
        );
    }

    #[test]
    fn bare_drops_without_trust_line_is_native() {
        let tx = tx_with(json!("2500000"), json!([]));
        assert_eq!(
            classify_delivered(&tx, "XRPB", Some(ISSUER)),
            Delivered::Native(2.5)
        );
    }

    #[test]
    fn bare_drops_matches_when_native_xrp_is_expected() {
        let tx = tx_with(json!("2500000"), json!([]));
        assert_eq!(classify_delivered(&tx, "XRP", None), Delivered::Expected(2.5));
    }

    #[test]
    fn ripple_epoch_conversion() {
        // 2000-01-01T00:00:00Z in ripple time is the unix offset itself.
        assert_eq!(ripple_to_unix(0), 946_684_800);
    }
}
