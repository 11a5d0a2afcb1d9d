//! Hex balance parsing.

use num_bigint::BigUint;
use num_traits::Num;

use crate::error::{FailureCause, RequestFailure};
use crate::types::{IntBalance, RawBalance};

/// Parse a hex balance (`0x`-prefixed or bare) into an arbitrary-precision integer.
///
/// Leading zeros are fine; an empty digit string is not.
pub fn parse_hex_balance(raw: &str) -> Result<BigUint, FailureCause> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FailureCause::Parse(raw.to_string()));
    }

    BigUint::from_str_radix(digits, 16).map_err(|_| FailureCause::Parse(raw.to_string()))
}

/// Render big-endian return data as a minimal hex quantity (`0x0` for zero).
///
/// Empty data renders as `0x`, which does not parse as a balance.
pub fn quantity_from_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0x".to_string();
    }
    let digits = hex::encode(bytes);
    match digits.trim_start_matches('0') {
        "" => "0x0".to_string(),
        trimmed => format!("0x{trimmed}"),
    }
}

/// Parse every raw balance. A bad value becomes a [`RequestFailure`] instead
/// of aborting the rest.
pub fn parse_raw_balances<I>(raw: I) -> (Vec<IntBalance>, Vec<RequestFailure>)
where
    I: IntoIterator<Item = RawBalance>,
{
    let mut parsed = Vec::new();
    let mut failures = Vec::new();
    for RawBalance { request, balance } in raw {
        match parse_hex_balance(&balance) {
            Ok(balance) => parsed.push(IntBalance { request, balance }),
            Err(cause) => failures.push(RequestFailure { request, cause }),
        }
    }
    (parsed, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_hex() {
        assert_eq!(parse_hex_balance("0x64").unwrap(), BigUint::from(100u32));
        assert_eq!(parse_hex_balance("0X0").unwrap(), BigUint::from(0u32));
        assert_eq!(parse_hex_balance("ff").unwrap(), BigUint::from(255u32));
    }

    #[test]
    fn return_data_renders_as_minimal_quantity() {
        let mut word = [0u8; 32];
        word[31] = 0x64;
        assert_eq!(quantity_from_bytes(&word), "0x64");
        assert_eq!(quantity_from_bytes(&[0x05]), "0x5");
        assert_eq!(quantity_from_bytes(&[0u8; 32]), "0x0");
        assert_eq!(quantity_from_bytes(&[0x01, 0x00]), "0x100");
        assert_eq!(quantity_from_bytes(&[]), "0x");
        assert!(parse_hex_balance(&quantity_from_bytes(&[])).is_err());
    }

    #[test]
    fn parses_padded_abi_word() {
        let word = format!("0x{}{}", "0".repeat(62), "64");
        assert_eq!(parse_hex_balance(&word).unwrap(), BigUint::from(100u32));
    }

    #[test]
    fn parses_beyond_256_bits() {
        let raw = format!("0x1{}", "0".repeat(70));
        let parsed = parse_hex_balance(&raw).unwrap();
        assert_eq!(parsed.bits(), 281);
    }

    #[test]
    fn parse_failures_do_not_abort_the_rest() {
        use crate::types::BalanceRequest;

        let raw = vec![
            RawBalance {
                request: BalanceRequest::native("0x1", "0xA"),
                balance: "0x64".into(),
            },
            RawBalance {
                request: BalanceRequest::native("0x1", "0xB"),
                balance: "oops".into(),
            },
        ];
        let (parsed, failures) = parse_raw_balances(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].balance, BigUint::from(100u32));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].request.address, "0xB");
        assert_eq!(failures[0].cause, FailureCause::Parse("oops".into()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_hex_balance("0xzz"),
            Err(FailureCause::Parse("0xzz".into()))
        );
        assert!(parse_hex_balance("0x").is_err());
        assert!(parse_hex_balance("").is_err());
        assert!(parse_hex_balance("0x-1").is_err());
    }
}
