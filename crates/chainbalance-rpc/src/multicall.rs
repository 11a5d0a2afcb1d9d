//! Multicall3 ABI helpers.
//!
//! Encodes `aggregate3((address,bool,bytes)[])` with `allowFailure = true`
//! for every entry, and decodes the `(bool,bytes)[]` it returns.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, Address};

use crate::error::TransportError;

pub use chainbalance_core::MULTICALL3_ADDRESS;

pub const AGGREGATE3: &str = "aggregate3((address,bool,bytes)[])";

/// First four bytes of `keccak256(signature)`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

pub fn parse_address(raw: &str) -> Result<Address, TransportError> {
    raw.parse::<Address>()
        .map_err(|e| TransportError::Abi(format!("invalid address {raw:?}: {e}")))
}

/// Call data for `signature` applied to address arguments.
pub fn encode_call(signature: &str, args: &[String]) -> Result<Vec<u8>, TransportError> {
    let params = args
        .iter()
        .map(|a| parse_address(a).map(DynSolValue::Address))
        .collect::<Result<Vec<_>, _>>()?;

    let mut data = function_selector(signature).to_vec();
    data.extend(DynSolValue::Tuple(params).abi_encode_params());
    Ok(data)
}

/// Call data for one `aggregate3` round-trip.
pub fn encode_aggregate3(calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let entries = calls
        .iter()
        .map(|(target, data)| {
            DynSolValue::Tuple(vec![
                DynSolValue::Address(*target),
                DynSolValue::Bool(true),
                DynSolValue::Bytes(data.clone()),
            ])
        })
        .collect();

    let mut data = function_selector(AGGREGATE3).to_vec();
    data.extend(DynSolValue::Tuple(vec![DynSolValue::Array(entries)]).abi_encode_params());
    data
}

/// Decode `aggregate3` return data into `(success, returnData)` pairs, one
/// per submitted entry and in submission order.
pub fn decode_aggregate3(
    return_data: &[u8],
    expected: usize,
) -> Result<Vec<(bool, Vec<u8>)>, TransportError> {
    let result_type = DynSolType::Array(Box::new(DynSolType::Tuple(vec![
        DynSolType::Bool,
        DynSolType::Bytes,
    ])));

    let decoded = result_type
        .abi_decode(return_data)
        .map_err(|e| TransportError::Abi(format!("failed to decode aggregate3 results: {e}")))?;

    let DynSolValue::Array(items) = decoded else {
        return Err(TransportError::Abi("expected array from aggregate3".into()));
    };
    if items.len() != expected {
        return Err(TransportError::Abi(format!(
            "aggregate3 returned {} results, expected {expected}",
            items.len()
        )));
    }

    Ok(items
        .into_iter()
        .map(|item| match item {
            DynSolValue::Tuple(fields) => match fields.as_slice() {
                [DynSolValue::Bool(success), DynSolValue::Bytes(data)] => (*success, data.clone()),
                _ => (false, Vec::new()),
            },
            _ => (false, Vec::new()),
        })
        .collect())
}

#[cfg(test)]
pub(crate) fn encode_aggregate3_returns(results: &[(bool, Vec<u8>)]) -> Vec<u8> {
    let items = results
        .iter()
        .map(|(success, data)| {
            DynSolValue::Tuple(vec![DynSolValue::Bool(*success), DynSolValue::Bytes(data.clone())])
        })
        .collect();
    DynSolValue::Array(items).abi_encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbalance_core::backend::{BALANCE_OF, GET_ETH_BALANCE};

    #[test]
    fn known_selectors() {
        assert_eq!(hex::encode(function_selector(BALANCE_OF)), "70a08231");
        assert_eq!(hex::encode(function_selector(GET_ETH_BALANCE)), "4d2301cc");
        assert_eq!(hex::encode(function_selector(AGGREGATE3)), "82ad56cb");
    }

    #[test]
    fn balance_of_call_data() {
        let data = encode_call(
            BALANCE_OF,
            &["0x9fc201b6bc40cccbd5b588532ce98b845f95af51".to_string()],
        )
        .unwrap();
        assert_eq!(data.len(), 36);
        assert_eq!(
            hex::encode(&data),
            "70a08231\
             0000000000000000000000009fc201b6bc40cccbd5b588532ce98b845f95af51"
        );
    }

    #[test]
    fn bad_address_is_rejected() {
        let err = encode_call(BALANCE_OF, &["not-an-address".to_string()]).unwrap_err();
        assert!(matches!(err, TransportError::Abi(_)));
    }

    #[test]
    fn aggregate3_starts_with_selector() {
        let target = parse_address(MULTICALL3_ADDRESS).unwrap();
        let data = encode_aggregate3(&[(target, vec![0xde, 0xad])]);
        assert_eq!(&data[..4], &function_selector(AGGREGATE3));
        // selector, array offset, length, element offset, tuple head (3 words),
        // bytes length, padded bytes
        assert_eq!(data.len(), 4 + 32 * 8);
    }

    #[test]
    fn decodes_results_in_order() {
        let encoded = encode_aggregate3_returns(&[(true, vec![0x64]), (false, vec![])]);
        let results = decode_aggregate3(&encoded, 2).unwrap();
        assert_eq!(results, vec![(true, vec![0x64]), (false, vec![])]);
    }

    #[test]
    fn result_count_mismatch_is_an_error() {
        let encoded = encode_aggregate3_returns(&[(true, vec![0x64])]);
        assert!(matches!(decode_aggregate3(&encoded, 2), Err(TransportError::Abi(_))));
    }
}
