//! Balance sheets: block → address → currency → value.

use std::collections::HashMap;

use num_bigint::BigUint;
use serde::Serialize;

use crate::error::AggregateError;
use crate::parse::parse_raw_balances;
use crate::types::{BalanceRequest, Currency, IntBalance, RawBalance};

type AddressMap<V> = HashMap<String, HashMap<Currency, V>>;

/// Three-level lookup of balances. Keys are unique per level; iteration
/// order is unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BalanceSheet<V> {
    blocks: HashMap<String, AddressMap<V>>,
}

impl<V> Default for BalanceSheet<V> {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }
}

impl<V> BalanceSheet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; a previous value for the same triple is replaced and
    /// returned (last write wins).
    pub fn insert(&mut self, request: BalanceRequest, value: V) -> Option<V> {
        self.blocks
            .entry(request.block)
            .or_default()
            .entry(request.address)
            .or_default()
            .insert(request.currency, value)
    }

    pub fn get(&self, block: &str, address: &str, currency: &Currency) -> Option<&V> {
        self.blocks.get(block)?.get(address)?.get(currency)
    }

    /// All balances recorded for one block.
    pub fn block(&self, block: &str) -> Option<&AddressMap<V>> {
        self.blocks.get(block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// Number of (block, address, currency) entries.
    pub fn len(&self) -> usize {
        self.blocks
            .values()
            .flat_map(|addresses| addresses.values())
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Currency, &V)> {
        self.blocks.iter().flat_map(|(block, addresses)| {
            addresses.iter().flat_map(move |(address, currencies)| {
                currencies
                    .iter()
                    .map(move |(currency, value)| (block.as_str(), address.as_str(), currency, value))
            })
        })
    }

    pub fn map_values<U, F>(self, mut f: F) -> BalanceSheet<U>
    where
        F: FnMut(V) -> U,
    {
        let blocks = self
            .blocks
            .into_iter()
            .map(|(block, addresses)| {
                let addresses = addresses
                    .into_iter()
                    .map(|(address, currencies)| {
                        let currencies = currencies
                            .into_iter()
                            .map(|(currency, value)| (currency, f(value)))
                            .collect();
                        (address, currencies)
                    })
                    .collect();
                (block, addresses)
            })
            .collect();
        BalanceSheet { blocks }
    }

    pub fn into_inner(self) -> HashMap<String, AddressMap<V>> {
        self.blocks
    }
}

impl<V> FromIterator<(BalanceRequest, V)> for BalanceSheet<V> {
    /// Later pairs overwrite earlier ones for the same triple.
    fn from_iter<I: IntoIterator<Item = (BalanceRequest, V)>>(iter: I) -> Self {
        let mut sheet = Self::new();
        for (request, value) in iter {
            sheet.insert(request, value);
        }
        sheet
    }
}

/// Fold raw results into a sheet of hex strings.
pub fn build_raw_sheet<I>(results: I) -> BalanceSheet<String>
where
    I: IntoIterator<Item = RawBalance>,
{
    results.into_iter().map(|r| (r.request, r.balance)).collect()
}

/// Fold already-parsed results into an integer sheet.
pub fn build_int_sheet_from<I>(results: I) -> BalanceSheet<BigUint>
where
    I: IntoIterator<Item = IntBalance>,
{
    results.into_iter().map(|r| (r.request, r.balance)).collect()
}

/// Parse and fold raw results into an integer sheet.
///
/// Parse failures do not abort the fold; they are merged into `carried`
/// (the fetch stage's failures, if any) and returned as one aggregate.
pub fn build_int_sheet<I>(
    results: I,
    carried: Option<AggregateError>,
) -> (BalanceSheet<BigUint>, Option<AggregateError>)
where
    I: IntoIterator<Item = RawBalance>,
{
    let (parsed, parse_failures) = parse_raw_balances(results);
    (
        build_int_sheet_from(parsed),
        AggregateError::combine(carried, parse_failures),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{aggregate, BackendError, RequestFailure};

    fn raw(block: &str, address: &str, currency: Currency, balance: &str) -> RawBalance {
        RawBalance {
            request: BalanceRequest::new(block, address, currency),
            balance: balance.into(),
        }
    }

    #[test]
    fn raw_sheet_nests_by_block_address_currency() {
        let sheet = build_raw_sheet(vec![
            raw("0x1", "0xA", Currency::Native, "0x64"),
            raw("0x1", "0xA", Currency::token("0xT"), "0x66"),
            raw("0x2", "0xB", Currency::Native, "0x65"),
        ]);
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet.get("0x1", "0xA", &Currency::Native).unwrap(), "0x64");
        assert_eq!(
            sheet.get("0x1", "0xA", &Currency::token("0xT")).unwrap(),
            "0x66"
        );
        assert_eq!(sheet.get("0x2", "0xB", &Currency::Native).unwrap(), "0x65");
        assert!(sheet.get("0x2", "0xA", &Currency::Native).is_none());
        assert_eq!(sheet.block("0x1").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_triple_last_write_wins() {
        let sheet = build_raw_sheet(vec![
            raw("0x1", "0xA", Currency::Native, "0x1"),
            raw("0x1", "0xA", Currency::Native, "0x2"),
        ]);
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.get("0x1", "0xA", &Currency::Native).unwrap(), "0x2");
    }

    #[test]
    fn int_sheet_parses_hex() {
        let (sheet, failures) =
            build_int_sheet(vec![raw("0x1", "0xA", Currency::Native, "0x64")], None);
        assert!(failures.is_none());
        assert_eq!(
            sheet.get("0x1", "0xA", &Currency::Native),
            Some(&BigUint::from(100u32))
        );
    }

    #[test]
    fn parse_failures_merge_with_fetch_failures() {
        let fetch = aggregate(vec![RequestFailure::new(
            BalanceRequest::native("0x1", "0xC"),
            BackendError::Transport("down".into()),
        )]);
        let (sheet, failures) = build_int_sheet(
            vec![
                raw("0x1", "0xA", Currency::Native, "0x64"),
                raw("0x1", "0xB", Currency::Native, "nothex"),
            ],
            Some(fetch),
        );
        assert_eq!(sheet.len(), 1);
        let failures = failures.unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures.failed_count(), 2);
        let causes: Vec<_> = failures.groups().map(|g| g.cause.clone()).collect();
        assert_eq!(causes[0], "transport error: down");
        assert_eq!(causes[1], "invalid hex balance \"nothex\"");
    }

    #[test]
    fn map_values_and_serialize() {
        let sheet = build_raw_sheet(vec![raw("latest", "0xA", Currency::Native, "0x0a")]);
        let ints = sheet.map_values(|v| v.len());
        assert_eq!(ints.get("latest", "0xA", &Currency::Native), Some(&4));
        let json = serde_json::to_value(&ints).unwrap();
        assert_eq!(json["latest"]["0xA"]["native"], 4);
    }

    #[test]
    fn iter_visits_every_leaf() {
        let sheet = build_raw_sheet(vec![
            raw("0x1", "0xA", Currency::Native, "0x1"),
            raw("0x1", "0xB", Currency::Native, "0x2"),
        ]);
        let mut leaves: Vec<_> = sheet.iter().map(|(_, a, _, v)| (a, v.as_str())).collect();
        leaves.sort();
        assert_eq!(leaves, vec![("0xA", "0x1"), ("0xB", "0x2")]);
    }
}
