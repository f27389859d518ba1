//! Settlement/refund split for Mastercard batch files
//!
//! Records starting with `D` are data records; everything else is a header or
//! trailer and is copied to both outputs. A data record goes to exactly one
//! output, chosen by the sign of the 12-character amount field at byte offset
//! 518.

use std::ops::Range;

use courier_common::{CourierError, Result};

use super::{decode_utf8, DestinationTarget, RouteStrategy, RoutedObject};
use crate::config::DestinationSpec;

/// Byte range of the signed spend amount inside a data record
pub const AMOUNT_FIELD: Range<usize> = 518..530;

/// Which output a data record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ledger {
    Settlement,
    Refund,
}

#[derive(Debug, Clone)]
pub struct MastercardSplit {
    settlement: DestinationSpec,
    refund: DestinationSpec,
}

impl MastercardSplit {
    pub fn new(settlement: DestinationSpec, refund: DestinationSpec) -> Self {
        Self { settlement, refund }
    }
}

impl RouteStrategy for MastercardSplit {
    fn transform(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RoutedObject>> {
        let (settlement, refund) = split_records(filename, bytes)?;

        Ok(vec![
            RoutedObject::new(
                DestinationTarget::in_directory(
                    &self.settlement.container,
                    &self.settlement.directory,
                    filename,
                ),
                settlement,
            ),
            RoutedObject::new(
                DestinationTarget::in_directory(
                    &self.refund.container,
                    &self.refund.directory,
                    filename,
                ),
                refund,
            ),
        ])
    }
}

/// Split file content into (settlement, refund) byte buffers, preserving line order
pub fn split_records(filename: &str, bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let text = decode_utf8(filename, bytes)?;
    let mut settlement = Vec::with_capacity(bytes.len());
    let mut refund = Vec::with_capacity(bytes.len() / 4);

    for (index, line) in text.split_inclusive('\n').enumerate() {
        if !line.starts_with('D') {
            settlement.extend_from_slice(line.as_bytes());
            refund.extend_from_slice(line.as_bytes());
            continue;
        }

        match classify(line).map_err(|reason| CourierError::format(filename, index + 1, reason))? {
            Ledger::Settlement => settlement.extend_from_slice(line.as_bytes()),
            Ledger::Refund => refund.extend_from_slice(line.as_bytes()),
        }
    }

    Ok((settlement, refund))
}

/// Route a data record by the sign of its amount field
pub fn classify(record: &str) -> std::result::Result<Ledger, String> {
    let amount = parse_amount(record)?;
    Ok(if amount >= 0 {
        Ledger::Settlement
    } else {
        Ledger::Refund
    })
}

/// Parse the amount field; records shorter than the field yield what is present
fn parse_amount(record: &str) -> std::result::Result<i64, String> {
    let end = AMOUNT_FIELD.end.min(record.len());
    let field = record
        .get(AMOUNT_FIELD.start.min(end)..end)
        .ok_or_else(|| "amount field is not valid ASCII".to_string())?;

    let field = field.trim_matches(|c: char| c.is_ascii_whitespace());
    if field.is_empty() {
        return Err(format!(
            "missing amount field at offset {} (record is {} bytes)",
            AMOUNT_FIELD.start,
            record.trim_end_matches(&['\r', '\n'][..]).len()
        ));
    }

    field
        .parse::<i64>()
        .map_err(|e| format!("invalid amount '{}': {}", field, e))
}
