//! Reply parsing: vendor pipe-delimited blocks into per-security tables.
//!
//! A reply body is a sequence of blocks, one per security per column:
//!
//! ```text
//! START SECURITY|<security>|<column>|...
//! <security>|<DD/MM/YYYY>|<value>|...
//! ...
//! END SECURITY|...|...|<return code>
//! ```
//!
//! Blocks for the same security merge into one table. A data line naming a
//! different security than its block is a protocol violation and aborts the
//! parse; everything else degrades gracefully (absent cells, logged
//! warnings).

use crate::error::DlError;
use crate::table::SecurityTable;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;

const START_SECURITY: &str = "START SECURITY";
const END_SECURITY: &str = "END SECURITY";
const DATE_FORMAT: &str = "%d/%m/%Y";

/// Parse a history reply body into per-security tables.
///
/// Every table spans every calendar date in the inclusive `[begin, end]`
/// range with one column per entry of `fields`, regardless of which dates the
/// reply mentions. Pure function of its inputs — parsing the same body twice
/// yields identical tables.
pub fn parse_history(
    raw: &str,
    begin: NaiveDate,
    end: NaiveDate,
    fields: &[&str],
) -> Result<BTreeMap<String, SecurityTable>, DlError> {
    if begin > end {
        return Err(DlError::Decode(format!(
            "begin date {begin} is after end date {end}"
        )));
    }

    let mut tables: BTreeMap<String, SecurityTable> = BTreeMap::new();
    // Some while inside a block: (current security, current column).
    let mut block: Option<(String, String)> = None;

    for line in raw.lines() {
        let bits: Vec<&str> = line.splitn(5, '|').collect();
        match &block {
            Some((security, column)) => {
                if bits[0] == END_SECURITY {
                    match bits.get(3).and_then(|s| s.trim().parse::<i64>().ok()) {
                        Some(0) => {}
                        Some(code) => {
                            warn!("return code {code} for history request on security {security}");
                        }
                        None => {
                            warn!("unreadable return code on END SECURITY for {security}");
                        }
                    }
                    block = None;
                } else if bits[0] != security {
                    return Err(DlError::ProtocolViolation {
                        expected: security.clone(),
                        found: bits[0].to_string(),
                    });
                } else if bits.len() < 3 {
                    warn!("short data line for {security}: {line:?}");
                } else {
                    let Ok(date) = NaiveDate::parse_from_str(bits[1], DATE_FORMAT) else {
                        debug!("could not parse date {:?} for {security}", bits[1]);
                        continue;
                    };
                    let Ok(value) = bits[2].trim().parse::<f64>() else {
                        debug!("could not convert value {:?} to float", bits[2]);
                        continue;
                    };
                    if let Some(table) = tables.get_mut(security) {
                        if !table.set(date, column, value) {
                            debug!(
                                "dropped cell {security}/{column} @ {date}: outside range or \
                                 column not requested"
                            );
                        }
                    }
                }
            }
            None => {
                if bits[0] == START_SECURITY {
                    if bits.len() < 3 {
                        warn!("malformed block start ignored: {line:?}");
                        continue;
                    }
                    let security = bits[1].to_string();
                    let column = bits[2].to_string();
                    tables
                        .entry(security.clone())
                        .or_insert_with(|| SecurityTable::new(begin, end, fields));
                    if !fields.iter().any(|f| *f == column) {
                        warn!("column {column} for {security} was not requested; dropping its values");
                    }
                    block = Some((security, column));
                }
                // Anything else between blocks is noise.
            }
        }
    }

    Ok(tables)
}
