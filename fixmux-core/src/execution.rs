/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Structured execution data extracted from ExecutionReport (35=8) messages.

use crate::types::Side;
use rust_decimal::Decimal;
use std::fmt;

/// Fill details carried by one ExecutionReport.
///
/// Records are only ever built complete; a report lacking any of the nine
/// fields produces no record at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// ExecID (17).
    pub exec_id: String,
    /// Symbol (55).
    pub symbol: String,
    /// Side (54).
    pub side: Side,
    /// OrderQty (38).
    pub order_qty: Decimal,
    /// LastPx (31).
    pub last_px: Decimal,
    /// LastQty (32).
    pub last_qty: Decimal,
    /// TransactTime (60), as sent by the counterparty.
    pub transact_time: String,
    /// ExecType (150).
    pub exec_type: char,
    /// OrdStatus (39).
    pub ord_status: char,
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Execution Report: ExecID={}, Symbol={}, Side={}, OrderQty={}, LastPx={}, \
             LastQty={}, TransactTime={}, ExecType={}, OrdStatus={}",
            self.exec_id,
            self.symbol,
            self.side,
            self.order_qty,
            self.last_px,
            self.last_qty,
            self.transact_time,
            self.exec_type,
            self.ord_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_execution_record_line() {
        let record = ExecutionRecord {
            exec_id: "E1".to_string(),
            symbol: "EUR/USD".to_string(),
            side: Side::Buy,
            order_qty: Decimal::from_str("1000000").unwrap(),
            last_px: Decimal::from_str("1.08450").unwrap(),
            last_qty: Decimal::from_str("250000").unwrap(),
            transact_time: "20240301-12:00:00.000".to_string(),
            exec_type: 'F',
            ord_status: '1',
        };
        assert_eq!(
            record.to_string(),
            "Execution Report: ExecID=E1, Symbol=EUR/USD, Side=1, OrderQty=1000000, \
             LastPx=1.08450, LastQty=250000, TransactTime=20240301-12:00:00.000, \
             ExecType=F, OrdStatus=1"
        );
    }
}
