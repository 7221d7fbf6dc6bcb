//! Append-only payment transaction ledger keyed by gateway payment id
use crate::booking::{Booking, BookingStore};
use crate::error::Result;
use crate::types::TimeStamp;
use crate::utils::{compound_key, from_cbor, prefix_key, to_cbor};
use chrono::Utc;
use sled::Transactional;
use sled::transaction::ConflictableTransactionResult;

pub const LEDGER_TREE: &str = "payment_transactions";
pub const LEDGER_BY_BOOKING_TREE: &str = "payment_transactions_by_booking";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    #[n(0)]
    Captured,
    #[n(1)]
    Failed,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction {
    #[n(0)]
    pub booking_id: String,
    #[n(1)]
    pub gateway: String,
    #[n(2)]
    pub order_id: String,
    #[n(3)]
    pub payment_id: String,
    #[n(4)]
    pub signature: String,
    #[n(5)]
    pub amount: u64,
    #[n(6)]
    pub status: TransactionStatus,
    /// Request body as received from the gateway callback.
    #[n(7)]
    #[cbor(with = "minicbor::bytes")]
    pub raw: Vec<u8>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted,
    AlreadyRecorded,
}

#[derive(Clone)]
pub struct PaymentLedger {
    rows: sled::Tree,
    by_booking: sled::Tree,
}

impl PaymentLedger {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            rows: db.open_tree(LEDGER_TREE)?,
            by_booking: db.open_tree(LEDGER_BY_BOOKING_TREE)?,
        })
    }

    /// Insert `tx` unless its payment id is already present. The check and the
    /// writes run in one transaction, so of two racing inserts exactly one
    /// sees `Inserted`.
    pub fn record(&self, tx: &PaymentTransaction) -> Result<LedgerInsert> {
        let key = tx.payment_id.as_bytes();
        let row = to_cbor(tx)?;
        let index = compound_key(&[tx.booking_id.as_bytes(), key]);

        let outcome = (&self.rows, &self.by_booking).transaction(
            |(rows, by_booking)| -> ConflictableTransactionResult<LedgerInsert> {
                if rows.get(key)?.is_some() {
                    return Ok(LedgerInsert::AlreadyRecorded);
                }
                rows.insert(key, row.as_slice())?;
                by_booking.insert(index.as_slice(), key)?;
                Ok(LedgerInsert::Inserted)
            },
        )?;

        Ok(outcome)
    }

    /// Like [`PaymentLedger::record`], but the booking the payment produced is
    /// written in the same transaction. Either the row and the booking both
    /// land or neither does. A known payment id writes nothing.
    pub fn record_with_booking(
        &self,
        tx: &PaymentTransaction,
        bookings: &BookingStore,
        booking: &mut Booking,
    ) -> Result<LedgerInsert> {
        let key = tx.payment_id.as_bytes();
        let row = to_cbor(tx)?;
        let index = compound_key(&[tx.booking_id.as_bytes(), key]);
        let booking_key = booking.id.clone();
        let encoded = BookingStore::encode(booking)?;

        let outcome = (&self.rows, &self.by_booking, bookings.tree()).transaction(
            |(rows, by_booking, stored)| -> ConflictableTransactionResult<LedgerInsert> {
                if rows.get(key)?.is_some() {
                    return Ok(LedgerInsert::AlreadyRecorded);
                }
                rows.insert(key, row.as_slice())?;
                by_booking.insert(index.as_slice(), key)?;
                stored.insert(booking_key.as_bytes(), encoded.as_slice())?;
                Ok(LedgerInsert::Inserted)
            },
        )?;

        Ok(outcome)
    }

    pub fn contains(&self, payment_id: &str) -> Result<bool> {
        Ok(self.rows.contains_key(payment_id.as_bytes())?)
    }

    pub fn find(&self, payment_id: &str) -> Result<Option<PaymentTransaction>> {
        match self.rows.get(payment_id.as_bytes())? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every row recorded against `booking_id`, in payment id order.
    pub fn for_booking(&self, booking_id: &str) -> Result<Vec<PaymentTransaction>> {
        let mut rows = Vec::new();
        for entry in self.by_booking.scan_prefix(prefix_key(booking_id.as_bytes())) {
            let (_, payment_id) = entry?;
            if let Some(bytes) = self.rows.get(&payment_id)? {
                rows.push(from_cbor(&bytes)?);
            }
        }
        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
