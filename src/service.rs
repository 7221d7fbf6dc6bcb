//! Service layer API for booking and payment operations
use crate::booking::{Booking, BookingStatus, BookingStore, GatewayRef, NewBooking, PaymentMode};
use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::gateway::SignatureVerifier;
use crate::ledger::{LedgerInsert, PaymentLedger, PaymentTransaction, TransactionStatus};
use crate::machine::{self, Capture, RefundRequest, Transition};
use crate::notify::{Notification, Notifier};
use crate::types::TimeStamp;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// What a gateway order for a booking should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub booking_id: String,
    pub amount: u64,
    pub mode: PaymentMode,
    pub currency: String,
    pub receipt: String,
}

/// A gateway callback reporting a captured payment.
#[derive(Debug, Clone, Default)]
pub struct VerifyPayment {
    pub booking_id: String,
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub requested_mode: Option<PaymentMode>,
    pub raw: Vec<u8>,
}

impl VerifyPayment {
    fn check_required(&self) -> std::result::Result<(), ValidationError> {
        let fields = [
            ("orderId", &self.order_id),
            ("paymentId", &self.payment_id),
            ("signature", &self.signature),
            ("bookingId", &self.booking_id),
        ];
        match fields.into_iter().find(|(_, v)| v.trim().is_empty()) {
            Some((name, _)) => Err(ValidationError::MissingField(name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment was new and the booking now reflects it.
    Applied(Booking),
    /// The payment id was already in the ledger. Nothing changed.
    AlreadyProcessed,
}

pub struct BookingService {
    instance: Arc<sled::Db>,
    bookings: BookingStore,
    ledger: PaymentLedger,
    notifier: Arc<dyn Notifier>,
    verifier: Arc<dyn SignatureVerifier>,
    stale_after: Duration,
}

impl BookingService {
    pub fn new(
        instance: Arc<sled::Db>,
        notifier: Arc<dyn Notifier>,
        verifier: Arc<dyn SignatureVerifier>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            bookings: BookingStore::open(&instance)?,
            ledger: PaymentLedger::open(&instance)?,
            instance,
            notifier,
            verifier,
            stale_after: config.stale_after(),
        })
    }

    pub fn bookings(&self) -> &BookingStore {
        &self.bookings
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.instance.flush()?)
    }

    /// Validate a checkout draft and store it as a pending booking.
    pub fn create_booking(&self, draft: NewBooking) -> Result<Booking> {
        let mut booking = draft.validate_and_finalise()?;
        self.bookings.save(&mut booking)?;
        info!(booking = %booking.id, booking_ref = %booking.booking_ref, total = booking.payment.total_amount, "booking created");
        Ok(booking)
    }

    pub fn get_booking(&self, id: &str) -> Result<Booking> {
        self.bookings.get(id)
    }

    pub fn payment_intent(&self, id: &str, requested: Option<PaymentMode>) -> Result<PaymentIntent> {
        let booking = self.bookings.get(id)?;
        let (amount, mode) = machine::payable_amount(&booking.payment, requested)?;
        let tail = &booking.id[booking.id.len().saturating_sub(6)..];

        Ok(PaymentIntent {
            booking_id: booking.id.clone(),
            amount,
            mode,
            currency: booking.payment.currency.clone(),
            receipt: format!("bk_{tail}"),
        })
    }

    /// Apply a captured payment exactly once per gateway payment id.
    ///
    /// A replayed payment id returns [`PaymentOutcome::AlreadyProcessed`]
    /// before the signature is checked. A bad signature is an error and
    /// nothing is written.
    pub fn verify_payment(&self, request: VerifyPayment) -> Result<PaymentOutcome> {
        request.check_required()?;

        if self.ledger.contains(&request.payment_id)? {
            info!(payment = %request.payment_id, "payment already processed");
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        if !self
            .verifier
            .verify(&request.order_id, &request.payment_id, &request.signature)
        {
            warn!(payment = %request.payment_id, booking = %request.booking_id, "signature rejected");
            return Err(ValidationError::InvalidSignature.into());
        }

        let mut booking = self.bookings.get(&request.booking_id)?;
        booking
            .ensure_invoice_id()
            .map_err(|e| Error::Encode(e.to_string()))?;
        let (amount, _) = machine::payable_amount(&booking.payment, request.requested_mode)?;

        let now = TimeStamp::new();
        let capture = Capture {
            amount,
            gateway_ref: GatewayRef {
                order_id: Some(request.order_id.clone()),
                payment_id: Some(request.payment_id.clone()),
                signature: Some(request.signature.clone()),
            },
        };
        let transition = machine::apply_payment_capture(&booking, &capture, false, &now)?;

        let row = PaymentTransaction {
            booking_id: booking.id.clone(),
            gateway: booking.payment.gateway.clone(),
            order_id: request.order_id,
            payment_id: request.payment_id,
            signature: request.signature,
            amount,
            status: TransactionStatus::Captured,
            raw: request.raw,
            created_at: now,
        };
        let Some(booking) = self.commit_with_payment(transition, &row)? else {
            info!(payment = %row.payment_id, "payment recorded concurrently");
            return Ok(PaymentOutcome::AlreadyProcessed);
        };
        info!(
            booking = %booking.id,
            payment = %row.payment_id,
            amount,
            paid = booking.payment.amount_paid,
            remaining = booking.payment.remaining_amount,
            status = booking.payment.status.as_str(),
            "payment captured"
        );
        Ok(PaymentOutcome::Applied(booking))
    }

    /// Record a failed gateway attempt against the booking, once per payment id.
    pub fn fail_payment(
        &self,
        booking_id: &str,
        order_id: &str,
        payment_id: &str,
        raw: Vec<u8>,
    ) -> Result<PaymentOutcome> {
        if payment_id.trim().is_empty() {
            return Err(ValidationError::MissingField("paymentId").into());
        }
        if self.ledger.contains(payment_id)? {
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        let booking = self.bookings.get(booking_id)?;
        let now = TimeStamp::new();
        let transition = machine::apply_payment_failure(&booking, &now)?;

        let row = PaymentTransaction {
            booking_id: booking.id.clone(),
            gateway: booking.payment.gateway.clone(),
            order_id: order_id.to_owned(),
            payment_id: payment_id.to_owned(),
            signature: String::new(),
            amount: 0,
            status: TransactionStatus::Failed,
            raw,
            created_at: now,
        };
        let Some(booking) = self.commit_with_payment(transition, &row)? else {
            return Ok(PaymentOutcome::AlreadyProcessed);
        };
        info!(booking = %booking.id, payment = payment_id, "payment failed");
        Ok(PaymentOutcome::Applied(booking))
    }

    pub fn confirm_booking(&self, id: &str) -> Result<Booking> {
        let booking = self.bookings.get(id)?;
        let transition = machine::apply_confirmation(&booking, &TimeStamp::new())?;
        let booking = self.commit(transition)?;
        info!(booking = %booking.id, "booking confirmed");
        Ok(booking)
    }

    /// Cancel a booking. The caller is responsible for authorising the request.
    pub fn cancel_booking(&self, id: &str, reason: &str, refund: Option<RefundRequest>) -> Result<Booking> {
        let booking = self.bookings.get(id)?;
        let transition = machine::apply_cancellation(&booking, reason, refund.as_ref(), &TimeStamp::new())?;
        let booking = self.commit(transition)?;
        info!(
            booking = %booking.id,
            payment_status = booking.payment.status.as_str(),
            "booking cancelled"
        );
        Ok(booking)
    }

    pub fn complete_refund(&self, id: &str) -> Result<Booking> {
        let booking = self.bookings.get(id)?;
        let transition = machine::apply_refund_completion(&booking, &TimeStamp::new())?;
        let booking = self.commit(transition)?;
        info!(booking = %booking.id, "refund completed");
        Ok(booking)
    }

    /// Delete bookings still `pending` that were created before
    /// `now - stale_after`. The cutoff is computed on every call.
    pub fn sweep_stale_pending(&self, now: &TimeStamp<Utc>) -> Result<usize> {
        let cutoff = now.minus(self.stale_after);
        let deleted = self
            .bookings
            .delete_where(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)?;
        info!(deleted, cutoff = %cutoff.to_datetime_utc(), "stale pending sweep");
        Ok(deleted)
    }

    /// Save the new state, latches included, then hand out its notifications.
    fn commit(&self, transition: Transition) -> Result<Booking> {
        let Transition {
            mut booking,
            notifications,
        } = transition;
        self.bookings.save(&mut booking)?;
        self.dispatch(&booking, &notifications);
        Ok(booking)
    }

    /// Save the new state together with the ledger row that caused it.
    /// Returns `None` when the payment id was recorded first by someone else,
    /// in which case nothing is written or sent.
    fn commit_with_payment(&self, transition: Transition, row: &PaymentTransaction) -> Result<Option<Booking>> {
        let Transition {
            mut booking,
            notifications,
        } = transition;
        if self.ledger.record_with_booking(row, &self.bookings, &mut booking)? == LedgerInsert::AlreadyRecorded {
            return Ok(None);
        }
        self.dispatch(&booking, &notifications);
        Ok(Some(booking))
    }

    fn dispatch(&self, booking: &Booking, notifications: &[Notification]) {
        for notification in notifications {
            if let Err(err) = self.notifier.send(notification) {
                warn!(
                    booking = %booking.id,
                    template = notification.template_key(),
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
}
