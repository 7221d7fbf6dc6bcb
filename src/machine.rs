//! Booking and payment transitions
//!
//! Every function here is pure: it takes the current booking, returns the next
//! one plus the notifications that transition earns, and leaves persistence
//! and delivery to the caller. A rejected transition returns an error before
//! anything is cloned or changed.
//!
//! Notification policy lives in [`decide_notifications`] alone. SMS categories
//! are gated by the booking's one-way latches, which are set on the returned
//! booking so that saving it records the send.
use crate::booking::{
    latch, Booking, BookingStatus, GatewayRef, Payment, PaymentMode, PaymentStatus, RefundInfo,
};
use crate::error::ValidationError;
use crate::notify::{Notification, NotificationKind};
use crate::types::TimeStamp;
use crate::utils::count_words;
use chrono::Utc;

pub const MAX_REASON_WORDS: usize = 500;
pub const PAYMENT_COMPLETED_TEXT: &str = "Payment completed successfully";

type Outcome<T> = std::result::Result<T, ValidationError>;

/// The next booking state together with what should be sent about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub booking: Booking,
    pub notifications: Vec<Notification>,
}

impl Transition {
    fn unchanged(booking: &Booking) -> Self {
        Self {
            booking: booking.clone(),
            notifications: Vec::new(),
        }
    }
}

/// A verified gateway capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub amount: u64,
    pub gateway_ref: GatewayRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefundRequest {
    pub amount: Option<u64>,
    pub is_refunded: bool,
    pub note: String,
}

#[derive(Debug, Clone, Copy)]
struct Before {
    status: BookingStatus,
    payment: PaymentStatus,
}

impl Before {
    fn of(booking: &Booking) -> Self {
        Self {
            status: booking.status,
            payment: booking.payment.status,
        }
    }
}

/// Amount the next gateway order must carry.
///
/// A `partial` request is honoured only while nothing has been paid; after the
/// first capture the balance is always due in full.
pub fn payable_amount(payment: &Payment, requested: Option<PaymentMode>) -> Outcome<(u64, PaymentMode)> {
    let mode = if payment.amount_paid > 0 {
        PaymentMode::Full
    } else {
        requested.unwrap_or(payment.mode)
    };

    let amount = match mode {
        PaymentMode::Partial => payment
            .partial_amount
            .filter(|a| *a > 0)
            .ok_or(ValidationError::PartialAmountMissing)?,
        PaymentMode::Full => payment.total_amount.saturating_sub(payment.amount_paid),
    };

    if amount == 0 {
        return Err(ValidationError::NothingToPay);
    }
    Ok((amount, mode))
}

/// Trim and bound a cancellation reason.
pub fn validate_cancellation_reason(reason: &str) -> Outcome<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::ReasonRequired);
    }
    let words = count_words(reason);
    if words > MAX_REASON_WORDS {
        return Err(ValidationError::ReasonTooLong(words));
    }
    Ok(reason.to_owned())
}

/// Apply a captured payment.
///
/// When the payment id is already in the ledger the booking comes back as it
/// was, with nothing to send.
pub fn apply_payment_capture(
    booking: &Booking,
    capture: &Capture,
    ledger_already_seen: bool,
    now: &TimeStamp<Utc>,
) -> Outcome<Transition> {
    if ledger_already_seen {
        return Ok(Transition::unchanged(booking));
    }
    if capture.amount == 0 {
        return Err(ValidationError::InvalidAmount);
    }
    if booking.status == BookingStatus::Cancelled {
        return Err(ValidationError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Confirmed,
        });
    }
    match booking.payment.status {
        PaymentStatus::Pending | PaymentStatus::Partial | PaymentStatus::Failed => {}
        other => return Err(ValidationError::InvalidPaymentState(other)),
    }

    let before = Before::of(booking);
    let mut next = booking.clone();

    let payment = &mut next.payment;
    payment.credit(capture.amount);
    if payment.remaining_amount == 0 {
        payment.status = PaymentStatus::Paid;
        payment.mode = PaymentMode::Full;
    } else {
        payment.status = PaymentStatus::Partial;
    }
    payment.is_verified = true;
    payment.gateway_ref = capture.gateway_ref.clone();

    // A capture landing on a failed attempt keeps the booking status as is
    // and leaves it for an operator to confirm. A booking already confirmed
    // stays confirmed rather than dropping back to pending.
    if before.payment != PaymentStatus::Failed {
        next.status = BookingStatus::Confirmed;
    }
    next.updated_at = now.clone();

    let notifications = decide_notifications(before, &mut next);
    Ok(Transition {
        booking: next,
        notifications,
    })
}

/// Record a failed gateway attempt.
pub fn apply_payment_failure(booking: &Booking, now: &TimeStamp<Utc>) -> Outcome<Transition> {
    match booking.payment.status {
        PaymentStatus::Pending | PaymentStatus::Partial => {}
        other => return Err(ValidationError::InvalidPaymentState(other)),
    }

    let before = Before::of(booking);
    let mut next = booking.clone();
    next.payment.status = PaymentStatus::Failed;
    next.updated_at = now.clone();

    let notifications = decide_notifications(before, &mut next);
    Ok(Transition {
        booking: next,
        notifications,
    })
}

/// Manual `pending -> confirmed`. A failed payment is reopened as pending.
pub fn apply_confirmation(booking: &Booking, now: &TimeStamp<Utc>) -> Outcome<Transition> {
    if booking.status != BookingStatus::Pending {
        return Err(ValidationError::InvalidTransition {
            from: booking.status,
            to: BookingStatus::Confirmed,
        });
    }

    let before = Before::of(booking);
    let mut next = booking.clone();
    next.status = BookingStatus::Confirmed;
    if next.payment.status == PaymentStatus::Failed {
        next.payment.status = PaymentStatus::Pending;
    }
    next.updated_at = now.clone();

    let notifications = decide_notifications(before, &mut next);
    Ok(Transition {
        booking: next,
        notifications,
    })
}

/// Cancel a pending or confirmed booking. Authorisation is the caller's job.
pub fn apply_cancellation(
    booking: &Booking,
    reason: &str,
    refund: Option<&RefundRequest>,
    now: &TimeStamp<Utc>,
) -> Outcome<Transition> {
    let reason = validate_cancellation_reason(reason)?;
    if booking.status == BookingStatus::Cancelled {
        return Err(ValidationError::AlreadyCancelled);
    }

    let before = Before::of(booking);
    let mut next = booking.clone();
    next.status = BookingStatus::Cancelled;
    next.cancellation_reason = Some(reason);
    next.cancelled_at = Some(now.clone());

    let paid = next.payment.amount_paid;
    if paid > 0 {
        let is_refunded = refund.is_some_and(|r| r.is_refunded);
        next.payment.status = if is_refunded {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::RefundPending
        };
        next.refund_info = Some(RefundInfo {
            amount: refund.and_then(|r| r.amount).unwrap_or(paid),
            is_refunded,
            refunded_at: is_refunded.then(|| now.clone()),
            note: refund.map(|r| r.note.trim().to_owned()).unwrap_or_default(),
        });
    } else {
        next.payment.status = PaymentStatus::Cancelled;
    }
    next.updated_at = now.clone();

    let notifications = decide_notifications(before, &mut next);
    Ok(Transition {
        booking: next,
        notifications,
    })
}

/// Mark a pending refund as paid out.
pub fn apply_refund_completion(booking: &Booking, now: &TimeStamp<Utc>) -> Outcome<Transition> {
    if booking.payment.status != PaymentStatus::RefundPending {
        return Err(ValidationError::InvalidPaymentState(booking.payment.status));
    }

    let before = Before::of(booking);
    let mut next = booking.clone();
    next.payment.status = PaymentStatus::Refunded;

    let paid = next.payment.amount_paid;
    let refund = next.refund_info.get_or_insert_with(|| RefundInfo {
        amount: paid,
        ..RefundInfo::default()
    });
    refund.is_refunded = true;
    refund.refunded_at = Some(now.clone());
    next.updated_at = now.clone();

    let notifications = decide_notifications(before, &mut next);
    Ok(Transition {
        booking: next,
        notifications,
    })
}

fn invoice_eligible(status: BookingStatus, payment: PaymentStatus) -> bool {
    status == BookingStatus::Confirmed || matches!(payment, PaymentStatus::Partial | PaymentStatus::Paid)
}

/// Decide what a transition from `before` to `booking` should send, setting
/// the latch of every SMS category that fires.
///
/// SMS without a phone number is skipped and leaves its latch unset. Emails
/// follow status edges and are not latched.
fn decide_notifications(before: Before, booking: &mut Booking) -> Vec<Notification> {
    let mut out = Vec::new();
    let status = booking.status;
    let payment = booking.payment.status;
    let status_changed = before.status != status;
    let payment_changed = before.payment != payment;
    let completed = before.payment == PaymentStatus::Partial && payment == PaymentStatus::Paid;

    if let Some(phone) = booking.contact.sms_recipient().map(str::to_owned) {
        let announce = match status {
            BookingStatus::Confirmed => true,
            BookingStatus::Cancelled => status_changed,
            BookingStatus::Pending => false,
        };
        if announce && latch(&mut booking.sms_flags.booking_confirmed_sent) {
            out.push(
                Notification::new(NotificationKind::BookingStatus, &phone)
                    .with("bookingId", &booking.booking_ref)
                    .with("status", status.as_str()),
            );
        }

        // partial -> paid is announced by the completion SMS below instead
        if payment_changed && !completed && latch(&mut booking.sms_flags.payment_status_sent) {
            out.push(
                Notification::new(NotificationKind::PaymentUpdate, &phone)
                    .with("bookingId", &booking.booking_ref)
                    .with("status", payment.as_str()),
            );
        }

        let became_eligible =
            !invoice_eligible(before.status, before.payment) && invoice_eligible(status, payment);
        if became_eligible {
            if let Some(invoice_id) = booking.invoice_id.clone() {
                if latch(&mut booking.sms_flags.invoice_sent) {
                    out.push(
                        Notification::new(NotificationKind::Invoice, &phone)
                            .with("bookingId", &booking.booking_ref)
                            .with("invoiceId", invoice_id),
                    );
                }
            }
        }

        if completed && latch(&mut booking.sms_flags.payment_completed_sent) {
            out.push(
                Notification::new(NotificationKind::PaymentCompleted, &phone)
                    .with("bookingId", &booking.booking_ref)
                    .with("status", PAYMENT_COMPLETED_TEXT),
            );
        }
    }

    if let Some(email) = booking.contact.email_recipient() {
        if status_changed {
            match status {
                BookingStatus::Confirmed => {
                    let kind = if payment == PaymentStatus::Paid {
                        NotificationKind::BookingConfirmedFull
                    } else {
                        NotificationKind::BookingConfirmedPartial
                    };
                    out.push(
                        Notification::new(kind, email)
                            .with("name", &booking.contact.name)
                            .with("tourName", &booking.tour_name)
                            .with("amountPaid", booking.payment.amount_paid)
                            .with("remainingAmount", booking.payment.remaining_amount),
                    );
                }
                BookingStatus::Cancelled => out.push(
                    Notification::new(NotificationKind::BookingCancelled, email)
                        .with("name", &booking.contact.name)
                        .with("tourName", &booking.tour_name)
                        .with(
                            "cancellationReason",
                            booking.cancellation_reason.as_deref().unwrap_or("Not provided"),
                        ),
                ),
                BookingStatus::Pending => {}
            }
        }

        if payment_changed && payment == PaymentStatus::Refunded {
            let amount = booking.refund_info.as_ref().map_or(0, |r| r.amount);
            out.push(
                Notification::new(NotificationKind::RefundCompleted, email)
                    .with("name", &booking.contact.name)
                    .with("tourName", &booking.tour_name)
                    .with("refundAmount", amount),
            );
        }
    }

    out
}
