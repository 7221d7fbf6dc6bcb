use anyhow::Context;
use chrono::Duration;
use sled::open;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use travel_graph::booking::{BookingStatus, ContactInfo, NewBooking, PaymentMode, PaymentStatus};
use travel_graph::config::Config;
use travel_graph::error::{Error, ValidationError};
use travel_graph::machine::RefundRequest;
use travel_graph::notify::{Notification, NotificationKind, Notifier};
use travel_graph::service::{BookingService, PaymentOutcome, VerifyPayment};
use travel_graph::types::{EntityId, TimeStamp};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<Notification>>,
}

impl Recorder {
    fn drain(&self) -> Vec<NotificationKind> {
        let mut sent = self.sent.lock().unwrap();
        sent.drain(..).map(|n| n.kind).collect()
    }
}

impl Notifier for Recorder {
    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Unreachable;

impl Notifier for Unreachable {
    fn send(&self, _: &Notification) -> anyhow::Result<()> {
        anyhow::bail!("sms gateway timed out")
    }
}

fn service_with(name: &str, notifier: Arc<dyn Notifier>) -> anyhow::Result<(tempfile::TempDir, BookingService)> {
    let dir = tempdir()?;
    let db = Arc::new(open(dir.path().join(name))?);
    let verifier = |order: &str, payment: &str, signature: &str| signature == format!("{order}|{payment}");
    let service = BookingService::new(db, notifier, Arc::new(verifier), &Config::default())?;
    Ok((dir, service))
}

fn draft(partial: Option<u64>) -> NewBooking {
    let start = TimeStamp::new_with(2026, 12, 24, 0, 0, 0).unwrap();
    let end = TimeStamp::new_with(2026, 12, 30, 0, 0, 0).unwrap();
    let draft = NewBooking::new()
        .set_tour(EntityId::new("tour-kedarkantha").unwrap(), "Kedarkantha Winter Trek", 5_000)
        .set_user("user-42")
        .set_dates(start, end)
        .set_guests(2, 0)
        .set_contact(ContactInfo::new("Meera", "meera@example.com", Some("9811111111")));
    match partial {
        Some(amount) => draft.partial_payment(amount),
        None => draft.full_payment(),
    }
}

fn callback(booking_id: &str, payment_id: &str) -> VerifyPayment {
    VerifyPayment {
        booking_id: booking_id.to_string(),
        order_id: "order_1".to_string(),
        payment_id: payment_id.to_string(),
        signature: format!("order_1|{payment_id}"),
        requested_mode: None,
        raw: payment_id.as_bytes().to_vec(),
    }
}

fn applied(outcome: PaymentOutcome) -> anyhow::Result<travel_graph::booking::Booking> {
    match outcome {
        PaymentOutcome::Applied(booking) => Ok(booking),
        PaymentOutcome::AlreadyProcessed => anyhow::bail!("payment was not applied"),
    }
}

#[test]
fn partial_then_final_payment() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let (_dir, service) = service_with("partial_then_final.db", recorder.clone())?;

    let booking = service.create_booking(draft(Some(3_000)))?;
    assert_eq!(booking.payment.total_amount, 10_000);

    let intent = service.payment_intent(&booking.id, None)?;
    assert_eq!((intent.amount, intent.mode), (3_000, PaymentMode::Partial));

    let first = applied(service.verify_payment(callback(&booking.id, "pay_1"))?)
        .context("first capture")?;
    assert_eq!(first.payment.status, PaymentStatus::Partial);
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(first.payment.amount_paid, 3_000);
    assert_eq!(first.payment.remaining_amount, 7_000);
    assert!(first.payment.is_verified);
    assert_eq!(
        recorder.drain(),
        vec![
            NotificationKind::BookingStatus,
            NotificationKind::PaymentUpdate,
            NotificationKind::Invoice,
            NotificationKind::BookingConfirmedPartial,
        ]
    );

    let intent = service.payment_intent(&booking.id, Some(PaymentMode::Partial))?;
    assert_eq!((intent.amount, intent.mode), (7_000, PaymentMode::Full));

    let second = applied(service.verify_payment(callback(&booking.id, "pay_2"))?)
        .context("second capture")?;
    assert_eq!(second.payment.status, PaymentStatus::Paid);
    assert_eq!(second.payment.remaining_amount, 0);
    assert_eq!(recorder.drain(), vec![NotificationKind::PaymentCompleted]);

    let stored = service.get_booking(&booking.id)?;
    assert!(stored.sms_flags.payment_completed_sent);
    assert_eq!(service.ledger().for_booking(&booking.id)?.len(), 2);
    Ok(())
}

#[test]
fn replayed_payment_id_is_applied_once() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let (_dir, service) = service_with("replay.db", recorder.clone())?;
    let booking = service.create_booking(draft(Some(3_000)))?;

    applied(service.verify_payment(callback(&booking.id, "pay_1"))?)?;
    recorder.drain();

    let mut replay = callback(&booking.id, "pay_1");
    replay.requested_mode = Some(PaymentMode::Full);
    assert_eq!(service.verify_payment(replay)?, PaymentOutcome::AlreadyProcessed);

    let stored = service.get_booking(&booking.id)?;
    assert_eq!(stored.payment.amount_paid, 3_000);
    assert_eq!(service.ledger().find("pay_1")?.map(|r| r.amount), Some(3_000));
    assert!(recorder.drain().is_empty());
    Ok(())
}

#[test]
fn bad_signature_changes_nothing() -> anyhow::Result<()> {
    let (_dir, service) = service_with("bad_signature.db", Arc::new(Recorder::default()))?;
    let booking = service.create_booking(draft(None))?;

    let mut forged = callback(&booking.id, "pay_1");
    forged.signature = "forged".into();
    let err = service.verify_payment(forged).unwrap_err();

    assert!(matches!(err, Error::Validation(ValidationError::InvalidSignature)));
    assert!(service.ledger().is_empty());
    assert_eq!(service.get_booking(&booking.id)?, booking);
    Ok(())
}

#[test]
fn missing_fields_and_unknown_booking() -> anyhow::Result<()> {
    let (_dir, service) = service_with("missing.db", Arc::new(Recorder::default()))?;

    let mut request = callback("b-unknown", "pay_1");
    request.order_id = " ".into();
    assert!(matches!(
        service.verify_payment(request).unwrap_err(),
        Error::Validation(ValidationError::MissingField("orderId"))
    ));

    let err = service.verify_payment(callback("b-unknown", "pay_1")).unwrap_err();
    assert!(matches!(err, Error::NotFound { what: "booking", .. }));
    assert!(service.ledger().is_empty());
    Ok(())
}

#[test]
fn cancellation_and_refund() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let (_dir, service) = service_with("cancel_refund.db", recorder.clone())?;
    let booking = service.create_booking(draft(Some(3_000)))?;
    applied(service.verify_payment(callback(&booking.id, "pay_1"))?)?;
    recorder.drain();

    let too_long = vec!["delay"; 501].join(" ");
    assert!(matches!(
        service.cancel_booking(&booking.id, &too_long, None).unwrap_err(),
        Error::Validation(ValidationError::ReasonTooLong(501))
    ));

    let refund = RefundRequest {
        amount: Some(2_500),
        is_refunded: false,
        note: "cancellation fee retained".into(),
    };
    let cancelled = service.cancel_booking(&booking.id, "  Flight cancelled  ", Some(refund))?;
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.payment.status, PaymentStatus::RefundPending);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Flight cancelled"));
    assert_eq!(cancelled.refund_info.as_ref().map(|r| r.amount), Some(2_500));
    assert_eq!(recorder.drain(), vec![NotificationKind::BookingCancelled]);

    assert!(matches!(
        service.cancel_booking(&booking.id, "again", None).unwrap_err(),
        Error::Validation(ValidationError::AlreadyCancelled)
    ));

    let refunded = service.complete_refund(&booking.id)?;
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    assert_eq!(recorder.drain(), vec![NotificationKind::RefundCompleted]);
    Ok(())
}

#[test]
fn confirmation_sms_fires_once() -> anyhow::Result<()> {
    let recorder = Arc::new(Recorder::default());
    let (_dir, service) = service_with("latch.db", recorder.clone())?;
    let booking = service.create_booking(draft(None))?;

    service.confirm_booking(&booking.id)?;
    let first = recorder.drain();
    assert_eq!(
        first.iter().filter(|k| **k == NotificationKind::BookingStatus).count(),
        1
    );

    applied(service.verify_payment(callback(&booking.id, "pay_1"))?)?;
    let second = recorder.drain();
    assert!(!second.contains(&NotificationKind::BookingStatus));
    assert!(second.contains(&NotificationKind::PaymentUpdate));
    Ok(())
}

#[test]
fn failed_payment_then_retry() -> anyhow::Result<()> {
    let (_dir, service) = service_with("failure.db", Arc::new(Recorder::default()))?;
    let booking = service.create_booking(draft(None))?;

    let failed = applied(service.fail_payment(&booking.id, "order_1", "pay_f", Vec::new())?)?;
    assert_eq!(failed.payment.status, PaymentStatus::Failed);
    assert_eq!(
        service.fail_payment(&booking.id, "order_1", "pay_f", Vec::new())?,
        PaymentOutcome::AlreadyProcessed
    );

    let retried = applied(service.verify_payment(callback(&booking.id, "pay_ok"))?)?;
    assert_eq!(retried.payment.status, PaymentStatus::Paid);
    assert_eq!(retried.status, BookingStatus::Pending);

    let confirmed = service.confirm_booking(&booking.id)?;
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    Ok(())
}

#[test]
fn delivery_errors_do_not_fail_the_transition() -> anyhow::Result<()> {
    let (_dir, service) = service_with("unreachable.db", Arc::new(Unreachable))?;
    let booking = service.create_booking(draft(None))?;

    let paid = applied(service.verify_payment(callback(&booking.id, "pay_1"))?)?;
    assert_eq!(paid.payment.status, PaymentStatus::Paid);
    // latches stay set even though nothing was delivered
    assert!(service.get_booking(&booking.id)?.sms_flags.booking_confirmed_sent);
    Ok(())
}

#[test]
fn sweep_removes_only_stale_pending() -> anyhow::Result<()> {
    let (_dir, service) = service_with("sweep.db", Arc::new(Recorder::default()))?;
    let stale = service.create_booking(draft(None))?;
    let confirmed = service.create_booking(draft(None))?;
    service.confirm_booking(&confirmed.id)?;

    let created = stale.created_at.clone();
    assert_eq!(service.sweep_stale_pending(&created.plus(Duration::hours(23)))?, 0);
    // exactly at the threshold is not yet stale
    assert_eq!(service.sweep_stale_pending(&stale.created_at.plus(Duration::hours(24)))?, 0);

    let later = TimeStamp::new().plus(Duration::hours(25));
    assert_eq!(service.sweep_stale_pending(&later)?, 1);
    assert!(matches!(
        service.get_booking(&stale.id).unwrap_err(),
        Error::NotFound { .. }
    ));
    assert_eq!(service.get_booking(&confirmed.id)?.status, BookingStatus::Confirmed);
    Ok(())
}
