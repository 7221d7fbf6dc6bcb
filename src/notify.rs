//! Notification decisions handed to the delivery collaborator
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => f.write_str("sms"),
            Channel::Email => f.write_str("email"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BookingStatus,
    PaymentUpdate,
    PaymentCompleted,
    Invoice,
    BookingConfirmedFull,
    BookingConfirmedPartial,
    BookingCancelled,
    RefundCompleted,
}

impl NotificationKind {
    /// Template the delivery side renders. Payment completion reuses the
    /// payment update SMS template with a fixed status line.
    pub fn template_key(&self) -> &'static str {
        match self {
            NotificationKind::BookingStatus => "BOOKING_CONFIRM",
            NotificationKind::PaymentUpdate | NotificationKind::PaymentCompleted => "PAYMENT_UPDATE",
            NotificationKind::Invoice => "INVOICE",
            NotificationKind::BookingConfirmedFull => "BOOKING_CONFIRMED_FULL",
            NotificationKind::BookingConfirmedPartial => "BOOKING_CONFIRMED_PARTIAL",
            NotificationKind::BookingCancelled => "BOOKING_CANCELLED",
            NotificationKind::RefundCompleted => "PAYMENT_REFUND_COMPLETED",
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            NotificationKind::BookingStatus
            | NotificationKind::PaymentUpdate
            | NotificationKind::PaymentCompleted
            | NotificationKind::Invoice => Channel::Sms,
            _ => Channel::Email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub kind: NotificationKind,
    pub recipient: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipient: &str) -> Self {
        Self {
            channel: kind.channel(),
            kind,
            recipient: recipient.to_owned(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_owned(), value.to_string());
        self
    }

    pub fn template_key(&self) -> &'static str {
        self.kind.template_key()
    }
}

/// Delivery collaborator for SMS and email.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Logs each notification instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            channel = %notification.channel,
            template = notification.template_key(),
            recipient = %notification.recipient,
            data = ?notification.data,
            "notification"
        );
        Ok(())
    }
}
