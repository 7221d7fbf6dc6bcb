//! Booking aggregate: guest/contact snapshot, embedded payment record and status
use crate::error::{Error, Result, ValidationError};
use crate::types::{EntityId, TimeStamp};
use crate::utils::{self, from_cbor, to_cbor};
use chrono::Utc;
use uuid7::uuid7;

pub const BOOKING_TREE: &str = "bookings";
pub const BOOKING_REF_HRP: &str = "bkid";
pub const INVOICE_HRP: &str = "inv";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Cancelled,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Partial,
    #[n(2)]
    Paid,
    #[n(3)]
    Failed,
    #[n(4)]
    RefundPending,
    #[n(5)]
    Refunded,
    #[n(6)]
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundPending => "refund_pending",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentMode {
    #[n(0)]
    #[default]
    Full,
    #[n(1)]
    Partial,
}

/// Gateway identifiers of the last captured transaction. Opaque to the core.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayRef {
    #[n(0)]
    pub order_id: Option<String>,
    #[n(1)]
    pub payment_id: Option<String>,
    #[n(2)]
    pub signature: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    #[n(0)]
    pub mode: PaymentMode,
    #[n(1)]
    pub total_amount: u64,
    #[n(2)]
    pub partial_amount: Option<u64>,
    #[n(3)]
    pub amount_paid: u64,
    #[n(4)]
    pub remaining_amount: u64,
    #[n(5)]
    pub status: PaymentStatus,
    #[n(6)]
    pub currency: String,
    #[n(7)]
    pub gateway: String,
    #[n(8)]
    pub gateway_ref: GatewayRef,
    #[n(9)]
    pub is_verified: bool,
}

impl Payment {
    pub fn new(mode: PaymentMode, total_amount: u64, partial_amount: Option<u64>) -> Self {
        Self {
            mode,
            total_amount,
            partial_amount,
            amount_paid: 0,
            remaining_amount: total_amount,
            status: PaymentStatus::Pending,
            currency: "INR".into(),
            gateway: "razorpay".into(),
            gateway_ref: GatewayRef::default(),
            is_verified: false,
        }
    }

    /// Add a captured amount and restore `remaining == max(total - paid, 0)`.
    pub fn credit(&mut self, amount: u64) {
        self.amount_paid = self.amount_paid.saturating_add(amount);
        self.recompute_remaining();
    }

    pub fn recompute_remaining(&mut self) {
        self.remaining_amount = self.total_amount.saturating_sub(self.amount_paid);
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Guests {
    #[n(0)]
    pub adults: u32,
    #[n(1)]
    pub children: u32,
}

impl Guests {
    pub fn total(&self) -> u32 {
        self.adults.saturating_add(self.children)
    }
}

/// Contact details captured at booking time, independent of the live profile.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactInfo {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn new(name: &str, email: &str, phone: Option<&str>) -> Self {
        Self {
            name: name.trim().to_owned(),
            email: email.trim().to_lowercase(),
            phone: phone.map(str::trim).filter(|p| !p.is_empty()).map(str::to_owned),
        }
    }
    pub fn sms_recipient(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.is_empty())
    }
    pub fn email_recipient(&self) -> Option<&str> {
        Some(self.email.as_str()).filter(|e| !e.is_empty())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct RefundInfo {
    #[n(0)]
    pub amount: u64,
    #[n(1)]
    pub is_refunded: bool,
    #[n(2)]
    pub refunded_at: Option<TimeStamp<Utc>>,
    #[n(3)]
    pub note: String,
}

/// One-way latches: each flips false -> true at most once per booking.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SmsFlags {
    #[n(0)]
    pub booking_confirmed_sent: bool,
    #[n(1)]
    pub payment_status_sent: bool,
    #[n(2)]
    pub invoice_sent: bool,
    #[n(3)]
    pub payment_completed_sent: bool,
}

/// Sets `flag` and reports whether this call was the one that set it.
pub fn latch(flag: &mut bool) -> bool {
    if *flag {
        return false;
    }
    *flag = true;
    true
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub booking_ref: String,
    #[n(2)]
    pub invoice_id: Option<String>,
    #[n(3)]
    pub tour: EntityId,
    #[n(4)]
    pub tour_name: String,
    #[n(5)]
    pub user: String,
    #[n(6)]
    pub start_date: TimeStamp<Utc>,
    #[n(7)]
    pub end_date: TimeStamp<Utc>,
    #[n(8)]
    pub guests: Guests,
    #[n(9)]
    pub total_persons: u32,
    #[n(10)]
    pub contact: ContactInfo,
    #[n(11)]
    pub payment: Payment,
    #[n(12)]
    pub status: BookingStatus,
    #[n(13)]
    pub cancellation_reason: Option<String>,
    #[n(14)]
    pub cancelled_at: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub refund_info: Option<RefundInfo>,
    #[n(16)]
    pub sms_flags: SmsFlags,
    #[n(17)]
    pub created_at: TimeStamp<Utc>,
    #[n(18)]
    pub updated_at: TimeStamp<Utc>,
}

impl Booking {
    /// Keep `total_persons >= adults + children` whenever a breakdown is known.
    pub fn normalise_guests(&mut self) {
        let sum = self.guests.total();
        if sum > 0 && self.total_persons < sum {
            self.total_persons = sum;
        }
    }

    pub fn set_guests(&mut self, guests: Guests, total_persons: Option<u32>) {
        self.guests = guests;
        if let Some(total) = total_persons {
            self.total_persons = total;
        }
        self.normalise_guests();
    }

    pub fn ensure_invoice_id(&mut self) -> anyhow::Result<&str> {
        if self.invoice_id.is_none() {
            self.invoice_id = Some(utils::new_uuid_to_bech32(INVOICE_HRP)?);
        }
        Ok(self.invoice_id.as_deref().unwrap_or_default())
    }
}

/// Draft used at checkout. Prices come from the tour, never from the client.
#[derive(Debug, Default, Clone)]
pub struct NewBooking {
    tour: Option<EntityId>,
    tour_name: Option<String>,
    price_per_person: Option<u64>,
    user: Option<String>,
    start_date: Option<TimeStamp<Utc>>,
    end_date: Option<TimeStamp<Utc>>,
    guests: Guests,
    total_persons: Option<u32>,
    contact: ContactInfo,
    mode: PaymentMode,
    partial_amount: Option<u64>,
}

impl NewBooking {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_tour(mut self, tour: EntityId, tour_name: &str, price_per_person: u64) -> Self {
        self.tour = Some(tour);
        self.tour_name = Some(tour_name.trim().to_owned());
        self.price_per_person = Some(price_per_person);
        self
    }
    pub fn set_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_owned());
        self
    }
    pub fn set_dates(mut self, start: TimeStamp<Utc>, end: TimeStamp<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }
    pub fn set_guests(mut self, adults: u32, children: u32) -> Self {
        self.guests = Guests { adults, children };
        self
    }
    pub fn set_total_persons(mut self, total: u32) -> Self {
        self.total_persons = Some(total);
        self
    }
    pub fn set_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = contact;
        self
    }
    pub fn full_payment(mut self) -> Self {
        self.mode = PaymentMode::Full;
        self.partial_amount = None;
        self
    }
    pub fn partial_payment(mut self, partial_amount: u64) -> Self {
        self.mode = PaymentMode::Partial;
        self.partial_amount = Some(partial_amount);
        self
    }

    /// Check the draft and produce a `pending` booking with fresh identifiers.
    pub fn validate_and_finalise(self) -> Result<Booking> {
        let tour = self.tour.ok_or(ValidationError::MissingField("tour"))?;
        let tour_name = self
            .tour_name
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingField("tourName"))?;
        let user = self
            .user
            .filter(|u| !u.trim().is_empty())
            .ok_or(ValidationError::MissingField("user"))?;
        let start_date = self.start_date.ok_or(ValidationError::MissingField("startDate"))?;
        let end_date = self.end_date.ok_or(ValidationError::MissingField("endDate"))?;
        if start_date > end_date {
            return Err(ValidationError::InvalidDates.into());
        }

        let price = self
            .price_per_person
            .filter(|p| *p > 0)
            .ok_or(ValidationError::InvalidPrice)?;

        let total_persons = self
            .total_persons
            .filter(|t| *t > 0)
            .unwrap_or_else(|| self.guests.total());
        if total_persons == 0 {
            return Err(ValidationError::InvalidGuestCount.into());
        }

        let total_amount = price
            .checked_mul(u64::from(total_persons.max(self.guests.total())))
            .ok_or(ValidationError::InvalidPrice)?;

        let partial_amount = match self.mode {
            PaymentMode::Full => None,
            PaymentMode::Partial => {
                let amount = self
                    .partial_amount
                    .filter(|a| *a > 0)
                    .ok_or(ValidationError::PartialAmountMissing)?;
                if amount >= total_amount {
                    return Err(ValidationError::PartialAmountTooLarge.into());
                }
                Some(amount)
            }
        };

        let booking_ref = utils::new_uuid_to_bech32(BOOKING_REF_HRP)
            .map_err(|e| Error::Encode(e.to_string()))?;
        let invoice_id = utils::new_uuid_to_bech32(INVOICE_HRP)
            .map_err(|e| Error::Encode(e.to_string()))?;
        let now = TimeStamp::new();

        let mut booking = Booking {
            id: uuid7().to_string(),
            booking_ref,
            invoice_id: Some(invoice_id),
            tour,
            tour_name,
            user,
            start_date,
            end_date,
            guests: self.guests,
            total_persons,
            contact: self.contact,
            payment: Payment::new(self.mode, total_amount, partial_amount),
            status: BookingStatus::Pending,
            cancellation_reason: None,
            cancelled_at: None,
            refund_info: None,
            sms_flags: SmsFlags::default(),
            created_at: now.clone(),
            updated_at: now,
        };
        booking.normalise_guests();

        Ok(booking)
    }
}

/// Bookings keyed by internal id in the `bookings` tree.
#[derive(Clone)]
pub struct BookingStore {
    tree: sled::Tree,
}

impl BookingStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(BOOKING_TREE)?,
        })
    }

    pub fn find(&self, id: &str) -> Result<Option<Booking>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, id: &str) -> Result<Booking> {
        self.find(id)?
            .ok_or_else(|| Error::not_found("booking", id))
    }

    /// Persist `booking`, re-applying the guest-count invariant first.
    pub fn save(&self, booking: &mut Booking) -> Result<()> {
        let bytes = Self::encode(booking)?;
        self.tree.insert(booking.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Row bytes for `booking` after the stored invariants are re-applied.
    pub(crate) fn encode(booking: &mut Booking) -> Result<Vec<u8>> {
        booking.normalise_guests();
        booking.payment.recompute_remaining();
        to_cbor(booking)
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.tree.remove(id.as_bytes())?.is_some())
    }

    /// Remove every booking matching `predicate`; returns how many went.
    ///
    /// A row is only removed if it still holds the bytes the predicate saw. A
    /// booking rewritten in between is kept and left for the next call.
    pub fn delete_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Booking) -> bool,
    {
        let mut deleted = 0;
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let booking: Booking = from_cbor(&bytes)?;
            if !predicate(&booking) {
                continue;
            }
            let swapped = self
                .tree
                .compare_and_swap(&key, Some(&bytes), None as Option<&[u8]>)?;
            if swapped.is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
