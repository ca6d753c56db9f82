use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, BOOKING_CONFLICTS_TOTAL};

use super::calendar;
use super::conflict::{check_available, now_ms, validate_nights, validate_rate};
use super::{Engine, EngineError, RoomLocks};

/// `rate * nights`, rejecting overflow.
pub(crate) fn stay_amount(rate: Money, nights: u32) -> Result<Money, EngineError> {
    rate.checked_mul(nights as Money)
        .ok_or(EngineError::LimitExceeded("stay amount too large"))
}

fn validate_booking_request(req: &BookingRequest) -> Result<(), EngineError> {
    if req.stays.is_empty() {
        return Err(EngineError::InvalidRequest("booking has no stays"));
    }
    if req.stays.len() > MAX_STAYS_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many stays in one booking"));
    }
    if req.payment_method.len() > MAX_PAYMENT_METHOD_LEN {
        return Err(EngineError::LimitExceeded("payment method too long"));
    }
    for stay in &req.stays {
        validate_nights(stay.nights)?;
        if let Some(amount) = stay.amount {
            validate_rate(amount)?;
        }
    }
    Ok(())
}

impl Engine {
    pub async fn create_booking(&self, req: BookingRequest) -> Result<BookingView, EngineError> {
        self.create_booking_at(req, now_ms()).await
    }

    /// Create a booking as of `now` (creation timestamp and default arrival).
    ///
    /// All-or-nothing: every stay is resolved and conflict-checked while the
    /// write locks of all involved rooms are held, and the booking with all of
    /// its stays is committed as a single event. Any failure leaves no trace.
    pub async fn create_booking_at(
        &self,
        req: BookingRequest,
        now: Ms,
    ) -> Result<BookingView, EngineError> {
        validate_booking_request(&req)?;
        let mut locks = RoomLocks::acquire(self, req.stays.iter().map(|s| s.room_id)).await?;

        let booking_id = Ulid::new();
        // Nights claimed by earlier stays of this same request, per room.
        let mut claimed: HashMap<Ulid, BTreeSet<NaiveDate>> = HashMap::new();
        let mut stays = Vec::with_capacity(req.stays.len());
        let mut total: Money = 0;

        for request in &req.stays {
            let rs = locks
                .get(&request.room_id)
                .ok_or(EngineError::NotFound(request.room_id))?;
            if rs.stays.len() >= MAX_STAYS_PER_ROOM {
                return Err(EngineError::LimitExceeded("too many stays on room"));
            }

            let arrival = calendar::resolve_arrival(request.arrival, now)?;
            let pending = claimed.entry(request.room_id).or_default();
            let nights = match check_available(rs, arrival, request.nights, None, Some(&*pending)) {
                Ok(nights) => nights,
                Err(e) => {
                    if matches!(e, EngineError::Conflict { .. }) {
                        metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
                        debug!(room = %request.room_id, "booking rejected: {e}");
                    }
                    return Err(e);
                }
            };
            pending.extend(nights);

            let rate = request.amount.unwrap_or(rs.room.rate);
            let amount = stay_amount(rate, request.nights)?;
            total = total
                .checked_add(amount)
                .ok_or(EngineError::LimitExceeded("booking total too large"))?;

            stays.push(Stay {
                id: Ulid::new(),
                booking_id,
                room_id: request.room_id,
                arrival,
                span: calendar::stay_span(arrival, request.nights),
                nights: request.nights,
                rate,
                amount,
                checked_in: false,
                checked_out: false,
                voided: false,
            });
        }

        let booking = Booking {
            id: booking_id,
            customer_id: req.customer_id,
            receptionist: req.receptionist,
            payment_method: req.payment_method,
            paid: req.paid,
            complementary: req.complementary,
            amount: total,
            created_at: now,
            deleted_at: None,
            stay_ids: stays.iter().map(|s| s.id).collect(),
        };

        let event = Event::BookingCreated {
            booking: booking.clone(),
            stays: stays.clone(),
        };
        self.persist_and_apply(&mut locks, event).await?;

        metrics::counter!(BOOKINGS_TOTAL).increment(1);
        info!(booking = %booking.id, stays = stays.len(), amount = total, "booking created");
        Ok(BookingView { booking, stays })
    }
}
