use std::collections::BTreeMap;

use crate::model::*;

use super::calendar::window_bounds;
use super::conflict::now_ms;
use super::{Engine, EngineError};

impl Engine {
    pub async fn summarize(&self, window: &DateWindow) -> Result<Summary, EngineError> {
        self.summarize_at(window, now_ms()).await
    }

    /// Money figures cover live bookings created inside `window`. Check-in,
    /// check-out and availability counts describe the present moment `now`
    /// and ignore the window.
    pub async fn summarize_at(&self, window: &DateWindow, now: Ms) -> Result<Summary, EngineError> {
        let (lo, hi) = window_bounds(window)?;
        // Holding every room's read lock keeps a concurrent multi-stay booking
        // out until both its stays and its booking record are readable.
        let rooms = self.read_all_rooms().await;

        let mut total_amount: Money = 0;
        let mut booking_count = 0;
        let mut amount_by_method: BTreeMap<PaymentMethod, Money> =
            PaymentMethod::ALL.iter().map(|m| (*m, 0)).collect();

        for entry in self.bookings.iter() {
            let b = entry.value();
            if b.is_deleted() || b.created_at < lo || b.created_at >= hi {
                continue;
            }
            booking_count += 1;
            total_amount = total_amount.saturating_add(b.amount);
            if let Some(method) = PaymentMethod::classify(&b.payment_method) {
                let bucket = amount_by_method.entry(method).or_default();
                *bucket = bucket.saturating_add(b.amount);
            }
        }

        let mut check_ins = 0;
        let mut check_outs = 0;
        let mut available_rooms = 0;
        for rs in &rooms {
            for stay in rs.stays.iter().filter(|s| !s.voided) {
                if stay.checked_in {
                    check_ins += 1;
                }
                if stay.checked_out {
                    check_outs += 1;
                }
            }
            if !rs.is_occupied_at(now) {
                available_rooms += 1;
            }
        }

        Ok(Summary {
            total_amount,
            booking_count,
            amount_by_method,
            check_ins,
            check_outs,
            available_rooms,
        })
    }
}
