//! The eight RPC handler bodies (§6, §9). Each takes the shared
//! [`crate::rpc::dispatcher::RpcContext`] and the request's query map, and
//! returns the domain value to encode into the response envelope (or an
//! [`RpcError`] to encode into `envelope.Error`).
//!
//! Grounded on `flight_handlers.go`'s `FindFlights`/`FindFlight`/
//! `ReserveFlight`/`MonitorUpdates` (the latter's streaming loop lives in
//! the dispatcher, not here). `CheckInFlight`/`CancelFlight`/`GetMeals`/
//! `AddMeals` are routed to in `router.go` but never defined anywhere in
//! the retrieved source — built fresh from the §6 RPC table and the
//! `ReserveFlight` record shape in `types.go`.

use crate::frame::Sid;
use crate::rpc::dispatcher::RpcContext;
use crate::rpc::flight::{seed_meals, Flight, ReserveFlight};
use crate::rpc::RpcError;
use std::collections::HashMap;

fn required<'a>(query: &'a HashMap<String, String>, key: &str) -> Result<&'a str, RpcError> {
    query
        .get(key)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(RpcError::InvalidParams)
}

pub fn find_flights(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<Vec<Flight>, RpcError> {
    let source = required(query, "source")?;
    let destination = required(query, "destination")?;
    Ok(ctx.flights.find(source, destination))
}

pub fn find_flight(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<Flight, RpcError> {
    let id: i32 = required(query, "id")?.parse().map_err(|_| RpcError::InvalidParams)?;
    ctx.flights.find_by_id(id).ok_or(RpcError::NoFlightFound)
}

/// Holds the reservation lock across the whole read-check-decrement-write
/// sequence — the original takes and immediately releases the mutex before
/// this compound update (Open Question #3's likely bug).
pub fn reserve_flight(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<ReserveFlight, RpcError> {
    let flight_id: i32 = required(query, "id")?.parse().map_err(|_| RpcError::InvalidParams)?;
    let seats: i32 = required(query, "seats")?.parse().map_err(|_| RpcError::InvalidParams)?;
    if seats <= 0 {
        return Err(RpcError::InvalidParams);
    }

    let _guard = ctx.reserve_lock.lock().unwrap();

    let flight = ctx.flights.find_by_id(flight_id).ok_or(RpcError::NoFlightFound)?;
    if flight.seat_availability - seats < 0 {
        return Err(RpcError::FailToReserve);
    }

    let mut updated_flight = flight;
    updated_flight.seat_availability -= seats;
    if !ctx.flights.update(updated_flight.clone()) {
        return Err(RpcError::InternalError);
    }

    let reservation = ReserveFlight {
        id: Sid::new().to_string(),
        flight: Some(updated_flight.clone()),
        seat_reserved: seats,
        check_in: false,
        cancelled: false,
        meals: Vec::new(),
    };
    ctx.reservations.insert(reservation.clone());
    ctx.publish_update(updated_flight);
    Ok(reservation)
}

pub fn check_in_flight(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<ReserveFlight, RpcError> {
    let id = required(query, "id")?;
    let mut reservation = ctx.reservations.find_by_id(id).ok_or(RpcError::NotFound)?;
    if !reservation.check_in {
        reservation.check_in = true;
        ctx.reservations.update(reservation.clone());
    }
    Ok(reservation)
}

/// Idempotent: a second cancel returns the already-cancelled state without
/// crediting seats back twice.
pub fn cancel_flight(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<ReserveFlight, RpcError> {
    let id = required(query, "id")?;

    let _guard = ctx.reserve_lock.lock().unwrap();

    let mut reservation = ctx.reservations.find_by_id(id).ok_or(RpcError::NotFound)?;
    if reservation.cancelled {
        return Ok(reservation);
    }

    reservation.cancelled = true;
    if let Some(reserved_flight) = reservation.flight.clone() {
        if let Some(mut current) = ctx.flights.find_by_id(reserved_flight.id) {
            current.seat_availability += reservation.seat_reserved;
            ctx.flights.update(current.clone());
            reservation.flight = Some(current.clone());
            ctx.publish_update(current);
        }
    }
    ctx.reservations.update(reservation.clone());
    Ok(reservation)
}

pub fn get_meals(_ctx: &RpcContext, _query: &HashMap<String, String>) -> Result<Vec<crate::rpc::flight::Food>, RpcError> {
    Ok(seed_meals())
}

/// Not idempotent: repeated calls append the meal again each time.
pub fn add_meals(ctx: &RpcContext, query: &HashMap<String, String>) -> Result<ReserveFlight, RpcError> {
    let id = required(query, "id")?;
    let meal_id: i64 = required(query, "meal_id")?.parse().map_err(|_| RpcError::InvalidParams)?;

    let meal = seed_meals()
        .into_iter()
        .find(|f| f.id == meal_id)
        .ok_or(RpcError::MealsNotFound)?;

    let mut reservation = ctx.reservations.find_by_id(id).ok_or(RpcError::NotFound)?;
    reservation.meals.push(meal);
    ctx.reservations.update(reservation.clone());
    Ok(reservation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::dispatcher::RpcContext;

    fn ctx_with_flight() -> RpcContext {
        let ctx = RpcContext::new_empty();
        ctx.flights.upsert(Flight {
            id: 5653,
            source: "Singapore".to_string(),
            destination: "Tokyo".to_string(),
            airfare: 320.5,
            seat_availability: 5,
            timestamp: 0,
        });
        ctx
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reserve_then_cancel_restores_seats() {
        let ctx = ctx_with_flight();
        let reservation = reserve_flight(&ctx, &query(&[("id", "5653"), ("seats", "2")])).unwrap();
        assert_eq!(ctx.flights.find_by_id(5653).unwrap().seat_availability, 3);

        let cancelled = cancel_flight(&ctx, &query(&[("id", &reservation.id)])).unwrap();
        assert!(cancelled.cancelled);
        assert_eq!(ctx.flights.find_by_id(5653).unwrap().seat_availability, 5);

        // second cancel is a no-op, doesn't credit seats twice
        let cancelled_again = cancel_flight(&ctx, &query(&[("id", &reservation.id)])).unwrap();
        assert!(cancelled_again.cancelled);
        assert_eq!(ctx.flights.find_by_id(5653).unwrap().seat_availability, 5);
    }

    #[test]
    fn reserve_more_seats_than_available_fails() {
        let ctx = ctx_with_flight();
        let err = reserve_flight(&ctx, &query(&[("id", "5653"), ("seats", "99")])).unwrap_err();
        assert_eq!(err, RpcError::FailToReserve);
        assert_eq!(ctx.flights.find_by_id(5653).unwrap().seat_availability, 5);
    }

    #[test]
    fn add_meals_is_not_idempotent() {
        let ctx = ctx_with_flight();
        let reservation = reserve_flight(&ctx, &query(&[("id", "5653"), ("seats", "1")])).unwrap();
        let once = add_meals(&ctx, &query(&[("id", &reservation.id), ("meal_id", "0")])).unwrap();
        assert_eq!(once.meals.len(), 1);
        let twice = add_meals(&ctx, &query(&[("id", &reservation.id), ("meal_id", "0")])).unwrap();
        assert_eq!(twice.meals.len(), 2);
    }
}
