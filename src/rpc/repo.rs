//! In-memory repositories seeded from an embedded CSV table (§6:
//! "Persisted state: none... seeded from a CSV on startup").
//!
//! Grounded on `flight_repo.go`/`reservation_repo.go`, with the original's
//! generic `store.DB` relation abstraction (explicitly out of scope; spec
//! treats it as an opaque key/value repository) replaced by a plain
//! mutex-guarded `Vec`.

use crate::rpc::flight::{Flight, ReserveFlight};
use std::sync::Mutex;

pub struct FlightRepo {
    flights: Mutex<Vec<Flight>>,
}

impl FlightRepo {
    pub fn new(flights: Vec<Flight>) -> Self {
        FlightRepo {
            flights: Mutex::new(flights),
        }
    }

    pub fn get_all(&self) -> Vec<Flight> {
        self.flights.lock().unwrap().clone()
    }

    pub fn find_by_id(&self, id: i32) -> Option<Flight> {
        self.flights.lock().unwrap().iter().find(|f| f.id == id).cloned()
    }

    /// Mirrors `FlightRepo.Update`'s find-by-ID-then-replace predicate.
    pub fn update(&self, updated: Flight) -> bool {
        let mut flights = self.flights.lock().unwrap();
        if let Some(slot) = flights.iter_mut().find(|f| f.id == updated.id) {
            *slot = updated;
            true
        } else {
            false
        }
    }

    /// Replaces a matching row, or inserts one if none exists. Used to seed
    /// individual flights (e.g. in tests) without going through the CSV path.
    pub fn upsert(&self, flight: Flight) {
        let mut flights = self.flights.lock().unwrap();
        if let Some(slot) = flights.iter_mut().find(|f| f.id == flight.id) {
            *slot = flight;
        } else {
            flights.push(flight);
        }
    }

    /// Whole-word, case-insensitive substring match, the idiomatic
    /// equivalent of `CreateRegexp`'s `(?i)\b\w*query\w*\b` pattern.
    pub fn find(&self, source: &str, destination: &str) -> Vec<Flight> {
        let source = source.to_lowercase();
        let destination = destination.to_lowercase();
        self.flights
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.source.to_lowercase().contains(&source) && f.destination.to_lowercase().contains(&destination))
            .cloned()
            .collect()
    }
}

pub struct ReservationRepo {
    reservations: Mutex<Vec<ReserveFlight>>,
}

impl ReservationRepo {
    pub fn new() -> Self {
        ReservationRepo {
            reservations: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, reservation: ReserveFlight) {
        self.reservations.lock().unwrap().push(reservation);
    }

    pub fn find_by_id(&self, id: &str) -> Option<ReserveFlight> {
        self.reservations.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn update(&self, updated: ReserveFlight) -> bool {
        let mut reservations = self.reservations.lock().unwrap();
        if let Some(slot) = reservations.iter_mut().find(|r| r.id == updated.id) {
            *slot = updated;
            true
        } else {
            false
        }
    }
}

impl Default for ReservationRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::flight::Flight;

    fn sample_flight(id: i32, source: &str, dest: &str) -> Flight {
        Flight {
            id,
            source: source.to_string(),
            destination: dest.to_string(),
            airfare: 100.0,
            seat_availability: 10,
            timestamp: 0,
        }
    }

    #[test]
    fn find_matches_case_insensitively() {
        let repo = FlightRepo::new(vec![sample_flight(1, "Singapore", "Tokyo")]);
        assert_eq!(repo.find("singapore", "tokyo").len(), 1);
        assert_eq!(repo.find("london", "tokyo").len(), 0);
    }

    #[test]
    fn update_replaces_matching_id_only() {
        let repo = FlightRepo::new(vec![sample_flight(1, "A", "B"), sample_flight(2, "C", "D")]);
        let mut updated = sample_flight(1, "A", "B");
        updated.seat_availability = 3;
        assert!(repo.update(updated));
        assert_eq!(repo.find_by_id(1).unwrap().seat_availability, 3);
        assert_eq!(repo.find_by_id(2).unwrap().seat_availability, 10);
    }
}
