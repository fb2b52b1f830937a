//! Domain records: `Flight`, `Food`, `ReserveFlight` (§6 RPC methods table).
//!
//! Grounded on `rpc/types.go` (field names/types — this is the revision
//! that actually makes the over-booking check meaningful, since an earlier
//! revision typed `SeatAvailablity` as `uint32`, making `seats - x < 0`
//! always false). CSV parsing mirrors `Flight.Parse`'s fixed column order.

use crate::rpc::value::{Decode, Encode, ValueResult};
use bytes::BytesMut;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Flight {
    pub id: i32,
    pub source: String,
    pub destination: String,
    pub airfare: f32,
    pub seat_availability: i32,
    pub timestamp: u32,
}

impl Encode for Flight {
    fn encode(&self, buf: &mut BytesMut) {
        self.id.encode(buf);
        self.source.encode(buf);
        self.destination.encode(buf);
        self.airfare.encode(buf);
        self.seat_availability.encode(buf);
        self.timestamp.encode(buf);
    }
}

impl Decode for Flight {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        Ok(Flight {
            id: i32::decode(cur)?,
            source: String::decode(cur)?,
            destination: String::decode(cur)?,
            airfare: f32::decode(cur)?,
            seat_availability: i32::decode(cur)?,
            timestamp: u32::decode(cur)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("flight row has {0} columns, expected 6")]
    WrongColumnCount(usize),
    #[error("invalid integer in column: {0}")]
    InvalidInt(#[from] std::num::ParseIntError),
    #[error("invalid float in column: {0}")]
    InvalidFloat(#[from] std::num::ParseFloatError),
}

impl Flight {
    /// Parse one CSV row: id,source,destination,timestamp,airfare,seat_availability.
    pub fn parse_csv_row(row: &str) -> Result<Flight, CsvError> {
        let cols: Vec<&str> = row.split(',').map(str::trim).collect();
        if cols.len() != 6 {
            return Err(CsvError::WrongColumnCount(cols.len()));
        }
        Ok(Flight {
            id: cols[0].parse()?,
            source: cols[1].to_string(),
            destination: cols[2].to_string(),
            timestamp: cols[3].parse()?,
            airfare: cols[4].parse()?,
            seat_availability: cols[5].parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: i64,
    pub name: String,
}

impl Encode for Food {
    fn encode(&self, buf: &mut BytesMut) {
        self.id.encode(buf);
        self.name.encode(buf);
    }
}

impl Decode for Food {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        Ok(Food {
            id: i64::decode(cur)?,
            name: String::decode(cur)?,
        })
    }
}

/// The fixed meal catalogue, matching `rpc.GetFood()`.
pub fn seed_meals() -> Vec<Food> {
    vec![
        Food { id: 0, name: "Steak".to_string() },
        Food { id: 1, name: "Pork Chop".to_string() },
        Food { id: 2, name: "Wine".to_string() },
        Food { id: 3, name: "Coke".to_string() },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReserveFlight {
    pub id: String,
    pub flight: Option<Flight>,
    pub seat_reserved: i32,
    pub check_in: bool,
    pub cancelled: bool,
    pub meals: Vec<Food>,
}

impl Encode for ReserveFlight {
    fn encode(&self, buf: &mut BytesMut) {
        self.id.encode(buf);
        self.flight.encode(buf);
        self.seat_reserved.encode(buf);
        self.check_in.encode(buf);
        self.cancelled.encode(buf);
        self.meals.encode(buf);
    }
}

impl Decode for ReserveFlight {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        Ok(ReserveFlight {
            id: String::decode(cur)?,
            flight: Option::decode(cur)?,
            seat_reserved: i32::decode(cur)?,
            check_in: bool::decode(cur)?,
            cancelled: bool::decode(cur)?,
            meals: Vec::decode(cur)?,
        })
    }
}

/// Seed data for the in-memory flight repository, embedded in lieu of a
/// CSV file on disk (spec §6: "seeded from a CSV on startup").
pub const SEED_CSV: &str = "\
5653,Singapore,Tokyo,1735689600,320.50,42
5654,Singapore,London,1735693200,890.00,17
5655,Tokyo,Singapore,1735696800,320.50,0
5656,London,Singapore,1735700400,890.00,5
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::value::{marshal, unmarshal};

    #[test]
    fn flight_round_trips() {
        let flight = Flight {
            id: 5653,
            source: "Singapore".to_string(),
            destination: "Tokyo".to_string(),
            airfare: 320.5,
            seat_availability: 42,
            timestamp: 1735689600,
        };
        let decoded: Flight = unmarshal(&marshal(&flight)).unwrap();
        assert_eq!(decoded, flight);
    }

    #[test]
    fn reserve_flight_with_meals_round_trips() {
        let reservation = ReserveFlight {
            id: "abc123".to_string(),
            flight: None,
            seat_reserved: 2,
            check_in: false,
            cancelled: false,
            meals: seed_meals(),
        };
        let decoded: ReserveFlight = unmarshal(&marshal(&reservation)).unwrap();
        assert_eq!(decoded, reservation);
    }

    #[test]
    fn csv_row_parses_in_fixed_column_order() {
        let flight = Flight::parse_csv_row("5653,Singapore,Tokyo,1735689600,320.50,42").unwrap();
        assert_eq!(flight.id, 5653);
        assert_eq!(flight.source, "Singapore");
        assert_eq!(flight.seat_availability, 42);
    }

    #[test]
    fn seed_csv_parses_cleanly() {
        let flights: Vec<Flight> = SEED_CSV
            .lines()
            .filter(|l| !l.is_empty())
            .map(Flight::parse_csv_row)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(flights.len(), 4);
        assert!(flights.iter().any(|f| f.id == 5653));
    }
}
