use chrono::{Datelike, Utc};
use diesel::prelude::*;

use crate::error::ApiError;
use crate::shared::schema::ticket_sequence;

/// The sequence lives in a single well-known row.
pub const SEQUENCE_ROW_ID: i32 = 1;

/// Increments the sequence row and formats the ticket number. The UPDATE
/// takes a row-level lock that serializes concurrent allocators for the rest
/// of the enclosing transaction, so two creates can never observe the same
/// value. The sequence is global, not per-year: numbers stay unique across
/// every ticket ever created and reflect creation order.
pub fn allocate(conn: &mut PgConnection) -> Result<String, ApiError> {
    let next: i64 = diesel::update(
        ticket_sequence::table.filter(ticket_sequence::id.eq(SEQUENCE_ROW_ID)),
    )
    .set(ticket_sequence::value.eq(ticket_sequence::value + 1))
    .returning(ticket_sequence::value)
    .get_result(conn)?;

    Ok(format_number(Utc::now().year(), next))
}

pub fn format_number(year: i32, sequence: i64) -> String {
    format!("TCK-{year}-{sequence:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_zero_padded_to_six_digits() {
        assert_eq!(format_number(2026, 1), "TCK-2026-000001");
        assert_eq!(format_number(2026, 42), "TCK-2026-000042");
        assert_eq!(format_number(2027, 999999), "TCK-2027-999999");
    }

    #[test]
    fn numbers_widen_past_a_million_instead_of_truncating() {
        assert_eq!(format_number(2030, 1_000_001), "TCK-2030-1000001");
    }
}
