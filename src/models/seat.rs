use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub event_id: i64,
    pub section: String,
    pub row: i32,
    pub number: i32,
    pub is_active: bool,
}

impl Seat {
    /// Код места в формате "C4-12" (секция+ряд, номер).
    pub fn code(&self) -> String {
        format!("{}{}-{}", self.section, self.row, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_code_format() {
        let seat = Seat {
            id: 12,
            event_id: 100,
            section: "C".to_string(),
            row: 4,
            number: 12,
            is_active: true,
        };
        assert_eq!(seat.code(), "C4-12");
    }
}
