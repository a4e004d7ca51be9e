//! Binlog event type codes. Grounded on `binlog/src/b_type.rs`'s
//! `LogEventType`, trimmed to the types this decoder actually demuxes
//! (§4.2).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    QueryEvent,
    RotateEvent,
    FormatDescriptionEvent,
    XidEvent,
    TableMapEvent,
    WriteRowsEventV1,
    UpdateRowsEventV1,
    DeleteRowsEventV1,
    WriteRowsEventV2,
    UpdateRowsEventV2,
    DeleteRowsEventV2,
    /// MariaDB: zlib-compressed row event payload, algorithm byte in the
    /// first post-header byte of the compressed body (only algorithm 0
    /// is handled, per §4.2/S6).
    MariaWriteRowsCompressed,
    MariaUpdateRowsCompressed,
    MariaDeleteRowsCompressed,
    Other(u8),
}

impl EventType {
    pub fn from_code(code: u8) -> EventType {
        match code {
            2 => EventType::QueryEvent,
            4 => EventType::RotateEvent,
            15 => EventType::FormatDescriptionEvent,
            16 => EventType::XidEvent,
            19 => EventType::TableMapEvent,
            23 => EventType::WriteRowsEventV1,
            24 => EventType::UpdateRowsEventV1,
            25 => EventType::DeleteRowsEventV1,
            30 => EventType::WriteRowsEventV2,
            31 => EventType::UpdateRowsEventV2,
            32 => EventType::DeleteRowsEventV2,
            // MariaDB-specific range, starting at 160.
            160 => EventType::MariaWriteRowsCompressed,
            161 => EventType::MariaUpdateRowsCompressed,
            162 => EventType::MariaDeleteRowsCompressed,
            other => EventType::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(EventType::from_code(19), EventType::TableMapEvent);
        assert_eq!(EventType::from_code(30), EventType::WriteRowsEventV2);
        assert_eq!(EventType::from_code(160), EventType::MariaWriteRowsCompressed);
    }

    #[test]
    fn unknown_code_is_preserved() {
        assert_eq!(EventType::from_code(200), EventType::Other(200));
    }
}
