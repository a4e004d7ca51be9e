use std::fmt;

/// An opaque, source-specific, monotonically non-decreasing stream
/// position. Positions from different sources are never compared; the
/// enum only exists so the checkpoint manager and canonical event can
/// carry either shape without the rest of the pipeline caring which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Mysql { file_name: String, offset: u64 },
    Postgres { lsn: u64 },
}

impl Position {
    /// Renders a Postgres LSN (or the whole position, for MySQL) the way
    /// it appears in logs, checkpoint files and the canonical event's
    /// `source_file_or_lsn` field.
    pub fn render(&self) -> String {
        match self {
            Position::Mysql { file_name, offset } => format!("{file_name}:{offset}"),
            Position::Postgres { lsn } => format_lsn(*lsn),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Formats a 64-bit LSN as `HI/LO` hex, matching Postgres's own rendering
/// (e.g. `0/16B2028`).
pub fn format_lsn(lsn: u64) -> String {
    let hi = (lsn >> 32) as u32;
    let lo = lsn as u32;
    format!("{hi:X}/{lo:X}")
}

/// Parses a `HI/LO` hex LSN as printed by Postgres (`pg_lsn` literal form).
pub fn parse_lsn(s: &str) -> Option<u64> {
    let (hi, lo) = s.split_once('/')?;
    let hi = u32::from_str_radix(hi, 16).ok()?;
    let lo = u32::from_str_radix(lo, 16).ok()?;
    Some(((hi as u64) << 32) | lo as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_roundtrip() {
        let lsn = 0x0000_0002_0000_1000u64;
        let rendered = format_lsn(lsn);
        assert_eq!(parse_lsn(&rendered), Some(lsn));
    }

    #[test]
    fn lsn_format_matches_postgres_style() {
        assert_eq!(format_lsn(0x1000), "0/1000");
        assert_eq!(parse_lsn("0/1000"), Some(0x1000));
    }

    #[test]
    fn mysql_position_renders_file_and_offset() {
        let pos = Position::Mysql { file_name: "mysql-bin.000005".into(), offset: 1234 };
        assert_eq!(pos.render(), "mysql-bin.000005:1234");
    }
}
