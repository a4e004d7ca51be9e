//! Client/server capability flags exchanged during the handshake.
//! Values match the MySQL wire protocol exactly (see
//! `connection/src/declar/capability_flags.rs` in the teacher for the
//! same flag set as raw constants; expressed here as a `bitflags!` type
//! rather than loose `u64` constants).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityFlags: u32 {
        const CLIENT_LONG_PASSWORD = 0x0000_0001;
        const CLIENT_FOUND_ROWS = 0x0000_0002;
        const CLIENT_LONG_FLAG = 0x0000_0004;
        const CLIENT_CONNECT_WITH_DB = 0x0000_0008;
        const CLIENT_NO_SCHEMA = 0x0000_0010;
        const CLIENT_COMPRESS = 0x0000_0020;
        const CLIENT_LOCAL_FILES = 0x0000_0080;
        const CLIENT_PROTOCOL_41 = 0x0000_0200;
        const CLIENT_SSL = 0x0000_0800;
        const CLIENT_TRANSACTIONS = 0x0000_2000;
        const CLIENT_SECURE_CONNECTION = 0x0000_8000;
        const CLIENT_MULTI_STATEMENTS = 0x0001_0000;
        const CLIENT_MULTI_RESULTS = 0x0002_0000;
        const CLIENT_PS_MULTI_RESULTS = 0x0004_0000;
        const CLIENT_PLUGIN_AUTH = 0x0008_0000;
        const CLIENT_CONNECT_ATTRS = 0x0010_0000;
        const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
        const CLIENT_SESSION_TRACK = 0x0080_0000;
        const CLIENT_DEPRECATE_EOF = 0x0100_0000;
    }
}

/// Flags this client advertises in the handshake response. SSL and
/// caching_sha2_password are intentionally not offered: the workspace
/// carries no TLS or RSA dependency (see DESIGN.md), and
/// `mysql_native_password` is sufficient for a replication-only client.
pub fn client_capabilities(with_database: bool) -> CapabilityFlags {
    let mut flags = CapabilityFlags::CLIENT_PROTOCOL_41
        | CapabilityFlags::CLIENT_SECURE_CONNECTION
        | CapabilityFlags::CLIENT_LONG_PASSWORD
        | CapabilityFlags::CLIENT_LONG_FLAG
        | CapabilityFlags::CLIENT_TRANSACTIONS
        | CapabilityFlags::CLIENT_PLUGIN_AUTH
        | CapabilityFlags::CLIENT_MULTI_RESULTS;
    if with_database {
        flags |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_database_sets_connect_with_db() {
        let flags = client_capabilities(true);
        assert!(flags.contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
        assert!(!client_capabilities(false).contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB));
    }

    #[test]
    fn never_advertises_ssl() {
        assert!(!client_capabilities(true).contains(CapabilityFlags::CLIENT_SSL));
    }
}
