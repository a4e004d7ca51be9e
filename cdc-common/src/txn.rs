use uuid::Uuid;

/// Mints a new transaction identifier.
///
/// Assigned once at `BEGIN` (or at the first row event seen outside an
/// explicit transaction) and attached to every event produced until the
/// matching `COMMIT`/`XID`.
pub fn new_txn_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_txn_id(), new_txn_id());
    }
}
