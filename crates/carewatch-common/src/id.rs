use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Configure the snowflake generator for this process.
///
/// `machine_id` and `node_id` are each 0-31; every process writing to the
/// same alerts database should get a distinct pair so concurrently created
/// alerts never collide on id. Calling this is optional: `next_id` falls
/// back to (1, 1) for single-process deployments and tests.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR.lock().unwrap();
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// A fresh alert/observation identifier, decimal-encoded.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR.lock().unwrap();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn burst_of_alert_ids_never_collides() {
        init(1, 1);
        let ids: HashSet<String> = (0..1000).map(|_| next_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| !id.is_empty()));
    }

    #[test]
    fn ids_fit_sqlite_text_keys_and_parse_back() {
        init(1, 1);
        let id = next_id();
        let parsed: i64 = id.parse().unwrap();
        assert!(parsed > 0);
    }
}
