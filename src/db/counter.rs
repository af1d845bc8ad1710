//! Redis counter store.
//!
//! One hash per work (`{prefix}{id}`) with `expected` and `processed`
//! fields. Increment-and-compare runs as a Lua script, so the comparison
//! sees exactly the value its own increment produced.

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::error::Result;
use crate::model::{CounterFigures, CounterTick, WorkId};
use crate::store::CounterStore;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

const INCREMENT_AND_COMPARE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
local processed = redis.call('HINCRBY', KEYS[1], 'processed', 1)
local expected = tonumber(redis.call('HGET', KEYS[1], 'expected') or '0')
if processed == expected then
    return {1, processed}
end
return {0, processed}
"#;

const ADD_EXPECTED: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call('HINCRBY', KEYS[1], 'expected', ARGV[1])
"#;

/// Counter store backed by Redis hashes.
#[derive(Clone)]
pub struct RedisCounters {
    conn: MultiplexedConnection,
    prefix: String,
    increment_and_compare: Script,
    add_expected: Script,
}

impl RedisCounters {
    /// Connect to Redis. Keys are namespaced with `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
            increment_and_compare: Script::new(INCREMENT_AND_COMPARE),
            add_expected: Script::new(ADD_EXPECTED),
        })
    }

    /// PING the server.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn key(&self, id: &WorkId) -> String {
        format!("{}{}", self.prefix, id)
    }
}

fn record(operation: &'static str) {
    metrics::counter_operations().add(1, &[KeyValue::new("operation", operation)]);
}

#[async_trait]
impl CounterStore for RedisCounters {
    async fn create(&self, id: &WorkId, expected: i64, processed: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("HSET")
            .arg(self.key(id))
            .arg("expected")
            .arg(expected)
            .arg("processed")
            .arg(processed)
            .query_async(&mut conn)
            .await?;
        record("create");
        Ok(())
    }

    async fn increment_and_compare(&self, id: &WorkId) -> Result<Option<CounterTick>> {
        let mut conn = self.conn.clone();
        let reply: Option<(i64, i64)> = self
            .increment_and_compare
            .key(self.key(id))
            .invoke_async(&mut conn)
            .await?;
        record("increment_and_compare");

        let tick = reply.map(|(complete, total)| CounterTick {
            is_complete: complete == 1,
            total,
        });
        debug!(work_id = %id, ?tick, "processed counter incremented");
        Ok(tick)
    }

    async fn get(&self, id: &WorkId) -> Result<Option<CounterFigures>> {
        let mut conn = self.conn.clone();
        let (expected, processed): (Option<i64>, Option<i64>) = redis::cmd("HMGET")
            .arg(self.key(id))
            .arg("expected")
            .arg("processed")
            .query_async(&mut conn)
            .await?;
        record("get");

        Ok(match (expected, processed) {
            (None, None) => None,
            (expected, processed) => Some(CounterFigures {
                expected: expected.unwrap_or(0),
                processed: processed.unwrap_or(0),
            }),
        })
    }

    async fn add_expected(&self, id: &WorkId, n: u32) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let expected: Option<i64> = self
            .add_expected
            .key(self.key(id))
            .arg(n)
            .invoke_async(&mut conn)
            .await?;
        record("add_expected");
        Ok(expected)
    }

    async fn delete(&self, ids: &[WorkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        record("delete");
        Ok(())
    }
}
