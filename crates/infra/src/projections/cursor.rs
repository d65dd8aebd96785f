use std::collections::HashMap;
use std::sync::RwLock;

use stockledger_core::{AggregateId, TenantId};

use super::ProjectionError;

/// Last applied sequence number per stream.
///
/// Delivery is at-least-once, so a projection skips anything at or below the
/// cursor and refuses to jump over a gap. A stream always starts at 1.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// `Ok(false)` for a duplicate, `Ok(true)` when `seq` is the next event.
    pub fn should_apply(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.last(tenant_id, aggregate_id);
        if seq == 0 || seq > last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(seq > last)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut m) = self.inner.write() {
            m.insert((tenant_id, aggregate_id), seq);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.inner.write() {
            m.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let c = StreamCursors::new();
        let t = TenantId::new();
        let a = AggregateId::new();

        assert!(c.should_apply(t, a, 1).unwrap());
        c.advance(t, a, 1);
        assert!(!c.should_apply(t, a, 1).unwrap());
        assert!(c.should_apply(t, a, 2).unwrap());
        assert!(matches!(
            c.should_apply(t, a, 4),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));
        assert!(c.should_apply(t, a, 0).is_err());
    }

    #[test]
    fn unseen_stream_must_start_at_one() {
        let c = StreamCursors::new();
        assert!(c.should_apply(TenantId::new(), AggregateId::new(), 2).is_err());
    }

    proptest! {
        #[test]
        fn shuffled_redelivery_applies_each_sequence_once(order in Just((1u64..=20).collect::<Vec<_>>()).prop_shuffle()) {
            let c = StreamCursors::new();
            let t = TenantId::new();
            let a = AggregateId::new();
            let mut applied = Vec::new();
            // Redeliver everything until the stream is complete, as a retrying bus would.
            while c.last(t, a) < 20 {
                for &seq in &order {
                    if let Ok(true) = c.should_apply(t, a, seq) {
                        c.advance(t, a, seq);
                        applied.push(seq);
                    }
                }
            }
            prop_assert_eq!(applied, (1u64..=20).collect::<Vec<_>>());
        }
    }
}
