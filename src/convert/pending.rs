use crate::convert::ops::ColumnOp;
use crate::convert::where_clause::ClusteringWhere;
use crate::error::ConvertError;
use crate::sstable::row::Ttl;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpKind {
    #[default]
    None,
    Insert,
    Update,
    Delete,
}

/// Guarded transitions of the pending statement. Each one forces the current
/// statement to be flushed before the new value is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    KindChange,
    TimestampChange,
    TtlChange,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::KindChange => "kind_change",
            FlushTrigger::TimestampChange => "timestamp_change",
            FlushTrigger::TtlChange => "ttl_change",
        }
    }
}

/// The single in-flight statement of a partition. Operations are keyed by
/// column ordinal so they render in schema order.
#[derive(Debug, Default)]
pub struct PendingStatement {
    kind: OpKind,
    timestamp: Option<i64>,
    ttl: Option<Ttl>,
    ttl_forbidden: bool,
    clustering: Option<ClusteringWhere>,
    ops: BTreeMap<usize, Vec<ColumnOp>>,
}

impl PendingStatement {
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn ttl(&self) -> Option<Ttl> {
        self.ttl
    }

    pub fn ttl_forbidden(&self) -> bool {
        self.ttl_forbidden
    }

    pub fn clustering(&self) -> Option<&ClusteringWhere> {
        self.clustering.as_ref()
    }

    pub fn ops(&self) -> impl Iterator<Item = (usize, &[ColumnOp])> {
        self.ops.iter().map(|(ordinal, ops)| (*ordinal, ops.as_slice()))
    }

    pub fn has_ops(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn kind_trigger(&self, next: OpKind) -> Option<FlushTrigger> {
        (self.kind != next).then_some(FlushTrigger::KindChange)
    }

    pub fn timestamp_trigger(&self, next: Option<i64>) -> Option<FlushTrigger> {
        match self.timestamp {
            Some(current) if Some(current) != next => Some(FlushTrigger::TimestampChange),
            _ => None,
        }
    }

    pub fn ttl_trigger(&self, next: Option<Ttl>) -> Option<FlushTrigger> {
        match self.ttl {
            Some(current) if Some(current) != next => Some(FlushTrigger::TtlChange),
            _ => None,
        }
    }

    pub(crate) fn set_kind(&mut self, kind: OpKind) {
        self.kind = kind;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Option<i64>) {
        self.timestamp = timestamp;
    }

    pub(crate) fn set_ttl(&mut self, ttl: Option<Ttl>) {
        self.ttl = ttl;
    }

    pub(crate) fn forbid_ttl(&mut self) {
        self.ttl_forbidden = true;
    }

    pub(crate) fn set_clustering(
        &mut self,
        clustering: ClusteringWhere,
    ) -> Result<(), ConvertError> {
        if self.clustering.is_some() {
            return Err(ConvertError::invariant(
                "clustering restriction set twice on one statement",
            ));
        }
        self.clustering = Some(clustering);
        Ok(())
    }

    pub(crate) fn push(&mut self, ordinal: usize, op: ColumnOp) {
        self.ops.entry(ordinal).or_default().push(op);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{FlushTrigger, OpKind, PendingStatement};
    use crate::convert::ops::ColumnOp;
    use crate::schema::types::Value;
    use crate::sstable::row::Ttl;

    #[test]
    fn unset_fields_never_trigger_a_flush() {
        let pending = PendingStatement::default();
        assert_eq!(pending.timestamp_trigger(Some(5)), None);
        assert_eq!(pending.ttl_trigger(Some(Ttl::Seconds(10))), None);
        assert_eq!(pending.kind_trigger(OpKind::None), None);
        assert_eq!(
            pending.kind_trigger(OpKind::Update),
            Some(FlushTrigger::KindChange)
        );
    }

    #[test]
    fn differing_values_trigger_named_flushes() {
        let mut pending = PendingStatement::default();
        pending.set_timestamp(Some(5));
        pending.set_ttl(Some(Ttl::Seconds(10)));
        assert_eq!(pending.timestamp_trigger(Some(5)), None);
        assert_eq!(
            pending.timestamp_trigger(Some(6)),
            Some(FlushTrigger::TimestampChange)
        );
        assert_eq!(
            pending.timestamp_trigger(None),
            Some(FlushTrigger::TimestampChange)
        );
        assert_eq!(
            pending.ttl_trigger(Some(Ttl::Expired)),
            Some(FlushTrigger::TtlChange)
        );
        assert_eq!(FlushTrigger::TtlChange.as_str(), "ttl_change");
    }

    #[test]
    fn ops_iterate_in_ordinal_order_and_clear_resets() {
        let mut pending = PendingStatement::default();
        pending.set_kind(OpKind::Update);
        pending.push(4, ColumnOp::SetScalar(Value::Int(1)));
        pending.push(2, ColumnOp::SetAdd(Value::Int(2)));
        pending.push(4, ColumnOp::SetScalar(Value::Int(3)));
        let order: Vec<(usize, usize)> = pending.ops().map(|(o, ops)| (o, ops.len())).collect();
        assert_eq!(order, vec![(2, 1), (4, 2)]);

        pending.forbid_ttl();
        pending.clear();
        assert_eq!(pending.kind(), OpKind::None);
        assert!(!pending.has_ops());
        assert!(!pending.ttl_forbidden());
    }
}
