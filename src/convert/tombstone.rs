use crate::error::ConvertError;
use crate::sstable::clustering::{Clustering, ClusteringBound, ClusteringComparator};
use crate::sstable::row::{DeletionTime, RangeTombstoneMarker};
use std::cmp::Ordering;
use tracing::warn;

/// A coalesced range deletion ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRange {
    pub start: ClusteringBound,
    pub end: ClusteringBound,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    ChainOpen,
}

/// Result of offering a deleted row to an open chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLink {
    /// A range the link completed, to be deleted before the row.
    pub emitted: Option<DeleteRange>,
    /// The row's own deletion is newer than the chain and must still be written.
    pub needs_own_delete: bool,
}

/// Coalesces consecutive range tombstone markers into delete ranges.
///
/// The latest close bound is held rather than emitted, so that an open
/// touching it with the same deletion time extends the range instead of
/// starting a new one.
#[derive(Debug, Default)]
pub struct TombstoneChain {
    first: Option<(ClusteringBound, DeletionTime)>,
    high_water: Option<ClusteringBound>,
    closed: bool,
}

impl TombstoneChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChainState {
        if self.first.is_some() {
            ChainState::ChainOpen
        } else {
            ChainState::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == ChainState::Idle
    }

    /// True when the chain's latest event was a close waiting for a touching open.
    pub fn holds_close(&self) -> bool {
        self.first.is_some() && self.closed
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.high_water = None;
        self.closed = false;
    }

    /// Boundaries are applied as close-then-open.
    pub fn feed(
        &mut self,
        marker: RangeTombstoneMarker,
        cmp: &ClusteringComparator<'_>,
    ) -> Result<Option<DeleteRange>, ConvertError> {
        match marker {
            RangeTombstoneMarker::Bound { bound, deletion } if bound.is_start() => {
                self.open(bound, deletion, cmp)
            }
            RangeTombstoneMarker::Bound { bound, .. } => {
                self.close(bound, cmp)?;
                Ok(None)
            }
            RangeTombstoneMarker::Boundary {
                close,
                open,
                open_deletion,
                ..
            } => {
                if close.is_start() || !open.is_start() {
                    return Err(ConvertError::unexpected_tombstone(format!(
                        "boundary with close {close} and open {open}"
                    )));
                }
                self.close(close, cmp)?;
                self.open(open, open_deletion, cmp)
            }
        }
    }

    /// Links a deleted row into the chain. Returns `None` when the row does not
    /// belong to the chain and must be handled on its own.
    pub fn link_row_delete(
        &mut self,
        clustering: &Clustering,
        deletion: DeletionTime,
        cmp: &ClusteringComparator<'_>,
    ) -> Result<Option<RowLink>, ConvertError> {
        let Some((first, chain_deletion)) = self.first.clone() else {
            return Ok(None);
        };
        let start = ClusteringBound::inclusive_start_of(clustering);
        let end = ClusteringBound::inclusive_end_of(clustering);

        if self.closed {
            let emitted = self.open(start, deletion, cmp)?;
            self.close(end, cmp)?;
            return Ok(Some(RowLink {
                emitted,
                needs_own_delete: false,
            }));
        }

        if cmp.compare(&first, &start)? != Ordering::Less {
            return Ok(None);
        }
        // Synthetic boundary at the row: raises the high-water close without
        // ending the range.
        let reopen = ClusteringBound::exclusive_start_of(clustering);
        self.close(end, cmp)?;
        self.open(reopen, chain_deletion, cmp)?;
        Ok(Some(RowLink {
            emitted: None,
            needs_own_delete: deletion.marked_for_delete_at > chain_deletion.marked_for_delete_at,
        }))
    }

    /// Emits the held range, if the chain is waiting on a close.
    pub fn flush_closed(&mut self) -> Option<DeleteRange> {
        if self.closed { self.take_range() } else { None }
    }

    /// Partition end: the chain must not be left open.
    pub fn finish_partition(&mut self) -> Result<Option<DeleteRange>, ConvertError> {
        let Some((start, _)) = &self.first else {
            return Ok(None);
        };
        if self.closed {
            return Ok(self.take_range());
        }
        let message = format!("range opened at {start} was never closed");
        self.reset();
        Err(ConvertError::unexpected_tombstone(message))
    }

    fn open(
        &mut self,
        start: ClusteringBound,
        deletion: DeletionTime,
        cmp: &ClusteringComparator<'_>,
    ) -> Result<Option<DeleteRange>, ConvertError> {
        let Some((first, chain_deletion)) = &self.first else {
            self.start_chain(start, deletion);
            return Ok(None);
        };
        // A chain reopened past a deleted row still compares against the
        // row's close; one that never saw a close cannot take another open.
        if !self.closed && self.high_water.is_none() {
            return Err(ConvertError::unexpected_tombstone(format!(
                "open bound {start} while the range opened at {first} is still open"
            )));
        }
        let touching = match &self.high_water {
            Some(high) => cmp.compare(&start, high)? == Ordering::Equal,
            None => false,
        };
        if touching && deletion.marked_for_delete_at == chain_deletion.marked_for_delete_at {
            self.closed = false;
            return Ok(None);
        }
        let emitted = self.take_range();
        self.start_chain(start, deletion);
        Ok(emitted)
    }

    fn close(
        &mut self,
        end: ClusteringBound,
        cmp: &ClusteringComparator<'_>,
    ) -> Result<(), ConvertError> {
        if self.first.is_none() {
            return Err(ConvertError::unexpected_tombstone(format!(
                "close bound {end} with no open range"
            )));
        }
        if self.closed
            && let Some(high) = &self.high_water
        {
            return Err(ConvertError::unexpected_tombstone(format!(
                "close bound {end} after the range was already closed at {high}"
            )));
        }
        if let Some(high) = &self.high_water
            && cmp.compare(&end, high)? == Ordering::Less
        {
            warn!(
                close = %end,
                high_water = %high,
                "ignoring range tombstone close behind the chain"
            );
            self.closed = true;
            return Ok(());
        }
        self.high_water = Some(end);
        self.closed = true;
        Ok(())
    }

    fn start_chain(&mut self, start: ClusteringBound, deletion: DeletionTime) {
        self.first = Some((start, deletion));
        self.high_water = None;
        self.closed = false;
    }

    fn take_range(&mut self) -> Option<DeleteRange> {
        let (start, deletion) = self.first.take()?;
        let end = self.high_water.take()?;
        self.closed = false;
        Some(DeleteRange {
            start,
            end,
            timestamp: deletion.marked_for_delete_at,
        })
    }
}
