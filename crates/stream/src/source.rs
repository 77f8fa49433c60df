//! Where the next frame buffer comes from.
//!
//! Two acquisition modes exist and a controller uses exactly one, fixed
//! by its type parameter:
//!
//! - [`PullSource`]: the interrupt asks the client through
//!   [`StreamHandler::on_get_new_trans`].
//! - [`QueueSource`]: tasks [`submit`](QueueSource::submit) transactions
//!   ahead of time; the interrupt dequeues without blocking.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};

use gdma::{Error, Result};

use crate::transaction::{StreamHandler, Transaction};

/// Buffer acquisition strategy.
pub trait TransactionSource {
    /// Fill `trans` with the next buffer, if one is ready. Never blocks.
    /// Returns "need yield".
    fn acquire<H>(&self, handler: &H, trans: &mut Transaction) -> bool
    where
        H: StreamHandler + ?Sized;
}

/// Ask the client from interrupt context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullSource;

impl TransactionSource for PullSource {
    fn acquire<H>(&self, handler: &H, trans: &mut Transaction) -> bool
    where
        H: StreamHandler + ?Sized,
    {
        handler.on_get_new_trans(trans)
    }
}

/// How long [`QueueSource::submit`] may wait for room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Fail at once if the queue is full.
    Immediate,
    /// Wait up to the given duration.
    After(Duration),
    /// Wait until a completion makes room.
    Indefinite,
}

/// Bounded queue of `N` pre-submitted transactions.
pub struct QueueSource<const N: usize> {
    queue: Channel<CriticalSectionRawMutex, Transaction, N>,
}

impl<const N: usize> QueueSource<N> {
    /// Empty queue.
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
        }
    }

    /// Queue a transaction for a future frame.
    ///
    /// The transaction must carry a buffer. Fails with
    /// [`Error::Timeout`] if the queue is still full when `timeout`
    /// elapses.
    pub async fn submit(&self, trans: Transaction, timeout: Timeout) -> Result<()> {
        if trans.buffer.is_none() {
            return Err(Error::InvalidArgument("transaction has no buffer"));
        }
        match timeout {
            Timeout::Immediate => self.queue.try_send(trans).map_err(|_| Error::Timeout),
            Timeout::After(limit) => with_timeout(limit, self.queue.send(trans))
                .await
                .map_err(|_| Error::Timeout),
            Timeout::Indefinite => {
                self.queue.send(trans).await;
                Ok(())
            }
        }
    }

    /// Transactions waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Nothing waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<const N: usize> Default for QueueSource<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TransactionSource for QueueSource<N> {
    fn acquire<H>(&self, _handler: &H, trans: &mut Transaction) -> bool
    where
        H: StreamHandler + ?Sized,
    {
        if let Ok(next) = self.queue.try_receive() {
            *trans = next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use embassy_futures::block_on;

    use super::*;
    use crate::transaction::DmaBuf;

    struct Nobody;

    impl StreamHandler for Nobody {
        fn on_get_new_trans(&self, _trans: &mut Transaction) -> bool {
            true
        }

        fn on_trans_finished(&self, _trans: &Transaction) -> bool {
            false
        }
    }

    fn buf(addr: usize) -> Transaction {
        // SAFETY: never dereferenced.
        Transaction::new(unsafe { DmaBuf::from_raw(addr as *mut u8, 64) })
    }

    #[test]
    fn queue_hands_out_in_submission_order() {
        let source = QueueSource::<2>::new();
        block_on(source.submit(buf(0x100), Timeout::Immediate)).unwrap();
        block_on(source.submit(buf(0x200), Timeout::Immediate)).unwrap();
        assert_eq!(source.len(), 2);

        let mut trans = Transaction::EMPTY;
        assert!(!source.acquire(&Nobody, &mut trans));
        assert_eq!(trans.buffer.map(|b| b.addr()), Some(0x100));
        source.acquire(&Nobody, &mut trans);
        assert_eq!(trans.buffer.map(|b| b.addr()), Some(0x200));
    }

    #[test]
    fn empty_queue_leaves_the_transaction_untouched() {
        let source = QueueSource::<1>::new();
        let mut trans = Transaction::EMPTY;
        source.acquire(&Nobody, &mut trans);
        assert_eq!(trans, Transaction::EMPTY);
    }

    #[test]
    fn submit_rejects_bufferless_transactions() {
        let source = QueueSource::<1>::new();
        let err = block_on(source.submit(Transaction::EMPTY, Timeout::Immediate)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(source.is_empty());
    }

    #[test]
    fn pull_source_forwards_the_yield_flag() {
        let mut trans = Transaction::EMPTY;
        assert!(PullSource.acquire(&Nobody, &mut trans));
    }
}
