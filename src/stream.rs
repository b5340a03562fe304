//! Streaming enumeration of bugs.
//!
//! Reading every bug under a ref namespace can mean parsing a lot of
//! history, so enumeration is lazy: a producer thread reads bugs one at a
//! time and hands them over a bounded single-producer/single-consumer
//! channel. The consumer pulls at its own pace and may stop early; the
//! channel holds a single item, so at most one parsed bug is abandoned and
//! the producer exits on the next disconnected send. The first read error
//! is yielded as an item and terminates the stream.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, bounded};
use tracing::trace;

use crate::core::bug::{self, BUGS_REF_PREFIX, remote_bugs_ref_prefix};
use crate::core::{Bug, Error};
use crate::store::Store;

/// A finite, lazy sequence of bugs. Dropping it reclaims the producer.
pub struct BugStream {
    rx: Option<Receiver<Result<Bug, Error>>>,
    producer: Option<JoinHandle<()>>,
}

impl Iterator for BugStream {
    type Item = Result<Bug, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref().and_then(|rx| rx.recv().ok())
    }
}

impl Drop for BugStream {
    fn drop(&mut self) {
        // Disconnect first so a producer blocked on send can exit.
        drop(self.rx.take());
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
    }
}

/// Read and parse all bugs under the local namespace.
pub fn read_all_local<S>(store: Arc<S>) -> BugStream
where
    S: Store + Send + Sync + ?Sized + 'static,
{
    read_all(store, BUGS_REF_PREFIX.to_string())
}

/// Read and parse all bugs tracked for the given remote.
pub fn read_all_remote<S>(store: Arc<S>, remote: &str) -> BugStream
where
    S: Store + Send + Sync + ?Sized + 'static,
{
    read_all(store, remote_bugs_ref_prefix(remote))
}

fn read_all<S>(store: Arc<S>, prefix: String) -> BugStream
where
    S: Store + Send + Sync + ?Sized + 'static,
{
    let (tx, rx) = bounded(1);

    let producer = thread::spawn(move || {
        let refs = match store.list_refs(&prefix) {
            Ok(refs) => refs,
            Err(err) => {
                let _ = tx.send(Err(err.into()));
                return;
            }
        };
        trace!(prefix = %prefix, refs = refs.len(), "streaming bugs");

        for reference in refs {
            let item = bug::read(store.as_ref(), &reference);
            let failed = item.is_err();
            if tx.send(item).is_err() || failed {
                // Consumer left, or the error above terminates the stream.
                return;
            }
        }
    });

    BugStream {
        rx: Some(rx),
        producer: Some(producer),
    }
}
