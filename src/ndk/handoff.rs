//! Coefficient hand-off between a control thread and the audio thread.
//!
//! Pot moves are turned into a complete [`NdkCoefficients`] set, tagged with
//! its pot values, on the control side and passed over a bounded channel as an `Arc`. The audio side
//! swaps the pointer at a block boundary, so a sample is always computed
//! from one consistent set. Replaced sets travel back on a second channel and
//! are dropped by the control thread.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::trace;

use super::matrices::{NdkBase, NdkCoefficients};
use crate::error::Result;

type Shared<const NX: usize, const NN: usize, const NU: usize, const NO: usize> =
    Arc<NdkCoefficients<NX, NN, NU, NO>>;

/// Create a connected publisher/receiver pair.
///
/// `pots` are the values the audio side is currently running with.
pub fn channel<const NX: usize, const NN: usize, const NU: usize, const NO: usize>(
    base: NdkBase,
    pots: &[f64],
    capacity: usize,
) -> (CoefficientPublisher<NX, NN, NU, NO>, CoefficientReceiver<NX, NN, NU, NO>) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    // Room for every in-flight set plus the one being replaced.
    let (retired_tx, retired_rx) = bounded(capacity + 1);

    let publisher = CoefficientPublisher {
        base,
        pots: pots.to_vec(),
        pending: None,
        tx,
        retired: retired_rx,
    };
    let receiver = CoefficientReceiver {
        rx,
        retired: retired_tx,
        parked: None,
    };
    (publisher, receiver)
}

/// Control-thread end: rebuilds coefficients and sends them.
#[derive(Debug)]
pub struct CoefficientPublisher<const NX: usize, const NN: usize, const NU: usize, const NO: usize> {
    base: NdkBase,
    pots: Vec<f64>,
    pending: Option<Shared<NX, NN, NU, NO>>,
    tx: Sender<Shared<NX, NN, NU, NO>>,
    retired: Receiver<Shared<NX, NN, NU, NO>>,
}

impl<const NX: usize, const NN: usize, const NU: usize, const NO: usize> CoefficientPublisher<NX, NN, NU, NO> {
    /// Publish coefficients for new pot values.
    ///
    /// Returns `true` if a set was handed to the channel. Unchanged values
    /// only retry a set still waiting for room.
    pub fn publish(&mut self, pots: &[f64]) -> Result<bool> {
        self.collect();
        if pots != self.pots.as_slice() {
            // A newer set supersedes one that never made it out.
            self.pending = Some(Arc::new(self.base.coefficients(pots)?));
            self.pots = pots.to_vec();
        }
        Ok(self.flush())
    }

    /// Retry sending a set that found the channel full.
    pub fn flush(&mut self) -> bool {
        let Some(next) = self.pending.take() else {
            return false;
        };
        match self.tx.try_send(next) {
            Ok(()) => true,
            Err(TrySendError::Full(next)) => {
                self.pending = Some(next);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("coefficient receiver gone, dropping update");
                false
            }
        }
    }

    /// Drop sets the audio thread has retired. Returns how many were freed.
    pub fn collect(&mut self) -> usize {
        self.retired.try_iter().count()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pots(&self) -> &[f64] {
        &self.pots
    }
}

/// Audio-thread end. Never blocks and never frees a coefficient set.
#[derive(Debug)]
pub struct CoefficientReceiver<const NX: usize, const NN: usize, const NU: usize, const NO: usize> {
    rx: Receiver<Shared<NX, NN, NU, NO>>,
    retired: Sender<Shared<NX, NN, NU, NO>>,
    parked: Option<Shared<NX, NN, NU, NO>>,
}

impl<const NX: usize, const NN: usize, const NU: usize, const NO: usize> CoefficientReceiver<NX, NN, NU, NO> {
    /// Swap in the newest published set, if any. Returns `true` on a swap.
    pub fn sync(&mut self, current: &mut Shared<NX, NN, NU, NO>) -> bool {
        if let Some(old) = self.parked.take() {
            self.retire(old);
        }

        let mut newest = None;
        while let Ok(next) = self.rx.try_recv() {
            if let Some(skipped) = newest.replace(next) {
                self.retire(skipped);
            }
        }

        match newest {
            Some(next) => {
                let old = std::mem::replace(current, next);
                self.retire(old);
                trace!("installed new NDK coefficient set");
                true
            }
            None => false,
        }
    }

    fn retire(&mut self, old: Shared<NX, NN, NU, NO>) {
        match self.retired.try_send(old) {
            Ok(()) => {}
            // Keep one set back and hand it over on the next sync.
            Err(TrySendError::Full(old)) if self.parked.is_none() => self.parked = Some(old),
            Err(err) => drop(err.into_inner()),
        }
    }
}
