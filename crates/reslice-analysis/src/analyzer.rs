//! Streaming analyzer interfaces.
//!
//! Both analyzers are fed the buffer one hop at a time, in order, and may
//! report an event after any hop. Implementations keep their own history and
//! must be [`reset`](OnsetDetector::reset) before reuse on a new buffer.

/// Detects note onsets in a stream of hops.
pub trait OnsetDetector: Send {
    /// Feed the next hop. Returns the time in seconds of an onset confirmed
    /// by this hop, if any. Reported times are non-decreasing.
    fn process(&mut self, hop: &[f32]) -> Option<f64>;

    /// Clear all history.
    fn reset(&mut self);
}

/// Estimates tempo from a stream of hops.
pub trait TempoEstimator: Send {
    /// Feed the next hop. Returns a tempo estimate in bpm when one is
    /// available after this hop.
    fn process(&mut self, hop: &[f32]) -> Option<f32>;

    fn reset(&mut self);
}

impl<T: OnsetDetector + ?Sized> OnsetDetector for Box<T> {
    fn process(&mut self, hop: &[f32]) -> Option<f64> {
        (**self).process(hop)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<T: TempoEstimator + ?Sized> TempoEstimator for Box<T> {
    fn process(&mut self, hop: &[f32]) -> Option<f32> {
        (**self).process(hop)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Call `f` with every hop of `samples`, in order.
///
/// Every hop handed out is exactly `hop_size` long; the final partial hop is
/// zero-padded. An empty buffer produces no hops.
pub fn for_each_hop(samples: &[f32], hop_size: usize, mut f: impl FnMut(&[f32])) {
    if hop_size == 0 {
        return;
    }
    let mut chunks = samples.chunks_exact(hop_size);
    for hop in &mut chunks {
        f(hop);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut padded = vec![0.0; hop_size];
        padded[..rest.len()].copy_from_slice(rest);
        f(&padded);
    }
}
