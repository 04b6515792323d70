use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use image::RgbImage;

use super::fallback::FallbackSegmenter;
use super::types::{Mask, SegmentationModel};
use crate::config::PipelineConfig;
use crate::error::SegmentationResult;
use crate::mask::MaskProcessor;

/// Single-slot, overwrite-latest hand-off from the worker thread. Staleness
/// never compounds: a result that was not consumed in time is simply
/// replaced by the next one.
type ResultSlot = Arc<Mutex<Option<SegmentationResult<Mask>>>>;

struct Worker {
    request_tx: SyncSender<RgbImage>,
    slot: ResultSlot,
}

/// Which segmentation capability this session is running on.
enum Capability {
    /// Model alive on the worker thread.
    Primary(Worker),
    /// Model missing or dead; the heuristic serves every frame. Entered at
    /// most once per session, never left.
    FallbackPermanent,
}

/// Owns the primary-model/fallback decision and the frame-skip cache, and
/// presents one coherent "current mask" to the scheduler.
///
/// At most one request is in flight at a time. While one is pending, callers
/// keep getting the last-known mask; a finished result becomes visible at the
/// start of the next refresh that consumes it, so the compositor never
/// observes a mask mutating mid-tick.
pub struct SegmentationSource {
    capability: Capability,
    fallback: FallbackSegmenter,
    processor: MaskProcessor,
    cached: Option<Mask>,
    in_flight: bool,
    discarding: bool,
}

impl SegmentationSource {
    pub fn new(model: Option<Box<dyn SegmentationModel>>, config: &PipelineConfig) -> Self {
        let capability = match model {
            Some(model) => match spawn_worker(model) {
                Ok(worker) => Capability::Primary(worker),
                Err(err) => {
                    tracing::warn!(
                        "could not start segmentation worker ({err}), \
                         using heuristic fallback for this session"
                    );
                    Capability::FallbackPermanent
                }
            },
            None => {
                tracing::warn!(
                    "segmentation model unavailable, using heuristic fallback for this session"
                );
                Capability::FallbackPermanent
            }
        };

        Self {
            capability,
            fallback: FallbackSegmenter::new(config),
            processor: MaskProcessor::new(config),
            cached: None,
            in_flight: false,
            discarding: false,
        }
    }

    /// Stage any finished result, then kick off a new request unless one is
    /// still pending. Never blocks; consumers read `current_mask` afterwards.
    pub fn refresh(&mut self, frame: &RgbImage) {
        if self.discarding {
            return;
        }
        if matches!(self.capability, Capability::FallbackPermanent) {
            let mask = self.fallback.estimate(frame);
            self.store(mask);
        } else {
            self.stage_finished(frame);
            self.request(frame);
        }
    }

    /// Last-known-good, blend-ready mask. `None` until the first result
    /// lands, which the compositor treats as all-foreground passthrough.
    pub fn current_mask(&self) -> Option<&Mask> {
        self.cached.as_ref()
    }

    /// True while a request sits with the worker.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// True when a finished result is waiting to be staged by the next
    /// `refresh`.
    pub fn has_staged_result(&self) -> bool {
        match &self.capability {
            Capability::Primary(worker) => lock(&worker.slot).is_some(),
            Capability::FallbackPermanent => false,
        }
    }

    /// Forget the cached mask and ignore any in-flight result when it lands.
    /// Called on stop so a future session starts cold instead of reusing a
    /// mask from a previous subject or lighting condition.
    pub fn discard_cache(&mut self) {
        self.cached = None;
        self.discarding = true;
    }

    fn stage_finished(&mut self, frame: &RgbImage) {
        let Capability::Primary(worker) = &self.capability else {
            return;
        };
        let Some(result) = lock(&worker.slot).take() else {
            return;
        };
        self.in_flight = false;
        match result {
            Ok(mask) => self.store(mask),
            Err(err) => {
                // Transient: the primary stays active, this frame gets the
                // heuristic instead.
                tracing::warn!(
                    "segmentation call failed ({err}), using heuristic mask for this frame"
                );
                let mask = self.fallback.estimate(frame);
                self.store(mask);
            }
        }
    }

    fn request(&mut self, frame: &RgbImage) {
        if self.in_flight {
            return;
        }
        let Capability::Primary(worker) = &self.capability else {
            return;
        };
        match worker.request_tx.try_send(frame.clone()) {
            Ok(()) => self.in_flight = true,
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!(
                    "segmentation worker is gone, using heuristic fallback for the rest \
                     of the session"
                );
                self.in_flight = false;
                self.capability = Capability::FallbackPermanent;
                let mask = self.fallback.estimate(frame);
                self.store(mask);
            }
        }
    }

    fn store(&mut self, mut mask: Mask) {
        self.processor.smooth(&mut mask);
        self.cached = Some(mask);
    }
}

fn spawn_worker(mut model: Box<dyn SegmentationModel>) -> std::io::Result<Worker> {
    let (request_tx, request_rx) = sync_channel::<RgbImage>(1);
    let slot: ResultSlot = Arc::new(Mutex::new(None));
    let worker_slot = Arc::clone(&slot);

    // The thread exits when the request sender is dropped. No join on
    // shutdown: a model call that never returns must not hold up stop.
    thread::Builder::new()
        .name("segmentation".into())
        .spawn(move || {
            while let Ok(frame) = request_rx.recv() {
                let result = model.segment(&frame);
                *lock(&worker_slot) = Some(result);
            }
        })?;

    Ok(Worker { request_tx, slot })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
