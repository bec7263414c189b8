//! Pod Orchestrator
//!
//! Drives the signal → sizing pipeline for every registered pod.
//!
//! ## Isolation
//!
//! ```text
//!   pod stage ──▶ Ok(..)            ─▶ result
//!             ├─▶ Err(e)            ─▶ PodExecutionError, pod excluded
//!             └─▶ panic (unwound)   ─▶ PodExecutionError, pod excluded
//! ```
//!
//! An excluded pod is skipped for the rest of the run. Other pods are
//! unaffected.
//!
//! ## Ordering
//!
//! Results always come back in registration order. With parallel signals
//! enabled the signal stage of every pod runs on its own scoped thread,
//! and the results are gathered back into registration order before any
//! of them is sized.

use super::{MarketView, OrderRequest, Pod, PodAllocation, PodRegistry, PodSpec, TradeIntent};
use crate::core::{PodExecutionError, PodId, PodStage, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Per-pod pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PodActivity {
    pub signal_calls: u64,
    pub intents: u64,
    pub orders_requested: u64,
}

/// Output of one signal stage across all pods
#[derive(Debug, Default)]
pub struct SignalRound {
    /// Intents per pod, registration order, only pods that produced any
    pub intents: Vec<(PodId, Vec<TradeIntent>)>,
    /// Pods excluded during this round
    pub failures: Vec<PodExecutionError>,
}

struct PodSlot {
    spec: PodSpec,
    pod: Box<dyn Pod>,
    excluded: bool,
    activity: PodActivity,
}

pub struct PodOrchestrator {
    slots: Vec<PodSlot>,
    parallel: bool,
    errors: Vec<PodExecutionError>,
}

type StageOutcome<T> = Result<anyhow::Result<T>, Box<dyn Any + Send>>;

fn invoke_signal(pod: &mut dyn Pod, view: &MarketView<'_>) -> StageOutcome<Vec<TradeIntent>> {
    catch_unwind(AssertUnwindSafe(|| pod.generate_signal(view)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked: <no message>".to_string()
    }
}

impl PodOrchestrator {
    pub fn new(registry: PodRegistry, parallel: bool) -> Self {
        let slots: Vec<PodSlot> = registry
            .into_entries()
            .into_iter()
            .map(|(spec, mut pod)| {
                pod.reset();
                PodSlot {
                    spec,
                    pod,
                    excluded: false,
                    activity: PodActivity::default(),
                }
            })
            .collect();
        info!(
            pods = slots.len(),
            parallel,
            order = ?slots.iter().map(|s| s.spec.id.as_str()).collect::<Vec<_>>(),
            "Initialized PodOrchestrator"
        );
        Self {
            slots,
            parallel,
            errors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pod specs in registration order
    pub fn specs(&self) -> impl Iterator<Item = &PodSpec> {
        self.slots.iter().map(|s| &s.spec)
    }

    pub fn spec(&self, pod: &PodId) -> Option<&PodSpec> {
        self.specs().find(|s| &s.id == pod)
    }

    pub fn is_excluded(&self, pod: &PodId) -> bool {
        self.slots
            .iter()
            .any(|s| &s.spec.id == pod && s.excluded)
    }

    pub fn excluded(&self) -> Vec<PodId> {
        self.slots
            .iter()
            .filter(|s| s.excluded)
            .map(|s| s.spec.id.clone())
            .collect()
    }

    /// Every error that excluded a pod, in the order they happened
    pub fn errors(&self) -> &[PodExecutionError] {
        &self.errors
    }

    pub fn activity(&self) -> Vec<(PodId, PodActivity)> {
        self.slots
            .iter()
            .map(|s| (s.spec.id.clone(), s.activity.clone()))
            .collect()
    }

    fn exclude(
        &mut self,
        index: usize,
        stage: PodStage,
        at: Timestamp,
        message: String,
    ) -> PodExecutionError {
        let slot = &mut self.slots[index];
        slot.excluded = true;
        let err = PodExecutionError {
            pod: slot.spec.id.clone(),
            stage,
            timestamp: at,
            message,
        };
        error!(pod = %err.pod, %stage, ts = at, message = %err.message, "Pod excluded");
        self.errors.push(err.clone());
        err
    }

    /// Run the signal stage of every pod that is not excluded and passes `eligible`
    pub fn generate_signals<F>(&mut self, view: &MarketView<'_>, eligible: F) -> SignalRound
    where
        F: Fn(&PodId) -> bool,
    {
        let runnable: Vec<bool> = self
            .slots
            .iter()
            .map(|s| !s.excluded && eligible(&s.spec.id))
            .collect();

        let outcomes: Vec<(usize, StageOutcome<Vec<TradeIntent>>)> = if self.parallel {
            self.signals_parallel(view, &runnable)
        } else {
            self.slots
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| runnable[*i])
                .map(|(i, slot)| (i, invoke_signal(slot.pod.as_mut(), view)))
                .collect()
        };

        let mut round = SignalRound::default();
        for (index, outcome) in outcomes {
            self.slots[index].activity.signal_calls += 1;
            let message = match outcome {
                Ok(Ok(intents)) => {
                    if !intents.is_empty() {
                        let slot = &mut self.slots[index];
                        slot.activity.intents += intents.len() as u64;
                        debug!(
                            pod = %slot.spec.id,
                            intents = intents.len(),
                            ts = view.timestamp,
                            "Signals generated"
                        );
                        round.intents.push((slot.spec.id.clone(), intents));
                    }
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let err = self.exclude(index, PodStage::Signal, view.timestamp, message);
            round.failures.push(err);
        }
        round
    }

    fn signals_parallel(
        &mut self,
        view: &MarketView<'_>,
        runnable: &[bool],
    ) -> Vec<(usize, StageOutcome<Vec<TradeIntent>>)> {
        let scoped = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = self
                .slots
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| runnable[*i])
                .map(|(i, slot)| {
                    let pod = slot.pod.as_mut();
                    (i, s.spawn(move |_| invoke_signal(pod, view)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(i, handle)| (i, handle.join().unwrap_or_else(Err)))
                .collect::<Vec<_>>()
        });
        // Every handle is joined above, so the scope itself only fails if
        // joining did
        scoped.unwrap_or_else(|payload| {
            error!(message = %panic_message(payload.as_ref()), "Signal worker scope failed");
            Vec::new()
        })
    }

    /// Run the sizing stage of `pod` for one intent
    ///
    /// Excluded pods size nothing. A request with a non-positive quantity
    /// is treated as a sizing failure.
    pub fn size_order(
        &mut self,
        pod: &PodId,
        intent: &TradeIntent,
        allocation: &PodAllocation,
        at: Timestamp,
    ) -> Result<Option<OrderRequest>, PodExecutionError> {
        let Some(index) = self.slots.iter().position(|s| &s.spec.id == pod) else {
            return Ok(None);
        };
        if self.slots[index].excluded {
            return Ok(None);
        }

        let slot = &mut self.slots[index];
        let outcome = catch_unwind(AssertUnwindSafe(|| slot.pod.size_order(intent, allocation)));
        let message = match outcome {
            Ok(Ok(None)) => return Ok(None),
            Ok(Ok(Some(request))) if request.quantity > Decimal::ZERO => {
                slot.activity.orders_requested += 1;
                return Ok(Some(request));
            }
            Ok(Ok(Some(request))) => format!(
                "sized {} {} with non-positive quantity {}",
                request.side, request.instrument, request.quantity
            ),
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => panic_message(payload.as_ref()),
        };
        Err(self.exclude(index, PodStage::Sizing, at, message))
    }

    /// Exclude `pod` for a failure detected outside the pod's own code
    pub fn fail(
        &mut self,
        pod: &PodId,
        stage: PodStage,
        at: Timestamp,
        message: String,
    ) -> Option<PodExecutionError> {
        let index = self.slots.iter().position(|s| &s.spec.id == pod)?;
        if self.slots[index].excluded {
            return None;
        }
        Some(self.exclude(index, stage, at, message))
    }
}
