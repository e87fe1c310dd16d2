//! Single-threaded pipeline driver.

use futures::FutureExt;
use log::{debug, trace};

use common_error::{QuarryError, QuarryResult};
use quarry_core::{Page, TypeDescriptor};

use super::DriverResult;
use crate::context::DriverContext;
use crate::metrics::{ExecutionTimer, OperatorStats};
use crate::operators::{BlockedFuture, BoxedOperator};

/// Outcome of one [`Driver::process`] pass.
pub enum Progress {
    /// Pages moved or operators changed state; call `process` again.
    Moved,
    /// Nothing can move until the future resolves.
    Blocked(BlockedFuture),
    /// Every operator is finished.
    Finished,
}

impl Progress {
    /// Check if the driver is done.
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Moved => write!(f, "Moved"),
            Self::Blocked(_) => write!(f, "Blocked"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// Owns one operator chain and moves pages through it.
///
/// Pages leaving the last operator are collected by the driver.
#[derive(Debug)]
pub struct Driver {
    ctx: DriverContext,
    operators: Vec<BoxedOperator>,
    /// Whether `finish` has been delivered to each operator.
    finish_sent: Vec<bool>,
    output: Vec<Page>,
}

impl Driver {
    pub(crate) fn new(ctx: DriverContext, operators: Vec<BoxedOperator>) -> Self {
        let finish_sent = vec![false; operators.len()];
        Self {
            ctx,
            operators,
            finish_sent,
            output: Vec::new(),
        }
    }

    /// Get the driver context.
    pub const fn context(&self) -> &DriverContext {
        &self.ctx
    }

    /// Types of the pages the driver collects.
    pub fn output_types(&self) -> &TypeDescriptor {
        self.last().output_types()
    }

    /// Check if the whole chain is finished.
    pub fn is_finished(&self) -> bool {
        self.last().is_finished()
    }

    /// Take the pages collected so far.
    pub fn take_output(&mut self) -> Vec<Page> {
        std::mem::take(&mut self.output)
    }

    /// Snapshot of every operator's accounting, head first.
    pub fn stats(&self) -> Vec<OperatorStats> {
        self.operators
            .iter()
            .map(|op| op.operator_context().stats())
            .collect()
    }

    /// Run one pass over the chain.
    ///
    /// For each adjacent pair the upstream operator, unless blocked or
    /// finished, hands one page to the downstream operator if that one
    /// needs input. A finished upstream operator finishes its downstream.
    /// Finally the last operator is polled for output.
    ///
    /// A pass that neither moves a page nor changes an operator's state
    /// while nothing is blocked means the chain is stuck, which is an
    /// `IllegalState`.
    pub fn process(&mut self) -> QuarryResult<Progress> {
        if self.is_finished() {
            return Ok(Progress::Finished);
        }

        let finished_before = self.finished_count();
        let mut moved = false;
        let mut blocked = None;

        for i in 0..self.operators.len() - 1 {
            let (head, tail) = self.operators.split_at_mut(i + 1);
            let current = &mut head[i];
            let next = &mut tail[0];

            let mut wait = current.is_blocked();
            if (&mut wait).now_or_never().is_none() {
                blocked.get_or_insert(wait);
                continue;
            }

            if !current.is_finished() && next.needs_input() {
                let timer = ExecutionTimer::start();
                let page = current.get_output()?;
                current
                    .operator_context()
                    .record_get_output(page.as_ref(), timer.stop());

                if let Some(page) = page {
                    let rows = page.position_count();
                    trace!("moving {rows} rows from operator {i} to {}", i + 1);
                    let timer = ExecutionTimer::start();
                    next.add_input(page)?;
                    next.operator_context().record_add_input(rows, timer.stop());
                    moved = true;
                }
            }

            if current.is_finished() && !self.finish_sent[i + 1] {
                let timer = ExecutionTimer::start();
                next.finish();
                next.operator_context().record_finish(timer.stop());
                self.finish_sent[i + 1] = true;
                moved = true;
            }
        }

        let last = self.operators.len() - 1;
        let operator = &mut self.operators[last];
        let mut wait = operator.is_blocked();
        if (&mut wait).now_or_never().is_none() {
            blocked.get_or_insert(wait);
        } else if !operator.is_finished() {
            let timer = ExecutionTimer::start();
            let page = operator.get_output()?;
            operator
                .operator_context()
                .record_get_output(page.as_ref(), timer.stop());
            if let Some(page) = page {
                trace!("collecting {} rows", page.position_count());
                self.output.push(page);
                moved = true;
            }
        }

        if self.is_finished() {
            return Ok(Progress::Finished);
        }
        if moved || self.finished_count() != finished_before {
            return Ok(Progress::Moved);
        }
        match blocked {
            Some(wait) => Ok(Progress::Blocked(wait)),
            None => Err(QuarryError::illegal_state(format!(
                "driver made no progress with {} of {} operators finished",
                finished_before,
                self.operators.len()
            ))),
        }
    }

    /// Drive the chain to the end, waiting on blocked operators.
    ///
    /// Cancellation is checked before every pass. Operator stats are
    /// recorded to the metrics sink whether or not the run succeeds.
    pub fn run_to_completion(mut self) -> QuarryResult<DriverResult> {
        let timer = ExecutionTimer::start();
        let outcome = self.run_loop();
        self.record_stats();
        outcome?;

        let elapsed = timer.stop();
        debug!(
            "driver finished {} operators in {elapsed:?}",
            self.operators.len()
        );
        Ok(DriverResult::new(
            std::mem::take(&mut self.output),
            self.output_types().clone(),
            self.stats(),
            elapsed,
        ))
    }

    fn run_loop(&mut self) -> QuarryResult<()> {
        loop {
            if self.ctx.is_cancelled() {
                debug!("driver cancelled");
                return Err(QuarryError::cancelled("driver cancelled"));
            }
            match self.process()? {
                Progress::Moved => {}
                Progress::Blocked(wait) => futures::executor::block_on(wait),
                Progress::Finished => return Ok(()),
            }
        }
    }

    fn record_stats(&self) {
        if let Some(sink) = self.ctx.metrics() {
            for operator in &self.operators {
                sink.record(&operator.operator_context().stats());
            }
        }
    }

    fn finished_count(&self) -> usize {
        self.operators.iter().filter(|op| op.is_finished()).count()
    }

    fn last(&self) -> &BoxedOperator {
        // a pipeline never instantiates an empty chain
        &self.operators[self.operators.len() - 1]
    }
}
