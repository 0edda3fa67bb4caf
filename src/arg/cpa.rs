use std::rc::Rc;

use crate::arg::merge::ArgMerge;
use crate::arg::precision::{ArgPrecisionAdjustment, ArgReducer};
use crate::arg::stop::ArgStop;
use crate::arg::transfer::ArgTransferRelation;
use crate::arg::{Arg, ArgState, SharedArg};
use crate::cfa::NodeId;
use crate::cpa::{
    AbstractState, ConfigurableProgramAnalysis, MergeOperator, PrecisionAdjustment, Reducer, StopOperator,
    TransferRelation,
};
use crate::error::CpaResult;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ArgMergeMode {
    Separate,
    #[default]
    Join,
    JoinTracking,
}

#[derive(Debug, Clone, Default)]
pub struct ArgOptions {
    /// Bound on the path counter before successors get trimmed; 0 disables trimming.
    pub max_paths: u64,
    pub keep_covered_states_in_reached: bool,
    pub merge: ArgMergeMode,
}

/// The ARG layer on top of an inner analysis.
///
/// Every run gets a fresh arena, and with it a fresh path counter.
pub struct ArgCpa<S, P> {
    inner: Rc<dyn ConfigurableProgramAnalysis<S, P>>,
    arg: SharedArg<S>,
    transfer: Rc<ArgTransferRelation<S, P>>,
    merge: Rc<ArgMerge<S, P>>,
    stop: Rc<ArgStop<S, P>>,
    precision_adjustment: Rc<ArgPrecisionAdjustment<S, P>>,
}

impl<S: AbstractState + 'static, P: 'static> ArgCpa<S, P> {
    pub fn new(inner: Rc<dyn ConfigurableProgramAnalysis<S, P>>, options: &ArgOptions) -> Self {
        let merge = match options.merge {
            ArgMergeMode::Separate => ArgMerge::Separate,
            ArgMergeMode::Join => ArgMerge::Join(inner.merge_operator()),
            ArgMergeMode::JoinTracking => ArgMerge::join_tracking(inner.merge_operator()),
        };
        Self {
            arg: Arg::shared(),
            transfer: Rc::new(ArgTransferRelation::new(inner.transfer_relation(), options.max_paths)),
            merge: Rc::new(merge),
            stop: Rc::new(ArgStop::new(
                inner.stop_operator(),
                options.keep_covered_states_in_reached,
            )),
            precision_adjustment: Rc::new(ArgPrecisionAdjustment::new(inner.precision_adjustment())),
            inner,
        }
    }

    pub fn arg(&self) -> &SharedArg<S> {
        &self.arg
    }

    pub fn inner(&self) -> &Rc<dyn ConfigurableProgramAnalysis<S, P>> {
        &self.inner
    }

    /// The merge operator, for asking whether the last merge changed anything.
    pub fn arg_merge(&self) -> &ArgMerge<S, P> {
        &self.merge
    }
}

impl<S: AbstractState + 'static, P: 'static> ConfigurableProgramAnalysis<ArgState<S>, P> for ArgCpa<S, P> {
    fn transfer_relation(&self) -> Rc<dyn TransferRelation<ArgState<S>, P>> {
        self.transfer.clone()
    }

    fn merge_operator(&self) -> Rc<dyn MergeOperator<ArgState<S>, P>> {
        self.merge.clone()
    }

    fn stop_operator(&self) -> Rc<dyn StopOperator<ArgState<S>, P>> {
        self.stop.clone()
    }

    fn precision_adjustment(&self) -> Rc<dyn PrecisionAdjustment<ArgState<S>, P>> {
        self.precision_adjustment.clone()
    }

    fn reducer(&self) -> Option<Rc<dyn Reducer<ArgState<S>, P>>> {
        let inner = self.inner.reducer()?;
        Some(Rc::new(ArgReducer::new(inner)))
    }

    /// Creates the root of the ARG.
    fn initial_state(&self, node: NodeId) -> CpaResult<ArgState<S>> {
        let wrapped = self.inner.initial_state(node)?;
        let id = self.arg.borrow_mut().create_root(wrapped);
        Ok(ArgState::new(id, self.arg.clone()))
    }

    fn initial_precision(&self, node: NodeId) -> P {
        self.inner.initial_precision(node)
    }
}
