use std::rc::Rc;

use log::debug;

use crate::arg::ArgState;
use crate::cpa::{AbstractState, Block, PrecisionAdjustment, PrecisionAdjustmentResult, Reducer};
use crate::error::CpaResult;

/// Adjusts the wrapped state of an ARG node in place.
///
/// A state the wrapped adjustment reports as bottom is removed from the ARG.
pub struct ArgPrecisionAdjustment<S, P> {
    inner: Rc<dyn PrecisionAdjustment<S, P>>,
}

impl<S, P> ArgPrecisionAdjustment<S, P> {
    pub fn new(inner: Rc<dyn PrecisionAdjustment<S, P>>) -> Self {
        Self { inner }
    }
}

impl<S: AbstractState, P> PrecisionAdjustment<ArgState<S>, P> for ArgPrecisionAdjustment<S, P> {
    fn adjust(
        &self,
        state: &ArgState<S>,
        precision: &P,
    ) -> CpaResult<Option<PrecisionAdjustmentResult<ArgState<S>, P>>> {
        let wrapped = state.wrapped();
        let Some(result) = self.inner.adjust(&wrapped, precision)? else {
            debug!("{} is bottom after precision adjustment", state.id());
            state.arg().borrow_mut().remove(state.id());
            return Ok(None);
        };
        state.arg().borrow_mut().replace_state(state.id(), result.state);
        Ok(Some(PrecisionAdjustmentResult {
            state: state.clone(),
            precision: result.precision,
            action: result.action,
        }))
    }
}

/// Reducer over ARG states. Reduced and expanded states are fresh nodes
/// without parents.
pub struct ArgReducer<S, P> {
    inner: Rc<dyn Reducer<S, P>>,
}

impl<S, P> ArgReducer<S, P> {
    pub fn new(inner: Rc<dyn Reducer<S, P>>) -> Self {
        Self { inner }
    }
}

impl<S: AbstractState, P> Reducer<ArgState<S>, P> for ArgReducer<S, P> {
    fn reduce_state(&self, state: &ArgState<S>, block: &Block) -> CpaResult<ArgState<S>> {
        let reduced = self.inner.reduce_state(&state.wrapped(), block)?;
        let id = state.arg().borrow_mut().create_detached(reduced);
        Ok(state.sibling(id))
    }

    fn expand_state(&self, root: &ArgState<S>, block: &Block, reduced: &ArgState<S>) -> CpaResult<ArgState<S>> {
        let expanded = self.inner.expand_state(&root.wrapped(), block, &reduced.wrapped())?;
        let id = root.arg().borrow_mut().create_detached(expanded);
        Ok(root.sibling(id))
    }

    fn reduce_precision(&self, precision: &P, block: &Block) -> P {
        self.inner.reduce_precision(precision, block)
    }

    fn expand_precision(&self, root: &P, block: &Block, reduced: &P) -> P {
        self.inner.expand_precision(root, block, reduced)
    }
}
