use std::rc::Rc;

use log::debug;

use crate::arg::ArgState;
use crate::cpa::{AbstractState, StopOperator};
use crate::error::CpaResult;

/// Coverage check against the reached states one at a time.
pub struct ArgStop<S, P> {
    inner: Rc<dyn StopOperator<S, P>>,
    keep_covered_states_in_reached: bool,
}

impl<S, P> ArgStop<S, P> {
    pub fn new(inner: Rc<dyn StopOperator<S, P>>, keep_covered_states_in_reached: bool) -> Self {
        Self {
            inner,
            keep_covered_states_in_reached,
        }
    }
}

impl<S: AbstractState, P> ArgStop<S, P> {
    /// Try to cover `state` by `reached`; on success the coverage is recorded.
    fn stop_single(&self, state: &ArgState<S>, reached: &ArgState<S>, precision: &P) -> CpaResult<bool> {
        let (wrapped, wrapped_reached) = {
            let arg = state.arg().borrow();
            let r = arg.node(reached.id());
            if !r.may_cover() || state.id() == reached.id() {
                return Ok(false);
            }
            // Never cover by a newer state, in particular not by a descendant.
            if state.id().is_older_than(reached.id()) {
                return Ok(false);
            }
            (arg.state(state.id()).clone(), r.state().clone())
        };

        if self.inner.stop(&wrapped, &[wrapped_reached], precision)? {
            state.arg().borrow_mut().cover(state.id(), reached.id());
            return Ok(true);
        }
        Ok(false)
    }
}

impl<S: AbstractState, P> StopOperator<ArgState<S>, P> for ArgStop<S, P> {
    fn stop(&self, state: &ArgState<S>, reached: &[ArgState<S>], precision: &P) -> CpaResult<bool> {
        let merged_with = {
            let arg = state.arg().borrow();
            let node = arg.node(state.id());
            assert!(!node.is_covered(), "Passing element to stop which is already covered: {}", node);
            node.merged_with()
        };

        // A state merged into a reached state is usually covered by it; then
        // it disappears from the ARG instead of being marked covered.
        if let Some(m) = merged_with {
            if reached.iter().any(|r| r.id() == m) {
                let (wrapped, wrapped_merged) = {
                    let arg = state.arg().borrow();
                    (arg.state(state.id()).clone(), arg.state(m).clone())
                };
                if self.inner.stop(&wrapped, &[wrapped_merged], precision)? {
                    let mut arg = state.arg().borrow_mut();
                    arg.remove(state.id());
                    arg.counter_mut().dec(1);
                    debug!("{} is covered by {} it was merged into", state.id(), m);
                    return Ok(true);
                }
                debug!("{} was merged into {} but is not covered by it", state.id(), m);
            }
        }

        if state.is_target() {
            return Ok(false);
        }

        for r in reached {
            if self.stop_single(state, r, precision)? {
                return Ok(!self.keep_covered_states_in_reached);
            }
        }
        Ok(false)
    }

    fn is_forced_covering_possible(&self, state: &ArgState<S>, reached: &ArgState<S>, precision: &P) -> bool {
        let (wrapped, wrapped_reached) = {
            let arg = state.arg().borrow();
            let r = arg.node(reached.id());
            if r.is_covered() || !r.may_cover() || state.id().is_older_than(reached.id()) {
                return false;
            }
            (arg.state(state.id()).clone(), r.state().clone())
        };
        self.inner.is_forced_covering_possible(&wrapped, &wrapped_reached, precision)
    }
}
