use std::rc::Rc;

use log::debug;

use crate::arg::{ArgState, StateId};
use crate::cpa::{AbstractState, TransferRelation};
use crate::error::CpaResult;

/// Transfer relation that unwraps a state, delegates and wraps every
/// successor as a new child in the ARG.
///
/// When the path counter of the arena exceeds `max_paths`, each batch of
/// successors is down-sampled and the dropped successors are removed again.
pub struct ArgTransferRelation<S, P> {
    inner: Rc<dyn TransferRelation<S, P>>,
    max_paths: u64,
}

impl<S, P> ArgTransferRelation<S, P> {
    pub fn new(inner: Rc<dyn TransferRelation<S, P>>, max_paths: u64) -> Self {
        Self { inner, max_paths }
    }
}

impl<S: AbstractState, P> TransferRelation<ArgState<S>, P> for ArgTransferRelation<S, P> {
    fn successors(&self, state: &ArgState<S>, precision: &P) -> CpaResult<Vec<ArgState<S>>> {
        // Covered states may still be in the reached set but are never expanded.
        if state.is_covered() {
            return Ok(Vec::new());
        }

        let wrapped = {
            let mut arg = state.arg().borrow_mut();
            arg.mark_expanded(state.id());
            arg.state(state.id()).clone()
        };
        let successors = self.inner.successors(&wrapped, precision)?;
        if successors.is_empty() {
            return Ok(Vec::new());
        }

        let mut arg = state.arg().borrow_mut();
        let mut ids: Vec<StateId> = successors
            .into_iter()
            .map(|s| arg.create_successor(state.id(), s))
            .collect();

        // Dropped successors leave the ARG entirely and close the paths they opened.
        if let Some(keep) = arg.counter().trimmed_indices(ids.len(), self.max_paths) {
            let dropped: Vec<StateId> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| !keep.contains(i))
                .map(|(_, &id)| id)
                .collect();
            for &id in &dropped {
                arg.remove(id);
            }
            arg.counter_mut().dec(dropped.len() as u64);
            arg.statistics_mut().trimmed += dropped.len();
            debug!("dropped successors {:?} of {}", dropped, state.id());
            ids = keep.into_iter().map(|i| ids[i]).collect();
        }

        Ok(ids.into_iter().map(|id| state.sibling(id)).collect())
    }
}
