use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use crate::arg::ArgState;
use crate::cpa::{AbstractState, MergeOperator};
use crate::error::CpaResult;

/// How the ARG merge treats two states at the same location.
pub enum ArgMerge<S, P> {
    /// Never merge.
    Separate,
    /// Join with the wrapped merge operator.
    Join(Rc<dyn MergeOperator<S, P>>),
    /// Like [`Join`][ArgMerge::Join], and remember whether the last call
    /// produced a new state.
    JoinTracking {
        inner: Rc<dyn MergeOperator<S, P>>,
        merged: Cell<bool>,
    },
}

impl<S, P> ArgMerge<S, P> {
    pub fn join_tracking(inner: Rc<dyn MergeOperator<S, P>>) -> Self {
        ArgMerge::JoinTracking {
            inner,
            merged: Cell::new(false),
        }
    }

    /// Whether the last merge changed the ARG. Always false unless tracking.
    pub fn last_merge_changed(&self) -> bool {
        match self {
            ArgMerge::JoinTracking { merged, .. } => merged.get(),
            _ => false,
        }
    }
}

impl<S: AbstractState, P> ArgMerge<S, P> {
    fn join(
        inner: &dyn MergeOperator<S, P>,
        state1: &ArgState<S>,
        state2: &ArgState<S>,
        precision: &P,
    ) -> CpaResult<Option<ArgState<S>>> {
        let (wrapped1, wrapped2) = {
            let arg = state1.arg().borrow();
            let a = arg.node(state1.id());
            assert!(!a.is_covered(), "Trying to merge covered element {}", a);
            let b = arg.node(state2.id());
            // States that may not cover must not absorb others either.
            if !b.may_cover() || a.merged_with().is_some() {
                return Ok(None);
            }
            (a.state().clone(), b.state().clone())
        };

        let Some(joined) = inner.merge(&wrapped1, &wrapped2, precision)? else {
            return Ok(None);
        };

        let mut arg = state1.arg().borrow_mut();
        assert!(
            arg.node(state1.id()).children().is_empty(),
            "Merged element {} already has children",
            state1.id()
        );
        let merged = arg.merge(state1.id(), state2.id(), joined);
        debug!("merge of {} and {} yields {}", state1.id(), state2.id(), merged);
        Ok(Some(state1.sibling(merged)))
    }
}

impl<S: AbstractState, P> MergeOperator<ArgState<S>, P> for ArgMerge<S, P> {
    fn merge(&self, state1: &ArgState<S>, state2: &ArgState<S>, precision: &P) -> CpaResult<Option<ArgState<S>>> {
        match self {
            ArgMerge::Separate => Ok(None),
            ArgMerge::Join(inner) => Self::join(inner.as_ref(), state1, state2, precision),
            ArgMerge::JoinTracking { inner, merged } => {
                let result = Self::join(inner.as_ref(), state1, state2, precision)?;
                merged.set(result.is_some());
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::arg::tests::{assert_consistent, Dummy};
    use crate::arg::{Arg, SharedArg, StateId};
    use crate::cpa::MergeSep;

    /// Joins any two states into one named "join".
    struct AlwaysJoin;

    impl MergeOperator<Dummy, ()> for AlwaysJoin {
        fn merge(&self, _state1: &Dummy, _state2: &Dummy, _precision: &()) -> CpaResult<Option<Dummy>> {
            Ok(Some(Dummy::new("join")))
        }
    }

    fn setup() -> (SharedArg<Dummy>, StateId, StateId, StateId) {
        let arg = Arg::shared();
        let (root, a, b) = {
            let mut g = arg.borrow_mut();
            let root = g.create_root(Dummy::new("root"));
            let b = g.create_successor(root, Dummy::new("b"));
            let a = g.create_successor(root, Dummy::new("a"));
            (root, a, b)
        };
        (arg, root, a, b)
    }

    #[test]
    fn test_separate_leaves_arg_alone() {
        let (arg, root, a, b) = setup();
        let before = format!("{:?}", arg.borrow());
        let sep: Rc<dyn MergeOperator<Dummy, ()>> = Rc::new(MergeSep);
        for merge in [ArgMerge::Separate, ArgMerge::Join(sep)] {
            let result = merge
                .merge(&ArgState::new(a, arg.clone()), &ArgState::new(b, arg.clone()), &())
                .unwrap();
            assert!(result.is_none());
        }
        assert_eq!(format!("{:?}", arg.borrow()), before);
        assert_eq!(arg.borrow().node(root).children(), &[b, a]);
    }

    #[test]
    fn test_join_replaces_second_state() {
        let (arg, root, a, b) = setup();
        let merge: ArgMerge<Dummy, ()> = ArgMerge::join_tracking(Rc::new(AlwaysJoin));
        let merged = merge
            .merge(&ArgState::new(a, arg.clone()), &ArgState::new(b, arg.clone()), &())
            .unwrap()
            .unwrap();
        assert!(merge.last_merge_changed());
        let g = arg.borrow();
        assert!(!g.contains(b));
        assert_eq!(g.node(a).merged_with(), Some(merged.id()));
        assert_eq!(g.state(merged.id()).name, "join");
        assert_eq!(g.node(merged.id()).parents(), &[root]);
        assert_consistent(&g);
    }

    #[test]
    fn test_no_join_into_non_covering_state() {
        let (arg, _, a, b) = setup();
        arg.borrow_mut().set_not_covering(b);
        let merge: ArgMerge<Dummy, ()> = ArgMerge::join_tracking(Rc::new(AlwaysJoin));
        let result = merge
            .merge(&ArgState::new(a, arg.clone()), &ArgState::new(b, arg.clone()), &())
            .unwrap();
        assert!(result.is_none());
        assert!(!merge.last_merge_changed());
    }

    #[test]
    #[should_panic(expected = "Trying to merge covered element")]
    fn test_merge_covered_panics() {
        let (arg, _, a, b) = setup();
        arg.borrow_mut().cover(a, b);
        let merge: ArgMerge<Dummy, ()> = ArgMerge::Join(Rc::new(AlwaysJoin));
        let _ = merge.merge(&ArgState::new(a, arg.clone()), &ArgState::new(b, arg.clone()), &());
    }
}
