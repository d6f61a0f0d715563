//! Memoization keyed on argument identity
//!
//! A [`Cacher`] wraps a function of observable arguments. Results are cached
//! per tuple of argument identities and invalidated when any argument of the
//! tuple reports a mutation through its observers.
//!
//! ```
//! use paramz_rs::caching::Cacher;
//! use paramz_rs::parameters::Node;
//!
//! let x = Node::param("x", vec![1.0, 2.0]);
//! let sum = Cacher::new(5, |args: &[Node]| args[0].values().iter().sum::<f64>());
//!
//! assert_eq!(sum.call(&[x.clone()]), 3.0);
//! x.set(&[5.0, 5.0]).unwrap();
//! assert_eq!(sum.call(&[x.clone()]), 10.0);
//! ```

use crate::config::CacheConfig;
use crate::parameters::observer::{Callback, Observable, ObserverId, PRIORITY_DEFAULT};
use log::debug;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

struct CacheEntry<A, R> {
    ids: Vec<ObserverId>,
    args: Vec<A>,
    output: R,
    changed: bool,
}

struct CacheState<A, R> {
    entries: VecDeque<CacheEntry<A, R>>,
    hits: usize,
    misses: usize,
}

/// Caches the results of `Fn(&[A]) -> R` for up to `limit` argument tuples.
pub struct Cacher<A, R>
where
    A: Observable + Clone + 'static,
    R: Clone + 'static,
{
    id: ObserverId,
    limit: usize,
    ignore_args: Vec<usize>,
    operation: Box<dyn Fn(&[A]) -> R>,
    state: Rc<RefCell<CacheState<A, R>>>,
}

fn distinct<A: Observable + Clone>(args: &[A]) -> Vec<A> {
    let mut out: Vec<A> = Vec::with_capacity(args.len());
    for arg in args {
        if !out.iter().any(|seen| seen.observer_id() == arg.observer_id()) {
            out.push(arg.clone());
        }
    }
    out
}

impl<A, R> Cacher<A, R>
where
    A: Observable + Clone + 'static,
    R: Clone + 'static,
{
    /// Cache up to `limit` argument tuples. `limit == 0` disables caching.
    pub fn new<F>(limit: usize, operation: F) -> Self
    where
        F: Fn(&[A]) -> R + 'static,
    {
        Self {
            id: ObserverId::next(),
            limit,
            ignore_args: Vec::new(),
            operation: Box::new(operation),
            state: Rc::new(RefCell::new(CacheState {
                entries: VecDeque::new(),
                hits: 0,
                misses: 0,
            })),
        }
    }

    pub fn with_config<F>(config: CacheConfig, operation: F) -> Self
    where
        F: Fn(&[A]) -> R + 'static,
    {
        Self::new(config.limit, operation).with_ignore_args(config.ignore_args)
    }

    /// Leave the arguments at `positions` out of the cache key. Mutating them
    /// does not invalidate anything.
    pub fn with_ignore_args(mut self, positions: Vec<usize>) -> Self {
        self.ignore_args = positions;
        self
    }

    /// Arguments that take part in the key, in order.
    fn tracked(&self, args: &[A]) -> Vec<A> {
        args.iter()
            .enumerate()
            .filter(|(i, _)| !self.ignore_args.contains(i))
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    /// Identity this cacher subscribes with.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of cached argument tuples.
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.hits, state.misses)
    }

    /// Return the cached result for `args`, computing it if needed.
    pub fn call(&self, args: &[A]) -> R {
        if self.limit == 0 {
            return (self.operation)(args);
        }

        let tracked = self.tracked(args);
        let ids: Vec<ObserverId> = tracked.iter().map(Observable::observer_id).collect();
        let cached = {
            let mut state = self.state.borrow_mut();
            let found = state
                .entries
                .iter()
                .find(|entry| entry.ids == ids)
                .map(|entry| (entry.changed, entry.output.clone()));
            if let Some((false, _)) = found {
                state.hits += 1;
            } else {
                state.misses += 1;
            }
            found
        };

        match cached {
            Some((false, output)) => output,
            Some((true, _)) => {
                let output = (self.operation)(args);
                let mut state = self.state.borrow_mut();
                if let Some(entry) = state.entries.iter_mut().find(|entry| entry.ids == ids) {
                    entry.output = output.clone();
                    entry.changed = false;
                }
                output
            }
            None => {
                let output = (self.operation)(args);
                self.insert(ids, tracked, output.clone());
                output
            }
        }
    }

    fn insert(&self, ids: Vec<ObserverId>, args: Vec<A>, output: R) {
        while self.len() >= self.limit {
            self.evict_oldest();
        }

        for arg in distinct(&args) {
            arg.remove_observer(self.id);
            arg.add_observer(self.id, PRIORITY_DEFAULT, self.invalidator(arg.observer_id()));
        }

        self.state.borrow_mut().entries.push_back(CacheEntry {
            ids,
            args,
            output,
            changed: false,
        });
    }

    /// Callback marking every entry that holds `arg` as stale.
    fn invalidator(&self, arg: ObserverId) -> Callback<A> {
        let state: Weak<RefCell<CacheState<A, R>>> = Rc::downgrade(&self.state);
        Rc::new(move |_origin: &A| {
            if let Some(state) = state.upgrade() {
                let mut state = state.borrow_mut();
                for entry in state.entries.iter_mut() {
                    if entry.ids.contains(&arg) {
                        entry.changed = true;
                    }
                }
            }
        })
    }

    fn evict_oldest(&self) {
        let evicted = self.state.borrow_mut().entries.pop_front();
        let Some(evicted) = evicted else {
            return;
        };

        let still_used: Vec<ObserverId> = self
            .state
            .borrow()
            .entries
            .iter()
            .flat_map(|entry| entry.ids.iter().copied())
            .collect();
        for arg in distinct(&evicted.args) {
            if !still_used.contains(&arg.observer_id()) {
                arg.remove_observer(self.id);
            }
        }
        debug!("cache {} evicted an entry", self.id);
    }

    /// Drop every cached result and stop listening to the arguments.
    pub fn reset(&self) {
        let entries: Vec<CacheEntry<A, R>> = self.state.borrow_mut().entries.drain(..).collect();
        let args: Vec<A> = entries.into_iter().flat_map(|entry| entry.args).collect();
        for arg in distinct(&args) {
            arg.remove_observer(self.id);
        }
    }
}

impl<A, R> Drop for Cacher<A, R>
where
    A: Observable + Clone + 'static,
    R: Clone + 'static,
{
    fn drop(&mut self) {
        self.reset();
    }
}
