//! Lazy depth-first search over an implicit graph
//!
//! Nodes are requested by a cheap identity (`TIn`, e.g. a URL) and turned into
//! an expensive value (`TOut`, e.g. a fetched page) by `materialize`. The
//! neighbours of a materialized node are produced by `adjacency`.

use futures::{Stream, TryStreamExt};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

/// Walks the graph reachable from `start` in depth-first order
///
/// Children are visited in the order `adjacency` yields them. Every identity
/// is materialized at most once, and a node whose materialized identity
/// differs from the requested one (a redirect, say) marks both as visited.
///
/// Nothing runs until the stream is polled, and no node is materialized
/// after the stream is dropped. The first error from `materialize` or
/// `adjacency` is yielded and ends the stream.
pub fn search<TIn, TOut, E, M, MFut, A, AStream>(
    start: TIn,
    mut materialize: M,
    mut adjacency: A,
) -> impl Stream<Item = Result<TOut, E>>
where
    TIn: Eq + Hash + Clone,
    TOut: Clone + Borrow<TIn>,
    M: FnMut(TIn) -> MFut,
    MFut: Future<Output = Result<TOut, E>>,
    A: FnMut(TOut) -> AStream,
    AStream: Stream<Item = Result<TIn, E>>,
{
    async_stream::stream! {
        let mut visited: HashSet<TIn> = HashSet::new();
        let mut stack = vec![start];

        while let Some(next) = stack.pop() {
            if visited.contains(&next) {
                continue;
            }

            let node = match materialize(next.clone()).await {
                Ok(node) => node,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };

            visited.insert(next);
            visited.insert(node.borrow().clone());
            yield Ok(node.clone());

            let children: Vec<TIn> = match adjacency(node).try_collect().await {
                Ok(children) => children,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };

            // Reversed so the first child is popped first
            stack.extend(
                children
                    .into_iter()
                    .filter(|child| !visited.contains(child))
                    .rev(),
            );
        }
    }
}
