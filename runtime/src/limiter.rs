//! Concurrency limiting applied before lifecycle instances start.
//!
//! [`cancel_matcher`] derives the set of action types that cancel a logic's
//! in-flight instances. [`limit`] thins a logic's matched actions with
//! debounce and then throttle; every action the limiter swallows is handed to
//! the `on_drop` callback so the caller can account for it.

use composable_logic_core::logic::Logic;
use composable_logic_core::matcher::TypeMatcher;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Callback receiving actions swallowed by the limiter.
pub type OnDrop<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Types that cancel in-flight instances of `logic`: its own type when
/// `latest` is set, plus its explicit `cancel_type`.
#[must_use]
pub fn cancel_matcher(logic: &Logic) -> Option<TypeMatcher> {
    let mut alternatives = Vec::new();
    if logic.latest() {
        alternatives.extend(logic.type_matcher().clone().into_alternatives());
    }
    if let Some(cancel_type) = logic.cancel_type() {
        alternatives.extend(cancel_type.clone().into_alternatives());
    }
    match alternatives.len() {
        0 => None,
        1 => alternatives.pop(),
        _ => Some(TypeMatcher::OneOf(alternatives)),
    }
}

/// Apply debounce then throttle. A zero window disables that step.
pub fn limit<S, T>(
    input: S,
    debounce_window: Duration,
    throttle_window: Duration,
    on_drop: OnDrop<T>,
) -> BoxStream<'static, T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    let stream = if debounce_window.is_zero() {
        input.boxed()
    } else {
        debounce(input, debounce_window, Arc::clone(&on_drop)).boxed()
    };
    if throttle_window.is_zero() {
        stream
    } else {
        throttle(stream, throttle_window, on_drop).boxed()
    }
}

enum Step<T> {
    Item(Option<T>),
    Fire,
}

/// Emit an item only after `window` passed without a newer one. Pending
/// items are flushed when the input ends.
pub fn debounce<S, T>(input: S, window: Duration, on_drop: OnDrop<T>) -> impl Stream<Item = T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    async_stream::stream! {
        let mut input = Box::pin(input);
        let mut pending: Option<T> = None;
        let timer = tokio::time::sleep(window);
        tokio::pin!(timer);

        loop {
            let step = if pending.is_some() {
                tokio::select! {
                    item = input.next() => Step::Item(item),
                    () = &mut timer => Step::Fire,
                }
            } else {
                Step::Item(input.next().await)
            };

            match step {
                Step::Item(Some(item)) => {
                    if let Some(stale) = pending.replace(item) {
                        on_drop(stale);
                    }
                    timer.as_mut().reset(Instant::now() + window);
                }
                Step::Item(None) => {
                    if let Some(item) = pending.take() {
                        yield item;
                    }
                    break;
                }
                Step::Fire => {
                    if let Some(item) = pending.take() {
                        yield item;
                    }
                }
            }
        }
    }
}

/// Emit the first item of each `window`; drop the rest.
pub fn throttle<S, T>(input: S, window: Duration, on_drop: OnDrop<T>) -> impl Stream<Item = T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    async_stream::stream! {
        let mut input = Box::pin(input);
        let mut closed_until: Option<Instant> = None;

        while let Some(item) = input.next().await {
            let now = Instant::now();
            if closed_until.is_some_and(|until| now < until) {
                on_drop(item);
                continue;
            }
            closed_until = Some(now + window);
            yield item;
        }
    }
}
