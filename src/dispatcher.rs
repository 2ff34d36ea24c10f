//! Event dispatch to the caller's handler

use std::collections::BTreeSet;

use crate::{
    constants::{SUBSCRIBE_ALL, SUBSCRIBE_ALL_LOWER},
    event::AmiEvent,
    queue::EventReceiver,
};

/// Which events reach the handler.
///
/// Built from the configured name list. `"All"` or `"all"` anywhere in the
/// list makes it [`Subscription::All`]; otherwise names are matched exactly
/// (case-sensitive) against the event's `Event` header. Duplicates collapse,
/// so each event is handled at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    All,
    Events(BTreeSet<String>),
}

impl Subscription {
    /// Build from event names as configured.
    ///
    /// ```
    /// # use asterisk_ami_tokio::Subscription;
    /// assert_eq!(Subscription::from_names(["Hangup", "all"]), Subscription::All);
    /// let named = Subscription::from_names(["Hangup", "Newchannel", "Hangup"]);
    /// assert!(matches!(named, Subscription::Events(ref s) if s.len() == 2));
    /// ```
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            if name == SUBSCRIBE_ALL || name == SUBSCRIBE_ALL_LOWER {
                return Subscription::All;
            }
            set.insert(name.to_string());
        }
        Subscription::Events(set)
    }

    /// Whether `event` should reach the handler.
    ///
    /// Frames with no `Event` header (action responses) only match `All`.
    pub fn matches(&self, event: &AmiEvent) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Events(names) => event
                .event_name()
                .is_some_and(|name| names.contains(name)),
        }
    }
}

/// Single consumer of the delivery queue.
///
/// Obtained from [`AmiSession::dispatcher`](crate::AmiSession::dispatcher)
/// or driven internally by
/// [`AmiSession::start_listening`](crate::AmiSession::start_listening).
/// Events come out in socket-read order; filtering never reorders them.
#[derive(Debug)]
pub struct EventDispatcher {
    rx: EventReceiver,
    subscription: Subscription,
}

impl EventDispatcher {
    pub(crate) fn new(rx: EventReceiver, subscription: Subscription) -> Self {
        Self { rx, subscription }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Next event matching the subscription, or `None` once the session is
    /// shut down and the queue is drained.
    pub async fn next(&mut self) -> Option<AmiEvent> {
        loop {
            let event = self
                .rx
                .recv()
                .await?;
            if self
                .subscription
                .matches(&event)
            {
                return Some(event);
            }
        }
    }

    /// Call `handler` for every matching event until the session shuts down.
    ///
    /// The handler runs on this task; while it runs, nothing else is
    /// dispatched, and under [`OverflowPolicy::Block`](crate::OverflowPolicy::Block)
    /// the socket read loop stalls once the queue fills.
    pub async fn run<F>(mut self, mut handler: F)
    where
        F: FnMut(AmiEvent),
    {
        while let Some(event) = self
            .next()
            .await
        {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::queue::delivery_queue;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    fn event(name: &str) -> AmiEvent {
        [("Event", name)]
            .into_iter()
            .collect()
    }

    #[test]
    fn all_matches_everything() {
        for token in ["All", "all"] {
            let sub = Subscription::from_names([token]);
            assert_eq!(sub, Subscription::All);
            assert!(sub.matches(&event("Hangup")));
            assert!(sub.matches(&AmiEvent::new()));
        }
    }

    #[test]
    fn all_is_case_sensitive_token() {
        let sub = Subscription::from_names(["ALL"]);
        assert!(!sub.matches(&event("Hangup")));
        assert!(sub.matches(&event("ALL")));
    }

    #[test]
    fn named_filter_exact_match() {
        let sub = Subscription::from_names(["Hangup", "Newchannel"]);
        assert!(sub.matches(&event("Hangup")));
        assert!(sub.matches(&event("Newchannel")));
        assert!(!sub.matches(&event("hangup")));
        assert!(!sub.matches(&event("HangupRequest")));

        let response: AmiEvent = [("Response", "Success")]
            .into_iter()
            .collect();
        assert!(!sub.matches(&response));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let sub = Subscription::from_names(Vec::<String>::new());
        assert!(!sub.matches(&event("Hangup")));
    }

    #[tokio::test]
    async fn run_fires_once_per_matching_event() {
        let (tx, rx) = delivery_queue(
            16,
            OverflowPolicy::Block,
            Arc::new(AtomicU64::new(0)),
        );
        let dispatcher = EventDispatcher::new(rx, Subscription::from_names(["All", "All"]));

        for name in ["Newchannel", "Newstate", "Hangup"] {
            assert!(tx
                .deliver(event(name))
                .await);
        }
        drop(tx);

        let mut seen = Vec::new();
        dispatcher
            .run(|e| {
                seen.push(
                    e.event_name()
                        .unwrap_or_default()
                        .to_string(),
                )
            })
            .await;
        assert_eq!(seen, vec!["Newchannel", "Newstate", "Hangup"]);
    }

    #[tokio::test]
    async fn next_skips_unsubscribed() {
        let (tx, rx) = delivery_queue(
            16,
            OverflowPolicy::Block,
            Arc::new(AtomicU64::new(0)),
        );
        let mut dispatcher = EventDispatcher::new(rx, Subscription::from_names(["Hangup"]));

        for name in ["Newchannel", "Hangup", "Newstate", "Hangup"] {
            assert!(tx
                .deliver(event(name))
                .await);
        }
        drop(tx);

        let mut count = 0;
        while let Some(e) = dispatcher
            .next()
            .await
        {
            assert!(e.is_event("Hangup"));
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
