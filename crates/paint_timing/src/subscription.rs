//! Cancellation tokens for host subscriptions.
//!
//! A [`Subscription`] owns the undo action for one registration with the host
//! (an observer, a listener or a timer). Cancelling runs that action once; dropping
//! an uncancelled subscription cancels it. [`SubscriptionGroup`] cancels a set of
//! subscriptions together, like an abort signal shared by several listeners.

use core::fmt;

/// Cancellation token returned by every host registration.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap the action that unregisters the handler.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    #[must_use]
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    /// Unregister the handler. Later calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether `cancel` still has work to do.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A set of subscriptions cancelled as one unit.
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    members: Vec<Subscription>,
    cancelled: bool,
}

impl SubscriptionGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Members added after the group was cancelled are cancelled immediately.
    pub fn push(&mut self, mut subscription: Subscription) {
        if self.cancelled {
            subscription.cancel();
            return;
        }
        self.members.push(subscription);
    }

    /// Cancel every member. Idempotent.
    pub fn cancel_all(&mut self) {
        self.cancelled = true;
        for mut member in self.members.drain(..) {
            member.cancel();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of members still registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting() -> (Rc<Cell<u32>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        let subscription = Subscription::new(move || seen.set(seen.get() + 1));
        (count, subscription)
    }

    #[test]
    fn cancel_runs_once() {
        let (count, mut subscription) = counting();
        assert!(subscription.is_active());
        subscription.cancel();
        subscription.cancel();
        drop(subscription);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn drop_cancels() {
        let (count, subscription) = counting();
        drop(subscription);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn group_cancels_members_together() {
        let (first, lhs) = counting();
        let (second, rhs) = counting();
        let mut group = SubscriptionGroup::new();
        group.push(lhs);
        group.push(rhs);
        assert_eq!(group.len(), 2);
        group.cancel_all();
        group.cancel_all();
        assert_eq!((first.get(), second.get()), (1, 1));
        assert!(group.is_empty());

        let (late, member) = counting();
        group.push(member);
        assert_eq!(late.get(), 1, "late members are cancelled on arrival");
    }
}
