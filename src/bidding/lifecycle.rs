use tokio::sync::watch;

/// Held by whatever hosts the bid form. Dropping it (or calling `cancel`)
/// stops any workflow bound to the paired [`Lifecycle`].
#[derive(Debug)]
pub struct LifecycleGuard {
    sender: watch::Sender<bool>,
}

impl LifecycleGuard {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

#[derive(Clone, Debug)]
pub struct Lifecycle {
    receiver: watch::Receiver<bool>,
}

impl Lifecycle {
    pub fn new() -> (LifecycleGuard, Lifecycle) {
        let (sender, receiver) = watch::channel(false);
        (LifecycleGuard { sender }, Lifecycle { receiver })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once the guard is cancelled or dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (guard, lifecycle) = Lifecycle::new();
        assert!(!lifecycle.is_cancelled());

        let mut waiter = lifecycle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        guard.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(lifecycle.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels() {
        let (guard, mut lifecycle) = Lifecycle::new();
        drop(guard);
        assert!(lifecycle.is_cancelled());
        lifecycle.cancelled().await;
    }
}
