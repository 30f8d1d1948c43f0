//! Change notification for state owned outside the synchronous core.

use tokio::sync::watch;

/// A value whose successful updates are announced to subscribers.
///
/// Subscribers receive a revision counter; they read the value itself from
/// the owner. Failed updates do not bump the revision.
#[derive(Debug)]
pub struct Observed<T> {
    value: T,
    revision: watch::Sender<u64>,
}

impl<T> Observed<T> {
    pub fn new(value: T) -> Self {
        let (revision, _) = watch::channel(0);
        Self { value, revision }
    }

    /// Current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receive the revision after every successful update.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Apply a fallible mutation, notifying subscribers if it succeeds.
    pub fn update<R, E>(&mut self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E> {
        let result = f(&mut self.value)?;
        self.revision.send_modify(|revision| *revision += 1);
        Ok(result)
    }

    /// Take the value back.
    pub fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetError;
    use crate::repository::Repository;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_successful_updates_notify() {
        let mut state = Observed::new(Repository::new());
        let mut rx = state.subscribe();

        state.update(|repo| repo.create("auth").map(|_| ())).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert!(state.get().contains("auth"));

        let err = state
            .update(|repo| repo.create("auth").map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, SetError::DuplicateName(_)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(state.revision(), 1);
    }
}
