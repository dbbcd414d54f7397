//! Observable cells.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// A value whose changes can be observed.
///
/// Setting a cell always notifies subscribers, even if the new value equals
/// the old one.
pub struct Cell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Replaces the value with `f(current)` and returns the new value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        self.tx.send_modify(|value| *value = f(value));
        self.get()
    }

    /// Subscribes to changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Returns a read-only view computing `f` over this cell's value.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U> {
        Derived {
            rx: self.subscribe(),
            f: Arc::new(f),
        }
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&*self.tx.borrow()).finish()
    }
}

/// A read-only view derived from a [`Cell`].
pub struct Derived<T, U> {
    rx: watch::Receiver<T>,
    f: Arc<dyn Fn(&T) -> U + Send + Sync>,
}

impl<T, U> Clone for Derived<T, U> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<T, U> Derived<T, U> {
    /// Computes the view over the source cell's current value.
    pub fn get(&self) -> U {
        (self.f)(&*self.rx.borrow())
    }

    /// Waits for the source cell to change, then returns the new view.
    ///
    /// Returns `None` once the source cell is dropped.
    pub async fn changed(&mut self) -> Option<U> {
        self.rx.changed().await.ok()?;
        Some((self.f)(&*self.rx.borrow_and_update()))
    }
}
