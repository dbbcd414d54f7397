//! Observable state bound to a data source.
//!
//! A [`DataBinding`] wraps one `Arc<dyn DataSource<T>>` in four observable
//! values: the bound value, a loading flag, the last error message and the
//! action handles that drive them. Observers subscribe to any [`Cell`] and
//! are woken on every change.
//!
//! ```ignore
//! let binding = DataBinding::new("wallet", None::<Wallet>, source);
//! binding.load().await;
//! let mut rx = binding.value().subscribe();
//! ```

mod binding;
mod cell;

pub use binding::{BindingOptions, BoundShape, DataBinding, RefreshTask, WriteAction};
pub use cell::{Cell, Derived};
