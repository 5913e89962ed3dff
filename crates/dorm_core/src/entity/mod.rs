//! Entity keys, handles and the identity map.

mod handle;
mod key;
mod pool;

pub use handle::EntityHandle;
pub use key::EntityKey;
pub use pool::{EntityPool, PoolKey, PRIMARY_ID};
