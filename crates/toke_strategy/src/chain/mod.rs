//! Chain reads over JSON-RPC and local snapshot persistence.

mod rpc;
mod store;

pub use rpc::{decode_word, parse_quantity, RpcClient, RpcConfig, RpcError};
pub use store::{Store, StoreError};
