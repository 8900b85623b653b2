//! batchexecute transport: response codec, RPC client, streaming queries.

pub mod codec;
pub mod constants;
pub mod query;
pub mod rpc;

pub use constants::{CodeMapper, rpc_ids};
pub use query::{QueryClient, QueryRequest, QueryResult};
pub use rpc::{CallOptions, RpcClient};
